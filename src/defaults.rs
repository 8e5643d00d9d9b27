//! Default configuration constants for talkback.
//!
//! Shared by the configuration file, the CLI and the pipeline so the same
//! values apply no matter where a setting comes from.

use std::time::Duration;

/// Default language model served by Ollama.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default Ollama endpoint.
pub const OLLAMA_HOST: &str = "http://localhost:11434";

/// How long to wait for a freshly started `ollama serve` to answer.
pub const SERVER_START_TIMEOUT_MS: u64 = 10_000;

/// Sampling temperature sent with every chat request.
pub const TEMPERATURE: f32 = 0.7;

/// Upper bound on generated tokens per response.
pub const MAX_TOKENS: u32 = 512;

/// Default text-to-speech command. Must read text on stdin and write raw
/// 16-bit little-endian mono PCM to stdout.
pub const TTS_COMMAND: &str = "piper";

/// Sample rate of synthesized audio in Hz.
pub const TTS_SAMPLE_RATE: u32 = 24000;

/// Duration of audio carried by one chunk, in milliseconds.
///
/// Shorter chunks start playback sooner and make interrupts more responsive,
/// at the cost of more player invocations per sentence.
pub const CHUNK_MS: u32 = 250;

/// Default audio player. Reads a WAV stream on stdin.
pub const PLAYER_COMMAND: &str = "aplay";

/// How long a worker blocks on an empty channel before re-checking the
/// cancellation token.
pub const POLL_INTERVAL_MS: u64 = 100;

/// How long an interrupted turn may take to unwind before remaining workers
/// are detached.
pub const CANCEL_TIMEOUT_MS: u64 = 2000;

/// Inputs that end the interactive session.
pub const EXIT_COMMANDS: &[&str] = &["exit", "quit"];

/// Poll interval as a [`Duration`].
pub fn poll_interval() -> Duration {
    Duration::from_millis(POLL_INTERVAL_MS)
}

/// Cancel timeout as a [`Duration`].
pub fn cancel_timeout() -> Duration {
    Duration::from_millis(CANCEL_TIMEOUT_MS)
}
