//! Text-to-speech backends.
//!
//! A synthesizer turns one sentence into a lazy stream of audio chunks so
//! playback of the first chunk can start before the rest is ready.

pub mod command;

use crate::error::{Result, TalkbackError};
use crate::pipeline::types::AudioChunk;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

pub use command::{CommandSynthesizer, CommandSynthesizerConfig};

/// Lazy stream of synthesized audio chunks for one sentence.
pub type ChunkStream = Box<dyn Iterator<Item = Result<AudioChunk>> + Send>;

/// Trait for speech synthesis.
///
/// This trait allows swapping implementations (external command vs mock).
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`.
    ///
    /// Dropping the returned stream early must release any resources the
    /// synthesis holds (child processes, buffers).
    fn synthesize(&self, text: &str) -> Result<ChunkStream>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Synthesizer that produces no audio. Used in text-only mode so no TTS
/// engine has to be installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynthesizer;

impl Synthesizer for SilentSynthesizer {
    fn synthesize(&self, _text: &str) -> Result<ChunkStream> {
        Ok(Box::new(std::iter::empty()))
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Mock synthesizer for testing.
///
/// Each call produces chunks whose two samples are `[call, chunk]`, so tests
/// can tell from the audio alone which sentence and chunk it came from.
#[derive(Debug)]
pub struct MockSynthesizer {
    chunk_counts: Vec<usize>,
    default_chunks: usize,
    fail_on: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    spoken: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    /// Create a mock producing `chunks` chunks per sentence.
    pub fn new(chunks: usize) -> Self {
        Self {
            chunk_counts: Vec::new(),
            default_chunks: chunks,
            fail_on: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Per-call chunk counts. Calls beyond the list use the default.
    pub fn with_chunk_counts(mut self, counts: Vec<usize>) -> Self {
        self.chunk_counts = counts;
        self
    }

    /// Fail synthesis for any sentence containing `needle`.
    pub fn with_failure_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Sleep before yielding each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sentences passed to [`Synthesizer::synthesize`], in call order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str) -> Result<ChunkStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }

        if let Some(ref needle) = self.fail_on
            && text.contains(needle.as_str())
        {
            return Err(TalkbackError::Synthesis {
                message: format!("mock refused to speak {text:?}"),
            });
        }

        let count = self
            .chunk_counts
            .get(call)
            .copied()
            .unwrap_or(self.default_chunks);
        let delay = self.delay;

        Ok(Box::new((0..count).map(move |chunk| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            Ok(AudioChunk::new(vec![call as i16, chunk as i16], 16000))
        })))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
