//! Synthesis through an external command such as `piper`.
//!
//! The command receives the sentence on stdin and must write raw 16-bit
//! little-endian mono PCM to stdout. Output is cut into fixed-duration
//! chunks as it arrives.

use crate::defaults;
use crate::error::{Result, TalkbackError};
use crate::pipeline::types::AudioChunk;
use crate::process::kill_quietly;
use crate::tts::{ChunkStream, Synthesizer};
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Settings for [`CommandSynthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSynthesizerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Voice model, passed as `--model <voice>` after `args`.
    pub voice: Option<String>,
    /// Sample rate the command produces, in Hz.
    pub sample_rate: u32,
    /// Audio duration per emitted chunk.
    pub chunk_ms: u32,
}

impl Default for CommandSynthesizerConfig {
    fn default() -> Self {
        Self {
            command: defaults::TTS_COMMAND.to_string(),
            args: vec!["--output-raw".to_string()],
            voice: None,
            sample_rate: defaults::TTS_SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
        }
    }
}

/// Synthesizer that runs one external process per sentence.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    config: CommandSynthesizerConfig,
}

impl CommandSynthesizer {
    pub fn new(config: CommandSynthesizerConfig) -> Self {
        Self { config }
    }

    /// Bytes of PCM per chunk (at least one sample).
    fn chunk_bytes(&self) -> usize {
        let samples = u64::from(self.config.sample_rate) * u64::from(self.config.chunk_ms) / 1000;
        (samples.max(1) as usize) * 2
    }

    fn command_args(&self) -> Vec<&str> {
        let mut args: Vec<&str> = self.config.args.iter().map(String::as_str).collect();
        if let Some(ref voice) = self.config.voice {
            args.push("--model");
            args.push(voice);
        }
        args
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str) -> Result<ChunkStream> {
        let tool = &self.config.command;
        let mut child = Command::new(tool)
            .args(self.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    TalkbackError::ToolNotFound { tool: tool.clone() }
                } else {
                    TalkbackError::Synthesis {
                        message: format!("failed to start {tool}: {e}"),
                    }
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(text.as_bytes()).and_then(|()| stdin.write_all(b"\n")) {
                Ok(()) => {}
                // Exited without reading; the exit status tells the rest
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    kill_quietly(&mut child, "synthesis");
                    return Err(TalkbackError::Synthesis {
                        message: format!("failed to send text to {tool}: {e}"),
                    });
                }
            }
        }

        let stdout = child.stdout.take().ok_or_else(|| TalkbackError::Synthesis {
            message: format!("{tool} has no stdout"),
        })?;

        Ok(Box::new(PcmChunks {
            tool: tool.clone(),
            child,
            stdout,
            chunk_bytes: self.chunk_bytes(),
            sample_rate: self.config.sample_rate,
            eof: false,
            done: false,
        }))
    }

    fn name(&self) -> &str {
        &self.config.command
    }
}

/// Reads fixed-size PCM chunks from a running synthesis process.
struct PcmChunks {
    tool: String,
    child: Child,
    stdout: ChildStdout,
    chunk_bytes: usize,
    sample_rate: u32,
    eof: bool,
    done: bool,
}

impl PcmChunks {
    /// Fills up to one chunk. Returns fewer bytes only at end of output.
    fn read_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn exit_status(&mut self) -> Result<()> {
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(TalkbackError::Synthesis {
                message: format!("{} exited with {status}", self.tool),
            })
        }
    }
}

impl Iterator for PcmChunks {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.eof {
            match self.read_chunk() {
                Ok(bytes) => {
                    let samples = decode_pcm(&bytes);
                    if !samples.is_empty() {
                        return Some(Ok(AudioChunk::new(samples, self.sample_rate)));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(TalkbackError::Synthesis {
                        message: format!("failed reading from {}: {e}", self.tool),
                    }));
                }
            }
        }

        self.done = true;
        self.exit_status().err().map(Err)
    }
}

impl Drop for PcmChunks {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            kill_quietly(&mut self.child, "synthesis");
        }
    }
}

/// Decodes little-endian 16-bit PCM. A trailing odd byte is dropped.
fn decode_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str, sample_rate: u32, chunk_ms: u32) -> CommandSynthesizer {
        CommandSynthesizer::new(CommandSynthesizerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            voice: None,
            sample_rate,
            chunk_ms,
        })
    }

    #[test]
    fn test_decode_pcm_little_endian() {
        assert_eq!(decode_pcm(&[0x01, 0x00, 0xff, 0xff, 0x07]), vec![1, -1]);
    }

    #[test]
    fn test_chunk_bytes() {
        let synth = shell("true", 24000, 250);
        assert_eq!(synth.chunk_bytes(), 12000);

        let tiny = shell("true", 10, 1);
        assert_eq!(tiny.chunk_bytes(), 2);
    }

    #[test]
    fn test_voice_is_appended_as_model_flag() {
        let synth = CommandSynthesizer::new(CommandSynthesizerConfig {
            voice: Some("en_US-amy-medium.onnx".to_string()),
            ..Default::default()
        });
        assert_eq!(
            synth.command_args(),
            vec!["--output-raw", "--model", "en_US-amy-medium.onnx"]
        );
    }

    #[test]
    fn test_synthesize_splits_output_into_chunks() {
        // 4000 bytes = 2000 samples; 1000 samples per chunk at 1 kHz / 1 s
        let synth = shell("cat >/dev/null; head -c 4000 /dev/zero", 1000, 1000);
        let chunks: Vec<AudioChunk> = synth
            .synthesize("Hello.")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.samples.len() == 1000));
        assert_eq!(chunks[0].sample_rate, 1000);
    }

    #[test]
    fn test_synthesize_emits_partial_last_chunk() {
        let synth = shell("cat >/dev/null; head -c 3000 /dev/zero", 1000, 1000);
        let sizes: Vec<usize> = synth
            .synthesize("Hi.")
            .unwrap()
            .map(|c| c.unwrap().samples.len())
            .collect();
        assert_eq!(sizes, vec![1000, 500]);
    }

    #[test]
    fn test_synthesize_receives_text_on_stdin() {
        // Echo stdin back as PCM: "ab\n" -> 3 bytes -> one sample
        let synth = shell("cat", 1000, 1000);
        let chunks: Vec<AudioChunk> = synth
            .synthesize("ab")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples, vec![i16::from_le_bytes([b'a', b'b'])]);
    }

    #[test]
    fn test_synthesize_nonzero_exit_is_error() {
        let synth = shell("cat >/dev/null; exit 3", 1000, 1000);
        let items: Vec<Result<AudioChunk>> = synth.synthesize("Hello.").unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TalkbackError::Synthesis { .. })));
    }

    #[test]
    fn test_synthesize_missing_tool() {
        let synth = CommandSynthesizer::new(CommandSynthesizerConfig {
            command: "talkback-no-such-tts-binary".to_string(),
            ..Default::default()
        });
        match synth.synthesize("Hello.") {
            Err(TalkbackError::ToolNotFound { tool }) => {
                assert_eq!(tool, "talkback-no-such-tts-binary");
            }
            Err(other) => panic!("Expected ToolNotFound, got {other}"),
            Ok(_) => panic!("Expected ToolNotFound, got a stream"),
        }
    }

    #[test]
    fn test_dropping_stream_early_stops_process() {
        let synth = shell("cat >/dev/null; head -c 100000000 /dev/zero", 1000, 10);
        let mut stream = synth.synthesize("Long.").unwrap();
        assert!(stream.next().is_some());
        // Must not hang waiting for 100 MB of output
        drop(stream);
    }
}
