//! Playback through an external player such as `aplay`, used when the crate
//! is built without the `cpal-audio` feature.

use crate::audio::AudioOutput;
use crate::defaults;
use crate::error::{Result, TalkbackError};
use crate::pipeline::types::AudioChunk;
use crate::process::kill_quietly;
use std::io::{Cursor, ErrorKind, Write};
use std::process::{Child, Command, Stdio};

/// Encodes a chunk as a complete mono 16-bit WAV file.
pub fn encode_wav(chunk: &AudioChunk) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: chunk.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_error = |e: hound::Error| TalkbackError::Playback {
        message: format!("Failed to encode WAV: {e}"),
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for &sample in &chunk.samples {
            writer.write_sample(sample).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

/// Plays each chunk by piping it as WAV into a player process.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    command: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new(
            defaults::PLAYER_COMMAND,
            vec!["-q".to_string(), "-".to_string()],
        )
    }
}

impl AudioOutput for CommandPlayer {
    fn play(&self, chunk: &AudioChunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let wav = encode_wav(chunk)?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    TalkbackError::ToolNotFound {
                        tool: self.command.clone(),
                    }
                } else {
                    TalkbackError::Playback {
                        message: format!("failed to start {}: {e}", self.command),
                    }
                }
            })?;

        if let Some(stdin) = child.stdin.take() {
            feed(&mut child, stdin, &wav, &self.command)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TalkbackError::Playback {
                message: format!(
                    "{} failed with status {}: {}",
                    self.command,
                    output.status,
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Writes the WAV bytes to the player's stdin and closes it. A player that
/// exits early surfaces through its exit status; any other write failure
/// kills and reaps the player before returning.
fn feed(child: &mut Child, mut stdin: impl Write, wav: &[u8], command: &str) -> Result<()> {
    match stdin.write_all(wav) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(e) => {
            drop(stdin);
            kill_quietly(child, "player");
            Err(TalkbackError::Playback {
                message: format!("failed to write to {command}: {e}"),
            })
        }
    }
}
