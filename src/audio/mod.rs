//! Audio output.
//!
//! Playback is blocking: [`AudioOutput::play`] returns once the chunk has
//! been handed to the device and played out, so a playback worker
//! naturally paces itself to real time.
//!
//! With the `cpal-audio` feature, [`CpalOutput`] keeps one device stream
//! open for the session. Without it, [`CommandPlayer`] pipes each chunk to
//! an external player.

pub mod player;
#[cfg(feature = "cpal-audio")]
pub mod speaker;

use crate::error::{Result, TalkbackError};
use crate::pipeline::types::AudioChunk;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub use player::{CommandPlayer, encode_wav};
#[cfg(feature = "cpal-audio")]
pub use speaker::CpalOutput;

/// Pluggable audio sink.
pub trait AudioOutput: Send + Sync {
    /// Play one chunk to completion.
    fn play(&self, chunk: &AudioChunk) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Output that discards audio. Used with `--no-speech`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentOutput;

impl AudioOutput for SilentOutput {
    fn play(&self, _chunk: &AudioChunk) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Output that records every chunk it is asked to play (for testing).
#[derive(Debug, Default)]
pub struct RecordingOutput {
    played: Mutex<Vec<AudioChunk>>,
    fail_on: Option<usize>,
    delay: Duration,
    attempts: Mutex<usize>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th play call (zero-based). The chunk is not recorded.
    pub fn with_failure_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Simulate playback time per chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Chunks played so far, in order.
    pub fn played(&self) -> Vec<AudioChunk> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&self, chunk: &AudioChunk) -> Result<()> {
        let attempt = {
            let mut attempts = self
                .attempts
                .lock()
                .map_err(|_| TalkbackError::Other("attempt counter poisoned".to_string()))?;
            *attempts += 1;
            *attempts - 1
        };

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        if self.fail_on == Some(attempt) {
            return Err(TalkbackError::Playback {
                message: format!("mock device failed on chunk {attempt}"),
            });
        }

        self.played
            .lock()
            .map_err(|_| TalkbackError::Other("recording poisoned".to_string()))?
            .push(chunk.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_output_accepts_everything() {
        let output = SilentOutput;
        assert!(output.play(&AudioChunk::new(vec![1, 2, 3], 16000)).is_ok());
        assert_eq!(output.name(), "silent");
    }

    #[test]
    fn test_recording_output_keeps_order() {
        let output = RecordingOutput::new();
        output.play(&AudioChunk::new(vec![1], 16000)).unwrap();
        output.play(&AudioChunk::new(vec![2], 16000)).unwrap();

        let played: Vec<Vec<i16>> = output.played().into_iter().map(|c| c.samples).collect();
        assert_eq!(played, vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_recording_output_failure_skips_chunk() {
        let output = RecordingOutput::new().with_failure_on(1);
        assert!(output.play(&AudioChunk::new(vec![1], 16000)).is_ok());
        assert!(matches!(
            output.play(&AudioChunk::new(vec![2], 16000)),
            Err(TalkbackError::Playback { .. })
        ));
        assert!(output.play(&AudioChunk::new(vec![3], 16000)).is_ok());
        assert_eq!(output.played().len(), 2);
    }
}
