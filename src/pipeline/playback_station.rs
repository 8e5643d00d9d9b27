//! Playback station - renders audio chunks strictly one after another.

use crate::audio::AudioOutput;
use crate::pipeline::error::StationError;
use crate::pipeline::station::{Emitter, Station};
use crate::pipeline::types::SpokenChunk;
use std::sync::Arc;

/// Terminal station that plays each chunk to completion before taking the
/// next one off the audio channel.
pub struct PlaybackStation {
    output: Arc<dyn AudioOutput>,
    played: usize,
}

impl PlaybackStation {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self { output, played: 0 }
    }
}

impl Station for PlaybackStation {
    type Input = SpokenChunk;
    type Output = ();

    fn process(&mut self, chunk: SpokenChunk, out: &mut Emitter<()>) -> Result<(), StationError> {
        // A chunk dequeued just before the interrupt must not reach the speaker
        if out.is_cancelled() {
            return Err(StationError::Cancelled);
        }

        self.output.play(&chunk.audio).map_err(|e| {
            StationError::Recoverable(format!(
                "skipping chunk {}.{}: {e}",
                chunk.sentence, chunk.chunk
            ))
        })?;
        self.played += 1;
        tracing::trace!(
            station = "playback",
            sentence = chunk.sentence,
            chunk = chunk.chunk,
            ms = chunk.audio.duration_ms(),
            "played"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "playback"
    }

    fn completed(&self) -> usize {
        self.played
    }
}
