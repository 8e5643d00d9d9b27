//! Display station - consumes the display channel and drives a [`DisplaySink`].

use crate::display::DisplaySink;
use crate::pipeline::error::StationError;
use crate::pipeline::station::{Emitter, Station};
use std::sync::Arc;

/// Terminal station writing fragments to a display as they arrive.
///
/// Runs independently of the audio path: a slow display never holds up
/// synthesis, and the display never waits for speech.
pub struct DisplayStation {
    sink: Arc<dyn DisplaySink>,
    written: usize,
}

impl DisplayStation {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self { sink, written: 0 }
    }
}

impl Station for DisplayStation {
    type Input = String;
    type Output = ();

    fn process(
        &mut self,
        fragment: String,
        _out: &mut Emitter<()>,
    ) -> Result<(), StationError> {
        self.sink
            .write(&fragment)
            .map_err(|e| StationError::Recoverable(format!("display write failed: {e}")))?;
        self.written += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "display"
    }

    fn completed(&self) -> usize {
        self.written
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.sink.end() {
            tracing::warn!(station = "display", "failed to finish display: {e}");
        }
    }
}
