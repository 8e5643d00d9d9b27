//! Producer end of the pipeline: pulls fragments from the text generator and
//! fans each one out to the display and text channels.

use crate::error::Result;
use crate::llm::TextGenerator;
use crate::pipeline::error::StationError;
use crate::pipeline::station::{Emitter, WorkerContext, WorkerHandle};
use crate::pipeline::types::StreamItem;
use crossbeam_channel::Sender;
use std::sync::Arc;

const NAME: &str = "text-source";

/// Adapter around a [`TextGenerator`].
///
/// Each fragment goes to the display channel first, then the text channel.
/// Generator failures end both streams early; they never escape the worker.
pub struct TextSource {
    generator: Arc<dyn TextGenerator>,
}

impl TextSource {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Name of the worker thread this adapter runs on.
    pub fn name(&self) -> &'static str {
        NAME
    }

    /// Starts generating a response to `prompt` on a new worker thread.
    ///
    /// The worker returns the number of fragments it forwarded.
    pub fn spawn(
        self,
        prompt: String,
        display_tx: Sender<StreamItem<String>>,
        text_tx: Sender<StreamItem<String>>,
        ctx: WorkerContext,
    ) -> Result<WorkerHandle> {
        WorkerHandle::spawn(NAME, move || {
            let mut display = Emitter::new(Some(display_tx), ctx.token.clone());
            let mut text = Emitter::new(Some(text_tx), ctx.token.clone());

            let forwarded = match self.forward(&prompt, &mut display, &mut text) {
                Ok(count) => count,
                Err((count, error)) => {
                    ctx.reporter.report(NAME, &error);
                    count
                }
            };

            display.close();
            text.close();
            tracing::debug!(station = NAME, fragments = forwarded, "text source stopped");

            // Release the turn only after both sentinels are out
            drop(ctx);
            forwarded
        })
    }

    /// Pumps fragments until the generator is exhausted, fails, or the turn
    /// is cancelled. On failure, returns how many fragments made it through.
    fn forward(
        &self,
        prompt: &str,
        display: &mut Emitter<String>,
        text: &mut Emitter<String>,
    ) -> std::result::Result<usize, (usize, StationError)> {
        let fragments = self
            .generator
            .generate(prompt)
            .map_err(|e| (0, StationError::Fatal(e.to_string())))?;

        let mut count = 0;
        for fragment in fragments {
            if text.is_cancelled() {
                return Err((count, StationError::Cancelled));
            }
            let fragment = fragment.map_err(|e| (count, StationError::Fatal(e.to_string())))?;
            if fragment.is_empty() {
                continue;
            }

            display.emit(fragment.clone()).map_err(|e| (count, e))?;
            text.emit(fragment).map_err(|e| (count, e))?;
            count += 1;
        }
        Ok(count)
    }
}
