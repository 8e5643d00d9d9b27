//! Synthesis station - segments the text stream into sentences and turns
//! each sentence into audio chunks.

use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::segmenter::SentenceSegmenter;
use crate::pipeline::station::{Emitter, Station};
use crate::pipeline::types::{Sentence, SpokenChunk};
use crate::tts::Synthesizer;
use std::sync::Arc;

const NAME: &str = "synthesis";

/// Station that consumes text fragments and emits audio chunks.
///
/// The segmenter runs inline: it has no concurrency of its own, so giving it
/// a thread would only add a channel hop. Chunks are forwarded as soon as the
/// synthesizer yields them.
pub struct SynthesisStation {
    synthesizer: Arc<dyn Synthesizer>,
    segmenter: SentenceSegmenter,
    reporter: Arc<dyn ErrorReporter>,
    next_index: usize,
    spoken: usize,
}

impl SynthesisStation {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            segmenter: SentenceSegmenter::new(),
            reporter: Arc::new(LogReporter),
            next_index: 0,
            spoken: 0,
        }
    }

    /// Where per-sentence failures are reported. A single fragment can
    /// complete several sentences, so failures are reported here and the
    /// remaining sentences still get spoken.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn speak_all(
        &mut self,
        texts: Vec<String>,
        out: &mut Emitter<SpokenChunk>,
    ) -> Result<(), StationError> {
        for text in texts {
            let sentence = Sentence::new(self.next_index, text);
            self.next_index += 1;
            self.speak(&sentence, out)?;
        }
        Ok(())
    }

    /// Synthesizes one sentence, forwarding each chunk as it arrives.
    ///
    /// Synthesis failures are reported and swallowed. Only cancellation and a
    /// vanished consumer stop the station.
    fn speak(
        &mut self,
        sentence: &Sentence,
        out: &mut Emitter<SpokenChunk>,
    ) -> Result<(), StationError> {
        if out.is_cancelled() {
            return Err(StationError::Cancelled);
        }
        tracing::debug!(station = NAME, sentence = sentence.index, text = %sentence.text, "synthesizing");

        let chunks = match self.synthesizer.synthesize(&sentence.text) {
            Ok(chunks) => chunks,
            Err(e) => {
                self.report_skip(sentence, &e.to_string());
                return Ok(());
            }
        };

        let mut chunk_index = 0;
        for chunk in chunks {
            // Stop pulling from the synthesizer as soon as the turn is cancelled
            if out.is_cancelled() {
                return Err(StationError::Cancelled);
            }
            match chunk {
                Ok(audio) if audio.is_empty() => {}
                Ok(audio) => {
                    out.emit(SpokenChunk::new(sentence.index, chunk_index, audio))?;
                    chunk_index += 1;
                }
                Err(e) => {
                    self.report_skip(sentence, &e.to_string());
                    return Ok(());
                }
            }
        }

        self.spoken += 1;
        tracing::debug!(
            station = NAME,
            sentence = sentence.index,
            chunks = chunk_index,
            "sentence synthesized"
        );
        Ok(())
    }

    fn report_skip(&self, sentence: &Sentence, message: &str) {
        self.reporter.report(
            NAME,
            &StationError::Recoverable(format!(
                "skipping sentence {}: {message}",
                sentence.index
            )),
        );
    }
}

impl Station for SynthesisStation {
    type Input = String;
    type Output = SpokenChunk;

    fn process(
        &mut self,
        fragment: String,
        out: &mut Emitter<SpokenChunk>,
    ) -> Result<(), StationError> {
        let sentences = self.segmenter.feed(&fragment);
        self.speak_all(sentences, out)
    }

    fn finish(&mut self, out: &mut Emitter<SpokenChunk>) -> Result<(), StationError> {
        let residual = self.segmenter.flush().into_iter().collect();
        self.speak_all(residual, out)
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn completed(&self) -> usize {
        self.spoken
    }
}
