//! Streaming response pipeline.
//!
//! Implements a multi-station pipeline where each station runs in its own
//! thread, connected by unbounded crossbeam channels. Every channel ends with
//! exactly one end-of-stream sentinel, and every blocking read is a short
//! poll so a cancelled turn unwinds within a couple of poll intervals.

pub mod cancel;
pub mod display_station;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod playback_station;
pub mod segmenter;
pub mod station;
pub mod synthesis_station;
pub mod text_source;
pub mod types;

pub use cancel::CancellationToken;
pub use display_station::DisplayStation;
pub use error::{ErrorReporter, LogReporter, StationError};
pub use gate::PipelineState;
pub use orchestrator::{Interrupter, Pipeline, PipelineConfig, TurnHandle, TurnReport};
pub use playback_station::PlaybackStation;
pub use segmenter::{SentenceSegmenter, sentences};
pub use station::{Emitter, Station, StationRunner, WorkerContext, WorkerHandle};
pub use synthesis_station::SynthesisStation;
pub use text_source::TextSource;
pub use types::{AudioChunk, Sentence, SpokenChunk, StreamItem};
