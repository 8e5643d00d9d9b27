//! Data types flowing between pipeline stations.

/// One message on a pipeline channel.
///
/// Every producer sends exactly one [`StreamItem::End`] when its stream is
/// over, whether it finished, failed or was cancelled, so every consumer is
/// guaranteed to terminate.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem<T> {
    /// A payload value.
    Item(T),
    /// End-of-stream sentinel.
    End,
}

impl<T> StreamItem<T> {
    /// Returns true for the end-of-stream sentinel.
    pub fn is_end(&self) -> bool {
        matches!(self, StreamItem::End)
    }
}

/// A complete sentence ready for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Zero-based position of this sentence within the turn.
    pub index: usize,
    /// Sentence text, trimmed, including its boundary marker.
    pub text: String,
}

impl Sentence {
    /// Creates a new sentence.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// A unit of synthesized audio as produced by a synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// PCM samples (16-bit signed integers, mono).
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new audio chunk.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Returns true if the chunk carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// An audio chunk tagged with its position in the turn.
///
/// Positions are informational (logging, tests); ordering is guaranteed by
/// the FIFO channel, not by sorting on these fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenChunk {
    /// Index of the sentence this chunk belongs to.
    pub sentence: usize,
    /// Index of the chunk within its sentence.
    pub chunk: usize,
    /// The audio itself.
    pub audio: AudioChunk,
}

impl SpokenChunk {
    /// Creates a new tagged chunk.
    pub fn new(sentence: usize, chunk: usize, audio: AudioChunk) -> Self {
        Self {
            sentence,
            chunk,
            audio,
        }
    }
}
