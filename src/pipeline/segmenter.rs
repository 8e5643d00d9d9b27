//! Sentence segmentation for streamed text.
//!
//! Language models stream text in arbitrary fragments (a token, a word, a
//! paragraph). Speech synthesis wants whole sentences. The segmenter buffers
//! fragments and releases a sentence as soon as its boundary marker arrives.

use std::collections::VecDeque;

/// Characters that terminate a sentence. The marker stays with the sentence
/// it terminates.
pub const BOUNDARY_MARKERS: [char; 4] = ['.', '!', '?', '\n'];

/// Accumulates text fragments and splits them into sentences.
///
/// Output does not depend on how the text was fragmented: feeding a paragraph
/// one character at a time yields the same sentences as feeding it whole.
#[derive(Debug, Default, Clone)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    /// Creates an empty segmenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns every sentence it completed, in order.
    ///
    /// Whitespace-only pieces between boundaries are dropped.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);

        let mut sentences = Vec::new();
        while let Some(pos) = self.buffer.find(BOUNDARY_MARKERS) {
            // Markers are ASCII, so pos + 1 is a char boundary.
            let rest = self.buffer.split_off(pos + 1);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            let trimmed = sentence.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
        }
        sentences
    }

    /// Releases the residual buffer as a final sentence at end of input.
    ///
    /// Returns `None` when nothing but whitespace is left. Calling it twice
    /// in a row yields `None` the second time.
    pub fn flush(&mut self) -> Option<String> {
        let residual = std::mem::take(&mut self.buffer);
        let trimmed = residual.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Returns the text buffered since the last boundary.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Lazily segments an iterator of fragments into sentences.
pub fn sentences<I, S>(fragments: I) -> Sentences<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Sentences {
        fragments: Some(fragments.into_iter()),
        segmenter: SentenceSegmenter::new(),
        ready: VecDeque::new(),
    }
}

/// Iterator returned by [`sentences`].
pub struct Sentences<I> {
    fragments: Option<I>,
    segmenter: SentenceSegmenter,
    ready: VecDeque<String>,
}

impl<I, S> Iterator for Sentences<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(sentence) = self.ready.pop_front() {
                return Some(sentence);
            }
            let fragments = self.fragments.as_mut()?;
            match fragments.next() {
                Some(fragment) => {
                    self.ready.extend(self.segmenter.feed(fragment.as_ref()));
                }
                None => {
                    self.fragments = None;
                    return self.segmenter.flush();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_all(fragments: &[&str]) -> Vec<String> {
        sentences(fragments.iter().copied()).collect()
    }

    fn strip_markers_and_whitespace(text: &str) -> String {
        text.chars()
            .filter(|c| !BOUNDARY_MARKERS.contains(c) && !c.is_whitespace())
            .collect()
    }

    #[test]
    fn test_fragments_across_boundaries() {
        let result = segment_all(&["Hello wor", "ld. How are", " you?"]);
        assert_eq!(result, vec!["Hello world.", "How are you?"]);
    }

    #[test]
    fn test_sentence_not_emitted_before_boundary() {
        let mut segmenter = SentenceSegmenter::new();
        assert!(segmenter.feed("Hello wor").is_empty());
        assert!(segmenter.feed("ld").is_empty());
        assert_eq!(segmenter.feed("."), vec!["Hello world."]);
    }

    #[test]
    fn test_multiple_boundaries_in_one_fragment() {
        let mut segmenter = SentenceSegmenter::new();
        let result = segmenter.feed("One. Two! Three? Four");
        assert_eq!(result, vec!["One.", "Two!", "Three?"]);
        assert_eq!(segmenter.flush(), Some("Four".to_string()));
    }

    #[test]
    fn test_newline_is_a_boundary() {
        let result = segment_all(&["First line\nSecond line\n"]);
        assert_eq!(result, vec!["First line", "Second line"]);
    }

    #[test]
    fn test_whitespace_only_pieces_are_dropped() {
        let result = segment_all(&["Hi.   \n\n  ", "  Bye."]);
        assert_eq!(result, vec!["Hi.", "Bye."]);
    }

    #[test]
    fn test_empty_fragment_is_noop() {
        let mut segmenter = SentenceSegmenter::new();
        segmenter.feed("Partial");
        assert!(segmenter.feed("").is_empty());
        assert_eq!(segmenter.pending(), "Partial");
    }

    #[test]
    fn test_flush_empty_buffer_yields_nothing() {
        let mut segmenter = SentenceSegmenter::new();
        assert_eq!(segmenter.flush(), None);
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_flush_whitespace_buffer_yields_nothing() {
        let mut segmenter = SentenceSegmenter::new();
        segmenter.feed("Done.  ");
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut segmenter = SentenceSegmenter::new();
        segmenter.feed("no terminator");
        assert_eq!(segmenter.flush(), Some("no terminator".to_string()));
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_granularity_does_not_change_output() {
        let text = "The quick brown fox. Jumps over!\nThe lazy dog? And then some trailing words";
        let whole = segment_all(&[text]);

        let per_char: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let by_char: Vec<String> = sentences(per_char.iter()).collect();
        assert_eq!(by_char, whole);

        for split in 0..text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let (a, b) = text.split_at(split);
            assert_eq!(segment_all(&[a, b]), whole, "split at byte {split}");
        }
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        let result = segment_all(&["Grüß di", "ch. Ça va? 日本", "語です。"]);
        assert_eq!(result, vec!["Grüß dich.", "Ça va?", "日本語です。"]);
    }

    #[test]
    fn test_no_text_lost_or_duplicated() {
        let fragments = [
            "Well", ", this is", " a test.", " It has", " several parts!", "\n", "Does it",
            " work", "?", " Maybe",
        ];
        let input: String = fragments.concat();
        let output: String = segment_all(&fragments).concat();

        assert_eq!(
            strip_markers_and_whitespace(&output),
            strip_markers_and_whitespace(&input)
        );
    }

    #[test]
    fn test_iterator_is_lazy() {
        let mut pulled = 0;
        let fragments = ["A. ", "B. ", "C."].iter().inspect(|_| pulled += 1);
        let mut iter = sentences(fragments);

        assert_eq!(iter.next(), Some("A.".to_string()));
        drop(iter);
        assert_eq!(pulled, 1);
    }
}
