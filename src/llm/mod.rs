//! Text generation backends.
//!
//! The pipeline only needs a lazy, ordered stream of text fragments. Any
//! fragment may be an error, after which the stream is considered over.

#[cfg(feature = "ollama")]
pub mod ollama;

use crate::error::{Result, TalkbackError};
use std::thread;
use std::time::Duration;

/// Lazy stream of response fragments.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Trait for language-model text generation.
///
/// This trait allows swapping implementations (Ollama vs mock).
pub trait TextGenerator: Send + Sync {
    /// Start generating a response to `prompt`.
    ///
    /// Fails immediately if the request cannot be issued. Errors during
    /// streaming arrive as `Err` items.
    fn generate(&self, prompt: &str) -> Result<FragmentStream>;

    /// Get the name of the model behind this generator.
    fn model_name(&self) -> &str;
}

/// Mock generator for testing
#[derive(Debug, Clone)]
pub struct MockGenerator {
    model_name: String,
    fragments: Vec<String>,
    fail_after: Option<usize>,
    fail_on_start: bool,
    delay: Duration,
}

impl MockGenerator {
    /// Create a mock that streams the given fragments.
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            model_name: "mock-model".to_string(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_after: None,
            fail_on_start: false,
            delay: Duration::ZERO,
        }
    }

    /// Emit a transport error after `n` fragments.
    pub fn with_failure_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail the request before any fragment is produced.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Sleep before each fragment, like a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl TextGenerator for MockGenerator {
    fn generate(&self, _prompt: &str) -> Result<FragmentStream> {
        if self.fail_on_start {
            return Err(TalkbackError::Transport {
                message: "mock connection refused".to_string(),
            });
        }

        let delay = self.delay;
        let limit = self.fail_after.unwrap_or(self.fragments.len());
        let mut items: Vec<Result<String>> = self
            .fragments
            .iter()
            .take(limit)
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_after.is_some() {
            items.push(Err(TalkbackError::Transport {
                message: "mock stream interrupted".to_string(),
            }));
        }

        Ok(Box::new(items.into_iter().inspect(move |_| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        })))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_generator_streams_fragments() {
        let generator = MockGenerator::new(&["Hello", " world."]);
        let fragments: Vec<String> = generator
            .generate("hi")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(fragments, vec!["Hello", " world."]);
    }

    #[test]
    fn test_mock_generator_fails_mid_stream() {
        let generator = MockGenerator::new(&["a", "b", "c"]).with_failure_after(2);
        let items: Vec<Result<String>> = generator.generate("hi").unwrap().collect();

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(TalkbackError::Transport { .. })));
    }

    #[test]
    fn test_mock_generator_start_failure() {
        let generator = MockGenerator::new(&["a"]).with_start_failure();
        assert!(generator.generate("hi").is_err());
    }

    #[test]
    fn test_generator_trait_is_object_safe() {
        let generator: Box<dyn TextGenerator> = Box::new(MockGenerator::new(&["x"]));
        assert_eq!(generator.model_name(), "mock-model");
        assert_eq!(generator.generate("p").unwrap().count(), 1);
    }
}
