//! talkback - talk to a local language model and hear it answer
//!
//! Streams the model's answer through sentence segmentation, speech
//! synthesis and playback concurrently, so speech starts with the first
//! sentence and can be interrupted at any moment.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod llm;
pub mod pipeline;
mod process;
pub mod tts;

// Composition root - needs everything
#[cfg(all(feature = "cli", feature = "ollama"))]
pub mod app;

// Collaborator traits (generate → synthesize → play, plus display)
pub use audio::AudioOutput;
pub use display::DisplaySink;
pub use llm::TextGenerator;
pub use tts::Synthesizer;

// Pipeline
pub use pipeline::{
    CancellationToken, Interrupter, Pipeline, PipelineConfig, PipelineState, TurnHandle,
    TurnReport,
};

// Error handling
pub use error::{Result, TalkbackError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Version reported by `--version`: the package version, plus `+<git hash>`
/// when built from a git checkout.
pub const VERSION: &str = env!("TALKBACK_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_extends_package_version() {
        let package = env!("CARGO_PKG_VERSION");
        assert!(VERSION.starts_with(package), "unexpected version {VERSION}");
        match VERSION.strip_prefix(package) {
            Some("") => {}
            Some(rest) => {
                let hash = rest.strip_prefix('+').unwrap_or_default();
                assert!(hash.len() >= 7, "expected a short git hash in {VERSION}");
                assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
            }
            None => unreachable!(),
        }
    }

    #[test]
    fn test_binary_requires_cli_and_ollama() {
        let manifest: toml::Table =
            toml::from_str(include_str!("../Cargo.toml")).unwrap();
        let bins = manifest["bin"].as_array().unwrap();
        let talkback = bins
            .iter()
            .find(|bin| bin["name"].as_str() == Some("talkback"))
            .unwrap();
        let required: Vec<&str> = talkback["required-features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f.as_str())
            .collect();
        assert!(required.contains(&"cli"));
        assert!(required.contains(&"ollama"));
    }
}
