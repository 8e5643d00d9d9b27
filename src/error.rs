//! Error types for talkback.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TalkbackError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Collaborator errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Playback failed: {message}")]
    Playback { message: String },

    #[error("Audio output device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("External tool not found: {tool}")]
    ToolNotFound { tool: String },

    // Pipeline errors
    #[error("Failed to start pipeline worker: {message}")]
    WorkerSpawn { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TalkbackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = TalkbackError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = TalkbackError::ConfigInvalidValue {
            key: "pipeline.poll_interval_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for pipeline.poll_interval_ms: must be positive"
        );
    }

    #[test]
    fn test_transport_display() {
        let error = TalkbackError::Transport {
            message: "connection refused".to_string(),
        };
        assert_eq!(error.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_synthesis_display() {
        let error = TalkbackError::Synthesis {
            message: "voice not loaded".to_string(),
        };
        assert_eq!(error.to_string(), "Synthesis failed: voice not loaded");
    }

    #[test]
    fn test_playback_display() {
        let error = TalkbackError::Playback {
            message: "device busy".to_string(),
        };
        assert_eq!(error.to_string(), "Playback failed: device busy");
    }

    #[test]
    fn test_tool_not_found_display() {
        let error = TalkbackError::ToolNotFound {
            tool: "piper".to_string(),
        };
        assert_eq!(error.to_string(), "External tool not found: piper");
    }

    #[test]
    fn test_worker_spawn_display() {
        let error = TalkbackError::WorkerSpawn {
            message: "resource temporarily unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to start pipeline worker: resource temporarily unavailable"
        );
    }

    #[test]
    fn test_other_display() {
        let error = TalkbackError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: TalkbackError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: TalkbackError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: TalkbackError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TalkbackError>();
        assert_sync::<TalkbackError>();
    }
}
