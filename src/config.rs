use crate::defaults;
use crate::error::{Result, TalkbackError};
use crate::pipeline::PipelineConfig;
use crate::tts::CommandSynthesizerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineSettings,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub host: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Launch `ollama serve` in the background when the server is down.
    pub start_server: bool,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub sample_rate: u32,
    pub chunk_ms: u32,
}

/// Audio playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name. Unset means the system default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Player command, used when built without `cpal-audio`.
    pub player: String,
    pub player_args: Vec<String>,
}

/// Pipeline timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub poll_interval_ms: u64,
    pub cancel_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            host: defaults::OLLAMA_HOST.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            system_prompt: None,
            start_server: false,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            command: defaults::TTS_COMMAND.to_string(),
            args: vec!["--output-raw".to_string()],
            voice: None,
            sample_rate: defaults::TTS_SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            player: defaults::PLAYER_COMMAND.to_string(),
            player_args: vec!["-q".to_string(), "-".to_string()],
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            cancel_timeout_ms: defaults::CANCEL_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TalkbackError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                TalkbackError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(TalkbackError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TALKBACK_MODEL → llm.model
    /// - TALKBACK_OLLAMA_HOST → llm.host
    /// - TALKBACK_TTS_COMMAND → tts.command
    /// - TALKBACK_PLAYER → audio.player
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("TALKBACK_MODEL")
            && !model.is_empty()
        {
            self.llm.model = model;
        }

        if let Ok(host) = std::env::var("TALKBACK_OLLAMA_HOST")
            && !host.is_empty()
        {
            self.llm.host = host;
        }

        if let Ok(command) = std::env::var("TALKBACK_TTS_COMMAND")
            && !command.is_empty()
        {
            self.tts.command = command;
        }

        if let Ok(player) = std::env::var("TALKBACK_PLAYER")
            && !player.is_empty()
        {
            self.audio.player = player;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| TalkbackError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.pipeline.poll_interval_ms == 0 {
            return Err(invalid("pipeline.poll_interval_ms", "must be positive"));
        }
        if self.tts.sample_rate == 0 {
            return Err(invalid("tts.sample_rate", "must be positive"));
        }
        if self.tts.chunk_ms == 0 {
            return Err(invalid("tts.chunk_ms", "must be positive"));
        }
        if self.tts.command.trim().is_empty() {
            return Err(invalid("tts.command", "must not be empty"));
        }
        if self.audio.player.trim().is_empty() {
            return Err(invalid("audio.player", "must not be empty"));
        }
        if !self.llm.host.starts_with("http://") && !self.llm.host.starts_with("https://") {
            return Err(invalid("llm.host", "must start with http:// or https://"));
        }
        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TalkbackError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/talkback/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("talkback")
            .join("config.toml")
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(self.pipeline.poll_interval_ms),
            cancel_timeout: Duration::from_millis(self.pipeline.cancel_timeout_ms),
        }
    }

    pub fn synthesizer_config(&self) -> CommandSynthesizerConfig {
        CommandSynthesizerConfig {
            command: self.tts.command.clone(),
            args: self.tts.args.clone(),
            voice: self.tts.voice.clone(),
            sample_rate: self.tts.sample_rate,
            chunk_ms: self.tts.chunk_ms,
        }
    }

    #[cfg(feature = "ollama")]
    pub fn ollama_config(&self) -> crate::llm::ollama::OllamaConfig {
        crate::llm::ollama::OllamaConfig {
            host: self.llm.host.clone(),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            system_prompt: self.llm.system_prompt.clone(),
        }
    }
}
