//! Streaming chat client for a local Ollama server.
//!
//! Uses `/api/chat` with `stream: true`: the server answers with one JSON
//! object per line, each carrying the next piece of the assistant message.

use crate::defaults;
use crate::error::{Result, TalkbackError};
use crate::llm::{FragmentStream, TextGenerator};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between reachability checks while a started server comes up.
const SERVER_START_POLL: Duration = Duration::from_millis(250);

/// Connection settings for [`OllamaClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    /// Base URL, e.g. `http://localhost:11434`.
    pub host: String,
    /// Model tag, e.g. `llama3.2`.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Optional system message sent before the user prompt.
    pub system_prompt: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: defaults::OLLAMA_HOST.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Body of `GET /api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Blocking Ollama chat client.
pub struct OllamaClient {
    config: OllamaConfig,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Create a client. No request is made until [`TextGenerator::generate`].
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            // Responses stream for as long as the model keeps talking
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| TalkbackError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    /// Check whether the server answers at all.
    pub fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url()))
            .timeout(Duration::from_secs(2))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }

    /// Names of the models pulled on the server, e.g. `llama3.2:latest`.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url());
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .map_err(|e| TalkbackError::Transport {
                message: format!("{url}: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TalkbackError::Transport {
                message: format!("{url} returned {status}"),
            });
        }
        let body = response.text().map_err(|e| TalkbackError::Transport {
            message: format!("{url}: {e}"),
        })?;
        parse_tags(&body)
    }

    /// True if `model` has been pulled. A tag without a version matches
    /// `:latest`.
    pub fn has_model(&self, model: &str) -> Result<bool> {
        let names = self.list_models()?;
        Ok(names.iter().any(|name| model_matches(name, model)))
    }

    /// Starts `ollama serve` in the background when the server does not
    /// answer, then waits for it to come up.
    ///
    /// The server is left running when talkback exits.
    pub fn ensure_server(&self) -> Result<()> {
        self.ensure_server_with(
            "ollama",
            Duration::from_millis(defaults::SERVER_START_TIMEOUT_MS),
        )
    }

    fn ensure_server_with(&self, command: &str, timeout: Duration) -> Result<()> {
        if self.is_reachable() {
            return Ok(());
        }

        tracing::info!(host = %self.config.host, "starting `{command} serve`");
        let mut cmd = Command::new(command);
        cmd.arg("serve")
            .env("OLLAMA_HOST", &self.config.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group, so Ctrl+C in the terminal leaves it running
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                TalkbackError::ToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                TalkbackError::Transport {
                    message: format!("failed to start `{command} serve`: {e}"),
                }
            }
        })?;
        tracing::debug!(pid = child.id(), "server process detached");
        drop(child);

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            thread::sleep(SERVER_START_POLL);
            if self.is_reachable() {
                tracing::info!(host = %self.config.host, "server is up");
                return Ok(());
            }
        }
        Err(TalkbackError::Transport {
            message: format!(
                "started `{command} serve` but {} did not answer within {timeout:?}",
                self.config.host
            ),
        })
    }

    fn base_url(&self) -> &str {
        self.config.host.trim_end_matches('/')
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        ChatRequest {
            model: &self.config.model,
            messages,
            stream: true,
            options: ChatOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        let url = format!("{}/api/chat", self.base_url());
        tracing::debug!(%url, model = %self.config.model, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .map_err(|e| TalkbackError::Transport {
                message: format!("{url}: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TalkbackError::Transport {
                message: format!("{url} returned {status}: {}", body.trim()),
            });
        }

        Ok(Box::new(ChatStream {
            lines: BufReader::new(response).lines(),
            done: false,
        }))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Iterator over the NDJSON lines of a streaming chat response.
struct ChatStream<R> {
    lines: Lines<R>,
    done: bool,
}

impl<R: BufRead> Iterator for ChatStream<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(TalkbackError::Transport {
                        message: format!("response stream broke: {e}"),
                    }));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match parse_chunk(&line) {
                Ok((content, done)) => {
                    self.done = done;
                    if !content.is_empty() {
                        return Some(Ok(content));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Model names from a `/api/tags` body.
fn parse_tags(body: &str) -> Result<Vec<String>> {
    let tags: TagsResponse = serde_json::from_str(body).map_err(|e| TalkbackError::Transport {
        message: format!("malformed model list: {e}"),
    })?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

/// Compares model tags, reading a missing version as `:latest`.
fn model_matches(name: &str, wanted: &str) -> bool {
    fn qualified(tag: &str) -> (&str, &str) {
        tag.split_once(':').unwrap_or((tag, "latest"))
    }
    qualified(name) == qualified(wanted)
}

/// Parse one response line into `(content, done)`.
fn parse_chunk(line: &str) -> Result<(String, bool)> {
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| TalkbackError::Transport {
        message: format!("malformed response line: {e}"),
    })?;
    if let Some(error) = chunk.error {
        return Err(TalkbackError::Transport { message: error });
    }
    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok((content, chunk.done))
}
