// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model-serving backend seam.
//!
//! Sessions never talk HTTP directly. They ask a [`Backend`] for a stream of
//! decoded chunks and react to each one. [`OllamaClient`] is the production
//! implementation; tests script their own.
//!
//! # Example
//!
//! ```no_run
//! use pullchat::backend::{Backend, Message, OllamaClient};
//! use pullchat::config::BackendConfig;
//!
//! let client = OllamaClient::new(BackendConfig::from_env())?;
//! for chunk in client.chat("llama3.2", vec![Message::user("Hello!")])? {
//!     print!("{}", chunk?.content());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ollama;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use ollama::OllamaClient;

/// Stream of decoded pull chunks.
pub type PullStream = Box<dyn Iterator<Item = Result<PullChunk, OllamaError>> + Send>;

/// Stream of decoded chat chunks.
pub type ChatStream = Box<dyn Iterator<Item = Result<ChatChunk, OllamaError>> + Send>;

/// The two streaming operations the session controller consumes.
///
/// Calls block until the response headers arrive; iterating the returned
/// stream blocks on each chunk. Run them off the UI thread.
pub trait Backend: Send + Sync + 'static {
    /// Start pulling `model` and stream its progress chunks.
    fn pull(&self, model: &str) -> Result<PullStream, OllamaError>;

    /// Send `messages` to `model` and stream the reply chunks.
    fn chat(&self, model: &str, messages: Vec<Message>) -> Result<ChatStream, OllamaError>;

    /// Cheap reachability check.
    fn ping(&self) -> Result<(), OllamaError>;
}

/// A chat message for the chat API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender ("user" or "assistant").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl Message {
    /// Create a new message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Progress value attached to a pull chunk. Servers send either a number or
/// preformatted text; both render verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressValue {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for ProgressValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One line of a pull response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullChunk {
    /// Status tag, e.g. "pulling manifest" or "pull complete".
    #[serde(default)]
    pub status: String,
    /// Optional progress value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressValue>,
    /// Layer identifier. Ollama calls it `digest`.
    #[serde(default, alias = "digest", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Layer size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Bytes of the layer received so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

impl PullChunk {
    /// Chunk with just a status tag.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// Attach a layer id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a progress value.
    pub fn with_progress(mut self, progress: ProgressValue) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Message body inside a chat chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunkMessage {
    #[serde(default)]
    pub content: String,
}

/// One line of a chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChatChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

impl ChatChunk {
    /// Chunk carrying one content fragment.
    pub fn content_fragment(content: impl Into<String>) -> Self {
        Self {
            message: Some(ChatChunkMessage {
                content: content.into(),
            }),
            done: false,
        }
    }

    /// The content fragment, empty when the chunk has none.
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// Error types specific to backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OllamaError {
    /// Server is not running or unreachable.
    NotRunning(String),
    /// Connection timed out.
    Timeout(String),
    /// The requested model was not found.
    ModelNotFound(String),
    /// API error reported by the server.
    ApiError(String),
    /// Network or HTTP error, including a body that broke off mid-stream.
    NetworkError(String),
}

impl OllamaError {
    /// Classify an error line or error body from the server.
    pub(crate) fn from_server_message(model: &str, message: &str) -> Self {
        if message.contains("not found") || message.contains("does not exist") {
            Self::ModelNotFound(format!("{}: {}", model, message))
        } else {
            Self::ApiError(message.to_string())
        }
    }
}

impl fmt::Display for OllamaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning(msg) => write!(f, "Ollama is not running: {}", msg),
            Self::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            Self::ModelNotFound(model) => write!(f, "Model not found: {}", model),
            Self::ApiError(msg) => write!(f, "Ollama API error: {}", msg),
            Self::NetworkError(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for OllamaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("Hello!");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "Hello!");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_pull_chunk_decodes_ollama_fields() {
        let chunk: PullChunk = serde_json::from_str(
            r#"{"status":"pulling 6a0746a1ec1a","digest":"sha256:6a07","total":1000,"completed":250}"#,
        )
        .unwrap();
        assert_eq!(chunk.status, "pulling 6a0746a1ec1a");
        assert_eq!(chunk.id.as_deref(), Some("sha256:6a07"));
        assert_eq!((chunk.completed, chunk.total), (Some(250), Some(1000)));
        assert!(chunk.progress.is_none());
    }

    #[test]
    fn test_progress_value_display() {
        let chunk: PullChunk =
            serde_json::from_str(r#"{"status":"downloading","progress":42}"#).unwrap();
        assert_eq!(chunk.progress.unwrap().to_string(), "42");

        let chunk: PullChunk =
            serde_json::from_str(r#"{"status":"downloading","progress":"1.2 GB / 4.1 GB"}"#)
                .unwrap();
        assert_eq!(chunk.progress.unwrap().to_string(), "1.2 GB / 4.1 GB");
    }

    #[test]
    fn test_chat_chunk_content() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"model":"demo","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(chunk.content(), "Hi");

        let last: ChatChunk = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(last.content(), "");
        assert!(last.done);
    }

    #[test]
    fn test_ollama_error_display() {
        let err = OllamaError::NotRunning("test".to_string());
        assert!(err.to_string().contains("not running"));

        let err = OllamaError::ModelNotFound("llama3".to_string());
        assert!(err.to_string().contains("llama3"));

        let err = OllamaError::Timeout("test".to_string());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_server_message_classification() {
        let err = OllamaError::from_server_message("nope", "pull model manifest: file does not exist");
        assert!(matches!(err, OllamaError::ModelNotFound(_)));

        let err = OllamaError::from_server_message("demo", "out of memory");
        assert_eq!(err, OllamaError::ApiError("out of memory".to_string()));
    }
}
