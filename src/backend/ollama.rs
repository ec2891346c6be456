// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ollama HTTP client.
//!
//! Both streaming endpoints answer with newline-delimited JSON. The response
//! body is read line by line as it arrives, so a caller iterating the stream
//! sees each chunk as soon as the server flushes it.

use std::io::{BufRead, BufReader, Lines, Read};
use std::marker::PhantomData;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use super::{Backend, ChatChunk, ChatStream, Message, OllamaError, PullChunk, PullStream};
use crate::config::BackendConfig;

/// Client for a running Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// Base URL for the Ollama API.
    base_url: String,
    /// HTTP client with a connect timeout only.
    client: Client,
}

impl OllamaClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: BackendConfig) -> Result<Self, OllamaError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            // reqwest's blocking client defaults to a 30s total timeout,
            // which would cut off any real model download.
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| OllamaError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the base URL of the client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_connect() {
            OllamaError::NotRunning(format!(
                "Cannot connect to Ollama at {}. Please ensure Ollama is running with: ollama serve",
                self.base_url
            ))
        } else if e.is_timeout() {
            OllamaError::Timeout(e.to_string())
        } else {
            OllamaError::NetworkError(e.to_string())
        }
    }

    /// POST a streaming request and check the status line.
    fn post_stream(
        &self,
        path: &str,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<Response, OllamaError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(error_text);

        if status.as_u16() == 404 {
            return Err(OllamaError::ModelNotFound(model.to_string()));
        }

        match OllamaError::from_server_message(model, &message) {
            OllamaError::ApiError(msg) => Err(OllamaError::ApiError(format!(
                "HTTP {} - {}",
                status, msg
            ))),
            other => Err(other),
        }
    }
}

impl Backend for OllamaClient {
    fn pull(&self, model: &str) -> Result<PullStream, OllamaError> {
        let body = serde_json::json!({
            "model": model,
            "stream": true
        });
        let response = self.post_stream("/api/pull", &body, model)?;
        tracing::debug!(model = %model, "PULL_STREAM_OPENED");
        Ok(Box::new(NdjsonStream::<_, PullChunk>::new(response, model)))
    }

    fn chat(&self, model: &str, messages: Vec<Message>) -> Result<ChatStream, OllamaError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true
        });
        let response = self.post_stream("/api/chat", &body, model)?;
        tracing::debug!(model = %model, "CHAT_STREAM_OPENED");
        Ok(Box::new(NdjsonStream::<_, ChatChunk>::new(response, model)))
    }

    fn ping(&self) -> Result<(), OllamaError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(OllamaError::ApiError(format!(
                "Version check failed: HTTP {}",
                response.status()
            )))
        }
    }
}

/// Iterator over the JSON lines of a streaming body.
///
/// Blank and undecodable lines are skipped. A line carrying an `error` field
/// ends the stream with that error, as does a read failure.
pub(crate) struct NdjsonStream<R, T> {
    lines: Lines<BufReader<R>>,
    model: String,
    finished: bool,
    _chunk: PhantomData<fn() -> T>,
}

impl<R: Read, T> NdjsonStream<R, T> {
    pub(crate) fn new(reader: R, model: &str) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            model: model.to_string(),
            finished: false,
            _chunk: PhantomData,
        }
    }
}

impl<R: Read, T: DeserializeOwned> Iterator for NdjsonStream<R, T> {
    type Item = Result<T, OllamaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(OllamaError::NetworkError(format!(
                        "Stream interrupted: {}",
                        e
                    ))));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(model = %self.model, error = %e, "Skipping undecodable stream line");
                    continue;
                }
            };

            if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
                self.finished = true;
                return Some(Err(OllamaError::from_server_message(&self.model, error)));
            }

            match serde_json::from_value::<T>(value) {
                Ok(chunk) => return Some(Ok(chunk)),
                Err(e) => {
                    tracing::debug!(model = %self.model, error = %e, "Skipping unexpected stream line");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pull_lines(body: &str) -> Vec<Result<PullChunk, OllamaError>> {
        NdjsonStream::<_, PullChunk>::new(Cursor::new(body.to_string()), "demo").collect()
    }

    #[test]
    fn test_client_url_normalization() {
        let client = OllamaClient::new(BackendConfig::with_host("http://localhost:11434/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_ndjson_skips_blank_and_garbage_lines() {
        let body = "{\"status\":\"pulling manifest\"}\n\n   \nnot json\n{\"status\":\"pull complete\"}\n";
        let chunks: Vec<PullChunk> = pull_lines(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].status, "pulling manifest");
        assert_eq!(chunks[1].status, "pull complete");
    }

    #[test]
    fn test_ndjson_handles_missing_trailing_newline() {
        let chunks = pull_lines("{\"status\":\"a\"}\n{\"status\":\"b\"}");
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_ndjson_error_line_ends_stream() {
        let body = "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n{\"status\":\"pull complete\"}\n";
        let chunks = pull_lines(body);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(chunks[1], Err(OllamaError::ModelNotFound(_))));
    }

    #[test]
    fn test_ndjson_chat_chunks() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        let text: String = NdjsonStream::<_, ChatChunk>::new(Cursor::new(body), "demo")
            .map(|c| c.unwrap().content().to_string())
            .collect();
        assert_eq!(text, "Hello");
    }
}
