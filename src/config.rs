// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backend configuration.
//!
//! The Ollama endpoint comes from the `OLLAMA_HOST` environment variable, the
//! same variable the Ollama CLI reads. Accepted forms:
//!
//! - `http://host:port` / `https://host:port`
//! - `http://host` / `https://host` (port 80 / 443, as with any URL)
//! - `host:port`
//! - `host` (Ollama's port 11434 appended)

use std::time::Duration;

/// Environment variable naming the backend host.
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default Ollama port.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Default timeout for establishing a connection (in seconds).
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Settings for reaching the model-serving backend.
///
/// Only the connect phase has a timeout. Streams run until the server ends
/// them; a stalled stream shows up as a backend error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without trailing slash, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl BackendConfig {
    /// Build a config from `OLLAMA_HOST`, falling back to the default URL.
    pub fn from_env() -> Self {
        match std::env::var(OLLAMA_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => Self::with_host(&host),
            _ => Self::default(),
        }
    }

    /// Build a config for an explicit host string.
    pub fn with_host(host: &str) -> Self {
        Self {
            base_url: normalize_host(host),
            ..Self::default()
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Turn an `OLLAMA_HOST`-style value into a base URL.
///
/// The port is always explicit in the result. A bare host gets 11434; a host
/// with an explicit scheme gets that scheme's standard port.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return DEFAULT_OLLAMA_URL.to_string();
    }

    let (scheme, rest, default_port) = match host.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            let port = match scheme.as_str() {
                "https" => HTTPS_PORT,
                "http" => HTTP_PORT,
                _ => DEFAULT_OLLAMA_PORT,
            };
            (scheme, rest, port)
        }
        None => ("http".to_string(), host, DEFAULT_OLLAMA_PORT),
    };

    // Bracketed IPv6 literals carry colons of their own.
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let has_port = match authority.rfind(']') {
        Some(close) => authority[close..].contains(':'),
        None => authority.contains(':'),
    };

    if has_port {
        format!("{}://{}", scheme, rest)
    } else {
        format!(
            "{}://{}:{}{}",
            scheme,
            authority,
            default_port,
            &rest[authority_end..]
        )
    }
}

/// How much conversation history each chat turn sends to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    /// Only the latest user message. Every turn is independent.
    #[default]
    SingleTurn,
    /// Completed turns are replayed as user/assistant messages.
    Conversation,
}
