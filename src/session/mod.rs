// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download and chat sessions.
//!
//! Each session is a one-shot state machine: build it, `start`/`send` it
//! against a [`Backend`](crate::backend::Backend), and iterate the returned
//! events until they run out. A session cannot be restarted; retrying means
//! building a new one.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pullchat::backend::OllamaClient;
//! use pullchat::config::BackendConfig;
//! use pullchat::session::{ChatSession, DownloadSession};
//!
//! let backend = Arc::new(OllamaClient::new(BackendConfig::default())?);
//!
//! let download = DownloadSession::new("llama3.2")?;
//! let model = download.model().clone();
//! for event in download.start(backend.clone()) {
//!     println!("{:?}", event);
//! }
//!
//! for event in ChatSession::new(model, "Hello!").send(backend) {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod chat;
pub mod download;
pub mod events;
pub mod types;

pub use chat::{ChatEvents, ChatSession};
pub use download::{DownloadEvents, DownloadSession};
pub use events::{ChatEvent, DownloadEvent, SessionEvent};
pub use types::{ChatTurn, DownloadState, ModelRef, Transcript, TurnState};
