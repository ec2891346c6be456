// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! pullchat - download a model, then chat with it, from any front-end.
//!
//! A headless controller for Ollama-style model servers. It pulls a model
//! with progress feedback, then runs streamed chat turns against it, and
//! reports everything as ordered events that a presentation drains on its
//! own schedule.
//!
//! # Core Modules
//!
//! - [`session`] - One-shot download and chat state machines
//! - [`controller`] - Guards, axes, transcript, worker dispatch
//! - [`sink`] - Event sink trait, event queue, delta batching
//! - [`backend`] - Backend trait and the Ollama HTTP client
//! - [`config`] - Endpoint configuration (`OLLAMA_HOST`)
//! - [`error`] - Error taxonomy and user-facing formatting
//! - [`terminal`] - Interactive terminal front-end
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pullchat::{BackendConfig, OllamaClient, SessionController, SessionEvent};
//!
//! // The blocking HTTP client must be created outside async code.
//! let backend = Arc::new(OllamaClient::new(BackendConfig::from_env())?);
//! let runtime = tokio::runtime::Runtime::new()?;
//! let _enter = runtime.enter();
//!
//! let (controller, mut events) = SessionController::with_queue(backend);
//!
//! controller.request_download("llama3.2")?;
//! while let Some(event) = events.blocking_recv() {
//!     println!("{:?}", event);
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//!
//! controller.send_message("Hello!")?;
//! while let Some(event) = events.blocking_recv() {
//!     if let SessionEvent::Chat(chat) = &event {
//!         println!("{:?}", chat);
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod sink;
pub mod sync;
pub mod terminal;

pub use backend::{Backend, Message, OllamaClient, OllamaError};
pub use config::{BackendConfig, ContextPolicy};
pub use controller::{Affordances, ChatAxis, DownloadAxis, SessionController};
pub use error::{format_error, SessionError};
pub use session::{
    ChatEvent, ChatSession, ChatTurn, DownloadEvent, DownloadSession, DownloadState, ModelRef,
    SessionEvent, Transcript, TurnState,
};
pub use sink::{coalesce_deltas, event_queue, DeltaBuffer, EventQueue, EventSink, QueueSink};
