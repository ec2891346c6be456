// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session controller: the single source of truth for download and chat state.
//!
//! Two orthogonal axes:
//! ```text
//! download:  NoModel ──request──> Downloading ──Ready/AlreadyAvailable──> Ready
//!                                     │  ▲                                 │
//!                                  Failed └──────────request──────────────┘
//!                                     ▼
//!                               DownloadFailed ──request──> Downloading
//!
//! chat (only while download = Ready):  Idle ──send──> AwaitingResponse ──Done/Failed──> Idle
//! ```
//!
//! Guard checks and the transition they protect happen under one write lock,
//! so overlapping requests are rejected rather than queued. Streams run on
//! tokio's blocking pool; every event updates state first and is then handed
//! to the [`EventSink`].

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::backend::{Backend, Message};
use crate::config::ContextPolicy;
use crate::error::{SessionError, DOWNLOAD_FAILED_MESSAGE};
use crate::session::{
    ChatEvent, ChatEvents, ChatSession, ChatTurn, DownloadEvent, DownloadEvents,
    DownloadSession, DownloadState, ModelRef, Transcript, TurnState,
};
use crate::sink::{event_queue, EventQueue, EventSink};
use crate::sync::{resilient_read, resilient_write};

/// Download axis of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadAxis {
    NoModel,
    Downloading,
    Ready,
    DownloadFailed,
}

/// Chat axis of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatAxis {
    Idle,
    AwaitingResponse,
}

/// What a UI should currently allow, derived from controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordances {
    pub can_download: bool,
    pub can_send: bool,
}

impl Affordances {
    fn derive(download: DownloadAxis, chat: ChatAxis) -> Self {
        Self {
            can_download: download != DownloadAxis::Downloading,
            can_send: download == DownloadAxis::Ready && chat == ChatAxis::Idle,
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    download_axis: DownloadAxis,
    download_state: DownloadState,
    model: Option<ModelRef>,
    download_generation: u64,
    chat_axis: ChatAxis,
    active_turn: Option<ChatTurn>,
    turn_generation: u64,
    transcript: Transcript,
    context_policy: ContextPolicy,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            download_axis: DownloadAxis::NoModel,
            download_state: DownloadState::Idle,
            model: None,
            download_generation: 0,
            chat_axis: ChatAxis::Idle,
            active_turn: None,
            turn_generation: 0,
            transcript: Transcript::new(),
            context_policy: ContextPolicy::default(),
        }
    }

    /// Move the active turn into the transcript and free the chat axis.
    fn finalize_turn(&mut self, outcome: impl FnOnce(&mut ChatTurn)) -> Option<ChatTurn> {
        let mut turn = self.active_turn.take()?;
        outcome(&mut turn);
        self.transcript.push(turn.clone());
        self.chat_axis = ChatAxis::Idle;
        Some(turn)
    }

    /// Prior messages for the next turn under the current policy.
    fn history(&self) -> Vec<Message> {
        match self.context_policy {
            ContextPolicy::SingleTurn => Vec::new(),
            ContextPolicy::Conversation => self
                .transcript
                .iter()
                .filter(|turn| *turn.state() == TurnState::Done)
                .flat_map(|turn| {
                    [
                        Message::user(turn.user_message()),
                        Message::assistant(turn.assistant_text()),
                    ]
                })
                .collect(),
        }
    }
}

struct ControllerInner {
    backend: Arc<dyn Backend>,
    sink: Arc<dyn EventSink>,
    state: RwLock<ControllerState>,
}

/// Coordinates one download axis and one chat axis over a shared backend.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Create a controller that relays events to `sink`.
    pub fn new(backend: Arc<dyn Backend>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                backend,
                sink,
                state: RwLock::new(ControllerState::new()),
            }),
        }
    }

    /// Create a controller wired to a fresh [`EventQueue`].
    pub fn with_queue(backend: Arc<dyn Backend>) -> (Self, EventQueue) {
        let (sink, queue) = event_queue();
        (Self::new(backend, Arc::new(sink)), queue)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn download_axis(&self) -> DownloadAxis {
        resilient_read(&self.inner.state).download_axis
    }

    pub fn chat_axis(&self) -> ChatAxis {
        resilient_read(&self.inner.state).chat_axis
    }

    /// State of the current (or last) download session.
    pub fn download_state(&self) -> DownloadState {
        resilient_read(&self.inner.state).download_state.clone()
    }

    /// Model of the current (or last) download session.
    pub fn model(&self) -> Option<ModelRef> {
        resilient_read(&self.inner.state).model.clone()
    }

    /// Snapshot of all finished turns.
    pub fn transcript(&self) -> Transcript {
        resilient_read(&self.inner.state).transcript.clone()
    }

    /// Snapshot of the turn currently in flight, if any.
    pub fn active_turn(&self) -> Option<ChatTurn> {
        resilient_read(&self.inner.state).active_turn.clone()
    }

    pub fn affordances(&self) -> Affordances {
        let state = resilient_read(&self.inner.state);
        Affordances::derive(state.download_axis, state.chat_axis)
    }

    pub fn context_policy(&self) -> ContextPolicy {
        resilient_read(&self.inner.state).context_policy
    }

    /// Takes effect from the next `send_message`.
    pub fn set_context_policy(&self, policy: ContextPolicy) {
        resilient_write(&self.inner.state).context_policy = policy;
    }

    /// Check that the backend answers at all.
    pub fn check_backend(&self) -> Result<(), SessionError> {
        self.inner.backend.ping().map_err(SessionError::from)
    }

    // ------------------------------------------------------------------
    // Download axis
    // ------------------------------------------------------------------

    /// Start pulling `model` on a blocking worker.
    ///
    /// Rejected synchronously with `InvalidInput`, `AlreadyInProgress`, or
    /// `NoRuntime` (outside a tokio runtime). The handle resolves to the
    /// final download axis.
    pub fn request_download(&self, model: &str) -> Result<JoinHandle<DownloadAxis>, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (generation, events) = self.begin_download(model)?;
        let controller = self.clone();
        Ok(runtime.spawn_blocking(move || controller.drive_download(generation, events)))
    }

    /// Pull `model` on the calling thread and return the final download axis.
    pub fn download_blocking(&self, model: &str) -> Result<DownloadAxis, SessionError> {
        let (generation, events) = self.begin_download(model)?;
        Ok(self.drive_download(generation, events))
    }

    fn begin_download(&self, model: &str) -> Result<(u64, DownloadEvents), SessionError> {
        let session = DownloadSession::new(model)?;

        let mut state = resilient_write(&self.inner.state);
        if state.download_axis == DownloadAxis::Downloading {
            tracing::debug!(model = %session.model(), "Download rejected: already in progress");
            return Err(SessionError::AlreadyInProgress);
        }

        state.download_generation += 1;
        state.download_axis = DownloadAxis::Downloading;
        state.download_state = DownloadState::Idle;
        state.model = Some(session.model().clone());
        let generation = state.download_generation;
        drop(state);

        tracing::info!(model = %session.model(), generation, "DOWNLOAD_REQUESTED");
        Ok((generation, session.start(Arc::clone(&self.inner.backend))))
    }

    fn drive_download(&self, generation: u64, mut events: DownloadEvents) -> DownloadAxis {
        let _guard = DownloadGuard { controller: self, generation };

        while let Some(event) = events.next() {
            {
                let mut state = resilient_write(&self.inner.state);
                state.download_state = events.state().clone();
                if event.unlocks_chat() {
                    state.download_axis = DownloadAxis::Ready;
                } else if matches!(event, DownloadEvent::Failed { .. }) {
                    state.download_axis = DownloadAxis::DownloadFailed;
                }
            }
            self.inner.sink.on_download(event);
        }

        self.download_axis()
    }

    // ------------------------------------------------------------------
    // Chat axis
    // ------------------------------------------------------------------

    /// Send one chat turn on a blocking worker.
    ///
    /// Rejected synchronously with `NotReady`, `Busy`, or `NoRuntime`. The
    /// handle resolves to the finished turn.
    ///
    /// Text that is empty or whitespace-only is also rejected, with
    /// `InvalidInput`, before the guards are checked. That is an input check
    /// on top of the two guard rejections: no request is sent and no turn is
    /// recorded. Front-ends that skip blank lines never hit it.
    pub fn send_message(&self, text: &str) -> Result<JoinHandle<ChatTurn>, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (generation, events) = self.begin_chat(text)?;
        let controller = self.clone();
        Ok(runtime.spawn_blocking(move || controller.drive_chat(generation, events)))
    }

    /// Send one chat turn on the calling thread and return the finished turn.
    ///
    /// Same rejections as [`send_message`](Self::send_message), minus `NoRuntime`.
    pub fn send_message_blocking(&self, text: &str) -> Result<ChatTurn, SessionError> {
        let (generation, events) = self.begin_chat(text)?;
        Ok(self.drive_chat(generation, events))
    }

    fn begin_chat(&self, text: &str) -> Result<(u64, ChatEvents), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let mut state = resilient_write(&self.inner.state);
        let model = match (&state.download_axis, &state.model) {
            (DownloadAxis::Ready, Some(model)) => model.clone(),
            _ => return Err(SessionError::NotReady),
        };
        if state.chat_axis != ChatAxis::Idle {
            tracing::debug!(model = %model, "Message rejected: response still streaming");
            return Err(SessionError::Busy);
        }

        let history = state.history();
        state.turn_generation += 1;
        state.active_turn = Some(ChatTurn::new(text));
        state.chat_axis = ChatAxis::AwaitingResponse;
        let generation = state.turn_generation;
        drop(state);

        let session = ChatSession::new(model, text).with_history(history);
        Ok((generation, session.send(Arc::clone(&self.inner.backend))))
    }

    fn drive_chat(&self, generation: u64, events: ChatEvents) -> ChatTurn {
        let guard = ChatGuard { controller: self, generation };
        let mut finished = None;

        for event in events {
            {
                let mut state = resilient_write(&self.inner.state);
                match &event {
                    ChatEvent::Delta { fragment } => {
                        if let Some(turn) = state.active_turn.as_mut() {
                            turn.append(fragment);
                        }
                    }
                    ChatEvent::Done { .. } => {
                        finished = state.finalize_turn(ChatTurn::finish);
                    }
                    ChatEvent::Failed { message } => {
                        let message = message.clone();
                        finished = state.finalize_turn(|turn| turn.fail(message));
                    }
                }
            }
            self.inner.sink.on_chat(event);
        }

        match finished {
            Some(turn) => turn,
            None => guard.abort("chat stream ended without a result"),
        }
    }
}

/// Frees the download axis if a worker stops before a terminal event.
struct DownloadGuard<'a> {
    controller: &'a SessionController,
    generation: u64,
}

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        let mut state = resilient_write(&self.controller.inner.state);
        if state.download_generation == self.generation
            && state.download_axis == DownloadAxis::Downloading
        {
            tracing::error!(generation = self.generation, "Download worker stopped early");
            state.download_axis = DownloadAxis::DownloadFailed;
            state.download_state = DownloadState::Failed(DOWNLOAD_FAILED_MESSAGE.to_string());
        }
    }
}

/// Fails the active turn if a worker stops before a terminal event.
struct ChatGuard<'a> {
    controller: &'a SessionController,
    generation: u64,
}

impl ChatGuard<'_> {
    fn abort(&self, reason: &str) -> ChatTurn {
        let mut state = resilient_write(&self.controller.inner.state);
        if state.turn_generation == self.generation {
            if let Some(turn) = state.finalize_turn(|turn| turn.fail(reason)) {
                tracing::error!(generation = self.generation, reason, "CHAT_TURN_ABORTED");
                return turn;
            }
        }
        // Already finalized; report what the transcript holds.
        state
            .transcript
            .last()
            .cloned()
            .unwrap_or_else(|| ChatTurn::new(""))
    }
}

impl Drop for ChatGuard<'_> {
    fn drop(&mut self) {
        let mut state = resilient_write(&self.controller.inner.state);
        if state.turn_generation == self.generation && state.active_turn.is_some() {
            tracing::error!(generation = self.generation, "Chat worker stopped early");
            state.finalize_turn(|turn| turn.fail("chat worker stopped unexpectedly"));
        }
    }
}
