// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Data model shared by the download and chat sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;

/// Name of a model at the backend (e.g. "llama3.2:latest").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelRef(String);

impl ModelRef {
    /// Validate a model name. Surrounding whitespace is dropped; a blank
    /// name is rejected.
    pub fn new(name: impl AsRef<str>) -> Result<Self, SessionError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput(
                "model name must not be empty".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModelRef {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelRef> for String {
    fn from(model: ModelRef) -> Self {
        model.0
    }
}

/// Where a single pull currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum DownloadState {
    /// Session created, stream not opened yet
    #[default]
    Idle,
    /// Manifest or layers are being fetched
    Pulling(Option<String>),
    /// A layer finished downloading
    LayerComplete(String),
    /// The model is present locally
    Complete,
    /// The pull failed; carries the user-facing message
    Failed(String),
}

/// Lifecycle of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum TurnState {
    /// Request issued, nothing received yet
    Pending,
    /// Fragments are arriving
    Streaming,
    /// Stream ended normally
    Done,
    /// Stream failed; carries the backend's error text
    Failed(String),
}

impl TurnState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Failed(_))
    }
}

/// One user message and the (possibly partial) assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    user_message: String,
    assistant_text: String,
    state: TurnState,
    started_at: DateTime<Utc>,
}

impl ChatTurn {
    /// A new turn in `Pending` state.
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_text: String::new(),
            state: TurnState::Pending,
            started_at: Utc::now(),
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append a fragment. A `Pending` turn starts streaming; a finished turn
    /// is left untouched and `false` is returned.
    pub fn append(&mut self, fragment: &str) -> bool {
        match self.state {
            TurnState::Pending => self.state = TurnState::Streaming,
            TurnState::Streaming => {}
            TurnState::Done | TurnState::Failed(_) => {
                tracing::warn!("Ignoring fragment for a finished chat turn");
                return false;
            }
        }
        self.assistant_text.push_str(fragment);
        true
    }

    /// Mark the turn done. No-op if it already finished.
    pub fn finish(&mut self) {
        if !self.state.is_finished() {
            self.state = TurnState::Done;
        }
    }

    /// Mark the turn failed, keeping any partial text. No-op if it already finished.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.state.is_finished() {
            self.state = TurnState::Failed(message.into());
        }
    }
}

/// Ordered, append-only list of finished turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished turn. Unfinished turns are refused.
    pub fn push(&mut self, turn: ChatTurn) -> bool {
        if !turn.state().is_finished() {
            tracing::warn!("Refusing to record an unfinished chat turn");
            return false;
        }
        self.turns.push(turn);
        true
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatTurn> {
        self.turns.iter()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ChatTurn;
    type IntoIter = std::slice::Iter<'a, ChatTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
