// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One streamed chat turn.

use std::iter::FusedIterator;
use std::sync::Arc;

use super::events::ChatEvent;
use super::types::ModelRef;
use crate::backend::{Backend, ChatStream, Message, OllamaError};

/// A single chat request, not yet sent.
///
/// The caller is responsible for only sending to a model that is ready.
#[derive(Debug, Clone)]
pub struct ChatSession {
    model: ModelRef,
    message: String,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(model: ModelRef, message: impl Into<String>) -> Self {
        Self {
            model,
            message: message.into(),
            history: Vec::new(),
        }
    }

    /// Prior messages to send ahead of the user message.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Send the turn. The request is only issued when the returned iterator
    /// is first polled.
    pub fn send(self, backend: Arc<dyn Backend>) -> ChatEvents {
        let mut messages = self.history;
        messages.push(Message::user(self.message));
        tracing::info!(model = %self.model, messages = messages.len(), "CHAT_TURN_STARTED");

        ChatEvents {
            model: self.model,
            phase: Phase::NotStarted { backend, messages },
            text: String::new(),
        }
    }
}

enum Phase {
    NotStarted {
        backend: Arc<dyn Backend>,
        messages: Vec<Message>,
    },
    Streaming(ChatStream),
    Finished,
}

/// Lazy, finite sequence of chat events. Ends right after `Done` or `Failed`.
pub struct ChatEvents {
    model: ModelRef,
    phase: Phase,
    text: String,
}

impl ChatEvents {
    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn fail(&mut self, err: OllamaError) -> ChatEvent {
        tracing::warn!(model = %self.model, error = %err, partial_len = self.text.len(), "CHAT_TURN_FAILED");
        self.phase = Phase::Finished;
        ChatEvent::Failed {
            message: err.to_string(),
        }
    }
}

impl Iterator for ChatEvents {
    type Item = ChatEvent;

    fn next(&mut self) -> Option<ChatEvent> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::NotStarted { backend, messages } => {
                    match backend.chat(self.model.as_str(), messages) {
                        Ok(stream) => self.phase = Phase::Streaming(stream),
                        Err(err) => return Some(self.fail(err)),
                    }
                }
                Phase::Streaming(mut stream) => match stream.next() {
                    Some(Ok(chunk)) => {
                        self.phase = Phase::Streaming(stream);
                        let fragment = chunk.content();
                        if fragment.is_empty() {
                            continue;
                        }
                        self.text.push_str(fragment);
                        return Some(ChatEvent::Delta {
                            fragment: fragment.to_string(),
                        });
                    }
                    Some(Err(err)) => return Some(self.fail(err)),
                    None => {
                        tracing::info!(model = %self.model, chars = self.text.chars().count(), "CHAT_TURN_DONE");
                        return Some(ChatEvent::Done {
                            full_text: self.text.clone(),
                        });
                    }
                },
                Phase::Finished => return None,
            }
        }
    }
}

impl FusedIterator for ChatEvents {}
