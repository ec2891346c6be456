// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures: an in-memory backend that replays scripted responses.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use pullchat::backend::{
    Backend, ChatChunk, ChatStream, Message, OllamaError, PullChunk, PullStream,
};
use pullchat::{ChatEvent, DownloadEvent, EventSink};

/// One scripted response: either the request fails outright, or it streams
/// the given items in order.
pub type Script<T> = Result<Vec<Result<T, OllamaError>>, OllamaError>;

/// Holds streams back until opened. Streams block before their first item.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        // Bounded so a broken test fails instead of hanging.
        let _ = cvar
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
    }
}

struct Gated<I> {
    gate: Option<Gate>,
    items: I,
}

impl<I: Iterator> Iterator for Gated<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(gate) = self.gate.take() {
            gate.wait();
        }
        self.items.next()
    }
}

/// Backend that replays scripted pull and chat responses.
///
/// Scripts are consumed one per call; the last one repeats.
#[derive(Default)]
pub struct ScriptedBackend {
    pulls: Mutex<VecDeque<Script<PullChunk>>>,
    chats: Mutex<VecDeque<Script<ChatChunk>>>,
    pull_gate: Option<Gate>,
    chat_gate: Option<Gate>,
    chat_requests: Mutex<Vec<Vec<Message>>>,
    pull_requests: Mutex<Vec<String>>,
    ping_failure: Option<OllamaError>,
    pings: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pull_ok(self, chunks: Vec<PullChunk>) -> Self {
        self.pull_script(Ok(chunks.into_iter().map(Ok).collect()))
    }

    pub fn pull_script(self, script: Script<PullChunk>) -> Self {
        self.pulls.lock().unwrap().push_back(script);
        self
    }

    pub fn chat_ok(self, fragments: &[&str]) -> Self {
        let chunks = fragments
            .iter()
            .map(|f| Ok(ChatChunk::content_fragment(*f)))
            .collect();
        self.chat_script(Ok(chunks))
    }

    pub fn chat_script(self, script: Script<ChatChunk>) -> Self {
        self.chats.lock().unwrap().push_back(script);
        self
    }

    /// Pull streams wait on `gate` before their first chunk.
    pub fn gate_pulls(mut self, gate: Gate) -> Self {
        self.pull_gate = Some(gate);
        self
    }

    /// Chat streams wait on `gate` before their first chunk.
    pub fn gate_chats(mut self, gate: Gate) -> Self {
        self.chat_gate = Some(gate);
        self
    }

    /// Every ping fails with `err`. Pings succeed otherwise.
    pub fn ping_fails(mut self, err: OllamaError) -> Self {
        self.ping_failure = Some(err);
        self
    }

    pub fn pings(&self) -> usize {
        *self.pings.lock().unwrap()
    }

    pub fn chat_requests(&self) -> Vec<Vec<Message>> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn pull_requests(&self) -> Vec<String> {
        self.pull_requests.lock().unwrap().clone()
    }

    fn next_script<T: Clone>(queue: &Mutex<VecDeque<Script<T>>>) -> Script<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn stream<T: Send + 'static>(
        script: Script<T>,
        gate: Option<Gate>,
    ) -> Result<Box<dyn Iterator<Item = Result<T, OllamaError>> + Send>, OllamaError> {
        let items = script?;
        Ok(Box::new(Gated {
            gate,
            items: items.into_iter(),
        }))
    }
}

impl Backend for ScriptedBackend {
    fn pull(&self, model: &str) -> Result<PullStream, OllamaError> {
        self.pull_requests.lock().unwrap().push(model.to_string());
        Self::stream(Self::next_script(&self.pulls), self.pull_gate.clone())
    }

    fn chat(&self, _model: &str, messages: Vec<Message>) -> Result<ChatStream, OllamaError> {
        self.chat_requests.lock().unwrap().push(messages);
        Self::stream(Self::next_script(&self.chats), self.chat_gate.clone())
    }

    fn ping(&self) -> Result<(), OllamaError> {
        *self.pings.lock().unwrap() += 1;
        match &self.ping_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Sink that records everything it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub downloads: Mutex<Vec<DownloadEvent>>,
    pub chats: Mutex<Vec<ChatEvent>>,
}

impl RecordingSink {
    pub fn downloads(&self) -> Vec<DownloadEvent> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn chats(&self) -> Vec<ChatEvent> {
        self.chats.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_download(&self, event: DownloadEvent) {
        self.downloads.lock().unwrap().push(event);
    }

    fn on_chat(&self, event: ChatEvent) {
        self.chats.lock().unwrap().push(event);
    }
}

/// The three-chunk pull used by the demo scenario.
pub fn demo_pull() -> Vec<PullChunk> {
    vec![
        PullChunk::status("pulling manifest"),
        PullChunk::status("download complete").with_id("L1"),
        PullChunk::status("pull complete"),
    ]
}

pub fn network_error() -> OllamaError {
    OllamaError::NotRunning("connection refused".to_string())
}
