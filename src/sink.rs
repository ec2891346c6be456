// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event sinks: how controller events reach a presentation.
//!
//! Workers never call into UI code directly. The usual wiring is
//! [`event_queue`]: the controller gets a [`QueueSink`], the UI keeps the
//! [`EventQueue`] and drains it on its own schedule (a frame tick, a timer,
//! or simply awaiting the next event).
//!
//! Batching fragments is a presentation choice. [`coalesce_deltas`] merges
//! adjacent deltas from one drain; [`DeltaBuffer`] holds text back until a
//! size threshold is reached.

use tokio::sync::mpsc;

use crate::session::{ChatEvent, DownloadEvent, SessionEvent};

/// Flush threshold for [`DeltaBuffer::default`], in characters.
pub const DEFAULT_DELTA_BATCH_CHARS: usize = 100;

/// Anything that consumes controller events.
///
/// Called from worker threads, in stream order. Implementations should hand
/// the event off quickly rather than render inline.
pub trait EventSink: Send + Sync + 'static {
    /// A download session produced an event.
    fn on_download(&self, event: DownloadEvent);

    /// A chat session produced an event.
    fn on_chat(&self, event: ChatEvent);
}

/// Sink that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl QueueSink {
    fn forward(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event queue closed; dropping event");
        }
    }
}

impl EventSink for QueueSink {
    fn on_download(&self, event: DownloadEvent) {
        self.forward(SessionEvent::Download(event));
    }

    fn on_chat(&self, event: ChatEvent) {
        self.forward(SessionEvent::Chat(event));
    }
}

/// Receiving end of a [`QueueSink`], owned by the UI.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventQueue {
    /// Take everything queued so far without blocking.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Wait for the next event from a plain (non-async) thread.
    ///
    /// Panics if called from inside an async context, like
    /// [`mpsc::UnboundedReceiver::blocking_recv`].
    pub fn blocking_recv(&mut self) -> Option<SessionEvent> {
        self.rx.blocking_recv()
    }
}

/// Create a connected sink/queue pair.
pub fn event_queue() -> (QueueSink, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSink { tx }, EventQueue { rx })
}

/// Merge runs of adjacent `Delta` events into one. Order and the
/// concatenated text are unchanged.
pub fn coalesce_deltas(events: Vec<SessionEvent>) -> Vec<SessionEvent> {
    let mut out: Vec<SessionEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let SessionEvent::Chat(ChatEvent::Delta { fragment }) = &event {
            if let Some(SessionEvent::Chat(ChatEvent::Delta { fragment: pending })) = out.last_mut() {
                pending.push_str(fragment);
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// Accumulates fragments and releases them in batches.
#[derive(Debug, Clone)]
pub struct DeltaBuffer {
    buffer: String,
    threshold: usize,
}

impl Default for DeltaBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA_BATCH_CHARS)
    }
}

impl DeltaBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: String::new(),
            threshold: threshold.max(1),
        }
    }

    /// Add a fragment; returns the batch once it reaches the threshold.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);
        if self.buffer.chars().count() >= self.threshold {
            self.flush()
        } else {
            None
        }
    }

    /// Release whatever is buffered. Call on `Done`/`Failed`.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> SessionEvent {
        SessionEvent::Chat(ChatEvent::Delta { fragment: text.to_string() })
    }

    #[test]
    fn test_queue_preserves_order() {
        let (sink, mut queue) = event_queue();
        sink.on_download(DownloadEvent::Ready);
        sink.on_chat(ChatEvent::Delta { fragment: "a".into() });
        sink.on_chat(ChatEvent::Done { full_text: "a".into() });

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SessionEvent::Download(DownloadEvent::Ready));
        assert!(events[2].is_terminal());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_sink_survives_dropped_queue() {
        let (sink, queue) = event_queue();
        drop(queue);
        sink.on_download(DownloadEvent::Ready);
    }

    #[tokio::test]
    async fn test_queue_recv() {
        let (sink, mut queue) = event_queue();
        let worker = tokio::task::spawn_blocking(move || {
            sink.on_chat(ChatEvent::Delta { fragment: "x".into() });
        });
        assert_eq!(queue.recv().await, Some(delta("x")));
        worker.await.unwrap();
    }

    #[test]
    fn test_coalesce_deltas() {
        let events = vec![
            SessionEvent::Download(DownloadEvent::Ready),
            delta("Hel"),
            delta("lo"),
            SessionEvent::Chat(ChatEvent::Done { full_text: "Hello".into() }),
            delta("x"),
        ];
        let merged = coalesce_deltas(events);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[1], delta("Hello"));
        assert_eq!(merged[3], delta("x"));
    }

    #[test]
    fn test_delta_buffer_threshold() {
        let mut buffer = DeltaBuffer::new(5);
        assert_eq!(buffer.push("ab"), None);
        assert_eq!(buffer.push("cde"), Some("abcde".to_string()));
        assert_eq!(buffer.push("f"), None);
        assert_eq!(buffer.flush(), Some("f".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_delta_buffer_default_threshold() {
        let mut buffer = DeltaBuffer::default();
        let chunk = "x".repeat(99);
        assert_eq!(buffer.push(&chunk), None);
        assert_eq!(buffer.push("y").map(|s| s.len()), Some(100));
    }
}
