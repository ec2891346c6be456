// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Events emitted to presentations.
//!
//! Tagged unions so a web front-end can forward them as JSON unchanged:
//!
//! ```json
//! {"kind":"download","event":"progress","message":"Downloading model 'demo'..."}
//! {"kind":"chat","event":"delta","fragment":"Hel"}
//! ```

use serde::{Deserialize, Serialize};

/// Progress of a model pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DownloadEvent {
    /// Human-readable progress line
    Progress { message: String },
    /// One layer finished downloading
    #[serde(rename_all = "camelCase")]
    LayerDone { layer_id: String },
    /// Pull finished; chat may start
    Ready,
    /// Nothing to pull, the model is already local
    AlreadyAvailable,
    /// Pull failed; carries the fixed user-facing message
    Failed { message: String },
}

impl DownloadEvent {
    /// Returns true for the event that ends a download sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Ready | DownloadEvent::AlreadyAvailable | DownloadEvent::Failed { .. }
        )
    }

    /// Returns true when the event means a model is usable.
    pub fn unlocks_chat(&self) -> bool {
        matches!(self, DownloadEvent::Ready | DownloadEvent::AlreadyAvailable)
    }
}

/// Progress of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChatEvent {
    /// Next piece of the assistant reply
    Delta { fragment: String },
    /// Reply finished
    #[serde(rename_all = "camelCase")]
    Done { full_text: String },
    /// Reply failed; earlier deltas still stand
    Failed { message: String },
}

impl ChatEvent {
    /// Returns true for the event that ends a chat sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Delta { .. })
    }
}

/// Any event the controller relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    Download(DownloadEvent),
    Chat(ChatEvent),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        match self {
            SessionEvent::Download(event) => event.is_terminal(),
            SessionEvent::Chat(event) => event.is_terminal(),
        }
    }
}

impl From<DownloadEvent> for SessionEvent {
    fn from(event: DownloadEvent) -> Self {
        SessionEvent::Download(event)
    }
}

impl From<ChatEvent> for SessionEvent {
    fn from(event: ChatEvent) -> Self {
        SessionEvent::Chat(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::Download(DownloadEvent::LayerDone {
            layer_id: "L1".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "download");
        assert_eq!(json["event"], "layerDone");
        assert_eq!(json["layerId"], "L1");

        let event = SessionEvent::Chat(ChatEvent::Done {
            full_text: "Hi there".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "chat");
        assert_eq!(json["event"], "done");
        assert_eq!(json["fullText"], "Hi there");
    }

    #[test]
    fn test_terminal_events() {
        assert!(!DownloadEvent::Progress { message: String::new() }.is_terminal());
        assert!(DownloadEvent::AlreadyAvailable.is_terminal());
        assert!(DownloadEvent::AlreadyAvailable.unlocks_chat());
        assert!(!DownloadEvent::Failed { message: String::new() }.unlocks_chat());

        assert!(!ChatEvent::Delta { fragment: "x".into() }.is_terminal());
        assert!(ChatEvent::Failed { message: "x".into() }.is_terminal());
    }
}
