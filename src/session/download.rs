// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model pull session.
//!
//! State diagram:
//! ```text
//! Idle ──"pulling manifest"/progress──> Pulling ──"download complete"──> LayerComplete
//!   │                                      │  ▲                              │
//!   │                                      │  └──────────progress───────────┘
//!   │                                      └──"pull complete" / end──> Complete
//!   ├──end of stream, nothing recognized──> Complete (AlreadyAvailable)
//!   └──any backend error──> Failed
//! ```

use std::iter::FusedIterator;
use std::sync::Arc;

use super::events::DownloadEvent;
use super::types::{DownloadState, ModelRef};
use crate::backend::{Backend, OllamaError, PullChunk, PullStream};
use crate::error::{SessionError, DOWNLOAD_FAILED_MESSAGE};

const STATUS_PULLING_MANIFEST: &str = "pulling manifest";
const STATUS_DOWNLOAD_COMPLETE: &str = "download complete";
const STATUS_PULL_COMPLETE: &str = "pull complete";

/// A single, not-yet-started model pull.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    model: ModelRef,
}

impl DownloadSession {
    /// Validate the model name. Fails with `InvalidInput` before any network call.
    pub fn new(model: impl AsRef<str>) -> Result<Self, SessionError> {
        Ok(Self {
            model: ModelRef::new(model)?,
        })
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Start the pull. The request is only sent when the returned iterator
    /// is first polled.
    pub fn start(self, backend: Arc<dyn Backend>) -> DownloadEvents {
        tracing::info!(model = %self.model, "DOWNLOAD_STARTED");
        DownloadEvents {
            model: self.model,
            phase: Phase::NotStarted(backend),
            state: DownloadState::Idle,
            recognized: false,
        }
    }
}

enum Phase {
    NotStarted(Arc<dyn Backend>),
    Streaming(PullStream),
    Finished,
}

/// Lazy, finite sequence of download events. Ends right after its terminal
/// event (`Ready`, `AlreadyAvailable` or `Failed`).
pub struct DownloadEvents {
    model: ModelRef,
    phase: Phase,
    state: DownloadState,
    recognized: bool,
}

impl DownloadEvents {
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Current state of the pull.
    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    /// Map one chunk to at most one event, updating state.
    fn on_chunk(&mut self, chunk: PullChunk) -> Option<DownloadEvent> {
        if chunk.status == STATUS_PULLING_MANIFEST {
            self.recognized = true;
            self.state = DownloadState::Pulling(None);
            return Some(DownloadEvent::Progress {
                message: format!("Downloading model '{}'...", self.model),
            });
        }

        if let Some(progress) = &chunk.progress {
            self.recognized = true;
            let progress = progress.to_string();
            let message = format!("{}: {}", chunk.status, progress);
            self.state = DownloadState::Pulling(Some(progress));
            return Some(DownloadEvent::Progress { message });
        }

        if chunk.status == STATUS_DOWNLOAD_COMPLETE {
            self.recognized = true;
            let layer_id = chunk.id.unwrap_or_default();
            tracing::debug!(model = %self.model, layer = %layer_id, "LAYER_DONE");
            self.state = DownloadState::LayerComplete(layer_id.clone());
            return Some(DownloadEvent::LayerDone { layer_id });
        }

        if chunk.status == STATUS_PULL_COMPLETE {
            return Some(self.complete(DownloadEvent::Ready));
        }

        tracing::trace!(model = %self.model, status = %chunk.status, "Unmapped pull status");
        None
    }

    fn complete(&mut self, event: DownloadEvent) -> DownloadEvent {
        self.phase = Phase::Finished;
        self.state = DownloadState::Complete;
        tracing::info!(model = %self.model, already_local = matches!(event, DownloadEvent::AlreadyAvailable), "DOWNLOAD_COMPLETE");
        event
    }

    fn fail(&mut self, err: OllamaError) -> DownloadEvent {
        tracing::warn!(model = %self.model, error = %err, "DOWNLOAD_FAILED");
        self.phase = Phase::Finished;
        self.state = DownloadState::Failed(DOWNLOAD_FAILED_MESSAGE.to_string());
        DownloadEvent::Failed {
            message: DOWNLOAD_FAILED_MESSAGE.to_string(),
        }
    }
}

impl Iterator for DownloadEvents {
    type Item = DownloadEvent;

    fn next(&mut self) -> Option<DownloadEvent> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::NotStarted(backend) => match backend.pull(self.model.as_str()) {
                    Ok(stream) => self.phase = Phase::Streaming(stream),
                    Err(err) => return Some(self.fail(err)),
                },
                Phase::Streaming(mut stream) => match stream.next() {
                    Some(Ok(chunk)) => {
                        self.phase = Phase::Streaming(stream);
                        if let Some(event) = self.on_chunk(chunk) {
                            return Some(event);
                        }
                    }
                    Some(Err(err)) => return Some(self.fail(err)),
                    None if self.recognized => return Some(self.complete(DownloadEvent::Ready)),
                    None => return Some(self.complete(DownloadEvent::AlreadyAvailable)),
                },
                Phase::Finished => return None,
            }
        }
    }
}

impl FusedIterator for DownloadEvents {}
