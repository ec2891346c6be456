// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy and user-facing error formatting.
//!
//! [`SessionError`] is what controller calls return synchronously. Transport
//! failures during a stream never show up here; sessions turn them into
//! terminal `Failed` events instead.

use crate::backend::OllamaError;

/// Fixed user-facing text for any failed download.
pub const DOWNLOAD_FAILED_MESSAGE: &str = "Could not find or download the specified model.";

/// Hint shown after a failed download.
pub const DOWNLOAD_FAILED_HINT: &str = "Check the model name and your internet connection.";

/// Hint shown after a failed chat turn.
pub const CHAT_FAILED_HINT: &str = "Check your Ollama server status.";

/// Errors returned by session and controller calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("A model download is already in progress")]
    AlreadyInProgress,
    #[error("A chat response is still streaming")]
    Busy,
    #[error("No model is ready yet; download one first")]
    NotReady,
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("No async runtime available to run the worker")]
    NoRuntime,
}

impl SessionError {
    /// True for guard rejections that indicate a caller bug, not a transient failure.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadyInProgress | SessionError::Busy | SessionError::NotReady
        )
    }
}

impl From<OllamaError> for SessionError {
    fn from(err: OllamaError) -> Self {
        match err {
            OllamaError::ModelNotFound(model) => SessionError::ModelNotFound(model),
            other => SessionError::BackendUnavailable(other.to_string()),
        }
    }
}

/// Formats an error message with title, causes, and fixes.
///
/// # Example
///
/// ```
/// use pullchat::error::format_error;
///
/// let error = format_error(
///     "Could not find or download the specified model.",
///     &["Typo in the model name", "No internet connection"],
///     &["Check the model name and your internet connection."],
/// );
/// println!("{}", error);
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n", title);

    if !causes.is_empty() {
        output.push_str("\nPossible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
    }

    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let error = format_error("Test Error", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.starts_with("[✗] Test Error\n"));
        assert!(error.contains("Possible causes:"));
        assert!(error.contains("  - Cause 2"));
        assert!(error.contains("Try these fixes:"));
        assert!(error.contains("  2. Fix 2"));
    }

    #[test]
    fn test_empty_causes_and_fixes() {
        let error = format_error("Empty test", &[], &[]);
        assert_eq!(error, "[✗] Empty test\n");
    }

    #[test]
    fn test_from_ollama_error() {
        let err: SessionError = OllamaError::NotRunning("down".to_string()).into();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));

        let err: SessionError = OllamaError::ModelNotFound("ghost".to_string()).into();
        assert_eq!(err, SessionError::ModelNotFound("ghost".to_string()));
    }

    #[test]
    fn test_guard_violations() {
        assert!(SessionError::Busy.is_guard_violation());
        assert!(SessionError::AlreadyInProgress.is_guard_violation());
        assert!(SessionError::NotReady.is_guard_violation());
        assert!(!SessionError::InvalidInput("x".into()).is_guard_violation());
    }
}
