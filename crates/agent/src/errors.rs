//! Error types for the AI contracts.
//!
//! [`AiError`] covers failures surfaced by models, providers, and the
//! conversation state machine. Two classes of failure never appear here:
//!
//! - Usage-monitor failures are absorbed by the emission helpers in
//!   [`crate::usage`] and become `proceed = false` at checked sites.
//! - Function-call failures raised by an evaluator are carried as the
//!   original [`anyhow::Error`] value, unchanged, through
//!   [`crate::ProviderCore::call_function_with_telemetry`].

use thiserror::Error;

use crate::ConversationId;

/// Failures surfaced by models, providers, and conversation handling.
#[derive(Debug, Error)]
pub enum AiError {
    /// The operation observed its cancellation token before completing.
    #[error("Operation cancelled")]
    Cancelled,

    /// A directive or continuation was applied to a conversation whose
    /// `is_complete` flag is set. Complete conversations are terminal.
    #[error("Conversation {} is complete and cannot be continued", display_id(.id))]
    ConversationComplete {
        /// Id of the offending conversation, if it has one.
        id: Option<ConversationId>,
    },

    /// A continuation was requested for a paused conversation without a
    /// `resume` directive.
    #[error("Conversation {} is paused; supply a resume control request", display_id(.id))]
    ConversationPaused {
        /// Id of the offending conversation, if it has one.
        id: Option<ConversationId>,
    },

    /// The AI backend reported a failure.
    #[error("AI backend error: {message}")]
    Backend {
        /// Backend-supplied description of the failure.
        message: String,
    },

    /// A schema-constrained result did not match the expected shape.
    #[error("Result did not match schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// A function invoked on the backend's behalf failed.
    ///
    /// The inner error is the evaluator's error, unmodified.
    #[error(transparent)]
    Function(#[from] anyhow::Error),
}

impl AiError {
    /// Creates an [`AiError::Backend`] from any message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

fn display_id(id: &Option<ConversationId>) -> String {
    match id {
        Some(id) => format!("'{id}'"),
        None => "(unnamed)".to_string(),
    }
}
