//! Conversation state threaded through `prompt` / `continue_prompt`, the
//! control-request side channel, and the caller-facing observer hooks.
//!
//! ## State machine
//!
//! ```text
//!            pause                       backend finishes
//!   Active ─────────► Paused      Active ─────────────────► Complete (terminal)
//!          ◄─────────
//!            resume
//! ```
//!
//! The phase is derived from the `is_paused` / `is_complete` flags, with
//! `is_complete` taking precedence. `AddMessages` directives never change the
//! phase. Any directive or continuation on a complete conversation fails with
//! [`AiError::ConversationComplete`].

use std::sync::Arc;

use pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AiError, ConversationId, OpaqueMessage};

/// Metadata key under which the reason of the latest pause is recorded.
pub const PAUSE_REASON_KEY: &str = "pauseReason";

/// The derived lifecycle phase of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationPhase {
    /// The backend may keep working on the conversation.
    Active,
    /// Work is suspended until a `Resume` directive arrives.
    Paused,
    /// The backend finished; no further continuation is allowed.
    Complete,
}

/// A resumable conversation session.
///
/// Created by a provider's `prompt`, passed back unchanged (or with caller
/// edits) into `continue_prompt`. The provider holds no conversation state of
/// its own; everything needed to resume lives here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAgentConversationState {
    /// Conversation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConversationId>,

    /// Backend-defined state payload.
    #[serde(default)]
    pub state: Value,

    /// Human-readable status label (e.g. `"analyzing"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Messages accumulated over the conversation, in order.
    #[serde(default)]
    pub messages: Vec<OpaqueMessage>,

    /// Work is suspended until resumed.
    #[serde(default)]
    pub is_paused: bool,

    /// The backend finished; terminal.
    #[serde(default)]
    pub is_complete: bool,
}

impl AiAgentConversationState {
    /// Creates an active conversation with a random id and the given payload.
    pub fn new(state: Value) -> Self {
        Self {
            id: Some(ConversationId::new_random()),
            state,
            ..Self::default()
        }
    }

    /// The phase derived from the flags.
    pub fn phase(&self) -> ConversationPhase {
        if self.is_complete {
            ConversationPhase::Complete
        } else if self.is_paused {
            ConversationPhase::Paused
        } else {
            ConversationPhase::Active
        }
    }

    /// Returns `true` once the conversation is complete.
    pub fn is_terminal(&self) -> bool {
        self.is_complete
    }

    /// Fails with [`AiError::ConversationComplete`] on a terminal conversation.
    pub fn ensure_resumable(&self) -> Result<(), AiError> {
        if self.is_complete {
            return Err(AiError::ConversationComplete {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Marks the conversation complete. Clears any pause.
    pub fn mark_complete(&mut self) {
        self.is_complete = true;
        self.is_paused = false;
    }

    /// Sets one metadata entry, creating the map if needed.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
    }

    /// Applies one control directive.
    pub fn apply_control_request(&mut self, request: &AiAgentControlRequest) -> Result<(), AiError> {
        self.ensure_resumable()?;

        match request {
            AiAgentControlRequest::Pause { reason } => {
                self.is_paused = true;
                match reason {
                    Some(reason) => self.set_metadata(PAUSE_REASON_KEY, reason.clone()),
                    None => self.remove_pause_reason(),
                }
            }
            AiAgentControlRequest::Resume => {
                self.is_paused = false;
                self.remove_pause_reason();
            }
            AiAgentControlRequest::AddMessages { messages } => {
                self.messages.extend(messages.iter().cloned());
            }
        }

        debug!(
            conversation = ?self.id.as_ref().map(|id| id.as_str()),
            directive = request.kind(),
            phase = ?self.phase(),
            "Applied control request"
        );
        Ok(())
    }

    /// Applies directives in the order given, stopping at the first failure.
    pub fn apply_control_requests<'a>(
        &mut self,
        requests: impl IntoIterator<Item = &'a AiAgentControlRequest>,
    ) -> Result<(), AiError> {
        for request in requests {
            self.apply_control_request(request)?;
        }
        Ok(())
    }

    /// Readies a returned state for `continue_prompt`.
    ///
    /// Checks the conversation is not complete, applies `requests` in order,
    /// and fails with [`AiError::ConversationPaused`] if the conversation is
    /// still paused afterwards.
    pub fn prepare_continuation(&mut self, requests: &[AiAgentControlRequest]) -> Result<(), AiError> {
        self.ensure_resumable()?;
        self.apply_control_requests(requests)?;
        if self.is_paused {
            return Err(AiError::ConversationPaused {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn remove_pause_reason(&mut self) {
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.remove(PAUSE_REASON_KEY);
        }
    }
}

// ---------------------------------------------------------------------------
// Control requests
// ---------------------------------------------------------------------------

/// A side-channel directive injected into a running conversation.
///
/// A sequence of directives is applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AiAgentControlRequest {
    /// Suspend work.
    Pause {
        /// Why the caller paused.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Resume suspended work.
    Resume,
    /// Append raw messages to the conversation log.
    AddMessages {
        /// Messages to append, in order.
        messages: Vec<OpaqueMessage>,
    },
}

impl AiAgentControlRequest {
    /// The directive's tag, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pause { .. } => "pause",
            Self::Resume => "resume",
            Self::AddMessages { .. } => "addMessages",
        }
    }
}

// ---------------------------------------------------------------------------
// Observer hooks
// ---------------------------------------------------------------------------

/// Notifications a provider sends to the caller while driving a conversation.
///
/// All hooks default to doing nothing.
pub trait ConversationObserver: Send + Sync {
    /// The working pipeline changed.
    fn on_pipeline_update(&self, _pipeline: &Pipeline) {}

    /// The conversation's status label changed.
    fn on_status_update(&self, _status: &str) {}

    /// New messages were exchanged with the backend.
    fn on_messages(&self, _messages: &[OpaqueMessage]) {}
}

struct SilentObserver;

impl ConversationObserver for SilentObserver {}

static SILENT: SilentObserver = SilentObserver;

/// Inputs to `AiProvider::prompt`.
pub struct PromptParams {
    /// The user's natural-language request.
    pub prompt: String,
    /// The pipeline the request applies to. Never mutated by the provider.
    pub previous_pipeline: Pipeline,
    /// Caller notification hooks.
    pub observer: Option<Arc<dyn ConversationObserver>>,
    /// Aborts in-flight work when triggered.
    pub cancellation: Option<CancellationToken>,
    /// Directives to apply, in order.
    pub control_requests: Vec<AiAgentControlRequest>,
}

impl PromptParams {
    /// Parameters with no observer, no cancellation, and no directives.
    pub fn new(prompt: impl Into<String>, previous_pipeline: Pipeline) -> Self {
        Self {
            prompt: prompt.into(),
            previous_pipeline,
            observer: None,
            cancellation: None,
            control_requests: Vec::new(),
        }
    }

    /// Sets the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConversationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Appends a directive.
    #[must_use]
    pub fn with_control_request(mut self, request: AiAgentControlRequest) -> Self {
        self.control_requests.push(request);
        self
    }

    /// The observer, or a silent one if none was supplied.
    pub fn observer(&self) -> &dyn ConversationObserver {
        self.observer.as_deref().unwrap_or(&SILENT)
    }
}

/// Inputs to `AiProvider::continue_prompt`.
pub struct ContinuePromptParams {
    /// The state returned by the previous `prompt` / `continue_prompt`.
    pub state: AiAgentConversationState,
    /// The pipeline as the caller currently holds it.
    pub previous_pipeline: Pipeline,
    /// Caller notification hooks.
    pub observer: Option<Arc<dyn ConversationObserver>>,
    /// Aborts in-flight work when triggered.
    pub cancellation: Option<CancellationToken>,
    /// Directives to apply before resuming, in order.
    pub control_requests: Vec<AiAgentControlRequest>,
}

impl ContinuePromptParams {
    /// Parameters with no observer, no cancellation, and no directives.
    pub fn new(state: AiAgentConversationState, previous_pipeline: Pipeline) -> Self {
        Self {
            state,
            previous_pipeline,
            observer: None,
            cancellation: None,
            control_requests: Vec::new(),
        }
    }

    /// Sets the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConversationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Appends a directive.
    #[must_use]
    pub fn with_control_request(mut self, request: AiAgentControlRequest) -> Self {
        self.control_requests.push(request);
        self
    }

    /// The observer, or a silent one if none was supplied.
    pub fn observer(&self) -> &dyn ConversationObserver {
        self.observer.as_deref().unwrap_or(&SILENT)
    }
}
