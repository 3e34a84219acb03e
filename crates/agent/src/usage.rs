//! Usage telemetry: events, the monitor sink, and emission helpers.
//!
//! Every billable or loggable operation (model call, analysis, generation,
//! function call) is bracketed by a start and an end [`UsageEvent`]. Events are
//! delivered to a [`UsageMonitor`] in one of two ways:
//!
//! - **Unchecked** ([`emit_start`], [`emit_end`]): the event is built and
//!   returned synchronously, then queued on the monitor's [`UsageDispatcher`].
//!   A single Tokio task drains the queue, so the monitor sees events in
//!   emission order. The caller never waits and never sees a failure.
//! - **Checked** ([`emit_start_checked`], [`emit_end_checked`]): delivery is
//!   awaited. The monitor's [`Verdict`] becomes the `proceed` flag, letting the
//!   monitor act as an admission gate (budgets, rate limits). A monitor error
//!   yields `proceed = false`; it is never propagated.
//!
//! [`run_guarded`] combines the checked pair around an arbitrary operation.
//!
//! ## Correlation
//!
//! An end event's `started_at` equals the paired start event's `started_at`
//! whenever the start timestamp is passed through as the override.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Timestamp, TokenUsage, UsageEventId};

// ---------------------------------------------------------------------------
// Event shapes
// ---------------------------------------------------------------------------

/// The kind of operation a usage event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageSource {
    /// A free-text model prompt.
    #[serde(rename = "model.prompt")]
    ModelPrompt,
    /// A schema-constrained model prompt.
    #[serde(rename = "model.promptWithSchema")]
    ModelPromptWithSchema,
    /// The analysis pass of pipeline generation.
    #[serde(rename = "pipeline.analyze")]
    PipelineAnalyze,
    /// The generation pass of pipeline generation.
    #[serde(rename = "pipeline.generate")]
    PipelineGenerate,
    /// A function invoked through the evaluator.
    #[serde(rename = "function.call")]
    FunctionCall,
}

impl UsageSource {
    /// Returns the dotted wire name (e.g. `"model.prompt"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelPrompt => "model.prompt",
            Self::ModelPromptWithSchema => "model.promptWithSchema",
            Self::PipelineAnalyze => "pipeline.analyze",
            Self::PipelineGenerate => "pipeline.generate",
            Self::FunctionCall => "function.call",
        }
    }
}

impl std::fmt::Display for UsageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form event metadata.
pub type UsageMetadata = serde_json::Map<String, Value>;

/// Fields shared by start and end events.
///
/// Callers build a base describing the operation; the emission helpers stamp
/// the phase and the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEventBase {
    /// Correlation id shared by a start/end pair, when the caller assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UsageEventId>,

    /// What kind of operation this is.
    pub source: UsageSource,

    /// Backend model name, for model-driven operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// When the operation started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,

    /// When the operation ended. Only set on end events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,

    /// Free-form metadata (e.g. the invoked function's name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UsageMetadata>,
}

impl UsageEventBase {
    /// Creates a base for `source` with every optional field unset.
    pub fn new(source: UsageSource) -> Self {
        Self {
            id: None,
            source,
            model: None,
            started_at: None,
            ended_at: None,
            metadata: None,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: UsageEventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the start timestamp.
    #[must_use]
    pub fn with_started_at(mut self, started_at: Timestamp) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Adds one metadata entry, creating the map if needed.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(UsageMetadata::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Which half of a start/end pair an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsagePhase {
    /// The operation is about to run.
    Start,
    /// The operation has finished (successfully or not).
    End,
}

/// A timestamped usage record, tagged by phase.
///
/// Serializes with a `"phase": "start" | "end"` discriminator and the base
/// fields inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum UsageEvent {
    /// Emitted before the operation runs.
    Start(UsageEventBase),
    /// Emitted after the operation completes or fails.
    End {
        /// Shared event fields.
        #[serde(flatten)]
        base: UsageEventBase,
        /// Token usage, when the backend reported it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

impl UsageEvent {
    /// Returns the event's phase.
    pub fn phase(&self) -> UsagePhase {
        match self {
            Self::Start(_) => UsagePhase::Start,
            Self::End { .. } => UsagePhase::End,
        }
    }

    /// Returns the shared event fields.
    pub fn base(&self) -> &UsageEventBase {
        match self {
            Self::Start(base) | Self::End { base, .. } => base,
        }
    }

    /// Shorthand for `self.base().source`.
    pub fn source(&self) -> UsageSource {
        self.base().source
    }

    /// Shorthand for `self.base().started_at`.
    pub fn started_at(&self) -> Option<Timestamp> {
        self.base().started_at
    }

    /// Token usage carried by an end event; always `None` for start events.
    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Self::Start(_) => None,
            Self::End { usage, .. } => usage.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor contract
// ---------------------------------------------------------------------------

/// A monitor's decision about the operation an event describes.
///
/// Only checked emission sites act on the verdict; unchecked sites discard it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Let the operation run.
    #[default]
    Proceed,
    /// Refuse the operation.
    Veto,
}

/// A sink receiving usage events.
///
/// Returning `Err` signals a monitor failure. Failures are never propagated to
/// the caller of the tracked operation: unchecked sites discard them and
/// checked sites treat them as a veto.
#[async_trait]
pub trait UsageMonitor: Send + Sync {
    /// Receives one event and decides whether the operation may proceed.
    async fn on_event(&self, event: &UsageEvent) -> anyhow::Result<Verdict>;
}

/// A monitor shared across calls and detached dispatch tasks.
pub type SharedUsageMonitor = Arc<dyn UsageMonitor>;

/// Result of a checked emission.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedEmission {
    /// The event that was delivered.
    pub event: UsageEvent,
    /// `false` if the monitor vetoed or failed; `true` otherwise.
    pub proceed: bool,
}

// ---------------------------------------------------------------------------
// Emission helpers
// ---------------------------------------------------------------------------

fn stamp_start(mut base: UsageEventBase) -> UsageEvent {
    base.started_at = Some(Timestamp::now());
    UsageEvent::Start(base)
}

fn stamp_end(
    mut base: UsageEventBase,
    usage: Option<TokenUsage>,
    started_override: Option<Timestamp>,
) -> UsageEvent {
    base.ended_at = Some(Timestamp::now());
    base.started_at = started_override.or(base.started_at);
    UsageEvent::End { base, usage }
}

/// Ordered, fire-and-forget delivery of unchecked events to one monitor.
///
/// Events go onto an unbounded channel drained by a single Tokio task, so the
/// monitor receives them in the order they were emitted. The drain task is
/// started by the first emission made inside a runtime and restarted if that
/// runtime has since shut down.
pub struct UsageDispatcher {
    monitor: SharedUsageMonitor,
    queue: Mutex<Option<mpsc::UnboundedSender<UsageEvent>>>,
}

impl UsageDispatcher {
    /// Creates a dispatcher for `monitor`. No task is started until the first
    /// emission.
    pub fn new(monitor: SharedUsageMonitor) -> Self {
        Self {
            monitor,
            queue: Mutex::new(None),
        }
    }

    /// The monitor events are delivered to.
    pub fn monitor(&self) -> &SharedUsageMonitor {
        &self.monitor
    }

    fn dispatch(&self, event: UsageEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        let event = match queue.as_ref() {
            Some(sender) => match sender.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                source = %event.source(),
                phase = ?event.phase(),
                "No Tokio runtime available; usage event dropped"
            );
            return;
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        if sender.send(event).is_ok() {
            handle.spawn(drain(Arc::clone(&self.monitor), receiver));
            *queue = Some(sender);
        }
    }
}

impl From<SharedUsageMonitor> for UsageDispatcher {
    fn from(monitor: SharedUsageMonitor) -> Self {
        Self::new(monitor)
    }
}

async fn drain(monitor: SharedUsageMonitor, mut events: mpsc::UnboundedReceiver<UsageEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(err) = monitor.on_event(&event).await {
            debug!(source = %event.source(), error = %err, "Usage monitor failed; event discarded");
        }
    }
}

async fn dispatch_checked(monitor: &dyn UsageMonitor, event: UsageEvent) -> CheckedEmission {
    let proceed = match monitor.on_event(&event).await {
        Ok(Verdict::Proceed) => true,
        Ok(Verdict::Veto) => {
            info!(source = %event.source(), phase = ?event.phase(), "Usage monitor vetoed operation");
            false
        }
        Err(err) => {
            warn!(source = %event.source(), phase = ?event.phase(), error = %err, "Usage monitor failed");
            false
        }
    };
    CheckedEmission { event, proceed }
}

/// Builds a start event stamped with the current time and queues it on
/// `dispatcher` without waiting.
///
/// Any `started_at` on `base` is replaced. Outside a Tokio runtime the event is
/// still returned, but the monitor never sees it: it is dropped with a `warn!`.
pub fn emit_start(dispatcher: &UsageDispatcher, base: UsageEventBase) -> UsageEvent {
    let event = stamp_start(base);
    debug!(source = %event.source(), "Emitting usage start");
    dispatcher.dispatch(event.clone());
    event
}

/// Builds an end event stamped with the current time and queues it on
/// `dispatcher` without waiting.
///
/// `started_at` resolves to `started_override`, falling back to
/// `base.started_at`. Outside a Tokio runtime the event is still returned, but
/// the monitor never sees it: it is dropped with a `warn!`.
pub fn emit_end(
    dispatcher: &UsageDispatcher,
    base: UsageEventBase,
    usage: Option<TokenUsage>,
    started_override: Option<Timestamp>,
) -> UsageEvent {
    let event = stamp_end(base, usage, started_override);
    debug!(source = %event.source(), "Emitting usage end");
    dispatcher.dispatch(event.clone());
    event
}

/// Like [`emit_start`], but awaits the monitor and reports its verdict.
pub async fn emit_start_checked(monitor: &dyn UsageMonitor, base: UsageEventBase) -> CheckedEmission {
    dispatch_checked(monitor, stamp_start(base)).await
}

/// Like [`emit_end`], but awaits the monitor and reports its verdict.
pub async fn emit_end_checked(
    monitor: &dyn UsageMonitor,
    base: UsageEventBase,
    usage: Option<TokenUsage>,
    started_override: Option<Timestamp>,
) -> CheckedEmission {
    dispatch_checked(monitor, stamp_end(base, usage, started_override)).await
}

/// Runs `call` between a checked start and a checked end event.
///
/// Returns `Ok(None)` without invoking `call` if the start event is vetoed.
/// Otherwise the end event is emitted whether `call` succeeds or fails, with
/// its `started_at` equal to the start event's; `usage_of` extracts token
/// usage from a successful output. The operation's own error is returned
/// untouched.
pub async fn run_guarded<T, E, F, Fut, U>(
    monitor: &dyn UsageMonitor,
    base: UsageEventBase,
    call: F,
    usage_of: U,
) -> Result<Option<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    U: FnOnce(&T) -> Option<TokenUsage>,
{
    let start = emit_start_checked(monitor, base.clone()).await;
    if !start.proceed {
        return Ok(None);
    }

    let outcome = call().await;
    let usage = outcome.as_ref().ok().and_then(usage_of);
    emit_end_checked(monitor, base, usage, start.event.started_at()).await;

    outcome.map(Some)
}
