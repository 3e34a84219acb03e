//! Stock [`UsageMonitor`] implementations.
//!
//! | Monitor | Verdict | Purpose |
//! |---------|---------|---------|
//! | [`NoopUsageMonitor`] | always proceed | Default when a provider is built without a monitor |
//! | [`TracingUsageMonitor`] | always proceed | Structured logging of every event |
//! | [`RecordingUsageMonitor`] | always proceed | In-memory event log for auditing and tests |
//! | [`TokenBudgetMonitor`] | veto when exhausted | Admission gate on accumulated token usage |
//! | [`CompositeUsageMonitor`] | veto if any child vetoes | Fan-out to several monitors |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{SharedUsageMonitor, TokenCount, UsageEvent, UsageMonitor, UsagePhase, Verdict};

/// Accepts every event and does nothing with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageMonitor;

#[async_trait]
impl UsageMonitor for NoopUsageMonitor {
    async fn on_event(&self, _event: &UsageEvent) -> anyhow::Result<Verdict> {
        Ok(Verdict::Proceed)
    }
}

// ---------------------------------------------------------------------------

/// Logs every event as a structured `tracing` event at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageMonitor;

#[async_trait]
impl UsageMonitor for TracingUsageMonitor {
    async fn on_event(&self, event: &UsageEvent) -> anyhow::Result<Verdict> {
        let base = event.base();
        let duration_ms = match (base.started_at, base.ended_at) {
            (Some(start), Some(end)) => Some(end.millis_since(start)),
            _ => None,
        };
        info!(
            phase = ?event.phase(),
            source = %base.source,
            id = base.id.as_ref().map(|id| id.as_str()),
            model = base.model.as_deref(),
            duration_ms,
            total_tokens = event.usage().map(|u| u.total().as_u64()),
            "AI usage"
        );
        Ok(Verdict::Proceed)
    }
}

// ---------------------------------------------------------------------------

/// Appends every event to an in-memory log.
#[derive(Debug, Default)]
pub struct RecordingUsageMonitor {
    events: Mutex<Vec<UsageEvent>>,
}

impl RecordingUsageMonitor {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events received so far, in delivery order.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events received so far.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no events have been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards every recorded event.
    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl UsageMonitor for RecordingUsageMonitor {
    async fn on_event(&self, event: &UsageEvent) -> anyhow::Result<Verdict> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(Verdict::Proceed)
    }
}

// ---------------------------------------------------------------------------

/// Vetoes new operations once accumulated token usage reaches a budget.
///
/// Usage is accumulated from end events via [`crate::TokenUsage::total`].
/// Start events are vetoed while `consumed >= budget`; end events always
/// proceed so in-flight operations can still be accounted for.
#[derive(Debug)]
pub struct TokenBudgetMonitor {
    budget: TokenCount,
    consumed: AtomicU64,
}

impl TokenBudgetMonitor {
    /// Creates a monitor permitting operations until `budget` tokens are consumed.
    pub fn new(budget: TokenCount) -> Self {
        Self {
            budget,
            consumed: AtomicU64::new(0),
        }
    }

    /// The configured budget.
    pub fn budget(&self) -> TokenCount {
        self.budget
    }

    /// Tokens consumed so far.
    pub fn consumed(&self) -> TokenCount {
        TokenCount::new(self.consumed.load(Ordering::SeqCst))
    }

    /// Tokens left before the budget is exhausted.
    pub fn remaining(&self) -> TokenCount {
        TokenCount::new(self.budget.as_u64().saturating_sub(self.consumed().as_u64()))
    }

    /// Returns `true` once consumption has reached the budget.
    pub fn is_exhausted(&self) -> bool {
        self.consumed() >= self.budget
    }
}

#[async_trait]
impl UsageMonitor for TokenBudgetMonitor {
    async fn on_event(&self, event: &UsageEvent) -> anyhow::Result<Verdict> {
        match event.phase() {
            UsagePhase::Start if self.is_exhausted() => {
                warn!(
                    source = %event.source(),
                    budget = %self.budget,
                    consumed = %self.consumed(),
                    "Token budget exhausted"
                );
                Ok(Verdict::Veto)
            }
            UsagePhase::Start => Ok(Verdict::Proceed),
            UsagePhase::End => {
                if let Some(usage) = event.usage() {
                    self.consumed
                        .fetch_add(usage.total().as_u64(), Ordering::SeqCst);
                }
                Ok(Verdict::Proceed)
            }
        }
    }
}

// ---------------------------------------------------------------------------

/// Forwards each event to every child monitor, in order.
///
/// Every child sees every event. The combined verdict is a veto if any child
/// vetoes; if any child fails, the first failure is returned after all
/// children have been called.
#[derive(Default)]
pub struct CompositeUsageMonitor {
    monitors: Vec<SharedUsageMonitor>,
}

impl CompositeUsageMonitor {
    /// Creates a composite over `monitors`.
    pub fn new(monitors: Vec<SharedUsageMonitor>) -> Self {
        Self { monitors }
    }

    /// Appends another child monitor.
    #[must_use]
    pub fn with(mut self, monitor: SharedUsageMonitor) -> Self {
        self.monitors.push(monitor);
        self
    }
}

#[async_trait]
impl UsageMonitor for CompositeUsageMonitor {
    async fn on_event(&self, event: &UsageEvent) -> anyhow::Result<Verdict> {
        let mut verdict = Verdict::Proceed;
        let mut first_error = None;

        for monitor in &self.monitors {
            match monitor.on_event(event).await {
                Ok(Verdict::Veto) => verdict = Verdict::Veto,
                Ok(Verdict::Proceed) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(verdict),
        }
    }
}
