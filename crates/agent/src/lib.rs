//! Contracts for driving pipeline generation from an AI backend.
//!
//! Given a natural-language prompt and an existing [`pipeline::Pipeline`], a
//! provider produces an analysis and, from that analysis, a new or updated
//! pipeline. This crate defines the shapes and behaviors concrete backends
//! must honor; it ships no vendor integration and executes no pipelines.
//!
//! ## Architectural Layer
//!
//! **Port definitions + usage telemetry.** Backends implement [`AiModel`],
//! [`AiProvider`], and [`AiEvaluator`]. The only behavior defined here is the
//! usage-telemetry protocol ([`usage`]), the telemetry-wrapped function call
//! ([`ProviderCore::call_function_with_telemetry`]), and the conversation
//! state machine ([`conversation`]).
//!
//! ## Composition
//!
//! ```text
//! AiEvaluator ──create_context──► AiEvaluationContext { agent, provider, monitor }
//!                                                          │
//!                       prompt / continue_prompt ◄─────────┤
//!                       analyze / generate        ◄────────┘
//!                               │
//!                               ├── MonitoredModel ── AiModel (backend)
//!                               └── call_function_with_telemetry ── evaluate ── invoke_function
//! ```
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`usage`] | `UsageEvent`, `UsageMonitor`, `UsageDispatcher`, `emit_*` helpers, `run_guarded` |
//! | [`monitors`] | Stock monitors (no-op, tracing, recording, token budget, composite) |
//! | [`model`] | `AiModel`, `MonitoredModel`, role-tagged messages |
//! | [`provider`] | `AiProvider`, `ProviderCore`, `FunctionCaller` |
//! | [`evaluator`] | `AiEvaluator`, `AiEvaluationContext` |
//! | [`conversation`] | Conversation state, control requests, observer hooks |
//! | [`analysis`] | `AiResult`, selector records, `AnalysisResult` |
//! | [`types`] | `Timestamp`, `TokenCount`, `TokenUsage` |
//! | [`identifiers`] | `ConversationId`, `UsageEventId` |
//! | [`errors`] | `AiError` |

pub mod analysis;
pub mod conversation;
pub mod errors;
pub mod evaluator;
pub mod identifiers;
pub mod model;
pub mod monitors;
pub mod provider;
pub mod types;
pub mod usage;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use analysis::{
    AiResult, AnalysisResult, AnalyzeOutput, OpaqueMessage, SelectorRecord, SelectorValidity,
};
pub use conversation::{
    AiAgentControlRequest, AiAgentConversationState, ContinuePromptParams, ConversationObserver,
    ConversationPhase, PromptParams, PAUSE_REASON_KEY,
};
pub use errors::AiError;
pub use evaluator::{AiEvaluationContext, AiEvaluator, EvaluatorFunctionCaller};
pub use identifiers::{ConversationId, UsageEventId};
pub use model::{AiModel, AiModelExt, ModelMessage, ModelRole, MonitoredModel};
pub use monitors::{
    CompositeUsageMonitor, NoopUsageMonitor, RecordingUsageMonitor, TokenBudgetMonitor,
    TracingUsageMonitor,
};
pub use provider::{
    ensure_not_cancelled, AiProvider, FunctionCallOutcome, FunctionCaller, ProviderCore,
    FUNCTION_NAME_KEY,
};
pub use types::{Timestamp, TokenCount, TokenUsage};
pub use usage::{
    emit_end, emit_end_checked, emit_start, emit_start_checked, run_guarded, CheckedEmission,
    SharedUsageMonitor, UsageDispatcher, UsageEvent, UsageEventBase, UsageMetadata, UsageMonitor,
    UsagePhase, UsageSource, Verdict,
};

// Cancellation handles are part of the public signatures.
pub use tokio_util::sync::CancellationToken;
