//! The provider contract: conversation-driven pipeline generation over a
//! model backend, with telemetry around every function call.
//!
//! Concrete providers implement [`AiProvider`] and hold a [`ProviderCore`], the
//! constructor-injected record of configuration, function-call callback, and
//! usage monitor. The core supplies the telemetry-wrapped function invocation
//! every provider shares.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::Pipeline;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::model::{AiModel, MonitoredModel};
use crate::monitors::NoopUsageMonitor;
use crate::usage::run_guarded;
use crate::{
    AiAgentConversationState, AiError, AiResult, AnalysisResult, ContinuePromptParams,
    ConversationObserver, PromptParams, SharedUsageMonitor, UsageDispatcher, UsageEventBase,
    UsageEventId, UsageSource,
};

/// Metadata key carrying the invoked function's name on `function.call` events.
pub const FUNCTION_NAME_KEY: &str = "functionName";

/// The callback a provider uses to run a named function on the backend's
/// behalf. Bound by [`crate::AiEvaluator::create_context`] to the evaluator.
#[async_trait]
pub trait FunctionCaller<C>: Send + Sync
where
    C: Send + Sync,
{
    /// Runs function `name` with `params`.
    ///
    /// Errors are returned to the provider unchanged.
    async fn call(
        &self,
        context: &C,
        name: &str,
        params: Value,
        cancellation: Option<&CancellationToken>,
    ) -> anyhow::Result<Value>;
}

/// What happened to a telemetry-wrapped function call.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCallOutcome {
    /// The function ran and returned this value.
    Performed(Value),
    /// The usage monitor refused the call; the function was not invoked.
    Vetoed,
}

impl FunctionCallOutcome {
    /// Returns `true` if the monitor refused the call.
    pub fn is_vetoed(&self) -> bool {
        matches!(self, Self::Vetoed)
    }

    /// The function's value, or `None` if vetoed.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Performed(value) => Some(value),
            Self::Vetoed => None,
        }
    }
}

/// Fails with [`AiError::Cancelled`] if `token` has been triggered.
pub fn ensure_not_cancelled(token: Option<&CancellationToken>) -> Result<(), AiError> {
    match token {
        Some(token) if token.is_cancelled() => Err(AiError::Cancelled),
        _ => Ok(()),
    }
}

/// Configuration, function-call callback, and usage monitor shared by every
/// call on one provider instance.
///
/// All three are read-only after construction.
pub struct ProviderCore<Cfg, C>
where
    C: Send + Sync,
{
    config: Cfg,
    function_caller: Arc<dyn FunctionCaller<C>>,
    dispatcher: UsageDispatcher,
}

impl<Cfg, C> ProviderCore<Cfg, C>
where
    Cfg: Send + Sync,
    C: Send + Sync,
{
    /// Creates a core. Without a monitor, usage events go to a
    /// [`NoopUsageMonitor`].
    pub fn new(
        config: Cfg,
        function_caller: Arc<dyn FunctionCaller<C>>,
        monitor: Option<SharedUsageMonitor>,
    ) -> Self {
        Self {
            config,
            function_caller,
            dispatcher: UsageDispatcher::new(monitor.unwrap_or_else(|| Arc::new(NoopUsageMonitor))),
        }
    }

    /// The bound configuration.
    pub fn config(&self) -> &Cfg {
        &self.config
    }

    /// The usage monitor.
    pub fn monitor(&self) -> &SharedUsageMonitor {
        self.dispatcher.monitor()
    }

    /// Ordered unchecked delivery to the monitor, for [`crate::emit_start`] and
    /// [`crate::emit_end`].
    pub fn dispatcher(&self) -> &UsageDispatcher {
        &self.dispatcher
    }

    /// Wraps `model` so its calls report to this core's monitor.
    pub fn monitored_model<M>(&self, model: Box<dyn AiModel<M>>) -> MonitoredModel<M>
    where
        M: Send + Sync,
    {
        MonitoredModel::new(model, Arc::clone(self.monitor()))
    }

    /// Invokes function `name` between checked `function.call` usage events.
    ///
    /// 1. A start event (fresh correlation id, function name in metadata) is
    ///    delivered to the monitor. On veto, returns
    ///    [`FunctionCallOutcome::Vetoed`] without invoking the function.
    /// 2. The bound callback runs, racing `cancellation` if given. A triggered
    ///    token fails the call with [`AiError::Cancelled`].
    /// 3. An end event correlated by the start timestamp is delivered whether
    ///    the call succeeded or failed.
    ///
    /// A failing callback's error is returned as-is. Monitor failures never
    /// surface here.
    #[instrument(skip_all, fields(function = name))]
    pub async fn call_function_with_telemetry(
        &self,
        context: &C,
        name: &str,
        params: Value,
        cancellation: Option<&CancellationToken>,
    ) -> anyhow::Result<FunctionCallOutcome> {
        let base = UsageEventBase::new(UsageSource::FunctionCall)
            .with_id(UsageEventId::new_random())
            .with_metadata(FUNCTION_NAME_KEY, name);

        let outcome = run_guarded(
            self.monitor().as_ref(),
            base,
            || self.invoke(context, name, params, cancellation),
            |_| None,
        )
        .await?;

        Ok(match outcome {
            Some(value) => FunctionCallOutcome::Performed(value),
            None => {
                info!(function = name, "Function call vetoed by usage monitor");
                FunctionCallOutcome::Vetoed
            }
        })
    }

    /// Runs a pipeline-level step (`pipeline.analyze`, `pipeline.generate`)
    /// between checked usage events.
    ///
    /// A vetoed step yields [`AiResult::empty`]. If `cancellation` fires first
    /// the step is dropped and [`AiError::Cancelled`] is returned after the end
    /// event.
    pub async fn run_tracked<T, F, Fut>(
        &self,
        source: UsageSource,
        model: Option<&str>,
        cancellation: Option<&CancellationToken>,
        step: F,
    ) -> Result<AiResult<T>, AiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AiResult<T>, AiError>>,
    {
        let mut base = UsageEventBase::new(source);
        if let Some(model) = model {
            base = base.with_model(model);
        }

        let outcome = run_guarded(
            self.monitor().as_ref(),
            base,
            || async move {
                match cancellation {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(AiError::Cancelled),
                        result = step() => result,
                    },
                    None => step().await,
                }
            },
            |result| result.usage,
        )
        .await?;
        Ok(outcome.unwrap_or_default())
    }

    async fn invoke(
        &self,
        context: &C,
        name: &str,
        params: Value,
        cancellation: Option<&CancellationToken>,
    ) -> anyhow::Result<Value> {
        let call = self.function_caller.call(context, name, params, cancellation);
        match cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(AiError::Cancelled.into()),
                result = call => result,
            },
            None => call.await,
        }
    }
}

/// A backend that turns prompts into pipelines.
///
/// Two contracts coexist and both are required:
///
/// - **Conversational**: [`prompt`](Self::prompt) starts a conversation and
///   [`continue_prompt`](Self::continue_prompt) resumes it. The provider holds
///   no conversation state; it lives in the returned
///   [`AiAgentConversationState`]. Control requests in the params must be
///   applied in order; `continue_prompt` implementations should start with
///   [`AiAgentConversationState::prepare_continuation`].
/// - **Two-step**: [`analyze`](Self::analyze) then [`generate`](Self::generate).
///
/// Function calls made while serving either contract go through
/// [`call_function_with_telemetry`](Self::call_function_with_telemetry).
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Backend configuration (credentials, model names, limits).
    type Config: Send + Sync;

    /// Caller context threaded through every call and handed to functions.
    type Context: Send + Sync;

    /// The shared configuration / callback / monitor record.
    fn core(&self) -> &ProviderCore<Self::Config, Self::Context>;

    /// The bound configuration.
    fn config(&self) -> &Self::Config {
        self.core().config()
    }

    /// The usage monitor.
    fn monitor(&self) -> &SharedUsageMonitor {
        self.core().monitor()
    }

    /// Creates a handle to backend model `model`, scoped to `context`.
    fn create_model<M>(&self, model: &str, context: &M) -> Box<dyn AiModel<M>>
    where
        M: Send + Sync + 'static;

    /// Starts a conversation for `params.prompt` against
    /// `params.previous_pipeline`.
    async fn prompt(
        &self,
        context: &Self::Context,
        params: PromptParams,
    ) -> Result<AiAgentConversationState, AiError>;

    /// Resumes a conversation previously returned by `prompt` or
    /// `continue_prompt`.
    ///
    /// Fails with [`AiError::ConversationComplete`] on a complete conversation.
    async fn continue_prompt(
        &self,
        context: &Self::Context,
        params: ContinuePromptParams,
    ) -> Result<AiAgentConversationState, AiError>;

    /// Analyses `user_prompt` against `previous_pipeline` without modifying it.
    ///
    /// A triggered `cancellation` fails the call with [`AiError::Cancelled`].
    async fn analyze(
        &self,
        context: &Self::Context,
        user_prompt: &str,
        previous_pipeline: &Pipeline,
        on_messages: Option<&dyn ConversationObserver>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<AiResult<AnalysisResult>, AiError>;

    /// Produces a new or updated pipeline from `analysis`.
    ///
    /// A triggered `cancellation` fails the call with [`AiError::Cancelled`].
    async fn generate(
        &self,
        context: &Self::Context,
        analysis: &AnalysisResult,
        previous_pipeline: &Pipeline,
        on_messages: Option<&dyn ConversationObserver>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<AiResult<Pipeline>, AiError>;

    /// See [`ProviderCore::call_function_with_telemetry`].
    async fn call_function_with_telemetry(
        &self,
        context: &Self::Context,
        name: &str,
        params: Value,
        cancellation: Option<&CancellationToken>,
    ) -> anyhow::Result<FunctionCallOutcome> {
        self.core()
            .call_function_with_telemetry(context, name, params, cancellation)
            .await
    }
}
