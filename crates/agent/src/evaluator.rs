//! The evaluator contract and the evaluation context it builds.
//!
//! An [`AiEvaluator`] supervises functions run under AI control. It is the
//! provider's only route to side effects: [`AiEvaluator::create_context`] binds
//! the evaluator as the provider's [`FunctionCaller`], so every function a
//! provider calls is dispatched through [`AiEvaluator::evaluate`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{AiProvider, FunctionCaller, ProviderCore, SharedUsageMonitor};

/// Supervises function execution for AI providers.
///
/// Sandboxing, rate limiting, and retries are implementation choices. The
/// contract is only that `evaluate` hands `f` a valid context and returns
/// `f`'s value or error unchanged.
#[async_trait]
pub trait AiEvaluator: Send + Sync {
    /// Context handed to every evaluated function.
    type Context: Clone + Send + Sync + 'static;

    /// Runs `f` under supervision with `context` as its argument.
    async fn evaluate<F, Fut, T>(&self, context: Self::Context, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(Self::Context) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send;

    /// Executes the named function. Called from within `evaluate` when a
    /// provider requests a function call.
    async fn invoke_function(
        &self,
        context: Self::Context,
        name: &str,
        params: Value,
        cancellation: Option<CancellationToken>,
    ) -> anyhow::Result<Value>;

    /// Builds a provider bound to this evaluator.
    ///
    /// `build` receives a [`ProviderCore`] whose function-call callback routes
    /// through this evaluator's `evaluate` and `invoke_function`, and whose
    /// monitor is `monitor` (or a no-op monitor when `None`).
    fn create_context<P, B>(
        self: Arc<Self>,
        config: P::Config,
        monitor: Option<SharedUsageMonitor>,
        build: B,
    ) -> AiEvaluationContext<Self, P>
    where
        Self: Sized + 'static,
        P: AiProvider<Context = Self::Context>,
        B: FnOnce(ProviderCore<P::Config, Self::Context>) -> P,
    {
        let caller: Arc<dyn FunctionCaller<Self::Context>> = Arc::new(EvaluatorFunctionCaller {
            evaluator: Arc::clone(&self),
        });
        let provider = build(ProviderCore::new(config, caller, monitor.clone()));
        AiEvaluationContext {
            agent: self,
            provider,
            monitor,
        }
    }
}

/// Adapts an evaluator into a provider's [`FunctionCaller`].
pub struct EvaluatorFunctionCaller<E> {
    evaluator: Arc<E>,
}

impl<E> EvaluatorFunctionCaller<E> {
    /// Wraps `evaluator`.
    pub fn new(evaluator: Arc<E>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl<E> FunctionCaller<E::Context> for EvaluatorFunctionCaller<E>
where
    E: AiEvaluator,
{
    async fn call(
        &self,
        context: &E::Context,
        name: &str,
        params: Value,
        cancellation: Option<&CancellationToken>,
    ) -> anyhow::Result<Value> {
        let evaluator = &self.evaluator;
        let cancellation = cancellation.cloned();
        self.evaluator
            .evaluate(context.clone(), move |ctx| async move {
                evaluator.invoke_function(ctx, name, params, cancellation).await
            })
            .await
    }
}

/// An evaluator paired with a provider bound to it.
pub struct AiEvaluationContext<E, P> {
    /// The supervising evaluator.
    pub agent: Arc<E>,
    /// The provider whose function calls route through `agent`.
    pub provider: P,
    /// The monitor the provider was built with, if one was supplied.
    pub monitor: Option<SharedUsageMonitor>,
}
