//! The single-call model contract and its telemetry decorator.
//!
//! [`AiModel`] is the lowest-level backend primitive: send role-tagged
//! messages, get a result. Retry and timeout policy belong to concrete
//! backends. [`MonitoredModel`] wraps any model with checked usage events so
//! providers get accounting (and budget gating) on every model call.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::usage::run_guarded;
use crate::{AiError, AiResult, SharedUsageMonitor, UsageEventBase, UsageSource};

/// Who authored a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Instructions framing the conversation.
    System,
    /// Caller-supplied content.
    User,
}

/// One role-tagged prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Message author.
    pub role: ModelRole,
    /// Message text.
    pub content: String,
}

impl ModelMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            content: content.into(),
        }
    }
}

/// A handle to one backend model, scoped to a caller context `C`.
#[async_trait]
pub trait AiModel<C>: Send + Sync
where
    C: Send + Sync,
{
    /// Backend model identifier (e.g. `"gpt-4o"`).
    fn name(&self) -> &str;

    /// Sends `messages` and returns the free-text result.
    async fn prompt(&self, context: &C, messages: &[ModelMessage]) -> Result<AiResult<String>, AiError>;

    /// Sends `messages` constrained by the JSON `schema` and returns the
    /// parsed result.
    async fn prompt_with_schema(
        &self,
        context: &C,
        messages: &[ModelMessage],
        schema: &Value,
    ) -> Result<AiResult<Value>, AiError>;
}

/// Typed convenience over [`AiModel::prompt_with_schema`].
#[async_trait]
pub trait AiModelExt<C>: AiModel<C>
where
    C: Send + Sync,
{
    /// Prompts with `schema` and deserializes the result into `T`.
    ///
    /// Fails with [`AiError::Schema`] if the result does not fit `T`.
    async fn prompt_typed<T>(
        &self,
        context: &C,
        messages: &[ModelMessage],
        schema: &Value,
    ) -> Result<AiResult<T>, AiError>
    where
        T: DeserializeOwned + Send,
    {
        let raw = self.prompt_with_schema(context, messages, schema).await?;
        let result = raw.result.map(serde_json::from_value).transpose()?;
        Ok(AiResult {
            result,
            messages: raw.messages,
            usage: raw.usage,
        })
    }
}

impl<C, M> AiModelExt<C> for M
where
    C: Send + Sync,
    M: AiModel<C> + ?Sized,
{
}

/// Wraps a model with checked usage telemetry.
///
/// Each call emits a start event (source `model.prompt` or
/// `model.promptWithSchema`, tagged with the model name) and, unless vetoed, an
/// end event carrying the result's token usage. A vetoed call returns
/// [`AiResult::empty`] without reaching the backend.
pub struct MonitoredModel<C>
where
    C: Send + Sync,
{
    inner: Box<dyn AiModel<C>>,
    monitor: SharedUsageMonitor,
}

impl<C> MonitoredModel<C>
where
    C: Send + Sync,
{
    /// Wraps `inner`, reporting to `monitor`.
    pub fn new(inner: Box<dyn AiModel<C>>, monitor: SharedUsageMonitor) -> Self {
        Self { inner, monitor }
    }

    fn base(&self, source: UsageSource) -> UsageEventBase {
        UsageEventBase::new(source).with_model(self.inner.name())
    }
}

#[async_trait]
impl<C> AiModel<C> for MonitoredModel<C>
where
    C: Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(skip_all, fields(model = %self.inner.name()))]
    async fn prompt(&self, context: &C, messages: &[ModelMessage]) -> Result<AiResult<String>, AiError> {
        let outcome = run_guarded(
            self.monitor.as_ref(),
            self.base(UsageSource::ModelPrompt),
            || self.inner.prompt(context, messages),
            |result| result.usage,
        )
        .await?;
        Ok(outcome.unwrap_or_default())
    }

    #[instrument(skip_all, fields(model = %self.inner.name()))]
    async fn prompt_with_schema(
        &self,
        context: &C,
        messages: &[ModelMessage],
        schema: &Value,
    ) -> Result<AiResult<Value>, AiError> {
        let outcome = run_guarded(
            self.monitor.as_ref(),
            self.base(UsageSource::ModelPromptWithSchema),
            || self.inner.prompt_with_schema(context, messages, schema),
            |result| result.usage,
        )
        .await?;
        Ok(outcome.unwrap_or_default())
    }
}
