//! Shared fixtures: an in-memory evaluator and a scripted scraping provider.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use agent::{
    AiAgentConversationState, AiError, AiEvaluator, AiModel, AiModelExt, AiProvider, AiResult,
    AnalysisResult, AnalyzeOutput, CancellationToken, ContinuePromptParams, ConversationObserver,
    FunctionCallOutcome, ModelMessage, OpaqueMessage, PromptParams, ProviderCore, TokenUsage,
    UsageSource,
};
use async_trait::async_trait;
use pipeline::{GenericNode, NodeId, NodeType, Pipeline};
use serde_json::{json, Value};

pub const PAGE_URL: &str = "https://shop.example/catalog";

/// Installs a test-writer subscriber once per process. `RUST_LOG` controls verbosity.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Caller context handed to every evaluated function.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub tenant: String,
}

impl Workspace {
    pub fn new(tenant: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
        }
    }
}

/// Runs functions in-process and counts every supervised evaluation.
#[derive(Default)]
pub struct InMemoryEvaluator {
    evaluations: AtomicUsize,
    invoked: Mutex<Vec<String>>,
}

impl InMemoryEvaluator {
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AiEvaluator for InMemoryEvaluator {
    type Context = Workspace;

    async fn evaluate<F, Fut, T>(&self, context: Self::Context, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(Self::Context) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        f(context).await
    }

    async fn invoke_function(
        &self,
        context: Workspace,
        name: &str,
        params: Value,
        _cancellation: Option<CancellationToken>,
    ) -> anyhow::Result<Value> {
        self.invoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        match name {
            "fetch_page" => Ok(json!({
                "tenant": context.tenant,
                "url": params["url"],
                "html": "<ul><li class=\"price\">9.99</li></ul>",
            })),
            other => anyhow::bail!("unknown function {other}"),
        }
    }
}

/// A model that always answers with the same selector analysis.
pub struct ScriptedModel {
    name: String,
}

#[async_trait]
impl<M> AiModel<M> for ScriptedModel
where
    M: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn prompt(&self, _context: &M, messages: &[ModelMessage]) -> Result<AiResult<String>, AiError> {
        let reply = format!("{} messages received", messages.len());
        Ok(AiResult::completed(reply, Vec::new()).with_usage(TokenUsage::new(4, 2)))
    }

    async fn prompt_with_schema(
        &self,
        _context: &M,
        _messages: &[ModelMessage],
        _schema: &Value,
    ) -> Result<AiResult<Value>, AiError> {
        let output = json!({
            "selectors": [
                { "selector": "li.price", "url": PAGE_URL, "description": "item price", "validity": "tested-valid" },
                { "selector": "span.sku", "url": PAGE_URL, "description": "item sku", "validity": "guess" }
            ],
            "metadata": ["single catalog page"]
        });
        Ok(
            AiResult::completed(output, vec![json!({ "role": "assistant", "content": "analysed" })])
                .with_usage(TokenUsage::new(10, 5)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub model: String,
}

/// Analyses on `prompt`, generates on `continue_prompt`.
///
/// The analysis is carried between the two calls in the conversation state.
pub struct ScraperProvider {
    core: ProviderCore<ScraperConfig, Workspace>,
}

impl ScraperProvider {
    pub fn new(core: ProviderCore<ScraperConfig, Workspace>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl AiProvider for ScraperProvider {
    type Config = ScraperConfig;
    type Context = Workspace;

    fn core(&self) -> &ProviderCore<ScraperConfig, Workspace> {
        &self.core
    }

    fn create_model<M>(&self, model: &str, _context: &M) -> Box<dyn AiModel<M>>
    where
        M: Send + Sync + 'static,
    {
        Box::new(ScriptedModel {
            name: model.to_string(),
        })
    }

    async fn prompt(
        &self,
        context: &Workspace,
        params: PromptParams,
    ) -> Result<AiAgentConversationState, AiError> {
        agent::ensure_not_cancelled(params.cancellation.as_ref())?;

        let mut conversation = AiAgentConversationState::new(Value::Null);
        conversation.apply_control_requests(&params.control_requests)?;
        if conversation.is_paused {
            conversation.status = Some("paused".into());
            params.observer().on_status_update("paused");
            return Ok(conversation);
        }

        let analysis = self
            .analyze(
                context,
                &params.prompt,
                &params.previous_pipeline,
                Some(params.observer()),
                params.cancellation.as_ref(),
            )
            .await?;
        conversation.messages.extend(analysis.messages);

        let status = match analysis.result {
            Some(analysis) => {
                conversation.state = json!({ "analysis": analysis });
                "analyzed"
            }
            None => "skipped",
        };
        conversation.status = Some(status.into());
        params.observer().on_status_update(status);
        Ok(conversation)
    }

    async fn continue_prompt(
        &self,
        context: &Workspace,
        params: ContinuePromptParams,
    ) -> Result<AiAgentConversationState, AiError> {
        let mut conversation = params.state.clone();
        conversation.prepare_continuation(&params.control_requests)?;
        agent::ensure_not_cancelled(params.cancellation.as_ref())?;

        let analysis: AnalysisResult = serde_json::from_value(conversation.state["analysis"].clone())?;
        let generated = self
            .generate(
                context,
                &analysis,
                &params.previous_pipeline,
                Some(params.observer()),
                params.cancellation.as_ref(),
            )
            .await?;
        conversation.messages.extend(generated.messages);
        if let Some(pipeline) = generated.result {
            conversation.state["pipeline"] = serde_json::to_value(&pipeline)?;
        }
        conversation.status = Some("generated".into());
        conversation.mark_complete();
        Ok(conversation)
    }

    async fn analyze(
        &self,
        context: &Workspace,
        user_prompt: &str,
        previous_pipeline: &Pipeline,
        on_messages: Option<&dyn ConversationObserver>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<AiResult<AnalysisResult>, AiError> {
        let model_name = self.config().model.clone();
        self.core()
            .run_tracked(UsageSource::PipelineAnalyze, Some(&model_name), cancellation, || async {
                let page = match self
                    .call_function_with_telemetry(context, "fetch_page", json!({ "url": PAGE_URL }), cancellation)
                    .await?
                {
                    FunctionCallOutcome::Performed(page) => page,
                    FunctionCallOutcome::Vetoed => return Ok(AiResult::empty()),
                };

                let model = self
                    .core()
                    .monitored_model(self.create_model(&model_name, context));
                let messages = [
                    ModelMessage::system(format!(
                        "Existing pipeline has {} nodes. Page: {}",
                        previous_pipeline.len(),
                        page["html"]
                    )),
                    ModelMessage::user(user_prompt),
                ];
                let output = model
                    .prompt_typed::<AnalyzeOutput>(context, &messages, &json!({ "type": "object" }))
                    .await?;

                if let Some(observer) = on_messages {
                    observer.on_messages(&output.messages);
                }
                Ok::<_, AiError>(output.map(|analysis| AnalysisResult::new(analysis, user_prompt)))
            })
            .await
    }

    async fn generate(
        &self,
        _context: &Workspace,
        analysis: &AnalysisResult,
        previous_pipeline: &Pipeline,
        on_messages: Option<&dyn ConversationObserver>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<AiResult<Pipeline>, AiError> {
        let model_name = self.config().model.clone();
        self.core()
            .run_tracked(UsageSource::PipelineGenerate, Some(&model_name), cancellation, || async {
                let mut pipeline = previous_pipeline.clone();
                let fetch = NodeId::new("fetch").ok_or_else(|| AiError::backend("empty node id"))?;
                let fetch_type = NodeType::new("fetch").ok_or_else(|| AiError::backend("empty node type"))?;
                pipeline.insert(
                    GenericNode::new(fetch.clone(), fetch_type).with_config(json!({ "url": PAGE_URL })),
                );

                for (index, record) in analysis.analysis().valid_selectors().enumerate() {
                    let id = NodeId::new(format!("extract-{index}"))
                        .ok_or_else(|| AiError::backend("empty node id"))?;
                    let node_type =
                        NodeType::new("extract").ok_or_else(|| AiError::backend("empty node type"))?;
                    pipeline.insert(
                        GenericNode::new(id, node_type)
                            .with_config(json!({ "selector": record.selector }))
                            .with_input(fetch.clone()),
                    );
                }

                let messages: Vec<OpaqueMessage> =
                    vec![json!({ "role": "assistant", "content": "generated" })];
                if let Some(observer) = on_messages {
                    observer.on_pipeline_update(&pipeline);
                    observer.on_messages(&messages);
                }
                Ok::<_, AiError>(AiResult::completed(pipeline, messages).with_usage(TokenUsage::new(3, 3)))
            })
            .await
    }
}

/// Records every observer notification.
#[derive(Default)]
pub struct RecordingObserver {
    pub pipelines: Mutex<Vec<Pipeline>>,
    pub statuses: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<OpaqueMessage>>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pipelines(&self) -> Vec<Pipeline> {
        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ConversationObserver for RecordingObserver {
    fn on_pipeline_update(&self, pipeline: &Pipeline) {
        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pipeline.clone());
    }

    fn on_status_update(&self, status: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status.to_string());
    }

    fn on_messages(&self, messages: &[OpaqueMessage]) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(messages.iter().cloned());
    }
}

/// A one-node pipeline the caller already holds.
pub fn existing_pipeline() -> Pipeline {
    let id = NodeId::new("seed").unwrap();
    let node_type = NodeType::new("fetch").unwrap();
    [GenericNode::new(id, node_type).with_config(json!({ "url": "https://shop.example" }))]
        .into_iter()
        .collect()
}

pub fn config() -> ScraperConfig {
    ScraperConfig {
        model: "gpt-4o".into(),
    }
}

pub fn evaluator() -> Arc<InMemoryEvaluator> {
    Arc::new(InMemoryEvaluator::default())
}
