use std::sync::Arc;

use serde_json::{json, Map, Value};
use slotcore::{ExecutionLogEntry, Result, Section, Topic, Widget, WidgetAction};

use crate::backend::{BackendRequest, GenerativeBackend};
use crate::context::build_context;
use crate::prompt::PromptRenderer;

/// Wraps a tool identifier in the descriptor shape the backend expects.
pub fn tool_descriptor(name: &str) -> Value {
    json!({ "type": name })
}

/// Everything one execution attempt needs, resolved up front by the caller.
pub struct ExecutionRequest<'a> {
    pub topic: &'a Topic,
    pub section: &'a Section,
    pub widget: Arc<dyn Widget>,
    pub action: Arc<dyn WidgetAction>,
    pub metadata: &'a Map<String, Value>,
    pub extra_instructions: Option<&'a str>,
    pub model_override: Option<&'a str>,
    pub tools_override: Option<Vec<String>>,
}

/// All intermediates of a successful attempt. The caller decides what to
/// persist; the pipeline itself writes nothing.
pub struct ExecutionResult {
    pub content: Value,
    pub metadata: Map<String, Value>,
    pub prompt: String,
    pub model: String,
    pub tools: Vec<Value>,
    pub raw: Value,
    pub parsed: Value,
    pub log_entry: ExecutionLogEntry,
}

/// Runs one attempt end to end: context, prompt, backend (or local
/// transformation), postprocess. Side-effect free; errors propagate whole.
pub struct ExecutionPipeline {
    backend: Arc<dyn GenerativeBackend>,
    renderer: PromptRenderer,
    default_model: String,
}

impl ExecutionPipeline {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        renderer: PromptRenderer,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            renderer,
            default_model: default_model.into(),
        }
    }

    pub async fn execute(&self, request: ExecutionRequest<'_>) -> Result<ExecutionResult> {
        let context = build_context(request.topic, request.section, request.metadata);
        let prompt = self
            .renderer
            .render(request.action.as_ref(), &context, request.extra_instructions);

        let model = request
            .model_override
            .map(|m| m.to_string())
            .or_else(|| {
                request
                    .metadata
                    .get("model")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| self.default_model.clone());

        let tool_names = match request.tools_override {
            Some(names) => names,
            None => {
                let own = request.action.tools();
                if own.is_empty() {
                    request.widget.default_tools()
                } else {
                    own
                }
            }
        };
        let tools: Vec<Value> = tool_names.iter().map(|name| tool_descriptor(name)).collect();

        let schema = request.action.schema().or_else(|| request.widget.schema());

        tracing::debug!(
            "Executing action '{}' on section {} with model {}",
            request.action.name(),
            request.section.id,
            model
        );

        let (raw, parsed) = if request.action.is_local() {
            let value = request.action.run_local(&context)?;
            (value.clone(), value)
        } else {
            let backend_request = BackendRequest {
                prompt: prompt.clone(),
                model: model.clone(),
                tools: tools.clone(),
                schema,
            };
            let response = self.backend.generate(&backend_request).await?;
            (response.raw, response.parsed)
        };

        let content = request.action.postprocess(&context, parsed.clone());

        let mut metadata = request.metadata.clone();
        metadata.insert("model".to_string(), Value::String(model.clone()));
        metadata.insert("tools".to_string(), Value::Array(tools.clone()));

        let log_entry = ExecutionLogEntry::success(
            prompt.clone(),
            model.clone(),
            tools.clone(),
            raw.clone(),
            parsed.clone(),
        );

        Ok(ExecutionResult {
            content,
            metadata,
            prompt,
            model,
            tools,
            raw,
            parsed,
            log_entry,
        })
    }
}
