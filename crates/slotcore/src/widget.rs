use std::sync::Arc;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ExecutionError;

/// One operation a widget exposes (e.g. "generate", "summarize").
///
/// Actions are stateless and shared across workers; the pipeline calls them
/// once per execution attempt.
pub trait WidgetAction: Send + Sync {
    /// Action name used for resolution
    fn name(&self) -> &str;

    /// Builds the base prompt from the execution context.
    fn build_prompt(&self, ctx: &ExecutionContext) -> String;

    /// Tool identifiers this action wants enabled. Empty means the widget's
    /// default tools apply.
    fn tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Strict output schema, overriding the widget's.
    fn schema(&self) -> Option<Value> {
        None
    }

    /// Local actions transform the context synchronously and never reach the
    /// generative backend.
    fn is_local(&self) -> bool {
        false
    }

    /// Synchronous transformation for local actions; the result is used as
    /// both raw and parsed payload.
    fn run_local(&self, _ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        Err(ExecutionError::Local(format!(
            "action '{}' has no local transformation",
            self.name()
        )))
    }

    /// Shapes the parsed payload into section content. The default keeps
    /// mappings as-is and wraps anything else under "result".
    fn postprocess(&self, _ctx: &ExecutionContext, parsed: Value) -> Value {
        match parsed {
            Value::Object(_) => parsed,
            other => serde_json::json!({ "result": other }),
        }
    }
}

/// A named content-generation capability.
///
/// Widgets are registered once at process start and are immutable afterwards;
/// the registry shares them across workers behind `Arc`.
pub trait Widget: Send + Sync {
    /// Unique widget name (e.g. "paragraph")
    fn name(&self) -> &str;

    /// Icon identifier for catalog listings.
    fn icon(&self) -> Option<&str> {
        None
    }

    /// Template identifier a rendering layer may use for finished content.
    fn template(&self) -> Option<&str> {
        None
    }

    /// Ordered list of the widget's actions.
    fn actions(&self) -> Vec<Arc<dyn WidgetAction>>;

    /// Widget-level output schema applied when an action declares none.
    fn schema(&self) -> Option<Value> {
        None
    }

    /// Tool identifiers applied when an action declares none.
    fn default_tools(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Normalizes a widget/action identifier for lookup: lowercases the input
/// and collapses every run of non-alphanumeric characters into a single
/// hyphen.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_sep = false;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_sep = true;
        }
    }
    slug
}
