use std::sync::Arc;

use serde_json::{json, Value};
use slotcore::{ExecutionContext, Widget, WidgetAction};

use crate::text_content;

/// Prose widget: one block of body text per section.
pub struct ParagraphWidget;

impl Widget for ParagraphWidget {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn icon(&self) -> Option<&str> {
        Some("text")
    }

    fn template(&self) -> Option<&str> {
        Some("paragraph")
    }

    fn actions(&self) -> Vec<Arc<dyn WidgetAction>> {
        vec![
            Arc::new(GenerateAction),
            Arc::new(SummarizeAction),
            Arc::new(ExpandAction),
        ]
    }
}

/// Writes a fresh paragraph from the topic context.
pub struct GenerateAction;

impl WidgetAction for GenerateAction {
    fn name(&self) -> &str {
        "generate"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        format!(
            "Write a single well-structured paragraph about {}. \
             Stay factual and avoid filler phrases.",
            ctx.get_text_or("topic_title", "the given topic")
        )
    }

    fn postprocess(&self, _ctx: &ExecutionContext, parsed: Value) -> Value {
        text_content(parsed)
    }
}

/// Condenses existing content; the backend must answer in a fixed shape.
pub struct SummarizeAction;

impl WidgetAction for SummarizeAction {
    fn name(&self) -> &str {
        "summarize"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        match ctx.get_text("current_content") {
            Some(current) => format!(
                "Summarize the following content in one concise paragraph:\n\n{}",
                current
            ),
            None => format!(
                "Summarize what is known about {} in one concise paragraph.",
                ctx.get_text_or("topic_title", "the given topic")
            ),
        }
    }

    fn schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" }
            },
            "required": ["summary"],
            "additionalProperties": false
        }))
    }
}

/// Grows the current paragraph while keeping its voice.
pub struct ExpandAction;

impl WidgetAction for ExpandAction {
    fn name(&self) -> &str {
        "expand"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        match ctx.get_text("current_content") {
            Some(current) => format!(
                "Expand the following paragraph with more detail and at least \
                 one concrete example, keeping its tone:\n\n{}",
                current
            ),
            None => format!(
                "Write a detailed paragraph about {} with at least one \
                 concrete example.",
                ctx.get_text_or("topic_title", "the given topic")
            ),
        }
    }

    fn postprocess(&self, _ctx: &ExecutionContext, parsed: Value) -> Value {
        text_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn context_with(entries: &[(&str, Value)]) -> ExecutionContext {
        let mut map = Map::new();
        for (key, value) in entries {
            map.insert(key.to_string(), value.clone());
        }
        ExecutionContext::from_map(map)
    }

    #[test]
    fn test_generate_prompt_names_the_topic() {
        let ctx = context_with(&[("topic_title", json!("Rust in Production"))]);
        let prompt = GenerateAction.build_prompt(&ctx);
        assert!(prompt.contains("Rust in Production"));
    }

    #[test]
    fn test_summarize_prefers_current_content() {
        let ctx = context_with(&[
            ("topic_title", json!("Rust in Production")),
            ("current_content", json!("Rust powers our ingest path.")),
        ]);
        let prompt = SummarizeAction.build_prompt(&ctx);
        assert!(prompt.contains("Rust powers our ingest path."));
        assert!(prompt.starts_with("Summarize the following content"));

        let bare = context_with(&[("topic_title", json!("Rust in Production"))]);
        let prompt = SummarizeAction.build_prompt(&bare);
        assert!(prompt.contains("Rust in Production"));
    }

    #[test]
    fn test_summarize_schema_is_strict() {
        let schema = SummarizeAction.schema().unwrap();
        assert_eq!(schema["required"], json!(["summary"]));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_free_text_actions_wrap_strings() {
        let ctx = ExecutionContext::new();
        assert_eq!(
            GenerateAction.postprocess(&ctx, json!("body text")),
            json!({"text": "body text"})
        );
        assert_eq!(
            ExpandAction.postprocess(&ctx, json!({"text": "kept"})),
            json!({"text": "kept"})
        );
    }

    #[test]
    fn test_widget_lists_three_actions() {
        let names: Vec<String> = ParagraphWidget
            .actions()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["generate", "summarize", "expand"]);
    }
}
