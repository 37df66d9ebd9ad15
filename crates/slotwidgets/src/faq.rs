use std::sync::Arc;

use serde_json::{json, Value};
use slotcore::{ExecutionContext, Widget, WidgetAction};

/// Question-and-answer list widget. Both actions share the widget-level
/// schema and the widget's default web search tool.
pub struct FaqWidget;

impl Widget for FaqWidget {
    fn name(&self) -> &str {
        "faq"
    }

    fn icon(&self) -> Option<&str> {
        Some("question")
    }

    fn template(&self) -> Option<&str> {
        Some("faq-list")
    }

    fn actions(&self) -> Vec<Arc<dyn WidgetAction>> {
        vec![Arc::new(GenerateAction), Arc::new(ExtendAction)]
    }

    fn schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": { "type": "string" },
                            "answer": { "type": "string" }
                        },
                        "required": ["question", "answer"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }))
    }

    fn default_tools(&self) -> Vec<String> {
        vec!["web_search".to_string()]
    }
}

pub struct GenerateAction;

impl WidgetAction for GenerateAction {
    fn name(&self) -> &str {
        "generate"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        format!(
            "Write the five questions readers most often ask about {} and \
             answer each in two or three sentences.",
            ctx.get_text_or("topic_title", "the given topic")
        )
    }
}

/// Adds questions that the current list does not cover yet.
pub struct ExtendAction;

impl WidgetAction for ExtendAction {
    fn name(&self) -> &str {
        "extend"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        match ctx.get_text("current_content") {
            Some(current) => format!(
                "The FAQ below already exists. Add three new questions and \
                 answers it does not cover, and return the full updated \
                 list:\n\n{}",
                current
            ),
            None => GenerateAction.build_prompt(ctx),
        }
    }
}
