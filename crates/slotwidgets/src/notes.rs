use std::sync::Arc;

use serde_json::{json, Value};
use slotcore::{ExecutionContext, ExecutionError, Widget, WidgetAction};

use crate::text_content;

/// Free-form notes widget. `set` writes caller-supplied text without a
/// backend call; `polish` sends the current notes out for cleanup.
pub struct NotesWidget;

impl Widget for NotesWidget {
    fn name(&self) -> &str {
        "notes"
    }

    fn icon(&self) -> Option<&str> {
        Some("note")
    }

    fn actions(&self) -> Vec<Arc<dyn WidgetAction>> {
        vec![Arc::new(SetAction), Arc::new(PolishAction)]
    }
}

/// Stores the `value` context entry as the section text.
pub struct SetAction;

impl WidgetAction for SetAction {
    fn name(&self) -> &str {
        "set"
    }

    fn build_prompt(&self, _ctx: &ExecutionContext) -> String {
        String::new()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn run_local(&self, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        match ctx.get_text("value") {
            Some(value) => Ok(json!({ "text": value })),
            None => Err(ExecutionError::Local(
                "the 'value' metadata field is required to set notes".to_string(),
            )),
        }
    }
}

pub struct PolishAction;

impl WidgetAction for PolishAction {
    fn name(&self) -> &str {
        "polish"
    }

    fn build_prompt(&self, ctx: &ExecutionContext) -> String {
        match ctx.get_text("current_content") {
            Some(current) => format!(
                "Clean up the following notes: fix grammar, merge duplicates \
                 and keep the author's voice. Return only the revised \
                 notes.\n\n{}",
                current
            ),
            None => format!(
                "Draft short working notes about {}.",
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

    #[test]
    fn test_set_requires_a_value() {
        let empty = ExecutionContext::new();
        let err = SetAction.run_local(&empty).unwrap_err();
        assert!(matches!(err, ExecutionError::Local(_)));

        let mut map = Map::new();
        map.insert("value".to_string(), json!("remember the milk"));
        let ctx = ExecutionContext::from_map(map);
        assert_eq!(
            SetAction.run_local(&ctx).unwrap(),
            json!({"text": "remember the milk"})
        );
    }

    #[test]
    fn test_set_is_local() {
        assert!(SetAction.is_local());
        assert!(!PolishAction.is_local());
    }

    #[test]
    fn test_polish_quotes_current_notes() {
        let mut map = Map::new();
        map.insert("current_content".to_string(), json!({"text": "teh notes"}));
        let ctx = ExecutionContext::from_map(map);
        let prompt = PolishAction.build_prompt(&ctx);
        assert!(prompt.contains("teh notes"));
    }
}
