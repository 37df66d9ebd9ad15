//! Built-in widgets: the capabilities a stock deployment registers at start.

use std::sync::Arc;

use serde_json::Value;
use slotruntime::WidgetRegistry;

pub mod faq;
pub mod notes;
pub mod paragraph;

pub use faq::FaqWidget;
pub use notes::NotesWidget;
pub use paragraph::ParagraphWidget;

/// Registers every built-in widget.
pub fn register_all(registry: &mut WidgetRegistry) {
    registry.register(Arc::new(ParagraphWidget));
    registry.register(Arc::new(FaqWidget));
    registry.register(Arc::new(NotesWidget));
}

/// Free-text payloads land as `{"text": ...}`; mappings pass through.
pub(crate) fn text_content(parsed: Value) -> Value {
    match parsed {
        Value::Object(_) => parsed,
        Value::String(text) => serde_json::json!({ "text": text }),
        other => serde_json::json!({ "text": other.to_string() }),
    }
}
