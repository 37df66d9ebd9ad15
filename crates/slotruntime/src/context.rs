use serde_json::{Map, Value};
use slotcore::{ExecutionContext, Section, Topic};

/// Request-metadata key whose nested entries override everything else in
/// the built context.
pub const CONTEXT_OVERRIDE_KEY: &str = "context";

/// Merges derived defaults, caller metadata and the nested context override
/// into the flat map handed to actions. Pure; no I/O.
///
/// Precedence, highest first: entries of `metadata["context"]`, remaining
/// top-level metadata keys, derived defaults.
pub fn build_context(
    topic: &Topic,
    section: &Section,
    request_metadata: &Map<String, Value>,
) -> ExecutionContext {
    let mut ctx = ExecutionContext::new();

    ctx.insert("topic_title", Value::String(topic.title.clone()));
    ctx.insert("topic_id", Value::String(topic.id.to_string()));
    ctx.insert("topic_slug", Value::String(topic.slug.clone()));
    ctx.insert("section_id", Value::from(section.id));
    ctx.insert("language", Value::String(section.language.clone()));
    if section.has_content() {
        ctx.insert("current_content", section.content.clone());
    }

    for (key, value) in request_metadata {
        if key == CONTEXT_OVERRIDE_KEY {
            continue;
        }
        ctx.insert(key.clone(), value.clone());
    }

    if let Some(Value::Object(overrides)) = request_metadata.get(CONTEXT_OVERRIDE_KEY) {
        for (key, value) in overrides {
            ctx.insert(key.clone(), value.clone());
        }
    }

    ctx
}
