use serde_json::{Map, Value};

/// Flat key/value view handed to actions for prompt building, local
/// transformations and post-processing.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self { values: Map::new() }
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value rendered for prompt interpolation: strings verbatim, anything
    /// else as compact JSON.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn get_text_or(&self, key: &str, default: &str) -> String {
        self.get_text(key).unwrap_or_else(|| default.to_string())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}
