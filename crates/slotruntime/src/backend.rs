use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use slotcore::ExecutionError;
use std::time::Duration;

use crate::schema::validate_against_schema;

/// A single request to the generative text service.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub prompt: String,
    pub model: String,
    pub tools: Vec<Value>,
    pub schema: Option<Value>,
}

/// What the service produced: the raw provider payload plus the parsed
/// content (schema-validated JSON when a schema was attached, otherwise
/// the first text choice as a JSON string).
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub raw: Value,
    pub parsed: Value,
}

/// Abstraction over the generative text service.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, ExecutionError>;
}

/// Connection settings for the HTTP backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// Talks to an OpenAI-compatible chat completions endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExecutionError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn build_headers(&self) -> Result<HeaderMap, ExecutionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| ExecutionError::Backend(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn build_payload(&self, request: &BackendRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": [
                { "role": "user", "content": request.prompt }
            ]
        });

        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(request.tools.clone());
        }

        if let Some(schema) = &request.schema {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "section_content",
                    "schema": schema,
                    "strict": true
                }
            });
        }

        payload
    }

    fn extract_content(raw: &Value) -> Result<String, ExecutionError> {
        raw.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ExecutionError::Backend("Response contains no message content".to_string())
            })
    }
}

#[async_trait]
impl GenerativeBackend for HttpBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, ExecutionError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let headers = self.build_headers()?;
        let payload = self.build_payload(request);

        tracing::debug!("Calling generative backend: model={}", request.model);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExecutionError::Backend(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Backend(format!(
                "Backend returned status {}: {}",
                status, body
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::Backend(format!("Invalid response body: {}", e)))?;

        let content = Self::extract_content(&raw)?;

        let parsed = if let Some(schema) = &request.schema {
            let value: Value = serde_json::from_str(&content).map_err(|e| {
                ExecutionError::ResponseValidation(format!(
                    "Structured response is not valid JSON: {}",
                    e
                ))
            })?;
            validate_against_schema(&value, schema)?;
            value
        } else {
            Value::String(content)
        };

        Ok(BackendResponse { raw, parsed })
    }
}

/// Offline backend used when no API key is configured and in tests. It
/// either replays a canned value or echoes the prompt back as text.
pub struct StaticBackend {
    canned: Option<Value>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self { canned: None }
    }

    pub fn with_response(canned: Value) -> Self {
        Self {
            canned: Some(canned),
        }
    }
}

impl Default for StaticBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeBackend for StaticBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, ExecutionError> {
        let raw = json!({
            "backend": "static",
            "model": request.model,
            "prompt": request.prompt,
        });

        let parsed = match (&self.canned, &request.schema) {
            (Some(value), Some(schema)) => {
                validate_against_schema(value, schema)?;
                value.clone()
            }
            (Some(value), None) => value.clone(),
            (None, Some(_)) => {
                return Err(ExecutionError::Backend(
                    "static backend has no canned response for a structured request".to_string(),
                ))
            }
            (None, None) => Value::String(format!("[static] {}", request.prompt)),
        };

        Ok(BackendResponse { raw, parsed })
    }
}
