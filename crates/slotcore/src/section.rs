use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::topic::TopicId;

pub type SectionId = i64;

/// Phase of a section's execution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl ExecutionStatus {
    /// A terminal status holds until the next enqueue re-opens the cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Finished | ExecutionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Finished => "finished",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// Outcome of a single execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Failure,
}

/// Immutable audit record of one execution attempt, appended to the
/// section's log on success and on failure alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub status: LogStatus,
    pub created_at: DateTime<Utc>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub tools: Vec<Value>,
    pub raw_response: Option<Value>,
    pub parsed_response: Option<Value>,
    pub error_message: Option<String>,
}

impl ExecutionLogEntry {
    pub fn success(
        prompt: impl Into<String>,
        model: impl Into<String>,
        tools: Vec<Value>,
        raw_response: Value,
        parsed_response: Value,
    ) -> Self {
        Self {
            status: LogStatus::Success,
            created_at: Utc::now(),
            prompt: Some(prompt.into()),
            model: Some(model.into()),
            tools,
            raw_response: Some(raw_response),
            parsed_response: Some(parsed_response),
            error_message: None,
        }
    }

    /// Failure entries carry whatever was known when the attempt broke;
    /// usually only the error and a model name from the request metadata.
    pub fn failure(error_message: impl Into<String>, model: Option<String>) -> Self {
        Self {
            status: LogStatus::Failure,
            created_at: Utc::now(),
            prompt: None,
            model,
            tools: Vec::new(),
            raw_response: None,
            parsed_response: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Execution bookkeeping carried on a section.
///
/// The queued request (action, instructions, metadata) is stored here so the
/// worker can pick it up out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub status: ExecutionStatus,
    pub action: Option<String>,
    pub extra_instructions: Option<String>,
    pub request_metadata: Map<String, Value>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Queued,
            action: None,
            extra_instructions: None,
            request_metadata: Map::new(),
            queued_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            error_message: None,
            error_code: None,
        }
    }
}

/// A content slot on a topic, bound to one widget for its lifetime.
///
/// Sections are mutated whole-row by the API boundary and the workers; there
/// is no version token, so overlapping runs on the same section settle
/// last-writer-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub topic_id: TopicId,
    pub widget: String,
    pub content: Value,
    pub metadata: Map<String, Value>,
    pub execution_logs: Vec<ExecutionLogEntry>,
    pub execution_state: ExecutionState,
    pub language: String,
    pub position: i32,
}

impl Section {
    pub fn new(
        id: SectionId,
        topic_id: TopicId,
        widget: impl Into<String>,
        language: impl Into<String>,
        position: i32,
    ) -> Self {
        Self {
            id,
            topic_id,
            widget: widget.into(),
            content: Value::Null,
            metadata: Map::new(),
            execution_logs: Vec::new(),
            execution_state: ExecutionState::default(),
            language: language.into(),
            position,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.execution_state.status
    }

    /// True when `content` holds something worth feeding back into the
    /// context builder.
    pub fn has_content(&self) -> bool {
        match &self.content {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Accepts a new execution request. Previous error fields stay in place;
    /// only a successful run clears them.
    pub fn mark_queued(
        &mut self,
        action: impl Into<String>,
        extra_instructions: Option<String>,
        request_metadata: Map<String, Value>,
    ) {
        self.execution_state.status = ExecutionStatus::Queued;
        self.execution_state.action = Some(action.into());
        self.execution_state.extra_instructions = extra_instructions;
        self.execution_state.request_metadata = request_metadata;
        self.execution_state.queued_at = Some(Utc::now());
    }

    pub fn mark_running(&mut self) {
        self.execution_state.status = ExecutionStatus::Running;
        self.execution_state.started_at = Some(Utc::now());
    }

    /// Records a successful attempt: replaces content, merges the result
    /// metadata, appends the log entry and clears the error fields.
    pub fn apply_success(
        &mut self,
        content: Value,
        metadata: Map<String, Value>,
        entry: ExecutionLogEntry,
    ) {
        self.content = content;
        for (key, value) in metadata {
            self.metadata.insert(key, value);
        }
        self.execution_logs.push(entry);
        self.execution_state.status = ExecutionStatus::Finished;
        self.execution_state.completed_at = Some(Utc::now());
        self.execution_state.error_message = None;
        self.execution_state.error_code = None;
    }

    /// Records a failed attempt. Content from the last successful run is
    /// left untouched.
    pub fn apply_failure(
        &mut self,
        message: impl Into<String>,
        code: impl Into<String>,
        entry: ExecutionLogEntry,
    ) {
        self.execution_logs.push(entry);
        self.execution_state.status = ExecutionStatus::Failed;
        self.execution_state.failed_at = Some(Utc::now());
        self.execution_state.error_message = Some(message.into());
        self.execution_state.error_code = Some(code.into());
    }
}
