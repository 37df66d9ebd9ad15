use thiserror::Error;

use crate::section::SectionId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Section error: {0}")]
    Section(#[from] SectionError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable code recorded in `error_code` on a failed section.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Registry(e) => e.error_code(),
            EngineError::Section(e) => e.error_code(),
            EngineError::Execution(e) => e.error_code(),
            EngineError::Serialization(_) => "serialization_error",
            EngineError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Widget not found: {0}")]
    WidgetNotFound(String),

    #[error("Widget '{widget}' has no action matching '{action}'")]
    ActionNotFound { widget: String, action: String },
}

impl RegistryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::WidgetNotFound(_) => "widget_not_found",
            RegistryError::ActionNotFound { .. } => "action_not_found",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum SectionError {
    #[error("Section not found: {0}")]
    NotFound(SectionId),

    #[error("Topic not found: {0}")]
    TopicNotFound(uuid::Uuid),

    #[error("Caller does not own the requested topic")]
    Forbidden,

    #[error("Section {id} is bound to widget '{bound}', not '{requested}'")]
    WidgetMismatch {
        id: SectionId,
        bound: String,
        requested: String,
    },

    #[error("Section {0} was queued without an action identifier")]
    MissingActionIdentifier(SectionId),
}

impl SectionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SectionError::NotFound(_) => "section_not_found",
            SectionError::TopicNotFound(_) => "topic_not_found",
            SectionError::Forbidden => "forbidden",
            SectionError::WidgetMismatch { .. } => "widget_mismatch",
            SectionError::MissingActionIdentifier(_) => "missing_action_identifier",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Backend call failed: {0}")]
    Backend(String),

    #[error("Backend response failed schema validation: {0}")]
    ResponseValidation(String),

    #[error("Local action failed: {0}")]
    Local(String),
}

impl ExecutionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ExecutionError::Backend(_) => "backend_error",
            ExecutionError::ResponseValidation(_) => "response_validation_error",
            ExecutionError::Local(_) => "local_action_error",
        }
    }
}
