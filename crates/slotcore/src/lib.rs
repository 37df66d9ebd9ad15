//! Core abstractions for the widget execution engine
//!
//! Domain types and traits shared by the runtime, the widget library and
//! the binaries: the section data model with its execution state machine,
//! the widget/action capability traits, the error taxonomy and the
//! lifecycle event bus.

mod context;
mod error;
pub mod events;
mod section;
mod topic;
mod widget;

pub use context::ExecutionContext;
pub use error::{EngineError, ExecutionError, RegistryError, SectionError};
pub use events::{EventBus, SectionEvent};
pub use section::{
    ExecutionLogEntry, ExecutionState, ExecutionStatus, LogStatus, Section, SectionId,
};
pub use topic::{AccountId, Topic, TopicId};
pub use widget::{slugify, Widget, WidgetAction};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
