//! Execution runtime for the widget engine: capability registry, context and
//! prompt assembly, backend adapters, the side-effect-free execution pipeline
//! and the async dispatcher with its worker pool.

pub mod backend;
pub mod context;
pub mod dispatcher;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod store;

pub use backend::{
    BackendConfig, BackendRequest, BackendResponse, GenerativeBackend, HttpBackend, StaticBackend,
};
pub use context::{build_context, CONTEXT_OVERRIDE_KEY};
pub use dispatcher::{Dispatcher, EngineContext, ExecutionHandle, ExecutionTask, RetryPolicy};
pub use pipeline::{tool_descriptor, ExecutionPipeline, ExecutionRequest, ExecutionResult};
pub use prompt::{language_display_name, PromptRenderer};
pub use registry::{WidgetInfo, WidgetRegistry};
pub use runtime::{EngineRuntime, RuntimeConfig};
pub use schema::validate_against_schema;
pub use store::{InMemorySectionStore, InMemoryTopicStore, SectionStore, TopicStore};
