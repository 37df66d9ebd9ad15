use std::sync::Arc;

use slotcore::{EventBus, Result, SectionEvent};
use tokio::sync::broadcast;

use crate::backend::{BackendConfig, GenerativeBackend, HttpBackend, StaticBackend};
use crate::dispatcher::{Dispatcher, EngineContext, RetryPolicy};
use crate::pipeline::ExecutionPipeline;
use crate::prompt::PromptRenderer;
use crate::registry::WidgetRegistry;
use crate::store::{InMemorySectionStore, InMemoryTopicStore, SectionStore, TopicStore};

/// Deployment knobs for the engine.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub event_buffer_size: usize,
    pub retry: RetryPolicy,
    pub default_model: String,
    pub language: String,
    pub backend: BackendConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            event_buffer_size: 1000,
            retry: RetryPolicy::default(),
            default_model: "gpt-4o-mini".to_string(),
            language: "en".to_string(),
            backend: BackendConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Reads knobs from the environment; anything unset keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_parse("SLOT_WORKERS") {
            config.workers = workers;
        }
        if let Ok(model) = std::env::var("SLOT_DEFAULT_MODEL") {
            config.default_model = model;
        }
        if let Ok(language) = std::env::var("SLOT_LANGUAGE") {
            config.language = language;
        }
        if let Ok(base_url) = std::env::var("GENERATIVE_API_BASE_URL") {
            config.backend.base_url = base_url;
        }
        config.backend.api_key = std::env::var("GENERATIVE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// The assembled engine: registry, stores, pipeline, event bus and the
/// dispatcher with its worker pool.
pub struct EngineRuntime {
    registry: Arc<WidgetRegistry>,
    sections: Arc<dyn SectionStore>,
    topics: Arc<dyn TopicStore>,
    events: EventBus,
    dispatcher: Dispatcher,
    config: RuntimeConfig,
}

impl EngineRuntime {
    /// Builds the engine with in-memory stores and a backend picked from the
    /// config: HTTP when an API key is present, static otherwise.
    pub fn with_registry(registry: WidgetRegistry, config: RuntimeConfig) -> Result<Self> {
        let backend: Arc<dyn GenerativeBackend> = if config.backend.api_key.is_some() {
            Arc::new(HttpBackend::new(config.backend.clone())?)
        } else {
            tracing::info!("No generative API key configured, using the static backend");
            Arc::new(StaticBackend::new())
        };

        Ok(Self::with_parts(
            registry,
            Arc::new(InMemorySectionStore::new()),
            Arc::new(InMemoryTopicStore::new()),
            backend,
            config,
        ))
    }

    /// Wires the engine from externally built parts; tests use this to swap
    /// in store and backend doubles.
    pub fn with_parts(
        registry: WidgetRegistry,
        sections: Arc<dyn SectionStore>,
        topics: Arc<dyn TopicStore>,
        backend: Arc<dyn GenerativeBackend>,
        config: RuntimeConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let events = EventBus::new(config.event_buffer_size);
        let pipeline = Arc::new(ExecutionPipeline::new(
            backend,
            PromptRenderer::new(config.language.clone()),
            config.default_model.clone(),
        ));

        let ctx = EngineContext {
            registry: Arc::clone(&registry),
            sections: Arc::clone(&sections),
            topics: Arc::clone(&topics),
            pipeline,
            events: events.clone(),
        };

        let dispatcher = Dispatcher::start(
            config.workers,
            config.queue_capacity,
            config.retry,
            config.language.clone(),
            ctx,
        );

        tracing::info!(
            "Engine runtime ready: {} widgets, {} workers",
            registry.len(),
            config.workers
        );

        Self {
            registry,
            sections,
            topics,
            events,
            dispatcher,
            config,
        }
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    pub fn sections(&self) -> &Arc<dyn SectionStore> {
        &self.sections
    }

    pub fn topics(&self) -> &Arc<dyn TopicStore> {
        &self.topics
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SectionEvent> {
        self.events.subscribe()
    }

    /// Drains outstanding work and stops the worker pool.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}
