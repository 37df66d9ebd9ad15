use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use slotcore::{ExecutionStatus, LogStatus, SectionEvent, SectionId, Topic};
use slotruntime::{
    EngineRuntime, InMemorySectionStore, InMemoryTopicStore, RetryPolicy, RuntimeConfig,
    SectionStore, StaticBackend, TopicStore, WidgetRegistry,
};
use slotwidgets::register_all;
use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

async fn start_engine(backend: StaticBackend) -> (EngineRuntime, Topic) {
    let mut registry = WidgetRegistry::new();
    register_all(&mut registry);

    let config = RuntimeConfig {
        workers: 1,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 5,
            max_delay_ms: 10,
        },
        ..RuntimeConfig::default()
    };

    let runtime = EngineRuntime::with_parts(
        registry,
        Arc::new(InMemorySectionStore::new()),
        Arc::new(InMemoryTopicStore::new()),
        Arc::new(backend),
        config,
    );

    let topic = Topic::new(Uuid::new_v4(), "Fermentation Basics");
    runtime.topics().insert(topic.clone()).await;
    (runtime, topic)
}

async fn wait_terminal(
    events: &mut broadcast::Receiver<SectionEvent>,
    section_id: SectionId,
) -> SectionEvent {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("event stream closed");
        if event.section_id() == section_id && event.is_terminal() {
            return event;
        }
    }
}

#[tokio::test]
async fn test_paragraph_summarize_end_to_end() {
    let (runtime, topic) =
        start_engine(StaticBackend::with_response(json!({"summary": "Concise"}))).await;
    let mut events = runtime.subscribe_events();

    let handle = runtime
        .dispatcher()
        .enqueue(
            &topic,
            "paragraph",
            "summarize",
            None,
            Map::new(),
            Some("Keep it under 80 words.".to_string()),
        )
        .await
        .unwrap();

    wait_terminal(&mut events, handle.section_id).await;

    let section = runtime.sections().get(handle.section_id).await.unwrap();
    assert_eq!(section.status(), ExecutionStatus::Finished);
    assert_eq!(section.content, json!({"summary": "Concise"}));
    assert!(section.execution_state.error_message.is_none());
    assert_eq!(section.execution_logs.len(), 1);
    assert_eq!(section.execution_logs[0].status, LogStatus::Success);

    let prompt = section.execution_logs[0].prompt.as_deref().unwrap();
    assert!(prompt.contains("Fermentation Basics"));
    assert!(prompt.contains("Additional instructions:\nKeep it under 80 words."));
    assert!(prompt.ends_with("Respond in English."));
}

#[tokio::test]
async fn test_faq_generate_uses_widget_schema_and_tools() {
    let canned = json!({
        "items": [
            { "question": "What is a starter?", "answer": "A live culture." }
        ]
    });
    let (runtime, topic) = start_engine(StaticBackend::with_response(canned.clone())).await;
    let mut events = runtime.subscribe_events();

    let handle = runtime
        .dispatcher()
        .enqueue(&topic, "faq", "generate", None, Map::new(), None)
        .await
        .unwrap();
    wait_terminal(&mut events, handle.section_id).await;

    let section = runtime.sections().get(handle.section_id).await.unwrap();
    assert_eq!(section.status(), ExecutionStatus::Finished);
    assert_eq!(section.content, canned);
    assert_eq!(
        section.execution_logs[0].tools,
        vec![json!({"type": "web_search"})],
        "the widget default tool reaches the backend request"
    );
    assert_eq!(section.metadata["tools"], json!([{"type": "web_search"}]));
}

#[tokio::test]
async fn test_faq_rejects_malformed_payload() {
    let (runtime, topic) = start_engine(StaticBackend::with_response(
        json!({"items": [{"question": "unanswered"}]}),
    ))
    .await;
    let mut events = runtime.subscribe_events();

    let handle = runtime
        .dispatcher()
        .enqueue(&topic, "faq", "generate", None, Map::new(), None)
        .await
        .unwrap();
    wait_terminal(&mut events, handle.section_id).await;

    let section = runtime.sections().get(handle.section_id).await.unwrap();
    assert_eq!(section.status(), ExecutionStatus::Failed);
    assert_eq!(
        section.execution_state.error_code.as_deref(),
        Some("response_validation_error")
    );
    assert_eq!(section.execution_logs.len(), 2, "one entry per attempt");
    assert_eq!(section.content, serde_json::Value::Null);
}

#[tokio::test]
async fn test_notes_set_is_purely_local() {
    let (runtime, topic) = start_engine(StaticBackend::with_response(
        json!("must never reach the backend"),
    ))
    .await;
    let mut events = runtime.subscribe_events();

    let mut metadata = Map::new();
    metadata.insert("value".to_string(), json!("buy more flour"));

    let handle = runtime
        .dispatcher()
        .enqueue(&topic, "notes", "set", None, metadata, None)
        .await
        .unwrap();
    wait_terminal(&mut events, handle.section_id).await;

    let section = runtime.sections().get(handle.section_id).await.unwrap();
    assert_eq!(section.status(), ExecutionStatus::Finished);
    assert_eq!(section.content, json!({"text": "buy more flour"}));
    assert_eq!(
        section.execution_logs[0].raw_response,
        section.execution_logs[0].parsed_response,
        "local actions record their own value as raw and parsed"
    );
}

#[tokio::test]
async fn test_notes_polish_wraps_free_text() {
    let (runtime, topic) = start_engine(StaticBackend::new()).await;
    let mut events = runtime.subscribe_events();

    let handle = runtime
        .dispatcher()
        .enqueue(&topic, "notes", "polish", None, Map::new(), None)
        .await
        .unwrap();
    wait_terminal(&mut events, handle.section_id).await;

    let section = runtime.sections().get(handle.section_id).await.unwrap();
    assert_eq!(section.status(), ExecutionStatus::Finished);
    let text = section.content["text"].as_str().unwrap();
    assert!(text.starts_with("[static] Draft short working notes"));
}
