use actix_cors::Cors;
use actix_web::{
    get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder,
    Result as ActixResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slotcore::{
    AccountId, EngineError, ExecutionStatus, SectionError, SectionId, Topic, TopicId,
};
use slotruntime::{EngineRuntime, RuntimeConfig, SectionStore, TopicStore, WidgetRegistry};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<EngineRuntime>,
}

/// Request body for enqueuing an execution
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    topic_id: TopicId,
    widget: String,
    action: String,
    section_id: Option<SectionId>,
    extra_instructions: Option<String>,
    metadata: Option<Map<String, Value>>,
}

/// Request body for topic creation
#[derive(Debug, Deserialize)]
struct CreateTopicRequest {
    title: String,
}

/// Query string for section status polls
#[derive(Debug, Deserialize)]
struct StatusQuery {
    topic_id: TopicId,
}

/// Section snapshot returned by the status endpoint
#[derive(Debug, Serialize)]
struct SectionStatusResponse {
    section_id: SectionId,
    status: ExecutionStatus,
    queued_at: Option<DateTime<Utc>>,
    metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

/// Caller identity comes from the X-Account-Id header.
fn authenticate(req: &HttpRequest) -> Result<AccountId, HttpResponse> {
    req.headers()
        .get("X-Account-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(ErrorResponse {
                error: "Missing or invalid X-Account-Id header".to_string(),
                code: "unauthorized".to_string(),
            })
        })
}

fn engine_error_response(err: &EngineError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
        code: err.error_code().to_string(),
    };
    match err {
        EngineError::Registry(_) => HttpResponse::NotFound().json(body),
        EngineError::Section(SectionError::Forbidden) => HttpResponse::Forbidden().json(body),
        EngineError::Section(SectionError::WidgetMismatch { .. }) => {
            HttpResponse::BadRequest().json(body)
        }
        EngineError::Section(SectionError::MissingActionIdentifier(_)) => {
            HttpResponse::BadRequest().json(body)
        }
        EngineError::Section(_) => HttpResponse::NotFound().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Loads the topic and enforces ownership for the calling account.
async fn load_owned_topic(
    state: &AppState,
    topic_id: TopicId,
    account: AccountId,
) -> Result<Topic, HttpResponse> {
    let topic = state
        .runtime
        .topics()
        .get(topic_id)
        .await
        .map_err(|e| engine_error_response(&e))?;
    if !topic.is_owned_by(account) {
        return Err(engine_error_response(&SectionError::Forbidden.into()));
    }
    Ok(topic)
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "slotengine"
    }))
}

/// List registered widgets and their actions
#[get("/api/widgets")]
async fn list_widgets(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.registry().list_widgets()))
}

/// Create a topic owned by the calling account
#[post("/api/topics")]
async fn create_topic(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateTopicRequest>,
) -> ActixResult<impl Responder> {
    let account = match authenticate(&req) {
        Ok(account) => account,
        Err(response) => return Ok(response),
    };

    let topic = Topic::new(account, body.into_inner().title);
    info!("Creating topic: {} ({})", topic.title, topic.id);
    data.runtime.topics().insert(topic.clone()).await;

    Ok(HttpResponse::Created().json(topic))
}

/// List a topic's sections in display order
#[get("/api/topics/{id}/sections")]
async fn list_sections(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<TopicId>,
) -> ActixResult<impl Responder> {
    let account = match authenticate(&req) {
        Ok(account) => account,
        Err(response) => return Ok(response),
    };

    let topic = match load_owned_topic(&data, path.into_inner(), account).await {
        Ok(topic) => topic,
        Err(response) => return Ok(response),
    };

    let sections = data.runtime.sections().list_by_topic(topic.id).await;
    Ok(HttpResponse::Ok().json(sections))
}

/// Accept an execution request and hand it to the worker pool
#[post("/api/executions")]
async fn enqueue_execution(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    let account = match authenticate(&req) {
        Ok(account) => account,
        Err(response) => return Ok(response),
    };

    let body = body.into_inner();
    let topic = match load_owned_topic(&data, body.topic_id, account).await {
        Ok(topic) => topic,
        Err(response) => return Ok(response),
    };

    let result = data
        .runtime
        .dispatcher()
        .enqueue(
            &topic,
            &body.widget,
            &body.action,
            body.section_id,
            body.metadata.unwrap_or_default(),
            body.extra_instructions,
        )
        .await;

    match result {
        Ok(handle) => Ok(HttpResponse::Accepted().json(handle)),
        Err(e) => {
            warn!("Rejected execution request for topic {}: {}", topic.id, e);
            Ok(engine_error_response(&e))
        }
    }
}

/// Poll one section's execution snapshot
#[get("/api/sections/{id}")]
async fn section_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<SectionId>,
    query: web::Query<StatusQuery>,
) -> ActixResult<impl Responder> {
    let account = match authenticate(&req) {
        Ok(account) => account,
        Err(response) => return Ok(response),
    };

    let topic = match load_owned_topic(&data, query.topic_id, account).await {
        Ok(topic) => topic,
        Err(response) => return Ok(response),
    };

    let section_id = path.into_inner();
    let section = match data.runtime.sections().get(section_id).await {
        Ok(section) if section.topic_id == topic.id => section,
        Ok(_) => {
            return Ok(engine_error_response(
                &SectionError::NotFound(section_id).into(),
            ))
        }
        Err(e) => return Ok(engine_error_response(&e)),
    };

    Ok(HttpResponse::Ok().json(SectionStatusResponse {
        section_id: section.id,
        status: section.status(),
        queued_at: section.execution_state.queued_at,
        metadata: section.metadata.clone(),
        content: section.has_content().then(|| section.content.clone()),
        error_message: section.execution_state.error_message.clone(),
        error_code: section.execution_state.error_code.clone(),
    }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("🚀 Starting Widget Engine Server");

    // Build the runtime with the built-in widget catalog
    let mut registry = WidgetRegistry::new();
    slotwidgets::register_all(&mut registry);

    let runtime = EngineRuntime::with_registry(registry, RuntimeConfig::from_env())?;

    info!(
        "✅ Runtime initialized with {} widgets",
        runtime.registry().len()
    );

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_widgets)
            .service(create_topic)
            .service(list_sections)
            .service(enqueue_execution)
            .service(section_status)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use slotruntime::{
        InMemorySectionStore, InMemoryTopicStore, RetryPolicy, StaticBackend,
    };
    use std::time::Duration;

    struct TestApp {
        state: web::Data<AppState>,
        topic: Topic,
        owner: AccountId,
    }

    async fn test_app() -> TestApp {
        let mut registry = WidgetRegistry::new();
        slotwidgets::register_all(&mut registry);

        let config = RuntimeConfig {
            workers: 1,
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            ..RuntimeConfig::default()
        };

        let runtime = EngineRuntime::with_parts(
            registry,
            Arc::new(InMemorySectionStore::new()),
            Arc::new(InMemoryTopicStore::new()),
            Arc::new(StaticBackend::with_response(
                serde_json::json!({"summary": "Concise"}),
            )),
            config,
        );

        let owner = Uuid::new_v4();
        let topic = Topic::new(owner, "Test Topic");
        runtime.topics().insert(topic.clone()).await;

        TestApp {
            state: web::Data::new(AppState {
                runtime: Arc::new(runtime),
            }),
            topic,
            owner,
        }
    }

    // Polls the store instead of the event bus: the request may already have
    // finished by the time a subscriber could attach.
    async fn wait_terminal(state: &web::Data<AppState>, section_id: SectionId) {
        for _ in 0..500 {
            let section = state
                .runtime
                .sections()
                .get(section_id)
                .await
                .expect("section exists");
            if section.status().is_terminal() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("section {} never reached a terminal state", section_id);
    }

    fn execute_body(topic: &Topic, widget: &str, action: &str) -> Value {
        serde_json::json!({
            "topic_id": topic.id,
            "widget": widget,
            "action": action,
        })
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app =
            test::init_service(App::new().service(health_check)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "slotengine");
    }

    #[actix_web::test]
    async fn test_widget_catalog_lists_builtins() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(list_widgets),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/widgets").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["faq", "notes", "paragraph"], "catalog is sorted");
    }

    #[actix_web::test]
    async fn test_enqueue_requires_account_header() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .set_json(execute_body(&harness.topic, "paragraph", "summarize"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 401);

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", "not-a-uuid"))
            .set_json(execute_body(&harness.topic, "paragraph", "summarize"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 401);
    }

    #[actix_web::test]
    async fn test_enqueue_unknown_action_is_404_and_touches_nothing() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(execute_body(&harness.topic, "paragraph", "UNKNOWN"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 404);

        let sections = harness
            .state
            .runtime
            .sections()
            .list_by_topic(harness.topic.id)
            .await;
        assert!(sections.is_empty(), "rejections must not create sections");
    }

    #[actix_web::test]
    async fn test_enqueue_and_poll_roundtrip() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution)
                .service(section_status),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(execute_body(&harness.topic, "paragraph", "summarize"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 202);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "queued");
        let section_id = body["section_id"].as_i64().unwrap();

        wait_terminal(&harness.state, section_id).await;

        let uri = format!(
            "/api/sections/{}?topic_id={}",
            section_id, harness.topic.id
        );
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "finished");
        assert_eq!(body["content"], serde_json::json!({"summary": "Concise"}));
        assert!(body.get("error_message").is_none());
    }

    #[actix_web::test]
    async fn test_foreign_account_is_forbidden() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution)
                .service(list_sections),
        )
        .await;

        let stranger = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", stranger.to_string()))
            .set_json(execute_body(&harness.topic, "paragraph", "summarize"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 403);

        let uri = format!("/api/topics/{}/sections", harness.topic.id);
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header(("X-Account-Id", stranger.to_string()))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 403);
    }

    #[actix_web::test]
    async fn test_unknown_topic_is_404() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution),
        )
        .await;

        let body = serde_json::json!({
            "topic_id": Uuid::new_v4(),
            "widget": "paragraph",
            "action": "summarize",
        });
        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(body)
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 404);
    }

    #[actix_web::test]
    async fn test_widget_mismatch_is_400() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(enqueue_execution),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(execute_body(&harness.topic, "paragraph", "summarize"))
            .to_request();
        let response = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(response).await;
        let section_id = body["section_id"].as_i64().unwrap();
        wait_terminal(&harness.state, section_id).await;

        let mismatch = serde_json::json!({
            "topic_id": harness.topic.id,
            "widget": "faq",
            "action": "generate",
            "section_id": section_id,
        });
        let req = test::TestRequest::post()
            .uri("/api/executions")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(mismatch)
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 400);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["code"], "widget_mismatch");
    }

    #[actix_web::test]
    async fn test_topic_scaffolding_roundtrip() {
        let harness = test_app().await;
        let app = test::init_service(
            App::new()
                .app_data(harness.state.clone())
                .service(create_topic)
                .service(list_sections),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/topics")
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .set_json(serde_json::json!({"title": "Baking Bread"}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 201);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["slug"], "baking-bread");

        let uri = format!("/api/topics/{}/sections", body["id"].as_str().unwrap());
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header(("X-Account-Id", harness.owner.to_string()))
            .to_request();
        let sections: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(sections, serde_json::json!([]));
    }
}
