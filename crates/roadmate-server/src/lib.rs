pub mod routes;
pub mod state;

use axum::http::{header, Method};
use axum::Router;
use roadmate_core::config::AppConfig;
use roadmate_core::eviction::{spawn_sweeper, EvictionPolicy};
use roadmate_core::orchestrator::Orchestrator;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors_enabled = state.config.server.cors;

    let mut app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::chat_routes())
        .merge(routes::session_routes())
        .with_state(state);

    app = app.layer(TraceLayer::new_for_http());

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_origin(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the HTTP server and the session sweeper.
pub async fn serve(config: AppConfig, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let policy = EvictionPolicy::from_config(&config.session);
    let sweeper = spawn_sweeper(
        orchestrator.store().clone(),
        orchestrator.locks().clone(),
        policy,
        Duration::from_secs(config.session.sweep_interval_secs.max(1)),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let agent = orchestrator.profile().name.clone();
    let router = build_router(AppState::new(config, orchestrator));

    tracing::info!("Starting server on {} (agent: {})", addr, agent);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let result = axum::serve(listener, router).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use roadmate_core::agents::AgentProfile;
    use roadmate_core::model::ModelClient;
    use roadmate_core::scripted::{ScriptStep, ScriptedModel};
    use roadmate_core::session::{FileSessionStore, MemorySessionStore, SessionStore};
    use roadmate_core::tool_registry::ToolRegistry;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn profile() -> AgentProfile {
        AgentProfile {
            name: "test".into(),
            description: String::new(),
            system_prompt: "You are a test agent.".into(),
            tools: Vec::new(),
        }
    }

    fn router_with(model: Arc<dyn ModelClient>, store: Arc<dyn SessionStore>) -> Router {
        let orchestrator =
            Orchestrator::new(model, Arc::new(ToolRegistry::new()), store, profile()).unwrap();
        build_router(AppState::new(AppConfig::default(), orchestrator))
    }

    fn test_router() -> Router {
        router_with(Arc::new(ScriptedModel::echo()), Arc::new(MemorySessionStore::new()))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let app = test_router();

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_replies_with_session() {
        let app = test_router();
        let resp = app
            .oneshot(post_json("/chat", r#"{"message":"hi","sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"sessionId": "s1", "reply": "echo: hi"}));
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_fields() {
        let cases = [
            (r#"{"sessionId":"s1"}"#, "Field 'message' is required and must be a string"),
            (r#"{"message":"","sessionId":"s1"}"#, "Field 'message' is required and must be a string"),
            (r#"{"message":"   ","sessionId":"s1"}"#, "Field 'message' is required and must be a string"),
            (r#"{"message":"hi","sessionId":" \t"}"#, "Field 'sessionId' is required and must be a string"),
            (r#"{"message":42,"sessionId":"s1"}"#, "Field 'message' is required and must be a string"),
            (r#"{"message":"hi","sessionId":7}"#, "Field 'sessionId' is required and must be a string"),
            (r#"{"message":"hi"}"#, "Field 'sessionId' is required and must be a string"),
        ];
        for (body, expected) in cases {
            for uri in ["/chat", "/chat/stream"] {
                let resp = test_router().oneshot(post_json(uri, body)).await.unwrap();
                assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
                assert_eq!(body_json(resp).await["error"], expected);
            }
        }
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_json() {
        let resp = test_router().oneshot(post_json("/chat", "{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"]
            .as_str()
            .unwrap()
            .starts_with("Request body must be JSON"));
    }

    #[tokio::test]
    async fn test_model_unavailable_maps_to_503() {
        let model = ScriptedModel::new([ScriptStep::Fail("upstream down".into())]);
        let app = router_with(Arc::new(model), Arc::new(MemorySessionStore::new()));
        let resp = app
            .oneshot(post_json("/chat", r#"{"message":"hi","sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(resp).await["error"]
            .as_str()
            .unwrap()
            .contains("upstream down"));
    }

    #[tokio::test]
    async fn test_stream_emits_content_then_done() {
        let resp = test_router()
            .oneshot(post_json("/chat/stream", r#"{"message":"hello there","sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let payloads: Vec<Value> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();

        let content: String = payloads
            .iter()
            .filter_map(|p| p["content"].as_str())
            .collect();
        assert_eq!(content, "echo: hello there");
        assert!(payloads
            .iter()
            .filter(|p| p.get("content").is_some())
            .all(|p| p["node"] == "assistant"));
        assert_eq!(payloads.last(), Some(&json!({"done": true})));
    }

    #[tokio::test]
    async fn test_stream_reports_error_event() {
        let model = ScriptedModel::new([ScriptStep::Fail("upstream down".into())]);
        let app = router_with(Arc::new(model), Arc::new(MemorySessionStore::new()));
        let resp = app
            .oneshot(post_json("/chat/stream", r#"{"message":"hi","sessionId":"s1"}"#))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let last = text.lines().filter_map(|l| l.strip_prefix("data: ")).last().unwrap();
        let payload: Value = serde_json::from_str(last).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_transcript_after_chat() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileSessionStore::new(tmp.path()).unwrap());
        let app = router_with(Arc::new(ScriptedModel::echo()), store);

        for message in ["one", "two"] {
            let body = json!({"message": message, "sessionId": "driver-1"}).to_string();
            let resp = app.clone().oneshot(post_json("/chat", &body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/sessions/driver-1/transcript")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0]["type"], "user_message");
        assert_eq!(turns[3]["text"], "echo: two");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/chat")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = test_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }
}
