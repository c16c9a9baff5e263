use std::sync::Arc;
use std::time::Duration;

use agro_relay::llm::ModelReply;
use agro_relay::relay::StoreLimits;
use agro_relay::web::{router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{calls, relay_with, relay_without_weather, text, ScriptedModel, Step};

#[ctor::ctor]
fn _init() {
    common::init();
}

fn app(model: Arc<ScriptedModel>) -> Router {
    router(AppState::new(relay_without_weather(model)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn quit_returns_exit_string_without_model_call() {
    let model = ScriptedModel::new(vec![]);
    let app = app(model.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/chat",
        Some(json!({"message": "quit", "profile": {"Region": "South West"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "Exiting chat..."}));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn chat_returns_model_text() {
    let model = ScriptedModel::new(vec![text("Rotate cassava with legumes.")]);
    let app = app(model.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/chat",
        Some(json!({"message": "How can I keep my soil healthy?", "profile": {"Crop": "Cassava", "Farm size": 2}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Rotate cassava with legumes.");
    assert!(body.get("conversation_id").is_none());
}

#[tokio::test]
async fn profile_is_optional() {
    let model = ScriptedModel::new(vec![text("ok")]);
    let app = app(model.clone());
    let (status, _) = send(&app, Method::POST, "/chat", Some(json!({"message": "hello"}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn conversation_history_and_delete() {
    let model = ScriptedModel::new(vec![text("first"), text("second")]);
    let app = app(model.clone());

    for msg in ["hi", "again"] {
        let (status, body) =
            send(&app, Method::POST, "/chat", Some(json!({"message": msg, "conversation_id": "farm-7"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], "farm-7");
    }

    let (status, body) = send(&app, Method::GET, "/chat/farm-7/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["documents"].as_array().unwrap().len(), 3);
    assert_eq!(turns[3]["text"], "second");
    // 2回目のモデル呼び出しは1回目の会話を含む
    assert_eq!(model.requests()[1].len(), 3);

    let (status, _) = send(&app, Method::DELETE, "/chat/farm-7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, Method::GET, "/chat/farm-7/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn requests_without_conversation_id_do_not_share_context() {
    let model = ScriptedModel::new(vec![text("a"), text("b")]);
    let app = app(model.clone());

    send(&app, Method::POST, "/chat", Some(json!({"message": "one"}))).await;
    send(&app, Method::POST, "/chat", Some(json!({"message": "two"}))).await;

    let requests = model.requests();
    assert_eq!(requests[0].len(), 1);
    assert_eq!(requests[1].len(), 1);
}

#[tokio::test]
async fn unknown_tool_maps_to_structured_502() {
    let model = ScriptedModel::new(vec![calls(&[("get_loan_rates", json!({}))])]);
    let app = app(model.clone());

    let (status, body) = send(&app, Method::POST, "/chat", Some(json!({"message": "loans?"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["kind"], "protocol_error");
    assert!(!body["error"]["message"].as_str().unwrap().contains("get_loan_rates"));
}

#[tokio::test]
async fn empty_message_is_400() {
    let model = ScriptedModel::new(vec![]);
    let app = app(model.clone());
    let (status, body) = send(&app, Method::POST, "/chat", Some(json!({"message": "  ", "profile": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_input");
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let model = ScriptedModel::new(vec![]);
    let app = app(model.clone());
    let (status, body) = send(&app, Method::POST, "/chat", Some(json!({"profile": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_input");
}

#[tokio::test]
async fn upstream_timeout_is_504_and_hides_detail() {
    let model = ScriptedModel::new(vec![Step::Slow(Duration::from_secs(5), ModelReply::text("late"))]);
    let mut settings = common::fast_settings();
    settings.retry.timeout = Duration::from_millis(50);
    let app = router(AppState::new(relay_with(model.clone(), "http://127.0.0.1:9", settings)));

    let (status, body) = send(&app, Method::POST, "/chat", Some(json!({"message": "hello"}))).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["kind"], "upstream_timeout");
}

#[tokio::test]
async fn upstream_error_is_502() {
    let model = ScriptedModel::new(vec![Step::Fail(agro_relay::UpstreamError::Api {
        status: Some(403),
        message: "PERMISSION_DENIED: API key sk-secret invalid".into(),
    })]);
    let app = app(model.clone());

    let (status, body) = send(&app, Method::POST, "/chat", Some(json!({"message": "hello"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["kind"], "upstream_error");
    assert!(!body.to_string().contains("sk-secret"));
}

#[tokio::test]
async fn health_reports_provider_and_documents() {
    let model = ScriptedModel::new(vec![]);
    let app = app(model);
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "scripted");
    assert_eq!(body["documents"], 3);
}

#[tokio::test]
async fn exit_and_empty_messages_do_not_register_sessions() {
    let model = ScriptedModel::new(vec![]);
    let app = app(model.clone());

    for i in 0..20 {
        let message = if i % 2 == 0 { "quit" } else { "   " };
        send(&app, Method::POST, "/chat", Some(json!({"message": message, "conversation_id": format!("c-{i}")}))).await;
    }

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["sessions"], 0);
    let (status, _) = send(&app, Method::GET, "/chat/c-0/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn session_count_is_capped() {
    let replies: Vec<Step> = (0..8).map(|i| text(&format!("reply {i}"))).collect();
    let model = ScriptedModel::new(replies);
    let limits = StoreLimits { max_sessions: 3, idle_ttl: Duration::from_secs(3600) };
    let app = router(AppState::with_limits(relay_without_weather(model.clone()), limits));

    for i in 0..8 {
        let (status, _) =
            send(&app, Method::POST, "/chat", Some(json!({"message": "hello", "conversation_id": format!("farm-{i}")}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["sessions"], 3);
    let mut kept = 0;
    for i in 0..8 {
        let (status, _) = send(&app, Method::GET, &format!("/chat/farm-{i}/history"), None).await;
        if status == StatusCode::OK {
            kept += 1;
        }
    }
    assert_eq!(kept, 3);
    let (status, body) = send(&app, Method::GET, "/chat/farm-7/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["turns"].as_array().unwrap().len(), 2);
}
