#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use agro_relay::config::WeatherConfig;
use agro_relay::corpus::{Corpus, ReferenceDocument};
use agro_relay::error::UpstreamError;
use agro_relay::llm::{ChatModel, ModelReply, ModelRequest, Part, RetryPolicy, ToolCall, Turn};
use agro_relay::relay::{RelaySettings, SessionRelay};
use agro_relay::{bootstrap, prompts};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static START: Once = Once::new();
static _GUARD: Lazy<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initialize test environment: dotenv and tracing (stderr + file).
/// Idempotent: safe to call multiple times.
pub fn init() {
    START.call_once(|| {
        let _ = dotenvy::dotenv();
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("env filter");

        // Daily rotating log file separate from app runtime logs
        let file_appender = rolling::daily("logs", "tests.log");
        let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
        *_GUARD.lock().unwrap() = Some(guard); // retain guard for lifetime

        let stderr_layer = fmt::layer().with_target(true).with_thread_ids(true).with_writer(std::io::stderr);
        let file_layer = fmt::layer().with_ansi(false).with_target(true).with_thread_ids(true).with_writer(file_nb);

        // 他のテストバイナリと独立なので try_init で十分
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init();

        tracing::info!(target: "test_init", "Test tracing initialized (stderr + rotating file)");
    });
}

// ---------------------------------------------------------------------------
// Model doubles
// ---------------------------------------------------------------------------

/// One scripted answer of `ScriptedModel`.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(ModelReply),
    Fail(UpstreamError),
    /// Sleep, then reply (for timeout tests).
    Slow(Duration, ModelReply),
}

pub fn text(t: &str) -> Step {
    Step::Reply(ModelReply::text(t))
}

pub fn calls(calls: &[(&str, Value)]) -> Step {
    Step::Reply(ModelReply {
        text: None,
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall { id: format!("call_{i}"), name: name.to_string(), args: args.clone() })
            .collect(),
    })
}

/// Replays a fixed script and records every request history it receives.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(steps.into()), requests: Mutex::new(Vec::new()) })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, UpstreamError> {
        self.requests.lock().unwrap().push(request.history.to_vec());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(r)) => Ok(r),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Slow(d, r)) => {
                tokio::time::sleep(d).await;
                Ok(r)
            }
            None => Err(UpstreamError::Empty("script exhausted".into())),
        }
    }
}

/// Answers every request with `echo: <text of the last user turn>`.
#[derive(Debug, Default)]
pub struct EchoModel {
    pub calls: AtomicUsize,
}

pub fn last_user_text(history: &[Turn]) -> Option<String> {
    history.iter().rev().find_map(|t| match t {
        Turn::User { parts } => parts.iter().rev().find_map(|p| match p {
            Part::Text(t) => Some(t.clone()),
            Part::Document(_) => None,
        }),
        _ => None,
    })
}

#[async_trait]
impl ChatModel for EchoModel {
    fn provider(&self) -> &'static str {
        "echo"
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = last_user_text(request.history).unwrap_or_default();
        // 他タスクと交互に動くように一度譲る
        tokio::time::sleep(Duration::from_millis(2)).await;
        let first_line = last.lines().next().unwrap_or_default().to_string();
        Ok(ModelReply::text(format!("echo: {first_line}")))
    }
}

// ---------------------------------------------------------------------------
// Weather service stub
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct WeatherStub {
    pub base_url: String,
    pub hits: Arc<AtomicUsize>,
    /// Query strings received, in order.
    pub queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    body: String,
    delay: Duration,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn stub_current(State(s): State<StubState>, Query(q): Query<HashMap<String, String>>) -> (StatusCode, String) {
    s.hits.fetch_add(1, Ordering::SeqCst);
    s.queries.lock().unwrap().push(q);
    if !s.delay.is_zero() {
        tokio::time::sleep(s.delay).await;
    }
    (s.status, s.body.clone())
}

/// Serve `GET /current.json` on an ephemeral local port.
pub async fn spawn_weather_stub(status: u16, body: &str) -> WeatherStub {
    spawn_weather_stub_with_delay(status, body, Duration::ZERO).await
}

pub async fn spawn_weather_stub_with_delay(status: u16, body: &str, delay: Duration) -> WeatherStub {
    let hits = Arc::new(AtomicUsize::new(0));
    let queries = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        status: StatusCode::from_u16(status).unwrap(),
        body: body.to_string(),
        delay,
        hits: hits.clone(),
        queries: queries.clone(),
    };
    let app = Router::new().route("/current.json", get(stub_current)).with_state(state);
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    WeatherStub { base_url: format!("http://{addr}"), hits, queries }
}

pub fn weather_config(base_url: &str) -> WeatherConfig {
    WeatherConfig { api_key: Some("test-key".into()), base_url: base_url.to_string(), timeout: Duration::from_secs(2) }
}

// ---------------------------------------------------------------------------
// Relay wiring
// ---------------------------------------------------------------------------

pub const DOC_NAMES: [&str; 3] = ["Credit_Score_Guide.pdf", "Farming_Practices.pdf", "Loan_Products.pdf"];

pub fn test_corpus() -> Corpus {
    Corpus::from_documents(
        DOC_NAMES
            .iter()
            .map(|n| ReferenceDocument::from_bytes(*n, "application/pdf", format!("%PDF-1.4 {n}").into_bytes()))
            .collect(),
    )
}

pub fn fast_settings() -> RelaySettings {
    RelaySettings {
        system_instruction: prompts::SYSTEM_INSTRUCTION.to_string(),
        retry: RetryPolicy { timeout: Duration::from_secs(2), max_retries: 1, base_delay: Duration::from_millis(1) },
        max_tool_rounds: 1,
    }
}

pub fn relay_with(model: Arc<dyn ChatModel>, weather_base: &str, settings: RelaySettings) -> SessionRelay {
    let registry = bootstrap::build_registry(&weather_config(weather_base)).unwrap();
    SessionRelay::new(model, registry, test_corpus(), settings).unwrap()
}

/// Relay whose weather tool points at an address nothing listens on.
pub fn relay_without_weather(model: Arc<dyn ChatModel>) -> SessionRelay {
    relay_with(model, "http://127.0.0.1:9", fast_settings())
}
