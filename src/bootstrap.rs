//! Startup wiring shared by the HTTP server and the CLI.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ModelConfig, ModelProvider, RelayConfig, WeatherConfig};
use crate::corpus::Corpus;
use crate::error::StartupError;
use crate::llm::{ChatModel, GeminiModel, OpenAiModel, RetryPolicy};
use crate::prompts::SYSTEM_INSTRUCTION;
use crate::relay::{RelaySettings, SessionRelay, StoreLimits};
use crate::tools::{build_weather_tool, ToolRegistry, WeatherClient};

pub fn build_model(config: &ModelConfig) -> Result<Arc<dyn ChatModel>, StartupError> {
    let model: Arc<dyn ChatModel> = match config.provider {
        ModelProvider::Gemini => Arc::new(GeminiModel::new(config)?),
        ModelProvider::OpenAi => Arc::new(OpenAiModel::new(config)),
    };
    Ok(model)
}

/// 組み込みツール (現在は天気のみ) を登録したレジストリ
pub fn build_registry(weather: &WeatherConfig) -> Result<ToolRegistry, StartupError> {
    let client = WeatherClient::new(weather)?;
    ToolRegistry::new().with(build_weather_tool(client))
}

pub fn relay_settings(config: &RelayConfig) -> RelaySettings {
    RelaySettings {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        retry: RetryPolicy {
            timeout: config.model.timeout,
            max_retries: config.model.retries,
            ..RetryPolicy::default()
        },
        max_tool_rounds: config.max_tool_rounds,
    }
}

pub fn store_limits(config: &RelayConfig) -> StoreLimits {
    StoreLimits { max_sessions: config.max_sessions, idle_ttl: config.session_ttl }
}

/// config → corpus → registry → model → relay.
///
/// Any failure here is a `StartupError`; the process must not serve turns
/// with a partial corpus or without a model key.
pub fn build_relay(config: &RelayConfig) -> Result<SessionRelay, StartupError> {
    let corpus = Corpus::load_required(config.corpus.as_slice())?;
    info!(target: "relay", documents = corpus.len(), bytes = corpus.total_bytes(), "corpus_loaded");
    if config.weather.api_key.is_none() {
        warn!(target: "tools", "WEATHER_API_KEY not set; weather lookups will fail");
    }
    let registry = build_registry(&config.weather)?;
    let model = build_model(&config.model)?;
    SessionRelay::new(model, registry, corpus, relay_settings(config))
}
