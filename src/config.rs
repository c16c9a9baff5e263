//! アプリケーション設定と定数
//!
//! 値はすべて環境変数 (および `.env`) から読む。テストではプロセス環境を
//! 書き換えずに済むよう `RelayConfig::from_lookup` にマップを渡す。

use crate::error::StartupError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 既定の参照資料 (起動ディレクトリからの相対パス)
pub const DEFAULT_CORPUS: [&str; 3] = [
    "data/DefaultRiskAnalysisofSmallScaleAgriculturalLoanSchemeinNigeria.pdf",
    "data/ajol-file-journals_16_articles_125504_submission_proof_125504-181-341943-1-10-20151111.pdf",
    "data/ssrn-4773497.pdf",
];

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_WEATHER_API_BASE: &str = "https://api.weatherapi.com/v1";

/// 利用するホスト型モデル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Gemini,
    OpenAi,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "gemini",
            ModelProvider::OpenAi => "openai",
        }
    }

    /// APIキーを読む環境変数名
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "GOOGLE_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => DEFAULT_GEMINI_MODEL,
            ModelProvider::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }
}

impl FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ModelProvider::Gemini),
            "openai" => Ok(ModelProvider::OpenAi),
            other => Err(format!("unknown provider {other}")),
        }
    }
}

/// ホスト型モデルへの接続設定
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub api_key: String,
    /// モデル名
    pub model: String,
    /// 最大出力トークン数
    pub max_tokens: u32,
    /// 1回の呼び出しのタイムアウト
    pub timeout: Duration,
    /// 一時的な失敗に対するリトライ回数
    pub retries: u32,
}

/// 天気APIの設定 (キー未設定なら毎回 LookupError)
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_WEATHER_API_BASE.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub model: ModelConfig,
    pub weather: WeatherConfig,
    /// 参照資料のパス (この順でモデルに送る)
    pub corpus: Vec<PathBuf>,
    pub bind: SocketAddr,
    /// 1ターンあたりのツール呼び出しラウンド数
    pub max_tool_rounds: usize,
    /// 保持する会話の上限 (超えたら最も古いものを破棄)
    pub max_sessions: usize,
    /// 会話を破棄するまでの無操作時間
    pub session_ttl: Duration,
}

impl RelayConfig {
    /// `.env` を読み込んだうえでプロセス環境から設定を構築
    pub fn from_env() -> Result<Self, StartupError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数から設定を構築
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("RELAY_MODEL_PROVIDER") {
            Some(raw) => raw.parse::<ModelProvider>().map_err(|reason| StartupError::InvalidConfig {
                key: "RELAY_MODEL_PROVIDER",
                value: raw,
                reason,
            })?,
            None => ModelProvider::Gemini,
        };

        let api_key = get(provider.api_key_var())
            .ok_or(StartupError::MissingApiKey { var: provider.api_key_var() })?;

        let model = ModelConfig {
            provider,
            api_key,
            model: get("RELAY_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            // NOTE: Keep in sync with tests (tests/config_tests.rs).
            max_tokens: parse_or(&get, "RELAY_MAX_TOKENS", 2000)?,
            timeout: Duration::from_secs(parse_or(&get, "RELAY_MODEL_TIMEOUT_SECS", 60)?),
            retries: parse_or(&get, "RELAY_UPSTREAM_RETRIES", 1)?,
        };

        let weather = WeatherConfig {
            api_key: get("WEATHER_API_KEY"),
            base_url: get("WEATHER_API_BASE").unwrap_or_else(|| DEFAULT_WEATHER_API_BASE.to_string()),
            timeout: Duration::from_secs(parse_or(&get, "RELAY_LOOKUP_TIMEOUT_SECS", 15)?),
        };

        let corpus = match get("RELAY_CORPUS") {
            Some(list) => parse_path_list(&list),
            None => DEFAULT_CORPUS.iter().map(PathBuf::from).collect(),
        };

        let bind: SocketAddr = parse_or(&get, "RELAY_BIND", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let max_tool_rounds: usize = parse_or(&get, "RELAY_MAX_TOOL_ROUNDS", 1)?;

        let max_sessions: usize = parse_or(&get, "RELAY_MAX_SESSIONS", 1000)?;
        let session_ttl = Duration::from_secs(parse_or(&get, "RELAY_SESSION_TTL_SECS", 30 * 60)?);

        Ok(Self { model, weather, corpus, bind, max_tool_rounds, max_sessions, session_ttl })
    }
}

/// カンマ区切りのパス一覧 (空要素は無視)
pub fn parse_path_list(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, StartupError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| StartupError::InvalidConfig {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
