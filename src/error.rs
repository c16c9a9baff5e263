//! エラー型の定義
//!
//! 起動時エラー (`StartupError`) はプロセスを止める。ターン処理中のエラーは
//! `RelayError` にまとめて呼び出し側 (HTTP / CLI) へ返す。

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 起動できない設定・資料の問題
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} is not set")]
    MissingApiKey { var: &'static str },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot read reference document {path}: {source}")]
    UnreadableDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reference corpus is empty")]
    EmptyCorpus,

    #[error("tool {name} is registered twice")]
    DuplicateTool { name: String },

    #[error("provider {provider} cannot accept document {name} ({mime_type})")]
    UnsupportedDocument {
        provider: &'static str,
        name: String,
        mime_type: String,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// ホスト型モデル呼び出しの失敗
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model API returned an error (status {status:?}): {message}")]
    Api { status: Option<u16>, message: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model returned no candidates: {0}")]
    Empty(String),

    #[error("could not build model request: {0}")]
    Request(String),
}

impl UpstreamError {
    /// リトライ対象か (ネットワーク断・レート制限・5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Api { status: Some(code), .. } => {
                matches!(code, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

/// 外部参照サービス (天気API) の失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup service returned status {status}")]
    Status { status: u16, body: String },

    #[error("lookup service returned a malformed payload: {0}")]
    Malformed(String),

    #[error("lookup request failed: {0}")]
    Transport(String),

    #[error("lookup request timed out after {0:?}")]
    Timeout(Duration),

    #[error("lookup service API key is not configured")]
    MissingApiKey,
}

impl LookupError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LookupError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// ツールハンドラが返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("{0}")]
    Failed(String),
}

/// 1ターンの処理結果としてのエラー
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model requested unknown tool(s): {}", requested.join(", "))]
    Protocol { requested: Vec<String> },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// HTTPレスポンスやログで使う安定した種別名
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidInput(_) => "invalid_input",
            RelayError::Protocol { .. } => "protocol_error",
            RelayError::Upstream(UpstreamError::Timeout(_)) => "upstream_timeout",
            RelayError::Upstream(_) => "upstream_error",
        }
    }
}
