use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::llm::TurnSummary;
use crate::profile::UserProfile;

/// POST /chat リクエスト
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub profile: UserProfile,
    /// 指定すると同じ会話のセッションを使い回す
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// POST /chat レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub conversation_id: Option<String>,
}

/// GET /chat/:conversation_id/history レスポンス
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub turns: Vec<TurnSummary>,
}

/// GET /health レスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: &'static str,
    pub documents: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

/// エラーレスポンス `{ "error": { "kind", "message" } }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// ステータスコード付きのエラーレスポンス
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, kind: "invalid_input", message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, kind: "not_found", message: message.into() }
    }
}

// 内部の詳細は返さない (ログにのみ出す)
impl From<&RelayError> for ApiError {
    fn from(e: &RelayError) -> Self {
        match e {
            RelayError::InvalidInput(msg) => ApiError::invalid_input(msg.clone()),
            RelayError::Protocol { .. } => Self {
                status: StatusCode::BAD_GATEWAY,
                kind: e.kind(),
                message: "The assistant requested a tool this service does not provide.".to_string(),
            },
            RelayError::Upstream(crate::error::UpstreamError::Timeout(_)) => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                kind: e.kind(),
                message: "The language model did not respond in time.".to_string(),
            },
            RelayError::Upstream(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                kind: e.kind(),
                message: "The language model request failed.".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { error: ErrorDetail { kind: self.kind, message: self.message } };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use std::time::Duration;

    #[test]
    fn relay_errors_map_to_statuses() {
        let cases = [
            (RelayError::InvalidInput("empty".into()), StatusCode::BAD_REQUEST, "invalid_input"),
            (RelayError::Protocol { requested: vec!["x".into()] }, StatusCode::BAD_GATEWAY, "protocol_error"),
            (RelayError::Upstream(UpstreamError::Timeout(Duration::from_secs(1))), StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            (
                RelayError::Upstream(UpstreamError::Api { status: Some(500), message: "secret detail".into() }),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
        ];
        for (err, status, kind) in cases {
            let api = ApiError::from(&err);
            assert_eq!(api.status, status);
            assert_eq!(api.kind, kind);
            assert!(!api.message.contains("secret"));
        }
    }

    #[test]
    fn chat_request_profile_defaults_to_empty() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.profile.is_empty());
        assert!(req.conversation_id.is_none());
    }
}
