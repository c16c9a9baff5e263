use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::relay::{is_exit_command, Session};

use super::models::{ApiError, ChatRequest, ChatResponse, HealthResponse, HistoryResponse};
use super::AppState;

const MAX_CONVERSATION_ID_LEN: usize = 128;

/// POST /chat - メッセージとプロフィールを受け取りモデルの応答を返す
pub async fn chat(State(state): State<AppState>, payload: Result<Json<ChatRequest>, JsonRejection>) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            warn!(target: "web", error = %rejection, "chat_bad_body");
            return ApiError::invalid_input(rejection.body_text()).into_response();
        }
    };

    let conversation_id = req.conversation_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
    if conversation_id.as_ref().is_some_and(|id| id.len() > MAX_CONVERSATION_ID_LEN) {
        return ApiError::invalid_input("conversation_id is too long").into_response();
    }
    info!(
        target: "web",
        message_len = req.message.len(),
        profile_fields = req.profile.len(),
        conversation = conversation_id.as_deref().unwrap_or("-"),
        "chat_request"
    );

    // 終了コマンドと空メッセージは履歴に触れないのでストアに登録しない
    let touches_history = !is_exit_command(&req.message) && !req.message.trim().is_empty();
    let result = match conversation_id.as_deref().filter(|_| touches_history) {
        Some(id) => {
            let shared = state.store.get_or_create(id);
            let mut session = shared.lock().await;
            state.relay.handle_turn(&mut session, &req.message, &req.profile).await
        }
        None => {
            let mut session = Session::ephemeral();
            state.relay.handle_turn(&mut session, &req.message, &req.profile).await
        }
    };

    match result {
        Ok(outcome) => Json(ChatResponse { response: outcome.reply, conversation_id }).into_response(),
        Err(e) => {
            match &e {
                RelayError::InvalidInput(_) => warn!(target: "web", error = %e, "chat_rejected"),
                _ => error!(target: "web", error = %e, kind = e.kind(), "chat_failed"),
            }
            ApiError::from(&e).into_response()
        }
    }
}

/// GET /chat/:conversation_id/history
pub async fn chat_history(State(state): State<AppState>, Path(conversation_id): Path<String>) -> Response {
    let Some(shared) = state.store.get(&conversation_id) else {
        return ApiError::not_found(format!("no conversation {conversation_id}")).into_response();
    };
    let turns = shared.lock().await.history().summaries();
    Json(HistoryResponse { conversation_id, turns }).into_response()
}

/// DELETE /chat/:conversation_id
pub async fn clear_chat(State(state): State<AppState>, Path(conversation_id): Path<String>) -> impl IntoResponse {
    let removed = state.store.remove(&conversation_id);
    info!(target: "web", conversation = %conversation_id, removed, "chat_cleared");
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        provider: state.relay.provider(),
        documents: state.relay.corpus().len(),
        sessions: state.store.len(),
    })
}
