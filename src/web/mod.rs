//! HTTP surface.

pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::relay::{SessionRelay, SessionStore, StoreLimits};

#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Arc<SessionRelay>,
    pub store: Arc<SessionStore>,
}

impl AppState {
    pub fn new(relay: SessionRelay) -> Self {
        Self::with_limits(relay, StoreLimits::default())
    }

    pub fn with_limits(relay: SessionRelay, limits: StoreLimits) -> Self {
        Self { relay: Arc::new(relay), store: Arc::new(SessionStore::with_limits(limits)) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/:conversation_id/history", get(handlers::chat_history))
        .route("/chat/:conversation_id", delete(handlers::clear_chat))
        .route("/health", get(handlers::health))
        // フロントエンドは別オリジンから呼ぶ
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
