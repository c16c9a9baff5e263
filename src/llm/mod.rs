//! Hosted conversational model seam.
//!
//! The relay owns the session history and hands the whole of it to a
//! `ChatModel` on every call; adapters translate it to their wire format.

pub mod gemini;
pub mod history;
pub mod openai;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::corpus::ReferenceDocument;
use crate::error::{StartupError, UpstreamError};
use crate::tools::ToolDefinition;

pub use gemini::GeminiModel;
pub use history::{ConversationHistory, Part, ToolCall, ToolResult, Turn, TurnSummary};
pub use openai::OpenAiModel;
pub use retry::RetryPolicy;

/// Everything a single model call needs.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub tools: &'a [ToolDefinition],
    pub history: &'a [Turn],
}

/// Text and/or tool calls returned by the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), tool_calls: Vec::new() }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logs and health output.
    fn provider(&self) -> &'static str;

    /// Reject, at startup, documents this provider cannot transport.
    fn check_corpus(&self, _documents: &[Arc<ReferenceDocument>]) -> Result<(), StartupError> {
        Ok(())
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, UpstreamError>;
}
