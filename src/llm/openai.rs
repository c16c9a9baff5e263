//! OpenAI chat-completions adapter.
//!
//! Chat completions have no binary document part, so only text-like reference
//! documents are accepted (inlined ahead of the user text); anything else is
//! rejected at startup by `check_corpus`.

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, FunctionCall,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::ModelConfig;
use crate::corpus::ReferenceDocument;
use crate::error::{StartupError, UpstreamError};
use crate::llm::{ChatModel, ModelReply, ModelRequest, Part, ToolCall, Turn};

/// トークン制限戦略を表現する列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenLimitStrategy {
    /// `max_tokens` を使用（4oモデル向け）
    MaxTokens,
    /// `max_completion_tokens` を使用（5系・oシリーズ向け）
    MaxCompletionTokens,
}

/// モデル名からトークン制限戦略を判定する
fn determine_token_limit_strategy(model: &str) -> TokenLimitStrategy {
    if model.contains("4o") || model.starts_with("gpt-4") || model.starts_with("gpt-3.5") {
        TokenLimitStrategy::MaxTokens
    } else {
        TokenLimitStrategy::MaxCompletionTokens
    }
}

#[derive(Clone)]
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModel").field("model", &self.model).finish()
    }
}

impl OpenAiModel {
    pub fn new(config: &ModelConfig) -> Self {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(config.api_key.clone()));
        Self { client, model: config.model.clone(), max_tokens: config.max_tokens }
    }

    fn build_request(&self, request: &ModelRequest<'_>) -> Result<CreateChatCompletionRequest, UpstreamError> {
        let messages = build_messages(request)?;
        let tools: Vec<ChatCompletionTool> = request.tools.iter().map(|t| t.as_chat_tool()).collect();

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(messages);
        if !tools.is_empty() {
            builder.tools(tools);
        }
        match determine_token_limit_strategy(&self.model) {
            TokenLimitStrategy::MaxTokens => builder.max_tokens(self.max_tokens),
            TokenLimitStrategy::MaxCompletionTokens => builder.max_completion_tokens(self.max_tokens),
        };
        builder.build().map_err(map_openai_error)
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn check_corpus(&self, documents: &[Arc<ReferenceDocument>]) -> Result<(), StartupError> {
        match documents.iter().find(|d| d.as_text().is_none()) {
            Some(doc) => Err(StartupError::UnsupportedDocument {
                provider: "openai",
                name: doc.name.clone(),
                mime_type: doc.mime_type.clone(),
            }),
            None => Ok(()),
        }
    }

    #[instrument(name = "openai_generate", skip(self, request), fields(model = %self.model, history_len = request.history.len()))]
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, UpstreamError> {
        let req = self.build_request(&request)?;
        info!(target: "llm", model = %self.model, max_tokens = self.max_tokens, "openai_request");
        let resp = self.client.chat().create(req).await.map_err(map_openai_error)?;
        debug!(target: "llm", choices = resp.choices.len(), "openai_response");

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Empty("no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.function.name,
                // 引数JSONが壊れている場合は生文字列のまま残し、リゾルバで報告する
                args: serde_json::from_str(&c.function.arguments).unwrap_or(Value::String(c.function.arguments)),
            })
            .collect::<Vec<_>>();
        let text = choice.message.content.filter(|t| !t.is_empty());

        if text.is_none() && tool_calls.is_empty() {
            return Err(UpstreamError::Empty("empty message".to_string()));
        }
        Ok(ModelReply { text, tool_calls })
    }
}

/// Render a user turn as one text block: documents first, then the turn text.
fn render_user_parts(parts: &[Part]) -> Result<String, UpstreamError> {
    let mut out = String::new();
    for part in parts {
        match part {
            Part::Document(doc) => {
                let body = doc.as_text().ok_or_else(|| {
                    UpstreamError::Request(format!("document {} ({}) is not text", doc.name, doc.mime_type))
                })?;
                out.push_str(&format!("[Reference document: {}]\n{}\n[End of {}]\n\n", doc.name, body, doc.name));
            }
            Part::Text(t) => out.push_str(t),
        }
    }
    Ok(out)
}

fn build_messages(request: &ModelRequest<'_>) -> Result<Vec<ChatCompletionRequestMessage>, UpstreamError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.history.len() + 1);
    if !request.system_instruction.is_empty() {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_instruction)
            .build()
            .map_err(map_openai_error)?;
        messages.push(system.into());
    }

    for turn in request.history {
        let msg: ChatCompletionRequestMessage = match turn {
            Turn::User { parts } => ChatCompletionRequestUserMessageArgs::default()
                .content(render_user_parts(parts)?)
                .build()
                .map_err(map_openai_error)?
                .into(),
            Turn::Model { text, tool_calls } => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(t) = text {
                    builder.content(t.clone());
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|c| ChatCompletionMessageToolCall {
                            id: c.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: match &c.args {
                                    Value::String(raw) => raw.clone(),
                                    other => other.to_string(),
                                },
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build().map_err(map_openai_error)?.into()
            }
            Turn::ToolResult(result) => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(result.call_id.clone())
                .content(result.payload.to_string())
                .build()
                .map_err(map_openai_error)?
                .into(),
        };
        messages.push(msg);
    }
    Ok(messages)
}

fn map_openai_error(e: OpenAIError) -> UpstreamError {
    match e {
        OpenAIError::Reqwest(err) => UpstreamError::Transport(err.to_string()),
        OpenAIError::ApiError(api) => UpstreamError::Api { status: api_error_status(&api), message: api.message },
        OpenAIError::JSONDeserialize(err) => UpstreamError::Malformed(err.to_string()),
        other => UpstreamError::Request(other.to_string()),
    }
}

/// async-openai drops the HTTP status, so recover it from the error type/code.
///
/// The client has already backed off on 429/5xx by the time these surface;
/// mapping them keeps `RetryPolicy` consistent across providers.
fn api_error_status(api: &ApiError) -> Option<u16> {
    let kind = api.r#type.as_deref();
    let code = api.code.as_deref();
    // 請求上限の 429 は待っても回復しない
    if kind == Some("insufficient_quota") || code == Some("insufficient_quota") {
        return None;
    }
    match (kind, code) {
        (_, Some("rate_limit_exceeded")) | (Some("requests" | "tokens" | "rate_limit_error"), _) => Some(429),
        (Some("server_error" | "api_error"), _) => Some(500),
        // 5xx の本文は JSON でないため type も code も付かない
        (None, None) => Some(500),
        (Some("authentication_error"), _) | (_, Some("invalid_api_key")) => Some(401),
        (Some("invalid_request_error"), _) => Some(400),
        _ => None,
    }
}
