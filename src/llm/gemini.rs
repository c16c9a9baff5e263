//! Gemini REST adapter (`models/{model}:generateContent`).
//!
//! Documents travel as `inlineData` parts, tool declarations as
//! `functionDeclarations`, tool results as `functionResponse` parts.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::config::ModelConfig;
use crate::error::{StartupError, UpstreamError};
use crate::llm::{ChatModel, ModelReply, ModelRequest, Part as TurnPart, ToolCall, Turn};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    base_url: String,
}

impl std::fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModel").field("model", &self.model).finish()
    }
}

impl GeminiModel {
    pub fn new(config: &ModelConfig) -> Result<Self, StartupError> {
        let client = Client::builder()
            .user_agent(concat!("agro_relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StartupError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_output_tokens: config.max_tokens,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the adapter at another endpoint root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send_request(&self, body: &GenerateContentRequest) -> Result<GenerateContentResponse, UpstreamError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(format!("Gemini API request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        response
            .json()
            .await
            .map_err(|err| UpstreamError::Malformed(format!("Failed to parse Gemini response: {err}")))
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    #[instrument(name = "gemini_generate", skip(self, request), fields(model = %self.model, history_len = request.history.len()))]
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, UpstreamError> {
        let body = build_request(&request, self.max_output_tokens);
        info!(target: "llm", model = %self.model, contents = body.contents.len(), "gemini_request");
        let resp = self.send_request(&body).await?;
        let reply = parse_response(resp)?;
        debug!(target: "llm", tool_calls = reply.tool_calls.len(), has_text = reply.text.is_some(), "gemini_response");
        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn text_part(text: impl Into<String>) -> Part {
    Part { text: Some(text.into()), ..Part::default() }
}

/// Translate the provider-neutral request into a Gemini request body.
pub(crate) fn build_request(request: &ModelRequest<'_>, max_output_tokens: u32) -> GenerateContentRequest {
    let mut contents: Vec<Content> = Vec::new();

    for turn in request.history {
        let (role, parts) = match turn {
            Turn::User { parts } => {
                let parts = parts
                    .iter()
                    .map(|p| match p {
                        TurnPart::Document(doc) => Part {
                            inline_data: Some(InlineData {
                                mime_type: doc.mime_type.clone(),
                                data: BASE64_STANDARD.encode(&doc.bytes),
                            }),
                            ..Part::default()
                        },
                        TurnPart::Text(t) => text_part(t.clone()),
                    })
                    .collect();
                ("user", parts)
            }
            Turn::Model { text, tool_calls } => {
                let mut parts = Vec::new();
                if let Some(t) = text.as_ref().filter(|t| !t.is_empty()) {
                    parts.push(text_part(t.clone()));
                }
                for call in tool_calls {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: call.name.clone(),
                            args: call.args.clone(),
                        }),
                        ..Part::default()
                    });
                }
                ("model", parts)
            }
            Turn::ToolResult(result) => {
                let response = match &result.payload {
                    Value::Object(_) => result.payload.clone(),
                    other => json!({ "result": other }),
                };
                let part = Part {
                    function_response: Some(FunctionResponse { id: None, name: result.name.clone(), response }),
                    ..Part::default()
                };
                ("user", vec![part])
            }
        };

        // Gemini rejects empty `parts`.
        if parts.is_empty() {
            continue;
        }
        // Gemini expects alternating roles; merge consecutive same-role turns.
        match contents.last_mut() {
            Some(last) if last.role == role => last.parts.extend(parts),
            _ => contents.push(Content { role: role.to_string(), parts }),
        }
    }

    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        let declarations: Vec<Value> = request.tools.iter().map(|t| t.as_gemini_declaration()).collect();
        vec![json!({ "functionDeclarations": declarations })]
    };

    let system_instruction = (!request.system_instruction.is_empty()).then(|| Content {
        role: String::new(),
        parts: vec![text_part(request.system_instruction)],
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        tools,
        generation_config: GenerationConfig { max_output_tokens },
    }
}

/// Collect text and function calls from the first candidate.
pub(crate) fn parse_response(response: GenerateContentResponse) -> Result<ModelReply, UpstreamError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(UpstreamError::Empty(reason));
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut texts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(t) = part.text.filter(|t| !t.is_empty()) {
            texts.push(t);
        }
        if let Some(fc) = part.function_call {
            tool_calls.push(ToolCall {
                id: fc.id.unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: fc.name,
                args: if fc.args.is_null() { json!({}) } else { fc.args },
            });
        }
    }

    if texts.is_empty() && tool_calls.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "empty content".to_string());
        return Err(UpstreamError::Empty(reason));
    }

    let text = (!texts.is_empty()).then(|| texts.concat());
    Ok(ModelReply { text, tool_calls })
}

fn map_http_error(status: StatusCode, body: String) -> UpstreamError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() { msg } else { format!("{status_text}: {msg}") }
        })
        .unwrap_or_else(|_| body.clone());

    UpstreamError::Api { status: Some(status.as_u16()), message }
}
