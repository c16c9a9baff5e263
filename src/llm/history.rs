use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::corpus::ReferenceDocument;

/// One piece of a user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Reference document, shared with the corpus (not copied per turn).
    Document(Arc<ReferenceDocument>),
    Text(String),
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider call id (generated when the provider does not send one).
    pub id: String,
    pub name: String,
    /// Arguments as sent by the model. Normally an object; a provider that
    /// sends unparsable JSON leaves the raw text here as a string.
    pub args: Value,
}

/// The answer to one `ToolCall`, fed back into the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub payload: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User { parts: Vec<Part> },
    Model { text: Option<String>, tool_calls: Vec<ToolCall> },
    ToolResult(ToolResult),
}

impl Turn {
    pub fn role(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Model { .. } => "model",
            Turn::ToolResult(_) => "tool",
        }
    }
}

/// Ordered, append-only conversation history.
///
/// Invariant: push order == send order. The system instruction is not part
/// of the history; the relay supplies it with every request.
#[derive(Debug, Default, Clone)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Add a user turn: documents first (in the given order), then text.
    pub fn add_user<S: Into<String>>(&mut self, documents: &[Arc<ReferenceDocument>], text: S) -> &mut Self {
        let mut parts: Vec<Part> = documents.iter().cloned().map(Part::Document).collect();
        parts.push(Part::Text(text.into()));
        self.turns.push(Turn::User { parts });
        self
    }

    pub fn add_model(&mut self, text: Option<String>, tool_calls: Vec<ToolCall>) -> &mut Self {
        self.turns.push(Turn::Model { text, tool_calls });
        self
    }

    pub fn add_tool_result(&mut self, result: ToolResult) -> &mut Self {
        self.turns.push(Turn::ToolResult(result));
        self
    }

    /// Drop every turn after the first `len` (used to undo a failed turn).
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::Model { tool_calls, .. } => Some(tool_calls.iter()),
                _ => None,
            })
            .flatten()
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns.iter().filter_map(|t| match t {
            Turn::ToolResult(r) => Some(r),
            _ => None,
        })
    }

    /// Serializable view without document bytes.
    pub fn summaries(&self) -> Vec<TurnSummary> {
        self.turns.iter().map(TurnSummary::from).collect()
    }
}

/// History entry as exposed over HTTP.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnSummary {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
}

impl From<&Turn> for TurnSummary {
    fn from(turn: &Turn) -> Self {
        let mut s = TurnSummary {
            role: turn.role(),
            documents: Vec::new(),
            text: None,
            tool_calls: Vec::new(),
            tool_result: None,
        };
        match turn {
            Turn::User { parts } => {
                for p in parts {
                    match p {
                        Part::Document(d) => s.documents.push(d.name.clone()),
                        Part::Text(t) => s.text = Some(t.clone()),
                    }
                }
            }
            Turn::Model { text, tool_calls } => {
                s.text = text.clone();
                s.tool_calls = tool_calls.iter().map(|c| c.name.clone()).collect();
            }
            Turn::ToolResult(r) => {
                s.text = Some(r.name.clone());
                s.tool_result = Some(r.payload.clone());
            }
        }
        s
    }
}
