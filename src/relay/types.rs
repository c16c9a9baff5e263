use serde_json::{json, Value};
use std::fmt::{self, Display};

use crate::error::{LookupError, ToolError};

/// Relay state machine (one turn).
///
/// `Idle → AwaitingModel → (ToolRequested → AwaitingToolResult → AwaitingModel)* → Responded`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    AwaitingModel,
    ToolRequested,
    AwaitingToolResult,
    Responded,
}

/// ツール呼び出しを実際に解決・実行した結果
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResolution {
    /// ツールが存在し、引数が検証を通り、正常実行された
    Executed { name: String, result: Value },
    /// ツール名が登録されていない (ProtocolError)
    ToolNotFound { requested: String },
    /// 引数がJSONオブジェクトとして解釈できない
    ArgumentsParseError { name: String, raw: String, error: String },
    /// 引数がスキーマに合わない
    InvalidArguments { name: String, error: String },
    /// 実行中に handler がエラーを返した
    ExecutionError { name: String, error: ToolError },
    /// 1ターンのラウンド上限を超えたため実行しなかった
    RoundLimitReached { name: String },
}

impl ToolResolution {
    pub fn is_executed(&self) -> bool {
        matches!(self, ToolResolution::Executed { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            ToolResolution::Executed { name, .. }
            | ToolResolution::ArgumentsParseError { name, .. }
            | ToolResolution::InvalidArguments { name, .. }
            | ToolResolution::ExecutionError { name, .. }
            | ToolResolution::RoundLimitReached { name } => name,
            ToolResolution::ToolNotFound { requested } => requested,
        }
    }

    /// 外部参照サービスの失敗であればその詳細
    pub fn lookup_error(&self) -> Option<&LookupError> {
        match self {
            ToolResolution::ExecutionError { error: ToolError::Lookup(e), .. } => Some(e),
            _ => None,
        }
    }

    /// ToolResult としてモデルに返すペイロード
    pub fn to_payload(&self) -> Value {
        match self {
            ToolResolution::Executed { result, .. } => result.clone(),
            ToolResolution::ToolNotFound { requested } => json!({
                "error": { "kind": "unknown_tool", "message": format!("tool {requested} is not available") }
            }),
            ToolResolution::ArgumentsParseError { error, .. } => json!({
                "error": { "kind": "invalid_arguments", "message": format!("arguments are not a JSON object: {error}") }
            }),
            ToolResolution::InvalidArguments { error, .. } => json!({
                "error": { "kind": "invalid_arguments", "message": error }
            }),
            ToolResolution::ExecutionError { error: ToolError::Lookup(e), .. } => {
                let mut detail = json!({ "kind": "lookup_failed", "message": e.to_string() });
                if let LookupError::Status { status, body } = e {
                    detail["status"] = json!(status);
                    detail["body"] = json!(body);
                }
                json!({ "error": detail })
            }
            ToolResolution::ExecutionError { error, .. } => json!({
                "error": { "kind": "tool_failed", "message": error.to_string() }
            }),
            ToolResolution::RoundLimitReached { .. } => json!({
                "error": { "kind": "tool_round_limit", "message": "tool call limit reached for this turn" }
            }),
        }
    }
}

// Display はログで %resolution として使う
impl Display for ToolResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResolution::Executed { name, result } => write!(f, "Executed name={} result={}", name, result),
            ToolResolution::ToolNotFound { requested } => write!(f, "ToolNotFound requested={}", requested),
            ToolResolution::ArgumentsParseError { name, raw, error } => {
                write!(f, "ArgumentsParseError name={} error={} raw={}", name, error, raw)
            }
            ToolResolution::InvalidArguments { name, error } => {
                write!(f, "InvalidArguments name={} error={}", name, error)
            }
            ToolResolution::ExecutionError { name, error } => write!(f, "ExecutionError name={} error={}", name, error),
            ToolResolution::RoundLimitReached { name } => write!(f, "RoundLimitReached name={}", name),
        }
    }
}

/// 1ターンの結果
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// ユーザーに返すテキスト
    pub reply: String,
    /// 終了キーワードで打ち切った場合 true (モデル呼び出しなし)
    pub exited: bool,
    /// このターンで解決したツール呼び出し (発生順)
    pub resolutions: Vec<ToolResolution>,
    /// ツールラウンド数
    pub tool_rounds: usize,
}

/// handle_turn の途中経過 (ロガーに渡す)
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Transition { from: RelayState, to: RelayState },
    ModelReplied { round: usize, text_len: usize, tool_calls: usize },
    ToolDispatched { round: usize, name: String },
    ToolResolved { round: usize, resolution: ToolResolution },
}

impl Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::Transition { from, to } => write!(f, "Transition {:?} -> {:?}", from, to),
            RelayEvent::ModelReplied { round, text_len, tool_calls } => {
                write!(f, "ModelReplied @{} text_len={} tool_calls={}", round, text_len, tool_calls)
            }
            RelayEvent::ToolDispatched { round, name } => write!(f, "ToolDispatched @{} name={}", round, name),
            RelayEvent::ToolResolved { round, resolution } => write!(f, "ToolResolved @{} => {}", round, resolution),
        }
    }
}
