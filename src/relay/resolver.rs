use serde_json::Value;
use tracing::debug;

use crate::llm::ToolCall;
use crate::tools::ToolRegistry;

use super::types::ToolResolution;

/// Resolve the model's tool call against the registry, validate its
/// arguments against the declared schema, and run the handler.
///
/// Never panics; every failure is described by the returned variant.
pub async fn resolve_and_execute_tool_call(call: &ToolCall, registry: &ToolRegistry) -> ToolResolution {
    let Some(tool) = registry.get(&call.name) else {
        return ToolResolution::ToolNotFound { requested: call.name.clone() };
    };

    let args = match &call.args {
        Value::Object(_) => call.args.clone(),
        // OpenAI が壊れた JSON を返した場合は生文字列が入っている
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(v @ Value::Object(_)) => v,
            Ok(other) => {
                return ToolResolution::ArgumentsParseError {
                    name: tool.name.to_string(),
                    raw: raw.clone(),
                    error: format!("expected object, got {other}"),
                };
            }
            Err(e) => {
                return ToolResolution::ArgumentsParseError {
                    name: tool.name.to_string(),
                    raw: raw.clone(),
                    error: e.to_string(),
                };
            }
        },
        other => {
            return ToolResolution::ArgumentsParseError {
                name: tool.name.to_string(),
                raw: other.to_string(),
                error: "expected object".to_string(),
            };
        }
    };

    if let Err(error) = tool.parameters.validate(&args) {
        return ToolResolution::InvalidArguments { name: tool.name.to_string(), error };
    }

    debug!(target: "relay", tool = tool.name, args = %args, "tool_execute");
    match tool.execute(args).await {
        Ok(v) => ToolResolution::Executed { name: tool.name.to_string(), result: v },
        Err(e) => ToolResolution::ExecutionError { name: tool.name.to_string(), error: e },
    }
}
