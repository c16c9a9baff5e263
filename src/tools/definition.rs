use std::fmt;
use std::sync::Arc;

use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Async tool handler: takes the model-supplied arguments (already validated
/// against the tool's schema) and returns a JSON result.
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync + 'static>;

/// JSON Schema (object) describing a tool's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameters(Value);

impl ToolParameters {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Schema variant accepted by Gemini function declarations, which reject
    /// `additionalProperties`.
    pub fn for_gemini(&self) -> Value {
        let mut v = self.0.clone();
        strip_key(&mut v, "additionalProperties");
        v
    }

    /// Names of required properties.
    pub fn required(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Check arguments against the declared schema. Returns a readable
    /// description of the first violation.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let obj = args
            .as_object()
            .ok_or_else(|| format!("arguments must be a JSON object, got {}", type_name(args)))?;
        let props = self.0.get("properties").and_then(|p| p.as_object());

        for name in self.required() {
            match obj.get(name) {
                None | Some(Value::Null) => return Err(format!("missing required parameter '{name}'")),
                Some(_) => {}
            }
        }

        let closed = self.0.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, value) in obj {
            let Some(schema) = props.and_then(|p| p.get(key)) else {
                if closed {
                    return Err(format!("unexpected parameter '{key}'"));
                }
                continue;
            };
            if value.is_null() {
                continue;
            }
            check_property(key, schema, value)?;
        }
        Ok(())
    }
}

fn check_property(key: &str, schema: &Value, value: &Value) -> Result<(), String> {
    let expected = schema.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let ok = match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    };
    if !ok {
        return Err(format!("parameter '{key}' must be {expected}, got {}", type_name(value)));
    }
    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(format!("parameter '{key}' must be one of {}", Value::Array(allowed.clone())));
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
            if n < min {
                return Err(format!("parameter '{key}' must be >= {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
            if n > max {
                return Err(format!("parameter '{key}' must be <= {max}"));
            }
        }
    }
    Ok(())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip_key(v: &mut Value, key: &str) {
    match v {
        Value::Object(map) => {
            map.remove(key);
            for child in map.values_mut() {
                strip_key(child, key);
            }
        }
        Value::Array(items) => {
            for child in items {
                strip_key(child, key);
            }
        }
        _ => {}
    }
}

/// Builder for object-typed parameter schemas.
#[derive(Debug, Clone)]
pub struct ToolParametersBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
    additional_properties: Option<bool>,
}

impl ToolParametersBuilder {
    pub fn new_object() -> Self {
        Self { properties: Map::new(), required: Vec::new(), additional_properties: None }
    }

    fn add(mut self, name: &str, mut schema: Value, description: Option<&str>) -> Self {
        if let (Some(d), Some(obj)) = (description, schema.as_object_mut()) {
            obj.insert("description".into(), Value::String(d.to_string()));
        }
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn add_string(self, name: &str, description: Option<&str>) -> Self {
        self.add(name, json!({ "type": "string" }), description)
    }

    pub fn add_string_enum(self, name: &str, description: Option<&str>, values: &[&str]) -> Self {
        self.add(name, json!({ "type": "string", "enum": values }), description)
    }

    pub fn add_integer(self, name: &str, description: Option<&str>, min: Option<i64>, max: Option<i64>) -> Self {
        let mut schema = json!({ "type": "integer" });
        if let Some(min) = min {
            schema["minimum"] = json!(min);
        }
        if let Some(max) = max {
            schema["maximum"] = json!(max);
        }
        self.add(name, schema, description)
    }

    pub fn required(mut self, name: &str) -> Self {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    pub fn build(self) -> ToolParameters {
        let mut schema = json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        });
        if let Some(allowed) = self.additional_properties {
            schema["additionalProperties"] = Value::Bool(allowed);
        }
        ToolParameters(schema)
    }
}

/// Metadata advertised to the model plus the local handler that serves it.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: ToolParameters,
    pub strict: bool,
    handler: ToolHandler,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("strict", &self.strict)
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(
        name: &'static str,
        description: &'static str,
        parameters: ToolParameters,
        handler: ToolHandler,
    ) -> Self {
        Self { name, description, parameters, strict: false, handler }
    }

    /// Strict function-calling mode (OpenAI only).
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn function_object(&self) -> FunctionObject {
        FunctionObject {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            parameters: Some(self.parameters.as_value().clone()),
            strict: Some(self.strict),
        }
    }

    /// OpenAI chat-completions tool entry.
    pub fn as_chat_tool(&self) -> ChatCompletionTool {
        ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: self.function_object(),
        }
    }

    /// Gemini `functionDeclarations` entry.
    pub fn as_gemini_declaration(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters.for_gemini(),
        })
    }

    /// Run the handler. Callers validate `args` first.
    pub async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        (self.handler)(args).await
    }
}
