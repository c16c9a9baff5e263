//! Tool registry: name → definition, filled once at startup.
//!
//! Lookup is exact and case-sensitive. Registration order is kept so the
//! declarations advertised to the model are stable across requests.

use std::collections::HashMap;

use crate::error::StartupError;
use crate::tools::ToolDefinition;

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: ToolDefinition) -> Result<(), StartupError> {
        if self.index.contains_key(tool.name) {
            return Err(StartupError::DuplicateTool { name: tool.name.to_string() });
        }
        tracing::debug!(target: "tools", name = tool.name, "tool_registered");
        self.index.insert(tool.name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: ToolDefinition) -> Result<Self, StartupError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
