//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the agent look at the world: list tables, read a
//! schema, run a query. The core does not define what any tool means; it
//! only resolves names and turns failures into observations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ToolError;

/// The input the model supplied for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolInput {
    /// A plain string (the common case: a SQL query, a table list).
    Text(String),
    /// Any other JSON value.
    Structured(serde_json::Value),
}

impl ToolInput {
    /// Build from a decoded JSON value; strings become `Text`.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }

    /// The input as text, the way most tools consume it.
    ///
    /// Structured input is serialized back to compact JSON, except for an
    /// object with a single string field which yields that string.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(serde_json::Value::Object(map)) if map.len() == 1 => {
                match map.values().next() {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    _ => serde_json::Value::Object(map.clone()).to_string(),
                }
            }
            Self::Structured(v) => v.to_string(),
        }
    }
}

impl From<&str> for ToolInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Name and description of a tool, as shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "sql_db_query").
    fn name(&self) -> &str;

    /// What this tool does and what input it expects (sent to the model).
    fn description(&self) -> &str;

    /// Run the tool. The returned text becomes the observation.
    async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError>;

    fn to_description(&self) -> ToolDescription {
        ToolDescription {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// A registry of the tools available to one agent.
///
/// Ordered by name so prompts render deterministically.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, "Registering tool");
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool replaced an existing registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool descriptions (for the prompt).
    pub fn descriptions(&self) -> Vec<ToolDescription> {
        self.tools.values().map(|t| t.to_description()).collect()
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, input: &ToolInput) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.invoke(input).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError> {
            Ok(input.as_text())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.contains("echo"));
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_descriptions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let descs = registry.descriptions();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_invoke_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let out = registry
            .invoke("echo", &ToolInput::from("hello world"))
            .await
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn registry_invoke_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke("nonexistent", &ToolInput::from(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn tool_input_from_json() {
        assert_eq!(
            ToolInput::from_json(serde_json::json!("SELECT 1")),
            ToolInput::Text("SELECT 1".into())
        );
        let structured = ToolInput::from_json(serde_json::json!({"tables": "a, b"}));
        assert_eq!(structured.as_text(), "a, b");
        let list = ToolInput::from_json(serde_json::json!([1, 2]));
        assert_eq!(list.as_text(), "[1,2]");
    }
}
