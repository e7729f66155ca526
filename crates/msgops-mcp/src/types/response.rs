//! MCP response types for tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use msgops::ToolResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }

    /// Wrap a dispatcher result: the JSON goes in the first text block and
    /// error results set `isError`.
    pub fn from_tool_result(result: &ToolResult) -> Self {
        let text = serde_json::to_string_pretty(result).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "error": {
                    "classification": "RemoteFailure",
                    "message": format!("failed to encode result: {e}"),
                    "retryable": false,
                }
            })
            .to_string()
        });
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: (!result.is_ok()).then_some(true),
        }
    }

    /// The decoded `ToolResult` carried in the first text block.
    pub fn tool_result(&self) -> Option<ToolResult> {
        self.content.iter().find_map(|c| match c {
            ToolContent::Text { text } => serde_json::from_str(text).ok(),
        })
    }
}

/// Behavioural hints shown to clients next to each tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub read_only_hint: bool,
    pub destructive_hint: bool,
    pub idempotent_hint: bool,
    pub open_world_hint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
