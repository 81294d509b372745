//! Provider tool translation.
//!
//! Each downstream AI provider expects tool declarations in its own shape.
//! This is a pure structural transform over `ToolDescriptor`s — no I/O, no
//! state — keyed by a provider id string.

use serde_json::{json, Value};

use crate::catalog::ToolDescriptor;
use crate::error::McpError;

/// Provider ids with a known request shape.
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "gemini", "anthropic"];

/// Reshape unified tool descriptors for one provider's calling convention.
pub fn translate_tools(tools: &[ToolDescriptor], provider: &str) -> Result<Vec<Value>, McpError> {
    match provider {
        // Chat-completion style function calling.
        "openai" => Ok(tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.prefixed_name,
                        "description": describe(t),
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()),

        // Gemini function declarations.
        "gemini" => Ok(tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.prefixed_name,
                    "description": describe(t),
                    "parameters": t.input_schema,
                })
            })
            .collect()),

        // Anthropic tool-use blocks.
        "anthropic" => Ok(tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.prefixed_name,
                    "description": describe(t),
                    "input_schema": t.input_schema,
                })
            })
            .collect()),

        other => Err(McpError::UnsupportedProvider(other.to_string())),
    }
}

fn describe(t: &ToolDescriptor) -> String {
    let desc = t.description.as_deref().unwrap_or("External MCP tool");
    format!("[MCP: {}] {}", t.server_name, desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "search".into(),
            prefixed_name: "mcp_linear_search".into(),
            description: Some("Search issues".into()),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
            server_id: "linear".into(),
            server_name: "Linear".into(),
        }]
    }

    #[test]
    fn openai_shape_wraps_function() {
        let out = translate_tools(&sample(), "openai").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["type"], "function");
        assert_eq!(out[0]["function"]["name"], "mcp_linear_search");
        assert_eq!(out[0]["function"]["parameters"]["type"], "object");
        assert_eq!(
            out[0]["function"]["description"],
            "[MCP: Linear] Search issues"
        );
    }

    #[test]
    fn gemini_shape_is_flat_declaration() {
        let out = translate_tools(&sample(), "gemini").unwrap();
        assert_eq!(out[0]["name"], "mcp_linear_search");
        assert!(out[0].get("parameters").is_some());
        assert!(out[0].get("input_schema").is_none());
    }

    #[test]
    fn anthropic_shape_uses_input_schema() {
        let out = translate_tools(&sample(), "anthropic").unwrap();
        assert_eq!(out[0]["name"], "mcp_linear_search");
        assert!(out[0].get("input_schema").is_some());
        assert!(out[0].get("parameters").is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = translate_tools(&sample(), "cohere").unwrap_err();
        assert!(matches!(err, McpError::UnsupportedProvider(_)));
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn missing_description_gets_placeholder() {
        let mut tools = sample();
        tools[0].description = None;
        let out = translate_tools(&tools, "gemini").unwrap();
        assert_eq!(out[0]["description"], "[MCP: Linear] External MCP tool");
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(translate_tools(&[], "openai").unwrap().is_empty());
    }
}
