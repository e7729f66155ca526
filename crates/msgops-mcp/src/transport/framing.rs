//! Message framing for newline-delimited JSON.

use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Largest accepted inbound or outbound message.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Parse a single line of text as a JSON-RPC message.
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(McpError::ContentTooLarge {
            size: line.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message(value: &serde_json::Value) -> McpResult<String> {
    let mut json = serde_json::to_string(value).map_err(McpError::Json)?;
    if json.len() > MAX_MESSAGE_BYTES {
        return Err(McpError::ContentTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_oversized_line_rejected() {
        let line = format!("{{\"pad\":\"{}\"}}", "x".repeat(MAX_MESSAGE_BYTES));
        let err = assert_err!(parse_message(&line));
        assert!(matches!(err, McpError::ContentTooLarge { .. }));
        assert_eq!(err.code(), crate::types::mcp_error_codes::CONTENT_TOO_LARGE);
    }

    #[test]
    fn test_notification_parses() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert_eq!(msg.method(), Some("notifications/initialized"));
    }

    #[test]
    fn test_frame_ends_with_newline() {
        let framed = frame_message(&serde_json::json!({"ok": true})).unwrap();
        assert!(framed.ends_with('\n'));
        assert_eq!(framed.matches('\n').count(), 1);
    }
}
