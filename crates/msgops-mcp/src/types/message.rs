//! JSON-RPC 2.0 envelopes as this server sees them.
//!
//! Clients send requests and notifications; the server never issues
//! requests of its own, so a stray client reply is only logged. Everything
//! written back is a [`JsonRpcReply`] holding either a result or an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier. `Null` is only produced for replies to input whose
/// id could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s:?}"),
            RequestId::Null => f.write_str("null"),
        }
    }
}

/// A call that expects a reply. `jsonrpc` defaults to empty so a missing
/// version is reported by request validation rather than as a parse error.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A reply from the client to a server-initiated request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientReply {
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: ClientOutcome,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientOutcome {
    Result(Value),
    Error(Value),
}

/// One line of client input.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Reply(ClientReply),
}

impl JsonRpcMessage {
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            JsonRpcMessage::Reply(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Exactly one of `result` or `error`, flattened beside `id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    Result(Value),
    Error(JsonRpcErrorObject),
}

/// Every line the server writes.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl JsonRpcReply {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: ReplyOutcome::Result(result),
        }
    }

    pub fn error(id: RequestId, error: JsonRpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: ReplyOutcome::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_carries_result_or_error() {
        let ok = serde_json::to_value(JsonRpcReply::result(RequestId::Number(7), json!({}))).unwrap();
        assert_eq!(ok, json!({ "jsonrpc": "2.0", "id": 7, "result": {} }));

        let err = JsonRpcReply::error(
            RequestId::Null,
            JsonRpcErrorObject {
                code: -32700,
                message: "bad".to_string(),
                data: None,
            },
        );
        let err = serde_json::to_value(err).unwrap();
        assert_eq!(err["id"], Value::Null);
        assert_eq!(err["error"]["code"], -32700);
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_client_reply_is_not_a_request() {
        let msg: JsonRpcMessage =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 3, "result": {} })).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Reply(_)));
        assert!(msg.method().is_none());

        let bare = serde_json::from_value::<JsonRpcMessage>(json!({ "jsonrpc": "2.0", "id": 3 }));
        assert!(bare.is_err());

        let msg: JsonRpcMessage =
            serde_json::from_value(json!({ "id": "a", "method": "ping" })).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(ref r) if r.jsonrpc.is_empty()));
    }
}
