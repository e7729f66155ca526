//! JSON Schema fragments shared by several tool definitions.

use serde_json::{json, Map, Value};

/// A closed object schema.
pub fn object(properties: Value, required: &[&str]) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), properties);
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema.insert("additionalProperties".to_string(), json!(false));
    Value::Object(schema)
}

pub fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub fn queue_identifier() -> Value {
    string("Queue name (e.g. \"orders\" or \"orders.fifo\") or queue ARN")
}

pub fn topic_identifier() -> Value {
    string("Topic name or topic ARN")
}

pub fn cursor() -> Value {
    string("Opaque cursor returned by the previous page; omit for the first page")
}

pub fn tags() -> Value {
    json!({
        "type": "object",
        "description": "Tag key/value pairs (at most 50; keys may not start with \"aws:\")",
        "additionalProperties": { "type": "string", "maxLength": 256 },
        "maxProperties": 50
    })
}

pub fn tag_keys() -> Value {
    json!({
        "type": "array",
        "items": { "type": "string", "minLength": 1, "maxLength": 128 },
        "minItems": 1
    })
}

pub fn message_attributes() -> Value {
    json!({
        "type": "object",
        "description": "String message attributes (at most 10)",
        "additionalProperties": { "type": "string" },
        "maxProperties": 10
    })
}

pub fn policy_statements() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "properties": {
                "sid": { "type": "string", "pattern": "^[A-Za-z0-9]+$" },
                "effect": { "type": "string", "enum": ["Allow", "Deny"] },
                "principal": {
                    "description": "\"*\" or a map such as {\"AWS\": \"arn:aws:iam::123456789012:root\"} or {\"Service\": \"sns.amazonaws.com\"}"
                },
                "action": {
                    "description": "One action or a list, all within the resource's service (sqs:* or sns:*)",
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                    ]
                },
                "resource": {
                    "type": "string",
                    "description": "Defaults to the target; other ARNs must be listed in allow_cross_resource"
                },
                "condition": {
                    "type": "object",
                    "description": "Condition block; required when allowing principal \"*\""
                }
            },
            "required": ["effect", "principal", "action"],
            "additionalProperties": false
        }
    })
}

pub fn cross_resources() -> Value {
    json!({
        "type": "array",
        "description": "Queue or topic ARNs that policy statements may target besides the resource itself",
        "items": { "type": "string" }
    })
}

pub fn message_group_id() -> Value {
    string("Ordering group; required for .fifo targets")
}

pub fn message_deduplication_id() -> Value {
    string("Deduplication id for .fifo targets; generated when omitted")
}
