//! Queue tool definitions.

use serde_json::{json, Value};

use msgops::Operation;

use super::schema::{self, object};

pub fn description(operation: Operation) -> Option<&'static str> {
    let text = match operation {
        Operation::CreateQueue => {
            "Create a queue, or return the existing one when its configuration matches. \
             Names ending in .fifo create ordered queues. Optionally attaches an access policy."
        }
        Operation::GetQueueAttributes => "Read a queue's URL, ARN and attributes",
        Operation::SetQueueAttributes => "Change configuration attributes of a managed queue",
        Operation::SetQueuePolicy => "Replace the access policy of a managed queue",
        Operation::DeleteQueue => "Delete a managed queue and every message in it",
        Operation::ListQueues => "List queues, optionally filtered by name prefix, one page at a time",
        Operation::SendMessage => "Send one message to a queue",
        Operation::PurgeQueue => "Delete every message in a managed queue",
        Operation::TagQueue => "Add or overwrite tags on a queue",
        Operation::UntagQueue => "Remove tags from a queue",
        Operation::ListQueueTags => "List a queue's tags and whether it is managed by this server",
        _ => return None,
    };
    Some(text)
}

pub fn input_schema(operation: Operation) -> Option<Value> {
    let schema = match operation {
        Operation::CreateQueue => object(
            json!({
                "queue_name": {
                    "type": "string",
                    "description": "1-80 characters of [A-Za-z0-9_-], plus the .fifo suffix for ordered queues"
                },
                "fifo": { "type": "boolean", "description": "Must agree with the .fifo suffix when given" },
                "attributes": attributes(),
                "tags": schema::tags(),
                "policy": schema::policy_statements(),
                "allow_cross_resource": schema::cross_resources()
            }),
            &["queue_name"],
        ),
        Operation::GetQueueAttributes | Operation::DeleteQueue | Operation::PurgeQueue => object(
            json!({ "queue": schema::queue_identifier() }),
            &["queue"],
        ),
        Operation::SetQueueAttributes => object(
            json!({ "queue": schema::queue_identifier(), "attributes": attributes() }),
            &["queue", "attributes"],
        ),
        Operation::SetQueuePolicy => object(
            json!({
                "queue": schema::queue_identifier(),
                "statements": schema::policy_statements(),
                "allow_cross_resource": schema::cross_resources()
            }),
            &["queue", "statements"],
        ),
        Operation::ListQueues => object(
            json!({
                "prefix": { "type": "string", "maxLength": 80 },
                "page_size": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 100 },
                "cursor": schema::cursor()
            }),
            &[],
        ),
        Operation::SendMessage => object(
            json!({
                "queue": schema::queue_identifier(),
                "body": { "type": "string", "minLength": 1, "description": "At most 262144 bytes" },
                "delay_seconds": {
                    "type": "integer", "minimum": 0, "maximum": 900,
                    "description": "Not allowed on .fifo queues"
                },
                "message_group_id": schema::message_group_id(),
                "message_deduplication_id": schema::message_deduplication_id(),
                "message_attributes": schema::message_attributes()
            }),
            &["queue", "body"],
        ),
        Operation::TagQueue => object(
            json!({ "queue": schema::queue_identifier(), "tags": schema::tags() }),
            &["queue", "tags"],
        ),
        Operation::UntagQueue => object(
            json!({ "queue": schema::queue_identifier(), "tag_keys": schema::tag_keys() }),
            &["queue", "tag_keys"],
        ),
        Operation::ListQueueTags => object(
            json!({ "queue": schema::queue_identifier() }),
            &["queue"],
        ),
        _ => return None,
    };
    Some(schema)
}

fn attributes() -> Value {
    json!({
        "type": "object",
        "properties": {
            "visibility_timeout": { "type": "integer", "minimum": 0, "maximum": 43200 },
            "message_retention_period": { "type": "integer", "minimum": 60, "maximum": 1209600 },
            "delay_seconds": { "type": "integer", "minimum": 0, "maximum": 900 },
            "maximum_message_size": { "type": "integer", "minimum": 1024, "maximum": 262144 },
            "receive_wait_time_seconds": { "type": "integer", "minimum": 0, "maximum": 20 },
            "kms_master_key_id": { "type": "string" },
            "redrive_policy": {
                "type": "object",
                "properties": {
                    "dead_letter_target_arn": { "type": "string" },
                    "max_receive_count": { "type": "integer", "minimum": 1, "maximum": 1000 }
                },
                "required": ["dead_letter_target_arn", "max_receive_count"],
                "additionalProperties": false
            },
            "content_based_deduplication": {
                "type": "boolean",
                "description": ".fifo queues only"
            }
        },
        "additionalProperties": false
    })
}
