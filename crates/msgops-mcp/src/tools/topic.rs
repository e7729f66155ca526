//! Topic and subscription tool definitions.

use serde_json::{json, Value};

use msgops::request::SUBSCRIPTION_PROTOCOLS;
use msgops::Operation;

use super::schema::{self, object};

pub fn description(operation: Operation) -> Option<&'static str> {
    let text = match operation {
        Operation::CreateTopic => {
            "Create a topic, or return the existing one when its configuration matches. \
             Names ending in .fifo create ordered topics. Optionally attaches an access policy."
        }
        Operation::GetTopicAttributes => "Read a topic's ARN and attributes",
        Operation::SetTopicPolicy => "Replace the access policy of a managed topic",
        Operation::DeleteTopic => "Delete a managed topic and its subscriptions",
        Operation::ListTopics => "List topics one page at a time",
        Operation::Subscribe => {
            "Subscribe an endpoint to a topic. With grant_queue_access an sqs endpoint \
             first gets a queue policy allowing the topic to deliver."
        }
        Operation::Unsubscribe => "Remove a subscription by ARN",
        Operation::ListSubscriptions => "List a topic's subscriptions one page at a time",
        Operation::PublishMessage => "Publish one message to a topic",
        Operation::TagTopic => "Add or overwrite tags on a topic",
        Operation::UntagTopic => "Remove tags from a topic",
        Operation::ListTopicTags => "List a topic's tags and whether it is managed by this server",
        _ => return None,
    };
    Some(text)
}

pub fn input_schema(operation: Operation) -> Option<Value> {
    let schema = match operation {
        Operation::CreateTopic => object(
            json!({
                "topic_name": {
                    "type": "string",
                    "description": "1-256 characters of [A-Za-z0-9_-], plus the .fifo suffix for ordered topics"
                },
                "fifo": { "type": "boolean", "description": "Must agree with the .fifo suffix when given" },
                "attributes": {
                    "type": "object",
                    "properties": {
                        "display_name": { "type": "string", "maxLength": 100 },
                        "content_based_deduplication": {
                            "type": "boolean",
                            "description": ".fifo topics only"
                        }
                    },
                    "additionalProperties": false
                },
                "tags": schema::tags(),
                "policy": schema::policy_statements(),
                "allow_cross_resource": schema::cross_resources()
            }),
            &["topic_name"],
        ),
        Operation::GetTopicAttributes | Operation::DeleteTopic => object(
            json!({ "topic": schema::topic_identifier() }),
            &["topic"],
        ),
        Operation::SetTopicPolicy => object(
            json!({
                "topic": schema::topic_identifier(),
                "statements": schema::policy_statements(),
                "allow_cross_resource": schema::cross_resources()
            }),
            &["topic", "statements"],
        ),
        Operation::ListTopics => object(json!({ "cursor": schema::cursor() }), &[]),
        Operation::Subscribe => object(
            json!({
                "topic": schema::topic_identifier(),
                "protocol": { "type": "string", "enum": SUBSCRIPTION_PROTOCOLS },
                "endpoint": {
                    "type": "string",
                    "description": "Queue ARN for sqs, URL for http/https, address for email, E.164 number for sms, ARN for lambda/application/firehose"
                },
                "filter_policy": { "type": "object", "description": "Message attribute filter policy" },
                "raw_message_delivery": { "type": "boolean" },
                "grant_queue_access": {
                    "type": "boolean",
                    "default": false,
                    "description": "sqs only: allow the topic to deliver into the queue before subscribing"
                }
            }),
            &["topic", "protocol", "endpoint"],
        ),
        Operation::Unsubscribe => object(
            json!({ "subscription_arn": schema::string("Subscription ARN") }),
            &["subscription_arn"],
        ),
        Operation::ListSubscriptions => object(
            json!({ "topic": schema::topic_identifier(), "cursor": schema::cursor() }),
            &["topic"],
        ),
        Operation::PublishMessage => object(
            json!({
                "topic": schema::topic_identifier(),
                "message": { "type": "string", "minLength": 1, "description": "At most 262144 bytes" },
                "subject": { "type": "string", "maxLength": 100 },
                "message_group_id": schema::message_group_id(),
                "message_deduplication_id": schema::message_deduplication_id(),
                "message_attributes": schema::message_attributes()
            }),
            &["topic", "message"],
        ),
        Operation::TagTopic => object(
            json!({ "topic": schema::topic_identifier(), "tags": schema::tags() }),
            &["topic", "tags"],
        ),
        Operation::UntagTopic => object(
            json!({ "topic": schema::topic_identifier(), "tag_keys": schema::tag_keys() }),
            &["topic", "tag_keys"],
        ),
        Operation::ListTopicTags => object(
            json!({ "topic": schema::topic_identifier() }),
            &["topic"],
        ),
        _ => return None,
    };
    Some(schema)
}
