//! Typed tool requests.
//!
//! Every tool name maps to one [`ToolRequest`] variant with its own argument
//! record. Decoding rejects unknown tools and unknown or mistyped fields;
//! range checks that need no remote state live next to the records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::policy::StatementInput;
use crate::types::{Attributes, OpsError, OpsResult, Tags};

/// Largest message body accepted by queues and topics.
pub const MAX_MESSAGE_BYTES: usize = 262_144;
/// Longest topic display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 100;
/// Longest publish subject.
pub const MAX_SUBJECT_LEN: usize = 100;
/// Largest `list-queues` page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Every tool the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    CreateQueue,
    GetQueueAttributes,
    SetQueueAttributes,
    SetQueuePolicy,
    DeleteQueue,
    ListQueues,
    SendMessage,
    PurgeQueue,
    TagQueue,
    UntagQueue,
    ListQueueTags,
    CreateTopic,
    GetTopicAttributes,
    SetTopicPolicy,
    DeleteTopic,
    ListTopics,
    Subscribe,
    Unsubscribe,
    ListSubscriptions,
    PublishMessage,
    TagTopic,
    UntagTopic,
    ListTopicTags,
}

impl Operation {
    pub const ALL: [Operation; 23] = [
        Operation::CreateQueue,
        Operation::GetQueueAttributes,
        Operation::SetQueueAttributes,
        Operation::SetQueuePolicy,
        Operation::DeleteQueue,
        Operation::ListQueues,
        Operation::SendMessage,
        Operation::PurgeQueue,
        Operation::TagQueue,
        Operation::UntagQueue,
        Operation::ListQueueTags,
        Operation::CreateTopic,
        Operation::GetTopicAttributes,
        Operation::SetTopicPolicy,
        Operation::DeleteTopic,
        Operation::ListTopics,
        Operation::Subscribe,
        Operation::Unsubscribe,
        Operation::ListSubscriptions,
        Operation::PublishMessage,
        Operation::TagTopic,
        Operation::UntagTopic,
        Operation::ListTopicTags,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateQueue => "create-queue",
            Operation::GetQueueAttributes => "get-queue-attributes",
            Operation::SetQueueAttributes => "set-queue-attributes",
            Operation::SetQueuePolicy => "set-queue-policy",
            Operation::DeleteQueue => "delete-queue",
            Operation::ListQueues => "list-queues",
            Operation::SendMessage => "send-message",
            Operation::PurgeQueue => "purge-queue",
            Operation::TagQueue => "tag-queue",
            Operation::UntagQueue => "untag-queue",
            Operation::ListQueueTags => "list-queue-tags",
            Operation::CreateTopic => "create-topic",
            Operation::GetTopicAttributes => "get-topic-attributes",
            Operation::SetTopicPolicy => "set-topic-policy",
            Operation::DeleteTopic => "delete-topic",
            Operation::ListTopics => "list-topics",
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::ListSubscriptions => "list-subscriptions",
            Operation::PublishMessage => "publish-message",
            Operation::TagTopic => "tag-topic",
            Operation::UntagTopic => "untag-topic",
            Operation::ListTopicTags => "list-topic-tags",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }

    /// Tools that never change remote state.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Operation::GetQueueAttributes
                | Operation::ListQueues
                | Operation::ListQueueTags
                | Operation::GetTopicAttributes
                | Operation::ListTopics
                | Operation::ListSubscriptions
                | Operation::ListTopicTags
        )
    }

    /// Tools that delete resources or data.
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            Operation::DeleteQueue
                | Operation::PurgeQueue
                | Operation::UntagQueue
                | Operation::DeleteTopic
                | Operation::Unsubscribe
                | Operation::UntagTopic
        )
    }

    /// Tools whose repetition with the same arguments has no further effect.
    pub fn is_idempotent(self) -> bool {
        !matches!(self, Operation::SendMessage | Operation::PublishMessage)
    }

    /// Mutations refused on resources msgops did not create.
    pub fn is_guarded(self) -> bool {
        matches!(
            self,
            Operation::SetQueueAttributes
                | Operation::SetQueuePolicy
                | Operation::DeleteQueue
                | Operation::PurgeQueue
                | Operation::SetTopicPolicy
                | Operation::DeleteTopic
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dead-letter configuration of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedrivePolicy {
    pub dead_letter_target_arn: String,
    pub max_receive_count: u32,
}

/// Configurable queue attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default)]
    pub visibility_timeout: Option<u32>,
    #[serde(default)]
    pub message_retention_period: Option<u32>,
    #[serde(default)]
    pub delay_seconds: Option<u32>,
    #[serde(default)]
    pub maximum_message_size: Option<u32>,
    #[serde(default)]
    pub receive_wait_time_seconds: Option<u32>,
    #[serde(default)]
    pub kms_master_key_id: Option<String>,
    #[serde(default)]
    pub redrive_policy: Option<RedrivePolicy>,
    #[serde(default)]
    pub content_based_deduplication: Option<bool>,
}

impl QueueConfig {
    pub fn is_empty(&self) -> bool {
        self == &QueueConfig::default()
    }

    /// Range-check and render as remote attribute names.
    ///
    /// The dead-letter ARN is only syntax-checked by the caller; here it is
    /// carried through as given.
    pub fn to_attributes(&self, fifo: bool) -> OpsResult<Attributes> {
        let mut out = Attributes::new();
        put_ranged(&mut out, "VisibilityTimeout", self.visibility_timeout, 0, 43_200)?;
        put_ranged(
            &mut out,
            "MessageRetentionPeriod",
            self.message_retention_period,
            60,
            1_209_600,
        )?;
        put_ranged(&mut out, "DelaySeconds", self.delay_seconds, 0, 900)?;
        put_ranged(&mut out, "MaximumMessageSize", self.maximum_message_size, 1024, 262_144)?;
        put_ranged(
            &mut out,
            "ReceiveMessageWaitTimeSeconds",
            self.receive_wait_time_seconds,
            0,
            20,
        )?;

        if let Some(key) = &self.kms_master_key_id {
            if key.trim().is_empty() {
                return Err(OpsError::InvalidArgument(
                    "kms_master_key_id must not be empty".to_string(),
                ));
            }
            out.insert("KmsMasterKeyId".to_string(), key.clone());
        }

        if let Some(redrive) = &self.redrive_policy {
            if !(1..=1000).contains(&redrive.max_receive_count) {
                return Err(OpsError::InvalidArgument(format!(
                    "redrive_policy.max_receive_count must be 1-1000, got {}",
                    redrive.max_receive_count
                )));
            }
            let rendered = serde_json::json!({
                "deadLetterTargetArn": redrive.dead_letter_target_arn,
                "maxReceiveCount": redrive.max_receive_count,
            });
            out.insert("RedrivePolicy".to_string(), rendered.to_string());
        }

        if let Some(enabled) = self.content_based_deduplication {
            if !fifo {
                return Err(OpsError::InvalidArgument(
                    "content_based_deduplication requires a .fifo queue".to_string(),
                ));
            }
            out.insert("ContentBasedDeduplication".to_string(), enabled.to_string());
        }

        Ok(out)
    }
}

fn put_ranged(
    out: &mut Attributes,
    name: &str,
    value: Option<u32>,
    min: u32,
    max: u32,
) -> OpsResult<()> {
    if let Some(value) = value {
        if !(min..=max).contains(&value) {
            return Err(OpsError::InvalidArgument(format!(
                "{name} must be {min}-{max}, got {value}"
            )));
        }
        out.insert(name.to_string(), value.to_string());
    }
    Ok(())
}

/// Configurable topic attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicConfig {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub content_based_deduplication: Option<bool>,
}

impl TopicConfig {
    pub fn to_attributes(&self, fifo: bool) -> OpsResult<Attributes> {
        let mut out = Attributes::new();
        if let Some(name) = &self.display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_LEN {
                return Err(OpsError::InvalidArgument(format!(
                    "display_name exceeds {MAX_DISPLAY_NAME_LEN} characters"
                )));
            }
            out.insert("DisplayName".to_string(), name.clone());
        }
        if let Some(enabled) = self.content_based_deduplication {
            if !fifo {
                return Err(OpsError::InvalidArgument(
                    "content_based_deduplication requires a .fifo topic".to_string(),
                ));
            }
            out.insert("ContentBasedDeduplication".to_string(), enabled.to_string());
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateQueueArgs {
    pub queue_name: String,
    #[serde(default)]
    pub fifo: Option<bool>,
    #[serde(default)]
    pub attributes: QueueConfig,
    #[serde(default)]
    pub tags: Tags,
    /// Statements attached right after creation.
    #[serde(default)]
    pub policy: Option<Vec<StatementInput>>,
    /// ARNs policy statements may target besides the new queue.
    #[serde(default)]
    pub allow_cross_resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueArgs {
    pub queue: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetQueueAttributesArgs {
    pub queue: String,
    pub attributes: QueueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPolicyArgs {
    /// Passed as `queue` or `topic`, depending on the tool.
    pub target: String,
    pub statements: Vec<StatementInput>,
    #[serde(default)]
    pub allow_cross_resource: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQueuesArgs {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageArgs {
    pub queue: String,
    pub body: String,
    #[serde(default)]
    pub delay_seconds: Option<u32>,
    #[serde(default)]
    pub message_group_id: Option<String>,
    #[serde(default)]
    pub message_deduplication_id: Option<String>,
    #[serde(default)]
    pub message_attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagArgs {
    /// Passed as `queue` or `topic`, depending on the tool.
    pub target: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UntagArgs {
    pub target: String,
    pub tag_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetArgs {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTopicArgs {
    pub topic_name: String,
    #[serde(default)]
    pub fifo: Option<bool>,
    #[serde(default)]
    pub attributes: TopicConfig,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub policy: Option<Vec<StatementInput>>,
    #[serde(default)]
    pub allow_cross_resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicArgs {
    pub topic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListTopicsArgs {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeArgs {
    pub topic: String,
    pub protocol: String,
    pub endpoint: String,
    #[serde(default)]
    pub filter_policy: Option<Value>,
    #[serde(default)]
    pub raw_message_delivery: Option<bool>,
    /// For `sqs` endpoints: first let the topic deliver into the queue.
    #[serde(default)]
    pub grant_queue_access: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnsubscribeArgs {
    pub subscription_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListSubscriptionsArgs {
    pub topic: String,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishMessageArgs {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message_group_id: Option<String>,
    #[serde(default)]
    pub message_deduplication_id: Option<String>,
    #[serde(default)]
    pub message_attributes: BTreeMap<String, String>,
}

/// Tools sharing a record with a `target` field take it under the name of
/// the resource they act on; only that name is accepted.
fn rename_target(operation: Operation, args: &mut Map<String, Value>) -> OpsResult<()> {
    let key = match operation {
        Operation::SetQueuePolicy
        | Operation::TagQueue
        | Operation::UntagQueue
        | Operation::ListQueueTags => "queue",
        Operation::SetTopicPolicy
        | Operation::TagTopic
        | Operation::UntagTopic
        | Operation::ListTopicTags => "topic",
        _ => return Ok(()),
    };
    if let Some(other) = ["target", "queue", "topic"]
        .into_iter()
        .find(|k| *k != key && args.contains_key(*k))
    {
        return Err(OpsError::InvalidArgument(format!(
            "{operation}: unknown field `{other}`, expected `{key}`"
        )));
    }
    let value = args
        .remove(key)
        .ok_or_else(|| OpsError::InvalidArgument(format!("{operation}: missing field `{key}`")))?;
    args.insert("target".to_string(), value);
    Ok(())
}

/// Protocols a topic can deliver to.
pub const SUBSCRIPTION_PROTOCOLS: &[&str] = &[
    "sqs",
    "lambda",
    "http",
    "https",
    "email",
    "email-json",
    "sms",
    "application",
    "firehose",
];

/// One decoded tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    CreateQueue(CreateQueueArgs),
    GetQueueAttributes(QueueArgs),
    SetQueueAttributes(SetQueueAttributesArgs),
    SetQueuePolicy(SetPolicyArgs),
    DeleteQueue(QueueArgs),
    ListQueues(ListQueuesArgs),
    SendMessage(SendMessageArgs),
    PurgeQueue(QueueArgs),
    TagQueue(TagArgs),
    UntagQueue(UntagArgs),
    ListQueueTags(TargetArgs),
    CreateTopic(CreateTopicArgs),
    GetTopicAttributes(TopicArgs),
    SetTopicPolicy(SetPolicyArgs),
    DeleteTopic(TopicArgs),
    ListTopics(ListTopicsArgs),
    Subscribe(SubscribeArgs),
    Unsubscribe(UnsubscribeArgs),
    ListSubscriptions(ListSubscriptionsArgs),
    PublishMessage(PublishMessageArgs),
    TagTopic(TagArgs),
    UntagTopic(UntagArgs),
    ListTopicTags(TargetArgs),
}

impl ToolRequest {
    /// Decode a tool call. `arguments` may be `null` for tools without
    /// required fields.
    pub fn from_call(name: &str, arguments: Value) -> OpsResult<Self> {
        let operation = Operation::from_name(name).ok_or_else(|| {
            OpsError::UnsupportedOperation(format!("unknown tool '{name}'"))
        })?;
        let mut map = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(OpsError::InvalidArgument(format!(
                    "{operation}: arguments must be an object, got {}",
                    json_type(&other)
                )))
            }
        };
        rename_target(operation, &mut map)?;

        fn decode<T: serde::de::DeserializeOwned>(op: Operation, args: Value) -> OpsResult<T> {
            serde_json::from_value(args).map_err(|e| OpsError::InvalidArgument(format!("{op}: {e}")))
        }

        let args = Value::Object(map);
        Ok(match operation {
            Operation::CreateQueue => ToolRequest::CreateQueue(decode(operation, args)?),
            Operation::GetQueueAttributes => {
                ToolRequest::GetQueueAttributes(decode(operation, args)?)
            }
            Operation::SetQueueAttributes => {
                ToolRequest::SetQueueAttributes(decode(operation, args)?)
            }
            Operation::SetQueuePolicy => ToolRequest::SetQueuePolicy(decode(operation, args)?),
            Operation::DeleteQueue => ToolRequest::DeleteQueue(decode(operation, args)?),
            Operation::ListQueues => ToolRequest::ListQueues(decode(operation, args)?),
            Operation::SendMessage => ToolRequest::SendMessage(decode(operation, args)?),
            Operation::PurgeQueue => ToolRequest::PurgeQueue(decode(operation, args)?),
            Operation::TagQueue => ToolRequest::TagQueue(decode(operation, args)?),
            Operation::UntagQueue => ToolRequest::UntagQueue(decode(operation, args)?),
            Operation::ListQueueTags => ToolRequest::ListQueueTags(decode(operation, args)?),
            Operation::CreateTopic => ToolRequest::CreateTopic(decode(operation, args)?),
            Operation::GetTopicAttributes => {
                ToolRequest::GetTopicAttributes(decode(operation, args)?)
            }
            Operation::SetTopicPolicy => ToolRequest::SetTopicPolicy(decode(operation, args)?),
            Operation::DeleteTopic => ToolRequest::DeleteTopic(decode(operation, args)?),
            Operation::ListTopics => ToolRequest::ListTopics(decode(operation, args)?),
            Operation::Subscribe => ToolRequest::Subscribe(decode(operation, args)?),
            Operation::Unsubscribe => ToolRequest::Unsubscribe(decode(operation, args)?),
            Operation::ListSubscriptions => {
                ToolRequest::ListSubscriptions(decode(operation, args)?)
            }
            Operation::PublishMessage => ToolRequest::PublishMessage(decode(operation, args)?),
            Operation::TagTopic => ToolRequest::TagTopic(decode(operation, args)?),
            Operation::UntagTopic => ToolRequest::UntagTopic(decode(operation, args)?),
            Operation::ListTopicTags => ToolRequest::ListTopicTags(decode(operation, args)?),
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            ToolRequest::CreateQueue(_) => Operation::CreateQueue,
            ToolRequest::GetQueueAttributes(_) => Operation::GetQueueAttributes,
            ToolRequest::SetQueueAttributes(_) => Operation::SetQueueAttributes,
            ToolRequest::SetQueuePolicy(_) => Operation::SetQueuePolicy,
            ToolRequest::DeleteQueue(_) => Operation::DeleteQueue,
            ToolRequest::ListQueues(_) => Operation::ListQueues,
            ToolRequest::SendMessage(_) => Operation::SendMessage,
            ToolRequest::PurgeQueue(_) => Operation::PurgeQueue,
            ToolRequest::TagQueue(_) => Operation::TagQueue,
            ToolRequest::UntagQueue(_) => Operation::UntagQueue,
            ToolRequest::ListQueueTags(_) => Operation::ListQueueTags,
            ToolRequest::CreateTopic(_) => Operation::CreateTopic,
            ToolRequest::GetTopicAttributes(_) => Operation::GetTopicAttributes,
            ToolRequest::SetTopicPolicy(_) => Operation::SetTopicPolicy,
            ToolRequest::DeleteTopic(_) => Operation::DeleteTopic,
            ToolRequest::ListTopics(_) => Operation::ListTopics,
            ToolRequest::Subscribe(_) => Operation::Subscribe,
            ToolRequest::Unsubscribe(_) => Operation::Unsubscribe,
            ToolRequest::ListSubscriptions(_) => Operation::ListSubscriptions,
            ToolRequest::PublishMessage(_) => Operation::PublishMessage,
            ToolRequest::TagTopic(_) => Operation::TagTopic,
            ToolRequest::UntagTopic(_) => Operation::UntagTopic,
            ToolRequest::ListTopicTags(_) => Operation::ListTopicTags,
        }
    }
}

/// Check a message body against the service limit.
pub fn validate_body(field: &str, body: &str) -> OpsResult<()> {
    if body.is_empty() {
        return Err(OpsError::InvalidArgument(format!("{field} must not be empty")));
    }
    if body.len() > MAX_MESSAGE_BYTES {
        return Err(OpsError::InvalidArgument(format!(
            "{field} is {} bytes, limit is {MAX_MESSAGE_BYTES}",
            body.len()
        )));
    }
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClass;
    use serde_json::json;

    #[test]
    fn test_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
            let encoded = serde_json::to_value(op).unwrap();
            assert_eq!(encoded, json!(op.as_str()));
        }
        assert_eq!(Operation::from_name("foo-bar"), None);
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolRequest::from_call("foo-bar", json!({})).unwrap_err();
        assert_eq!(err.class(), ErrorClass::UnsupportedOperation);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ToolRequest::from_call(
            "create-queue",
            json!({"queue_name": "orders-queue", "visibility": 10}),
        )
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
        assert!(err.to_string().contains("create-queue"));
    }

    #[test]
    fn test_target_field_follows_resource_kind() {
        let statements = json!([{ "effect": "Deny", "principal": "*", "action": "sqs:PurgeQueue" }]);
        let req = ToolRequest::from_call(
            "set-queue-policy",
            json!({ "queue": "orders-queue", "statements": statements }),
        )
        .unwrap();
        assert!(matches!(req, ToolRequest::SetQueuePolicy(ref a) if a.target == "orders-queue"));

        for (tool, args) in [
            ("set-queue-policy", json!({ "topic": "orders", "statements": statements })),
            ("tag-topic", json!({ "queue": "orders-queue", "tags": { "team": "a" } })),
            ("list-queue-tags", json!({ "target": "orders-queue" })),
            ("untag-topic", json!({ "tag_keys": ["team"] })),
        ] {
            let err = ToolRequest::from_call(tool, args).unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidArgument, "{tool}");
        }
    }

    #[test]
    fn test_missing_required_field() {
        let err = ToolRequest::from_call("delete-queue", Value::Null).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
    }

    #[test]
    fn test_non_object_arguments() {
        let err = ToolRequest::from_call("list-topics", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_null_arguments_for_optional_tools() {
        let req = ToolRequest::from_call("list-queues", Value::Null).unwrap();
        assert_eq!(req, ToolRequest::ListQueues(ListQueuesArgs::default()));
        assert_eq!(req.operation(), Operation::ListQueues);
    }

    #[test]
    fn test_queue_config_ranges() {
        let ok = QueueConfig {
            visibility_timeout: Some(43_200),
            delay_seconds: Some(0),
            ..QueueConfig::default()
        };
        let attrs = ok.to_attributes(false).unwrap();
        assert_eq!(attrs["VisibilityTimeout"], "43200");
        assert_eq!(attrs["DelaySeconds"], "0");

        let bad = QueueConfig {
            message_retention_period: Some(59),
            ..QueueConfig::default()
        };
        assert!(bad.to_attributes(false).is_err());

        let bad = QueueConfig {
            maximum_message_size: Some(262_145),
            ..QueueConfig::default()
        };
        assert!(bad.to_attributes(false).is_err());
    }

    #[test]
    fn test_content_dedup_needs_fifo() {
        let cfg = QueueConfig {
            content_based_deduplication: Some(true),
            ..QueueConfig::default()
        };
        assert!(cfg.to_attributes(false).is_err());
        assert_eq!(
            cfg.to_attributes(true).unwrap()["ContentBasedDeduplication"],
            "true"
        );

        let topic = TopicConfig {
            content_based_deduplication: Some(false),
            ..TopicConfig::default()
        };
        assert!(topic.to_attributes(false).is_err());
    }

    #[test]
    fn test_redrive_rendering() {
        let cfg = QueueConfig {
            redrive_policy: Some(RedrivePolicy {
                dead_letter_target_arn: "arn:aws:sqs:us-east-1:123456789012:dlq".to_string(),
                max_receive_count: 5,
            }),
            ..QueueConfig::default()
        };
        let attrs = cfg.to_attributes(false).unwrap();
        let parsed: Value = serde_json::from_str(&attrs["RedrivePolicy"]).unwrap();
        assert_eq!(parsed["maxReceiveCount"], 5);

        let bad = QueueConfig {
            redrive_policy: Some(RedrivePolicy {
                dead_letter_target_arn: "arn:aws:sqs:us-east-1:123456789012:dlq".to_string(),
                max_receive_count: 0,
            }),
            ..QueueConfig::default()
        };
        assert!(bad.to_attributes(false).is_err());
    }

    #[test]
    fn test_display_name_limit() {
        let cfg = TopicConfig {
            display_name: Some("d".repeat(101)),
            ..TopicConfig::default()
        };
        assert!(cfg.to_attributes(false).is_err());
    }

    #[test]
    fn test_body_limits() {
        assert!(validate_body("body", "").is_err());
        assert!(validate_body("body", &"x".repeat(MAX_MESSAGE_BYTES)).is_ok());
        assert!(validate_body("body", &"x".repeat(MAX_MESSAGE_BYTES + 1)).is_err());
    }

    #[test]
    fn test_annotations() {
        assert!(Operation::ListQueues.is_read_only());
        assert!(!Operation::ListQueues.is_destructive());
        assert!(Operation::DeleteTopic.is_destructive());
        assert!(!Operation::SendMessage.is_idempotent());
        assert!(Operation::PurgeQueue.is_guarded());
        assert!(!Operation::TagQueue.is_guarded());
    }
}
