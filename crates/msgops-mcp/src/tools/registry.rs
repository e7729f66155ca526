//! Tool registration and dispatch.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use msgops::{Dispatcher, Operation};

use crate::types::{ToolAnnotations, ToolCallResult, ToolDefinition};

use super::{queue, topic};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        Operation::ALL.iter().copied().map(Self::definition).collect()
    }

    pub fn definition(operation: Operation) -> ToolDefinition {
        let description = queue::description(operation).or_else(|| topic::description(operation));
        let input_schema = queue::input_schema(operation)
            .or_else(|| topic::input_schema(operation))
            .unwrap_or_else(|| serde_json::json!({ "type": "object" }));

        ToolDefinition {
            name: operation.as_str().to_string(),
            description: description.map(str::to_string),
            input_schema,
            annotations: Some(ToolAnnotations {
                read_only_hint: operation.is_read_only(),
                destructive_hint: operation.is_destructive(),
                idempotent_hint: operation.is_idempotent(),
                open_world_hint: true,
            }),
        }
    }

    /// Run a tool. Unknown names and bad arguments come back as error
    /// results rather than protocol errors.
    pub async fn call(
        dispatcher: &Dispatcher,
        name: &str,
        arguments: Option<Value>,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));
        let result = dispatcher.call(name, args, cancel).await;
        ToolCallResult::from_tool_result(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_is_described() {
        let tools = ToolRegistry::list_tools();
        assert_eq!(tools.len(), Operation::ALL.len());
        for tool in &tools {
            assert!(tool.description.is_some(), "{} has no description", tool.name);
            assert_eq!(tool.input_schema["type"], "object");
            assert_eq!(tool.input_schema["additionalProperties"], false, "{}", tool.name);
        }
    }

    #[test]
    fn test_annotations_follow_operation() {
        let delete = ToolRegistry::definition(Operation::DeleteQueue);
        let annotations = delete.annotations.unwrap();
        assert!(annotations.destructive_hint);
        assert!(!annotations.read_only_hint);

        let list = ToolRegistry::definition(Operation::ListTopics);
        let annotations = list.annotations.unwrap();
        assert!(annotations.read_only_hint);
        assert!(annotations.idempotent_hint);

        let publish = ToolRegistry::definition(Operation::PublishMessage);
        assert!(!publish.annotations.unwrap().idempotent_hint);
    }

    #[test]
    fn test_required_fields_match_argument_names() {
        let subscribe = ToolRegistry::definition(Operation::Subscribe);
        assert_eq!(
            subscribe.input_schema["required"],
            serde_json::json!(["topic", "protocol", "endpoint"])
        );
    }
}
