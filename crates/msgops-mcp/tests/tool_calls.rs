//! End-to-end tests: JSON-RPC in, tool results out, over the memory backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use msgops::client::{CreateTopic, MessagingClient};
use msgops::retry::{RecordingSleeper, RetryPolicy};
use msgops::{Dispatcher, DispatcherConfig, MemoryMessaging, RemoteAdapter, RemoteErrorKind};
use msgops_mcp::protocol::ProtocolHandler;
use msgops_mcp::transport::StdioTransport;
use msgops_mcp::types::*;

// ─────────────────────── helpers ───────────────────────

fn handler_with(config: DispatcherConfig) -> (Arc<MemoryMessaging>, ProtocolHandler) {
    let memory = Arc::new(MemoryMessaging::default());
    let adapter = RemoteAdapter::new(memory.clone())
        .with_retry(RetryPolicy::default())
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    let dispatcher = Dispatcher::new(adapter, config);
    (memory, ProtocolHandler::new(Arc::new(dispatcher)))
}

fn handler() -> (Arc<MemoryMessaging>, ProtocolHandler) {
    handler_with(DispatcherConfig::default())
}

fn mcp_request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

fn init_request() -> Value {
    mcp_request(
        0,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }),
    )
}

async fn send(handler: &ProtocolHandler, msg: Value) -> Option<Value> {
    let parsed: JsonRpcMessage = serde_json::from_value(msg).unwrap();
    handler.handle_message(parsed).await
}

async fn send_unwrap(handler: &ProtocolHandler, msg: Value) -> Value {
    send(handler, msg).await.expect("expected response")
}

/// Call a tool and return (isError, decoded ToolResult JSON).
async fn call_tool(handler: &ProtocolHandler, id: i64, name: &str, args: Value) -> (bool, Value) {
    let response = send_unwrap(
        handler,
        mcp_request(id, "tools/call", json!({ "name": name, "arguments": args })),
    )
    .await;
    let result = &response["result"];
    let text = result["content"][0]["text"].as_str().expect("text content");
    let is_error = result["isError"].as_bool().unwrap_or(false);
    (is_error, serde_json::from_str(text).unwrap())
}

// ─────────────────────── protocol ───────────────────────

#[tokio::test]
async fn test_initialize_advertises_tools() {
    let (_, h) = handler();
    let response = send_unwrap(&h, init_request()).await;
    assert_eq!(response["result"]["protocolVersion"], MCP_VERSION);
    assert_eq!(response["result"]["serverInfo"]["name"], "msgops-mcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());

    let ack = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    assert!(send(&h, ack).await.is_none());
}

#[tokio::test]
async fn test_tools_list_has_annotations() {
    let (_, h) = handler();
    let response = send_unwrap(&h, mcp_request(1, "tools/list", json!({}))).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 23);

    let delete = tools.iter().find(|t| t["name"] == "delete-topic").unwrap();
    assert_eq!(delete["annotations"]["destructiveHint"], true);
    assert_eq!(delete["annotations"]["readOnlyHint"], false);
    assert!(delete["inputSchema"]["properties"]["topic"].is_object());
}

#[tokio::test]
async fn test_ping_and_unknown_method() {
    let (_, h) = handler();
    let pong = send_unwrap(&h, mcp_request(1, "ping", json!({}))).await;
    assert_eq!(pong["result"], json!({}));

    let missing = send_unwrap(&h, mcp_request(2, "resources/list", json!({}))).await;
    assert_eq!(missing["error"]["code"], error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_jsonrpc_version() {
    let (_, h) = handler();
    let msg = json!({ "jsonrpc": "1.0", "id": 7, "method": "ping" });
    let response = send_unwrap(&h, msg).await;
    assert_eq!(response["error"]["code"], error_codes::INVALID_REQUEST);
    assert_eq!(response["id"], 7);
}

#[tokio::test]
async fn test_tools_call_without_params() {
    let (_, h) = handler();
    let msg = json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call" });
    let response = send_unwrap(&h, msg).await;
    assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
    assert_eq!(h.in_flight().await, 0);
}

// ─────────────────────── tools ───────────────────────

#[tokio::test]
async fn test_queue_lifecycle() {
    let (memory, h) = handler();
    let (is_error, created) =
        call_tool(&h, 1, "create-queue", json!({ "queue_name": "orders" })).await;
    assert!(!is_error);
    assert_eq!(created["status"], "ok");
    let url = created["payload"]["queue_url"].as_str().unwrap().to_string();
    let arn = created["payload"]["queue_arn"].as_str().unwrap().to_string();

    let (_, again) = call_tool(&h, 2, "create-queue", json!({ "queue_name": "orders" })).await;
    assert_eq!(again["payload"]["queue_url"], url.as_str());

    let (is_error, sent) =
        call_tool(&h, 3, "send-message", json!({ "queue": arn, "body": "hello" })).await;
    assert!(!is_error, "{sent}");
    assert_eq!(memory.queue_depth("orders").await, Some(1));

    let (_, purged) = call_tool(&h, 4, "purge-queue", json!({ "queue": "orders" })).await;
    assert_eq!(purged["payload"]["purged"], true);
    assert_eq!(memory.queue_depth("orders").await, Some(0));

    let (_, deleted) = call_tool(&h, 5, "delete-queue", json!({ "queue": "orders" })).await;
    assert_eq!(deleted["payload"]["deleted"], true);
    assert_eq!(memory.queue_depth("orders").await, None);
}

#[tokio::test]
async fn test_unknown_tool_is_tool_error() {
    let (memory, h) = handler();
    let (is_error, result) = call_tool(&h, 1, "foo-bar", json!({})).await;
    assert!(is_error);
    assert_eq!(result["status"], "error");
    assert_eq!(result["error"]["classification"], "UnsupportedOperation");
    assert_eq!(result["error"]["retryable"], false);
    assert_eq!(memory.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_argument_rejected() {
    let (memory, h) = handler();
    let (is_error, result) = call_tool(
        &h,
        1,
        "create-topic",
        json!({ "topic_name": "alerts", "colour": "red" }),
    )
    .await;
    assert!(is_error);
    assert_eq!(result["error"]["classification"], "InvalidArgument");
    assert_eq!(memory.call_count(), 0);
}

#[tokio::test]
async fn test_permission_denied_is_verbatim() {
    let (memory, h) = handler();
    memory
        .fail_next(RemoteErrorKind::AccessDenied, 1)
        .await;
    let (is_error, result) = call_tool(&h, 1, "list-topics", json!({})).await;
    assert!(is_error);
    assert_eq!(result["error"]["classification"], "PermissionDenied");
    assert_eq!(result["error"]["retryable"], false);
    assert_eq!(memory.call_count(), 1);
}

#[tokio::test]
async fn test_topic_fan_out_to_queue() {
    let (memory, h) = handler();
    let (_, topic) = call_tool(&h, 1, "create-topic", json!({ "topic_name": "events.fifo" })).await;
    let topic_arn = topic["payload"]["topic_arn"].as_str().unwrap().to_string();
    let (_, queue) = call_tool(&h, 2, "create-queue", json!({ "queue_name": "events.fifo" })).await;
    let queue_arn = queue["payload"]["queue_arn"].as_str().unwrap().to_string();

    let (is_error, sub) = call_tool(
        &h,
        3,
        "subscribe",
        json!({
            "topic": topic_arn,
            "protocol": "sqs",
            "endpoint": queue_arn,
            "grant_queue_access": true
        }),
    )
    .await;
    assert!(!is_error, "{sub}");
    assert_eq!(sub["payload"]["queue_access_granted"], true);

    let (is_error, published) = call_tool(
        &h,
        4,
        "publish-message",
        json!({ "topic": "events.fifo", "message": "e1", "message_group_id": "g" }),
    )
    .await;
    assert!(!is_error, "{published}");
    assert!(published["payload"]["deduplication_id"].is_string());
    assert_eq!(memory.published_count("events.fifo").await, Some(1));

    let sub_arn = sub["payload"]["subscription_arn"].as_str().unwrap().to_string();
    let (is_error, _) = call_tool(&h, 5, "unsubscribe", json!({ "subscription_arn": sub_arn })).await;
    assert!(!is_error);
    let (_, listed) = call_tool(&h, 6, "list-subscriptions", json!({ "topic": "events.fifo" })).await;
    assert_eq!(listed["payload"]["subscriptions"], json!([]));
}

async fn seed_unmanaged_topic(memory: &MemoryMessaging, name: &str) {
    memory
        .create_topic(&CreateTopic {
            name: name.to_string(),
            attributes: Default::default(),
            tags: Default::default(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_guard_can_be_disabled() {
    let (memory, guarded) = handler();
    seed_unmanaged_topic(&memory, "legacy").await;
    let (is_error, result) = call_tool(&guarded, 1, "delete-topic", json!({ "topic": "legacy" })).await;
    assert!(is_error);
    assert_eq!(result["error"]["classification"], "ProtectedResource");

    let (memory, unguarded) = handler_with(DispatcherConfig {
        guard_managed_resources: false,
        ..DispatcherConfig::default()
    });
    seed_unmanaged_topic(&memory, "legacy").await;
    let (is_error, result) =
        call_tool(&unguarded, 1, "delete-topic", json!({ "topic": "legacy" })).await;
    assert!(!is_error, "{result}");
    assert_eq!(memory.published_count("legacy").await, None);
}

#[tokio::test]
async fn test_pagination_through_protocol() {
    let (_, h) = handler();
    for i in 0..5 {
        call_tool(&h, i, "create-queue", json!({ "queue_name": format!("page-{i}") })).await;
    }

    let mut seen = 0;
    let mut pages = 0;
    let mut cursor = Value::Null;
    loop {
        let (is_error, page) = call_tool(
            &h,
            100 + pages,
            "list-queues",
            json!({ "prefix": "page-", "page_size": 2, "cursor": cursor }),
        )
        .await;
        assert!(!is_error, "{page}");
        seen += page["payload"]["queues"].as_array().unwrap().len();
        pages += 1;
        cursor = page["payload"]["cursor"].clone();
        if cursor.is_null() {
            break;
        }
    }
    assert_eq!(seen, 5);
    assert_eq!(pages, 3);
}

// ─────────────────────── cancellation ───────────────────────

#[tokio::test]
async fn test_cancellation_notification() {
    let (memory, h) = handler();
    let h = Arc::new(h);
    memory.set_latency(Duration::from_millis(500)).await;

    let request = mcp_request(
        42,
        "tools/call",
        json!({ "name": "create-queue", "arguments": { "queue_name": "slow" } }),
    );
    let parsed: JsonRpcMessage = serde_json::from_value(request).unwrap();
    h.admit(&parsed).await;
    let worker = {
        let h = h.clone();
        tokio::spawn(async move { h.handle_message(parsed).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancel = json!({
        "jsonrpc": "2.0",
        "method": "notifications/cancelled",
        "params": { "requestId": 42, "reason": "user aborted" }
    });
    assert!(send(&h, cancel).await.is_none());

    let response = worker.await.unwrap().unwrap();
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let result: Value = serde_json::from_str(text).unwrap();
    assert_eq!(result["error"]["classification"], "Cancelled");
    assert!(result["error"].get("completed_steps").is_none());
    assert_eq!(h.in_flight().await, 0);
}

#[tokio::test]
async fn test_cancel_for_unknown_request_is_ignored() {
    let (_, h) = handler();
    let cancel = json!({
        "jsonrpc": "2.0",
        "method": "notifications/cancelled",
        "params": { "requestId": "nope" }
    });
    assert!(send(&h, cancel).await.is_none());
}

// ─────────────────────── transport ───────────────────────

#[tokio::test]
async fn test_stdio_transport_round_trip() {
    let (_, h) = handler();
    let transport = StdioTransport::new(h);

    let input = [
        init_request().to_string(),
        "not json".to_string(),
        String::new(),
        mcp_request(1, "tools/call", json!({ "name": "create-topic", "arguments": { "topic_name": "t" } }))
            .to_string(),
        mcp_request(2, "ping", json!({})).to_string(),
    ]
    .join("\n")
        + "\n";

    let (out_writer, out_reader) = tokio::io::duplex(1 << 20);
    transport
        .serve(BufReader::new(input.as_bytes()), out_writer)
        .await
        .unwrap();

    let mut lines = BufReader::new(out_reader).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        responses.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    assert_eq!(responses.len(), 4);

    let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse_error["error"]["code"], error_codes::PARSE_ERROR);
    for id in 0..=2 {
        assert!(responses.iter().any(|r| r["id"] == id), "missing response {id}");
    }
}

#[tokio::test]
async fn test_stdio_rejects_oversized_message() {
    let (_, h) = handler();
    let transport = StdioTransport::new(h);
    let huge = format!(
        "{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"params\":{{\"pad\":\"{}\"}}}}\n",
        "x".repeat(msgops_mcp::transport::framing::MAX_MESSAGE_BYTES)
    );

    let (out_writer, out_reader) = tokio::io::duplex(1 << 16);
    transport
        .serve(BufReader::new(huge.as_bytes()), out_writer)
        .await
        .unwrap();

    let mut lines = BufReader::new(out_reader).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["code"], mcp_error_codes::CONTENT_TOO_LARGE);
    assert!(response["error"]["data"]["size"].as_u64().unwrap() > 4 * 1024 * 1024);
}

#[tokio::test]
async fn test_stdio_stops_reading_when_output_closes() {
    let (_, h) = handler();
    let transport = StdioTransport::new(h);

    let (mut client, server_in) = tokio::io::duplex(1 << 16);
    let (out_writer, out_reader) = tokio::io::duplex(1 << 16);
    drop(out_reader);

    // The client never closes its end.
    let feeder = tokio::spawn(async move {
        let line = format!("{}\n", mcp_request(1, "ping", json!({})));
        while client.write_all(line.as_bytes()).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let served = tokio::time::timeout(
        Duration::from_secs(5),
        transport.serve(BufReader::new(server_in), out_writer),
    )
    .await
    .expect("transport kept reading after its output closed");
    assert!(matches!(served, Err(McpError::Io(_))));
    feeder.abort();
}
