//! Request router: receives JSON-RPC messages and routes them to handlers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use msgops::Dispatcher;

use crate::tools::ToolRegistry;
use crate::types::*;

use super::negotiation::Handshake;
use super::validator::validate_request;

/// The protocol handler shared by every in-flight request.
///
/// `tools/call` requests register a cancellation token under their request
/// id for as long as they run, so `notifications/cancelled` can reach them.
pub struct ProtocolHandler {
    dispatcher: Arc<Dispatcher>,
    handshake: Mutex<Handshake>,
    in_flight: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
}

impl ProtocolHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            handshake: Mutex::new(Handshake::default()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Number of tool calls currently running.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Register a tool call before it is scheduled, so a cancellation
    /// arriving right behind the request still finds it.
    pub async fn admit(&self, msg: &JsonRpcMessage) {
        if let JsonRpcMessage::Request(req) = msg {
            if req.method == "tools/call" {
                self.in_flight
                    .lock()
                    .await
                    .entry(req.id.clone())
                    .or_default();
            }
        }
    }

    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            JsonRpcMessage::Reply(reply) => {
                match reply.outcome {
                    ClientOutcome::Result(result) => {
                        tracing::warn!(id = %reply.id, %result, "Ignoring unsolicited client result")
                    }
                    ClientOutcome::Error(error) => {
                        tracing::warn!(id = %reply.id, %error, "Ignoring unsolicited client error")
                    }
                }
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let is_tool_call = request.method == "tools/call";
        tracing::debug!("Received request: method={} id={id}", request.method);

        let result = match validate_request(&request) {
            Ok(()) => self.dispatch_request(request).await,
            Err(e) => Err(e),
        };
        if is_tool_call {
            self.in_flight.lock().await.remove(&id);
        }

        match result {
            Ok(value) => encode(JsonRpcReply::result(id, value)),
            Err(e) => encode(e.to_reply(id)),
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "shutdown" => {
                tracing::info!("Shutdown requested");
                self.cancel_all().await;
                Ok(Value::Object(serde_json::Map::new()))
            }

            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.id, request.params).await,

            "ping" => Ok(Value::Object(serde_json::Map::new())),

            _ => Err(McpError::MethodNotFound(request.method)),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.handshake.lock().await.acknowledge();
            }
            "notifications/cancelled" | "$/cancelRequest" => {
                self.handle_cancelled(notification.params).await;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn handle_cancelled(&self, params: Option<Value>) {
        let params: CancelRequestParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                tracing::warn!("Malformed cancellation notification: {e}");
                return;
            }
            None => {
                tracing::warn!("Cancellation notification without params");
                return;
            }
        };

        let in_flight = self.in_flight.lock().await;
        match in_flight.get(&params.request_id) {
            Some(token) => {
                tracing::info!(
                    "Cancelling request {}: {}",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason given")
                );
                token.cancel();
            }
            // Already finished, or never a tool call.
            None => tracing::debug!("No in-flight request {} to cancel", params.request_id),
        }
    }

    async fn cancel_all(&self) {
        for token in self.in_flight.lock().await.values() {
            token.cancel();
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Initialize params required".to_string()))?;

        let result = self
            .handshake
            .lock()
            .await
            .initialize(init_params, self.dispatcher.config())?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_list(&self) -> McpResult<Value> {
        let result = ToolListResult {
            tools: ToolRegistry::list_tools(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> McpResult<Value> {
        let call_params: ToolCallParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Tool call params required".to_string()))?;

        let cancel = self
            .in_flight
            .lock()
            .await
            .entry(id)
            .or_default()
            .clone();

        let result = ToolRegistry::call(
            &self.dispatcher,
            &call_params.name,
            call_params.arguments,
            &cancel,
        )
        .await;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }
}

fn encode(message: impl serde::Serialize) -> Value {
    serde_json::to_value(message).unwrap_or_default()
}
