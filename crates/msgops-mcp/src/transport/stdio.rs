//! Stdio transport: reads JSON-RPC from stdin and writes to stdout.
//!
//! Each request runs in its own task so a slow tool call never blocks
//! `ping` or `notifications/cancelled`. Responses funnel through one
//! writer task, which keeps every output line whole.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::protocol::ProtocolHandler;
use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

use super::framing;

/// Stdio transport for desktop MCP clients.
pub struct StdioTransport {
    handler: Arc<ProtocolHandler>,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Run the transport loop until stdin closes.
    pub async fn run(&self) -> McpResult<()> {
        tracing::info!("Stdio transport started");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Returns once the input is exhausted and every in-flight request has
    /// been answered.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> McpResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_frames(rx, writer));

        let mut line = String::new();
        loop {
            if tx.is_closed() {
                tracing::warn!("Output closed, no longer reading requests");
                break;
            }
            line.clear();
            let bytes_read = reader.read_line(&mut line).await.map_err(McpError::Io)?;

            if bytes_read == 0 {
                tracing::info!("EOF on stdin, shutting down");
                break;
            }

            if line.trim().is_empty() {
                continue;
            }

            match framing::parse_message(&line) {
                Ok(msg @ JsonRpcMessage::Notification(_)) => {
                    self.handler.handle_message(msg).await;
                }
                Ok(msg) => {
                    self.handler.admit(&msg).await;
                    let handler = self.handler.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = handler.handle_message(msg).await {
                            if tx.send(frame_response(&response)).is_err() {
                                tracing::debug!("Output closed before a response was written");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Parse error: {e}");
                    if tx.send(frame_error(RequestId::Null, &e)).is_err() {
                        tracing::warn!("Output closed, no longer reading requests");
                        break;
                    }
                }
            }
        }

        // The writer ends once every request task has dropped its sender.
        drop(tx);
        writer_task
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?
    }
}

async fn write_frames<W>(mut rx: mpsc::UnboundedReceiver<String>, mut writer: W) -> McpResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(McpError::Io)?;
        writer.flush().await.map_err(McpError::Io)?;
    }
    Ok(())
}

fn frame_response(response: &Value) -> String {
    match framing::frame_message(response) {
        Ok(framed) => framed,
        Err(e) => {
            tracing::warn!("Dropping unsendable response: {e}");
            let id = response
                .get("id")
                .cloned()
                .and_then(|id| serde_json::from_value(id).ok())
                .unwrap_or(RequestId::Null);
            frame_error(id, &e)
        }
    }
}

fn frame_error(id: RequestId, error: &McpError) -> String {
    let mut framed = serde_json::to_string(&error.to_reply(id)).unwrap_or_default();
    framed.push('\n');
    framed
}
