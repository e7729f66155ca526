//! Payloads of the `initialize` handshake.

use serde::{Deserialize, Serialize};

use msgops::DispatcherConfig;

pub const MCP_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "msgops-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `clientInfo` / `serverInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

/// The client's capability block is accepted and ignored: the server never
/// samples, lists roots, or sends requests back.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: PeerInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingCapability {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

/// The tool set is fixed at build time, so `listChanged` is always false.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    pub logging: LoggingCapability,
    pub tools: ToolsCapability,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            logging: LoggingCapability {},
            tools: ToolsCapability {
                list_changed: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: PeerInfo,
    pub instructions: String,
}

impl InitializeResult {
    /// Handshake reply describing the limits `config` enforces.
    pub fn for_config(config: &DispatcherConfig) -> Self {
        Self {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: PeerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: instructions(config),
        }
    }
}

fn instructions(config: &DispatcherConfig) -> String {
    let mut text = String::from(
        "msgops manages message queues, topics and subscriptions. \
         Every tool result is a JSON object whose `status` is `ok` or `error`; \
         errors carry a `classification` and a `retryable` flag. \
         List tools return a `cursor`: pass it back unchanged with the same \
         arguments to fetch the next page.",
    );
    if config.guard_managed_resources {
        text.push_str(
            " Only resources created through this server (tagged `MCP Generated=true`) \
             may be reconfigured, purged or deleted.",
        );
    } else {
        text.push_str(" The managed-resource guard is off.");
    }
    let scope = &config.scope;
    if !scope.allowed_accounts.is_empty() {
        let accounts: Vec<&str> = scope.allowed_accounts.iter().map(String::as_str).collect();
        text.push_str(&format!(" ARNs must belong to account {}.", accounts.join(" or ")));
    }
    if !scope.allowed_regions.is_empty() {
        let regions: Vec<&str> = scope.allowed_regions.iter().map(String::as_str).collect();
        text.push_str(&format!(" ARNs must be in region {}.", regions.join(" or ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgops::AccountScope;

    #[test]
    fn test_instructions_follow_config() {
        let guarded = InitializeResult::for_config(&DispatcherConfig::default());
        assert!(guarded.instructions.contains("MCP Generated=true"));

        let open = DispatcherConfig {
            guard_managed_resources: false,
            scope: AccountScope::new(["123456789012".to_string()], Vec::<String>::new()),
            ..DispatcherConfig::default()
        };
        let result = InitializeResult::for_config(&open);
        assert!(result.instructions.contains("guard is off"));
        assert!(result.instructions.contains("account 123456789012"));
        assert!(!result.instructions.contains("region"));
    }

    #[test]
    fn test_capabilities_shape() {
        let value = serde_json::to_value(ServerCapabilities::default()).unwrap();
        assert_eq!(value["tools"]["listChanged"], false);
        assert!(value["logging"].as_object().unwrap().is_empty());
    }
}
