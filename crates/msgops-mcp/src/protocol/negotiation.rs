//! `initialize` handshake state.

use msgops::DispatcherConfig;

use crate::types::{InitializeParams, InitializeResult, McpError, McpResult, PeerInfo, MCP_VERSION};

/// What the handshake has learned about the connected client.
#[derive(Debug, Default)]
pub struct Handshake {
    client: Option<PeerInfo>,
    acknowledged: bool,
}

impl Handshake {
    /// Answer `initialize`. Any non-empty version is accepted and answered
    /// with the one this server speaks; the client decides whether to go on.
    pub fn initialize(
        &mut self,
        params: InitializeParams,
        config: &DispatcherConfig,
    ) -> McpResult<InitializeResult> {
        let requested = params.protocol_version.trim();
        if requested.is_empty() {
            return Err(McpError::InvalidParams(
                "protocolVersion must not be empty".to_string(),
            ));
        }
        if requested != MCP_VERSION {
            tracing::warn!(requested, supported = MCP_VERSION, "Protocol version mismatch");
        }
        if let Some(previous) = &self.client {
            tracing::warn!(client = %previous.name, "Client initialized twice");
        }

        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            guarded = config.guard_managed_resources,
            "Client connected"
        );
        self.client = Some(params.client_info);
        self.acknowledged = false;
        Ok(InitializeResult::for_config(config))
    }

    /// Record `notifications/initialized`.
    pub fn acknowledge(&mut self) {
        if self.acknowledged {
            tracing::debug!("Duplicate initialized notification");
            return;
        }
        match &self.client {
            Some(client) => tracing::info!(client = %client.name, "Handshake complete"),
            None => tracing::warn!("Client sent initialized before initialize"),
        }
        self.acknowledged = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(version: &str) -> InitializeParams {
        InitializeParams {
            protocol_version: version.to_string(),
            client_info: PeerInfo {
                name: "agent".to_string(),
                version: "1.0".to_string(),
            },
        }
    }

    #[test]
    fn test_handshake_records_client() {
        let mut handshake = Handshake::default();
        let result = handshake
            .initialize(params("2025-01-01"), &DispatcherConfig::default())
            .unwrap();
        assert_eq!(result.protocol_version, MCP_VERSION);
        assert_eq!(handshake.client.as_ref().map(|c| c.name.as_str()), Some("agent"));
        assert!(!handshake.acknowledged);

        handshake.acknowledge();
        assert!(handshake.acknowledged);
    }

    #[test]
    fn test_empty_version_rejected() {
        let mut handshake = Handshake::default();
        let err = handshake
            .initialize(params("  "), &DispatcherConfig::default())
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
        assert!(handshake.client.is_none());
    }
}
