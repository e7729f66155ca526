//! Configuration loading and resolution.
//!
//! Command-line values win over environment variables, which win over
//! defaults. The resolved [`ServerConfig`] is built once at start-up.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use msgops::adapter::DEFAULT_CALL_TIMEOUT;
use msgops::memory::DEFAULT_ACCOUNT;
use msgops::{
    AccountScope, Dispatcher, DispatcherConfig, MemoryMessaging, MessagingClient, RemoteAdapter,
};

use crate::types::{McpError, McpResult};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Which messaging backend the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Aws,
    /// In-process emulation; nothing leaves the machine.
    Memory,
}

impl FromStr for Backend {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Backend::Aws),
            "memory" | "mem" => Ok(Backend::Memory),
            other => Err(McpError::Config(format!(
                "unknown backend '{other}' (expected 'aws' or 'memory')"
            ))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Aws => "aws",
            Backend::Memory => "memory",
        })
    }
}

/// Values given on the command line; `None` falls back to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub allowed_accounts: Vec<String>,
    pub allowed_regions: Vec<String>,
    pub allow_unmanaged: bool,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub backend: Backend,
    pub region: String,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub allowed_accounts: Vec<String>,
    pub allowed_regions: Vec<String>,
    pub allow_unmanaged: bool,
    pub call_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            region: DEFAULT_REGION.to_string(),
            profile: None,
            endpoint_url: None,
            allowed_accounts: Vec::new(),
            allowed_regions: Vec::new(),
            allow_unmanaged: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: Overrides) -> McpResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with<F>(overrides: Overrides, env: F) -> McpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let backend = match overrides.backend.or_else(|| env("MSGOPS_BACKEND")) {
            Some(raw) => raw.parse()?,
            None => Backend::default(),
        };
        let region = overrides
            .region
            .or_else(|| env("AWS_REGION"))
            .or_else(|| env("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let allowed_accounts = list_or_env(overrides.allowed_accounts, env("MSGOPS_ALLOWED_ACCOUNTS"));
        if let Some(bad) = allowed_accounts
            .iter()
            .find(|a| a.len() != 12 || !a.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(McpError::Config(format!(
                "allowed account '{bad}' is not a 12-digit account id"
            )));
        }

        let call_timeout = match overrides.call_timeout_secs {
            Some(0) => {
                return Err(McpError::Config("call timeout must be at least 1 second".to_string()))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            backend,
            region,
            profile: overrides.profile.or_else(|| env("AWS_PROFILE")),
            endpoint_url: overrides.endpoint_url.or_else(|| env("MSGOPS_ENDPOINT_URL")),
            allowed_accounts,
            allowed_regions: list_or_env(overrides.allowed_regions, env("MSGOPS_ALLOWED_REGIONS")),
            allow_unmanaged: overrides.allow_unmanaged,
            call_timeout,
        })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            scope: AccountScope::new(
                self.allowed_accounts.iter().cloned(),
                self.allowed_regions.iter().cloned(),
            ),
            guard_managed_resources: !self.allow_unmanaged,
            ..DispatcherConfig::default()
        }
    }

    /// Connect the configured backend and wrap it in a dispatcher.
    pub async fn build_dispatcher(&self) -> McpResult<Dispatcher> {
        let client = self.connect().await?;
        let adapter = RemoteAdapter::new(client).with_call_timeout(self.call_timeout);
        tracing::info!(
            backend = %self.backend,
            region = %self.region,
            guard = !self.allow_unmanaged,
            "Dispatcher ready"
        );
        Ok(Dispatcher::new(adapter, self.dispatcher_config()))
    }

    async fn connect(&self) -> McpResult<Arc<dyn MessagingClient>> {
        match self.backend {
            Backend::Memory => Ok(Arc::new(MemoryMessaging::new(
                DEFAULT_ACCOUNT,
                self.region.clone(),
            ))),
            #[cfg(feature = "aws")]
            Backend::Aws => {
                let config = msgops::AwsClientConfig {
                    region: self.region.clone(),
                    profile: self.profile.clone(),
                    endpoint_url: self.endpoint_url.clone(),
                };
                let client = msgops::AwsMessagingClient::connect(&config).await?;
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "aws"))]
            Backend::Aws => Err(McpError::Config(
                "this build has no AWS backend; use --backend memory".to_string(),
            )),
        }
    }
}

fn list_or_env(given: Vec<String>, env: Option<String>) -> Vec<String> {
    let raw = if given.is_empty() {
        env.map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    } else {
        given
    };
    raw.into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(overrides: Overrides, vars: &[(&str, &str)]) -> McpResult<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::resolve_with(overrides, |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve(Overrides::default(), &[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.dispatcher_config().guard_managed_resources);
    }

    #[test]
    fn test_cli_beats_environment() {
        let overrides = Overrides {
            region: Some("eu-west-1".to_string()),
            ..Overrides::default()
        };
        let config = resolve(
            overrides,
            &[("AWS_REGION", "us-west-2"), ("MSGOPS_BACKEND", "memory")],
        )
        .unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.backend, Backend::Memory);
    }

    #[test]
    fn test_region_fallback_chain() {
        let config = resolve(Overrides::default(), &[("AWS_DEFAULT_REGION", "ap-south-1")]).unwrap();
        assert_eq!(config.region, "ap-south-1");
    }

    #[test]
    fn test_allow_lists_from_environment() {
        let config = resolve(
            Overrides::default(),
            &[
                ("MSGOPS_ALLOWED_ACCOUNTS", "123456789012, 210987654321"),
                ("MSGOPS_ALLOWED_REGIONS", "us-east-1,"),
            ],
        )
        .unwrap();
        assert_eq!(config.allowed_accounts.len(), 2);
        assert_eq!(config.allowed_regions, vec!["us-east-1".to_string()]);

        let err = resolve(Overrides::default(), &[("MSGOPS_ALLOWED_ACCOUNTS", "12345")]).unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn test_unknown_backend() {
        assert!("sqs".parse::<Backend>().is_err());
        assert_eq!("Memory".parse::<Backend>().unwrap(), Backend::Memory);
    }

    #[tokio::test]
    async fn test_memory_backend_builds() {
        let config = ServerConfig {
            backend: Backend::Memory,
            allow_unmanaged: true,
            ..ServerConfig::default()
        };
        let dispatcher = config.build_dispatcher().await.unwrap();
        assert!(!dispatcher.config().guard_managed_resources);
    }
}
