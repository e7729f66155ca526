//! msgops MCP server entry point.

use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;

use msgops_mcp::config::{Overrides, ServerConfig};
use msgops_mcp::protocol::ProtocolHandler;
use msgops_mcp::tools::ToolRegistry;
use msgops_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "msgops-mcp",
    about = "MCP server for managing message queues, topics and subscriptions",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct BackendArgs {
    /// Messaging backend: aws or memory. Also reads MSGOPS_BACKEND.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// AWS region. Also reads AWS_REGION / AWS_DEFAULT_REGION.
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS shared-config profile. Also reads AWS_PROFILE.
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Endpoint override for local emulators. Also reads MSGOPS_ENDPOINT_URL.
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Only accept ARNs in this account (repeatable). Also reads MSGOPS_ALLOWED_ACCOUNTS.
    #[arg(long = "allowed-account", global = true)]
    allowed_accounts: Vec<String>,

    /// Only accept ARNs in this region (repeatable). Also reads MSGOPS_ALLOWED_REGIONS.
    #[arg(long = "allowed-region", global = true)]
    allowed_regions: Vec<String>,

    /// Allow reconfiguring and deleting resources not created by this server.
    #[arg(long, global = true)]
    allow_unmanaged: bool,

    /// Per-attempt timeout for remote calls, in seconds.
    #[arg(long, global = true)]
    call_timeout: Option<u64>,
}

impl From<BackendArgs> for Overrides {
    fn from(args: BackendArgs) -> Self {
        Overrides {
            backend: args.backend,
            region: args.region,
            profile: args.profile,
            endpoint_url: args.endpoint_url,
            allowed_accounts: args.allowed_accounts,
            allowed_regions: args.allowed_regions,
            allow_unmanaged: args.allow_unmanaged,
            call_timeout_secs: args.call_timeout,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Print server capabilities and tools as JSON.
    Info,

    /// Resolve configuration and make one read-only call against the backend.
    Check,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   msgops-mcp completions bash > ~/.local/share/bash-completion/completions/msgops-mcp
    ///   msgops-mcp completions zsh > ~/.zfunc/_msgops-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides: Overrides = cli.backend.clone().into();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = ServerConfig::resolve(overrides)?;
            tracing::info!("msgops MCP server v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Backend: {} ({})", config.backend, config.region);
            if config.allow_unmanaged {
                tracing::warn!("Managed-resource guard disabled");
            }
            let dispatcher = config.build_dispatcher().await?;
            let handler = ProtocolHandler::new(Arc::new(dispatcher));
            let transport = StdioTransport::new(handler);
            transport.run().await?;
        }

        Commands::Info => {
            let config = ServerConfig::resolve(overrides)?;
            let capabilities =
                msgops_mcp::types::InitializeResult::for_config(&config.dispatcher_config());
            let tools = ToolRegistry::list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "instructions": capabilities.instructions,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Check => {
            let config = ServerConfig::resolve(overrides)?;
            let dispatcher = config.build_dispatcher().await?;
            let result = dispatcher
                .call(
                    "list-queues",
                    serde_json::json!({ "page_size": 1 }),
                    &CancellationToken::new(),
                )
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_ok() {
                std::process::exit(1);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "msgops-mcp", &mut std::io::stdout());
        }

        Commands::Repl => {
            tokio::task::block_in_place(|| msgops_mcp::repl::run(overrides))?;
        }
    }

    Ok(())
}
