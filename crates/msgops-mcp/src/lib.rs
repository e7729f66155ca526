//! msgops MCP server: queue, topic and subscription management for LLM agents.

pub mod config;
pub mod protocol;
pub mod repl;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{Backend, Overrides, ServerConfig};
pub use protocol::ProtocolHandler;
pub use transport::StdioTransport;
