//! MCP tool definitions.

pub mod queue;
pub mod registry;
pub mod schema;
pub mod topic;

pub use registry::ToolRegistry;
