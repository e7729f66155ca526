//! msgops: managed queue and topic operations for agent tooling.
//!
//! Tool calls are decoded into [`request::ToolRequest`]s, checked by the
//! [`validate::Validator`] and [`policy::PolicyBuilder`], and carried out by a
//! [`dispatch::Dispatcher`] over any [`client::MessagingClient`] backend.

pub mod adapter;
#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod dispatch;
pub mod memory;
pub mod pagination;
pub mod policy;
pub mod request;
pub mod retry;
pub mod types;
pub mod validate;

pub use adapter::RemoteAdapter;
#[cfg(feature = "aws")]
pub use aws::{AwsClientConfig, AwsMessagingClient};
pub use client::{MessagingClient, RemoteError, RemoteErrorKind};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use memory::MemoryMessaging;
pub use pagination::CursorManager;
pub use policy::{PolicyBuilder, PolicyDocument, StatementInput};
pub use request::{Operation, ToolRequest};
pub use retry::RetryPolicy;
pub use types::*;
pub use validate::{AccountScope, Validator};
