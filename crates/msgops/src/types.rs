//! Core data types for messaging resources, tool outcomes, and errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag key stamped on every resource created through msgops.
pub const MANAGED_TAG_KEY: &str = "MCP Generated";
/// Value of [`MANAGED_TAG_KEY`] on managed resources.
pub const MANAGED_TAG_VALUE: &str = "true";
/// Name suffix of ordered, deduplicated resources.
pub const FIFO_SUFFIX: &str = ".fifo";

/// The kind of messaging resource an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Queue,
    Topic,
    Subscription,
}

impl ResourceKind {
    /// ARN service segment owning this kind.
    pub fn service(self) -> &'static str {
        match self {
            ResourceKind::Queue => "sqs",
            ResourceKind::Topic | ResourceKind::Subscription => "sns",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Queue => "queue",
            ResourceKind::Topic => "topic",
            ResourceKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `arn:partition:service:region:account:resource` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// A validated reference to a queue, topic, or subscription.
///
/// Only [`crate::validate::Validator`] constructs these, so holding one means
/// the name and (when present) the ARN already passed syntax and scope checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub(crate) kind: ResourceKind,
    pub(crate) name: String,
    pub(crate) arn: Option<Arn>,
}

impl ResourceId {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Bare resource name (for subscriptions, the `topic:uuid` tail).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> Option<&Arn> {
        self.arn.as_ref()
    }

    /// Owning account, known only when the caller supplied an ARN.
    pub fn account(&self) -> Option<&str> {
        self.arn.as_ref().map(|a| a.account.as_str())
    }

    pub fn is_fifo(&self) -> bool {
        self.name.ends_with(FIFO_SUFFIX)
    }

    /// The caller-facing form: the ARN if given, else the bare name.
    pub fn display_id(&self) -> String {
        match &self.arn {
            Some(arn) => arn.to_string(),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.display_id())
    }
}

/// Free-form resource tags, kept ordered for reproducible output.
pub type Tags = BTreeMap<String, String>;

/// Remote attribute map, keyed by the service's attribute names.
pub type Attributes = BTreeMap<String, String>;

/// Identity of a queue as returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHandle {
    pub name: String,
    pub queue_url: String,
    pub queue_arn: String,
}

/// A queue as seen in list output (the remote list call only returns URLs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub name: String,
    pub queue_url: String,
}

/// Identity of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicHandle {
    pub name: String,
    pub topic_arn: String,
}

/// A subscription of an endpoint to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub subscription_arn: String,
    pub topic_arn: String,
    pub protocol: String,
    pub endpoint: String,
}

/// Acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_id: Option<String>,
}

/// One page of a remote enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Stable, caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    InvalidIdentifier,
    InvalidPolicy,
    InvalidArgument,
    InvalidCursor,
    UnsupportedOperation,
    ResourceConflict,
    ResourceNotFound,
    Throttled,
    TransientTransport,
    PermissionDenied,
    ProtectedResource,
    RemoteFailure,
    Cancelled,
    PartialFailure,
}

impl ErrorClass {
    /// Whether a caller may reasonably retry the whole tool call.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Throttled | ErrorClass::TransientTransport)
    }
}

/// Every failure a tool call can end in.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OpsError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Throttled after {attempts} attempt(s): {message}")]
    Throttled { attempts: u32, message: String },

    #[error("Transient transport failure after {attempts} attempt(s): {message}")]
    TransientTransport { attempts: u32, message: String },

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Protected resource: {0}")]
    ProtectedResource(String),

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Cancelled after completing {completed_steps:?}")]
    Cancelled { completed_steps: Vec<String> },

    #[error("Step '{failed_step}' failed after completing {completed_steps:?}: {cause}")]
    PartialFailure {
        completed_steps: Vec<String>,
        failed_step: String,
        cause: Box<OpsError>,
    },
}

impl OpsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OpsError::InvalidIdentifier(_) => ErrorClass::InvalidIdentifier,
            OpsError::InvalidPolicy(_) => ErrorClass::InvalidPolicy,
            OpsError::InvalidArgument(_) => ErrorClass::InvalidArgument,
            OpsError::InvalidCursor(_) => ErrorClass::InvalidCursor,
            OpsError::UnsupportedOperation(_) => ErrorClass::UnsupportedOperation,
            OpsError::ResourceConflict(_) => ErrorClass::ResourceConflict,
            OpsError::ResourceNotFound(_) => ErrorClass::ResourceNotFound,
            OpsError::Throttled { .. } => ErrorClass::Throttled,
            OpsError::TransientTransport { .. } => ErrorClass::TransientTransport,
            OpsError::PermissionDenied(_) => ErrorClass::PermissionDenied,
            OpsError::ProtectedResource(_) => ErrorClass::ProtectedResource,
            OpsError::RemoteFailure(_) => ErrorClass::RemoteFailure,
            OpsError::Cancelled { .. } => ErrorClass::Cancelled,
            OpsError::PartialFailure { .. } => ErrorClass::PartialFailure,
        }
    }

    /// Render into the report handed back to callers.
    pub fn report(&self) -> ErrorReport {
        let class = self.class();
        let (completed_steps, failed_step, cause) = match self {
            OpsError::Cancelled { completed_steps } => (completed_steps.clone(), None, None),
            OpsError::PartialFailure {
                completed_steps,
                failed_step,
                cause,
            } => (
                completed_steps.clone(),
                Some(failed_step.clone()),
                Some(cause.class()),
            ),
            _ => (Vec::new(), None, None),
        };
        ErrorReport {
            classification: class,
            message: self.to_string(),
            retryable: class.is_retryable(),
            completed_steps,
            failed_step,
            cause,
        }
    }
}

/// Convenience result type.
pub type OpsResult<T> = Result<T, OpsError>;

/// Structured error payload of a failed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub classification: ErrorClass,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorClass>,
}

/// Normalized outcome of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Ok { payload: Value },
    Error { error: ErrorReport },
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        ToolResult::Ok { payload }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Ok { payload } => Some(payload),
            ToolResult::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorReport> {
        match self {
            ToolResult::Ok { .. } => None,
            ToolResult::Error { error } => Some(error),
        }
    }

    /// Classification of a failed call.
    pub fn class(&self) -> Option<ErrorClass> {
        self.error().map(|e| e.classification)
    }
}

impl From<OpsError> for ToolResult {
    fn from(e: OpsError) -> Self {
        ToolResult::Error { error: e.report() }
    }
}
