//! Typed seam over the remote messaging service.
//!
//! [`MessagingClient`] is the only place network I/O happens. Implementations
//! translate typed requests into service calls and classify whatever comes
//! back into a [`RemoteError`]; they never retry and never validate business
//! rules. See [`crate::adapter::RemoteAdapter`] for the retrying wrapper.

use async_trait::async_trait;

use crate::types::{
    Attributes, OpsError, Page, QueueHandle, QueueSummary, ResourceId, SentMessage,
    SubscriptionSummary, Tags, TopicHandle,
};

/// How a remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    Throttled,
    Transport,
    Timeout,
    NotFound,
    Conflict,
    AccessDenied,
    InvalidRequest,
    Service,
}

/// A classified failure reported by a [`MessagingClient`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Conflict, message)
    }

    /// Throttling, transport hiccups, and timeouts may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Throttled | RemoteErrorKind::Transport | RemoteErrorKind::Timeout
        )
    }

    /// Map into the caller-facing taxonomy after `attempts` tries.
    pub fn into_ops_error(self, attempts: u32) -> OpsError {
        let message = self.message;
        match self.kind {
            RemoteErrorKind::Throttled => OpsError::Throttled { attempts, message },
            RemoteErrorKind::Transport | RemoteErrorKind::Timeout => {
                OpsError::TransientTransport { attempts, message }
            }
            RemoteErrorKind::NotFound => OpsError::ResourceNotFound(message),
            RemoteErrorKind::Conflict => OpsError::ResourceConflict(message),
            RemoteErrorKind::AccessDenied => OpsError::PermissionDenied(message),
            RemoteErrorKind::InvalidRequest | RemoteErrorKind::Service => {
                OpsError::RemoteFailure(message)
            }
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Create a queue; attributes use the service's attribute names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateQueue {
    pub name: String,
    pub attributes: Attributes,
    pub tags: Tags,
}

/// Create a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTopic {
    pub name: String,
    pub attributes: Attributes,
    pub tags: Tags,
}

/// A message headed for a queue or topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub body: String,
    pub subject: Option<String>,
    pub delay_seconds: Option<u32>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub attributes: Attributes,
}

/// Subscribe an endpoint to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic: ResourceId,
    pub protocol: String,
    pub endpoint: String,
    pub attributes: Attributes,
}

/// One method per remote action. Implementations must be safe to call
/// concurrently from independent tool calls.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Create a queue, or return the existing one when its attributes match.
    /// A same-named queue with different attributes is a `Conflict`.
    async fn create_queue(&self, request: &CreateQueue) -> RemoteResult<QueueHandle>;

    /// Current attributes plus the queue's identity.
    async fn get_queue_attributes(&self, queue: &ResourceId)
        -> RemoteResult<(QueueHandle, Attributes)>;

    async fn set_queue_attributes(&self, queue: &ResourceId, attributes: &Attributes)
        -> RemoteResult<()>;

    async fn delete_queue(&self, queue: &ResourceId) -> RemoteResult<()>;

    async fn list_queues(
        &self,
        prefix: Option<&str>,
        page_size: u32,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<QueueSummary>>;

    async fn send_message(&self, queue: &ResourceId, message: &OutboundMessage)
        -> RemoteResult<SentMessage>;

    async fn purge_queue(&self, queue: &ResourceId) -> RemoteResult<()>;

    async fn tag_queue(&self, queue: &ResourceId, tags: &Tags) -> RemoteResult<()>;

    async fn untag_queue(&self, queue: &ResourceId, keys: &[String]) -> RemoteResult<()>;

    async fn list_queue_tags(&self, queue: &ResourceId) -> RemoteResult<Tags>;

    /// Create a topic, or return the existing one when its attributes match.
    async fn create_topic(&self, request: &CreateTopic) -> RemoteResult<TopicHandle>;

    async fn get_topic_attributes(&self, topic: &ResourceId)
        -> RemoteResult<(TopicHandle, Attributes)>;

    async fn set_topic_attribute(&self, topic: &ResourceId, name: &str, value: &str)
        -> RemoteResult<()>;

    async fn delete_topic(&self, topic: &ResourceId) -> RemoteResult<()>;

    async fn list_topics(&self, next_token: Option<&str>) -> RemoteResult<Page<TopicHandle>>;

    async fn subscribe(&self, request: &SubscribeRequest) -> RemoteResult<SubscriptionSummary>;

    async fn unsubscribe(&self, subscription: &ResourceId) -> RemoteResult<()>;

    async fn list_subscriptions(
        &self,
        topic: &ResourceId,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<SubscriptionSummary>>;

    async fn publish(&self, topic: &ResourceId, message: &OutboundMessage)
        -> RemoteResult<SentMessage>;

    async fn tag_topic(&self, topic: &ResourceId, tags: &Tags) -> RemoteResult<()>;

    async fn untag_topic(&self, topic: &ResourceId, keys: &[String]) -> RemoteResult<()>;

    async fn list_topic_tags(&self, topic: &ResourceId) -> RemoteResult<Tags>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClass;

    #[test]
    fn test_classification() {
        let cases = [
            (RemoteErrorKind::Throttled, ErrorClass::Throttled, true),
            (RemoteErrorKind::Transport, ErrorClass::TransientTransport, true),
            (RemoteErrorKind::Timeout, ErrorClass::TransientTransport, true),
            (RemoteErrorKind::NotFound, ErrorClass::ResourceNotFound, false),
            (RemoteErrorKind::Conflict, ErrorClass::ResourceConflict, false),
            (RemoteErrorKind::AccessDenied, ErrorClass::PermissionDenied, false),
            (RemoteErrorKind::InvalidRequest, ErrorClass::RemoteFailure, false),
            (RemoteErrorKind::Service, ErrorClass::RemoteFailure, false),
        ];
        for (kind, class, transient) in cases {
            let err = RemoteError::new(kind, "boom");
            assert_eq!(err.is_transient(), transient, "{kind:?}");
            assert_eq!(err.into_ops_error(1).class(), class, "{kind:?}");
        }
    }

    #[test]
    fn test_permission_denied_message_verbatim() {
        let msg = "User: arn:aws:iam::123456789012:user/bob is not authorized to perform: sqs:CreateQueue";
        let err = RemoteError::new(RemoteErrorKind::AccessDenied, msg).into_ops_error(1);
        assert_eq!(err.to_string(), msg);
    }
}
