//! Remote client adapter: retries, timeouts, and idempotency tokens.
//!
//! Wraps a [`MessagingClient`] with the remote-protocol concerns the
//! dispatcher should not see: every attempt is bounded by a timeout,
//! throttling and transport failures are retried per the injected
//! [`RetryPolicy`], and ordered sends carry a deduplication id that stays
//! fixed across retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{
    CreateQueue, CreateTopic, MessagingClient, OutboundMessage, RemoteError, RemoteErrorKind,
    RemoteResult, SubscribeRequest,
};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{
    Attributes, OpsResult, Page, QueueHandle, QueueSummary, ResourceId, SentMessage,
    SubscriptionSummary, Tags, TopicHandle,
};

/// Default per-attempt timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrying, timeout-bounded front for a [`MessagingClient`].
#[derive(Clone)]
pub struct RemoteAdapter {
    client: Arc<dyn MessagingClient>,
    retry: RetryPolicy,
    call_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RemoteAdapter {
    pub fn new(client: Arc<dyn MessagingClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run one remote action under the timeout and retry policy.
    async fn call<T, F, Fut>(&self, action: &'static str, mut attempt_fn: F) -> OpsResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.call_timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::new(
                    RemoteErrorKind::Timeout,
                    format!("{action} timed out after {:?}", self.call_timeout),
                )),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(action, attempt, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && self.retry.allows_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        action,
                        attempt,
                        kind = ?e.kind,
                        "Transient remote failure, retrying in {delay:?}: {}",
                        e.message
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(action, attempt, kind = ?e.kind, "Remote call failed: {}", e.message);
                    return Err(e.into_ops_error(attempt));
                }
            }
        }
    }

    /// Fill in a deduplication id for ordered targets that lack one.
    fn with_idempotency_token(target: &ResourceId, message: &OutboundMessage) -> OutboundMessage {
        let mut message = message.clone();
        if target.is_fifo() && message.deduplication_id.is_none() {
            message.deduplication_id = Some(uuid::Uuid::new_v4().to_string());
        }
        message
    }

    pub async fn create_queue(&self, request: &CreateQueue) -> OpsResult<QueueHandle> {
        self.call("create-queue", || self.client.create_queue(request))
            .await
    }

    pub async fn get_queue_attributes(
        &self,
        queue: &ResourceId,
    ) -> OpsResult<(QueueHandle, Attributes)> {
        self.call("get-queue-attributes", || self.client.get_queue_attributes(queue))
            .await
    }

    pub async fn set_queue_attributes(
        &self,
        queue: &ResourceId,
        attributes: &Attributes,
    ) -> OpsResult<()> {
        self.call("set-queue-attributes", || {
            self.client.set_queue_attributes(queue, attributes)
        })
        .await
    }

    pub async fn delete_queue(&self, queue: &ResourceId) -> OpsResult<()> {
        self.call("delete-queue", || self.client.delete_queue(queue))
            .await
    }

    pub async fn list_queues(
        &self,
        prefix: Option<&str>,
        page_size: u32,
        next_token: Option<&str>,
    ) -> OpsResult<Page<QueueSummary>> {
        self.call("list-queues", || {
            self.client.list_queues(prefix, page_size, next_token)
        })
        .await
    }

    pub async fn send_message(
        &self,
        queue: &ResourceId,
        message: &OutboundMessage,
    ) -> OpsResult<SentMessage> {
        let message = Self::with_idempotency_token(queue, message);
        let mut sent = self
            .call("send-message", || self.client.send_message(queue, &message))
            .await?;
        if sent.deduplication_id.is_none() {
            sent.deduplication_id = message.deduplication_id.clone();
        }
        Ok(sent)
    }

    pub async fn purge_queue(&self, queue: &ResourceId) -> OpsResult<()> {
        self.call("purge-queue", || self.client.purge_queue(queue))
            .await
    }

    pub async fn tag_queue(&self, queue: &ResourceId, tags: &Tags) -> OpsResult<()> {
        self.call("tag-queue", || self.client.tag_queue(queue, tags))
            .await
    }

    pub async fn untag_queue(&self, queue: &ResourceId, keys: &[String]) -> OpsResult<()> {
        self.call("untag-queue", || self.client.untag_queue(queue, keys))
            .await
    }

    pub async fn list_queue_tags(&self, queue: &ResourceId) -> OpsResult<Tags> {
        self.call("list-queue-tags", || self.client.list_queue_tags(queue))
            .await
    }

    pub async fn create_topic(&self, request: &CreateTopic) -> OpsResult<TopicHandle> {
        self.call("create-topic", || self.client.create_topic(request))
            .await
    }

    pub async fn get_topic_attributes(
        &self,
        topic: &ResourceId,
    ) -> OpsResult<(TopicHandle, Attributes)> {
        self.call("get-topic-attributes", || self.client.get_topic_attributes(topic))
            .await
    }

    pub async fn set_topic_attribute(
        &self,
        topic: &ResourceId,
        name: &str,
        value: &str,
    ) -> OpsResult<()> {
        self.call("set-topic-attributes", || {
            self.client.set_topic_attribute(topic, name, value)
        })
        .await
    }

    pub async fn delete_topic(&self, topic: &ResourceId) -> OpsResult<()> {
        self.call("delete-topic", || self.client.delete_topic(topic))
            .await
    }

    pub async fn list_topics(&self, next_token: Option<&str>) -> OpsResult<Page<TopicHandle>> {
        self.call("list-topics", || self.client.list_topics(next_token))
            .await
    }

    pub async fn subscribe(&self, request: &SubscribeRequest) -> OpsResult<SubscriptionSummary> {
        self.call("subscribe", || self.client.subscribe(request))
            .await
    }

    pub async fn unsubscribe(&self, subscription: &ResourceId) -> OpsResult<()> {
        self.call("unsubscribe", || self.client.unsubscribe(subscription))
            .await
    }

    pub async fn list_subscriptions(
        &self,
        topic: &ResourceId,
        next_token: Option<&str>,
    ) -> OpsResult<Page<SubscriptionSummary>> {
        self.call("list-subscriptions", || {
            self.client.list_subscriptions(topic, next_token)
        })
        .await
    }

    pub async fn publish(
        &self,
        topic: &ResourceId,
        message: &OutboundMessage,
    ) -> OpsResult<SentMessage> {
        let message = Self::with_idempotency_token(topic, message);
        let mut sent = self
            .call("publish-message", || self.client.publish(topic, &message))
            .await?;
        if sent.deduplication_id.is_none() {
            sent.deduplication_id = message.deduplication_id.clone();
        }
        Ok(sent)
    }

    pub async fn tag_topic(&self, topic: &ResourceId, tags: &Tags) -> OpsResult<()> {
        self.call("tag-topic", || self.client.tag_topic(topic, tags))
            .await
    }

    pub async fn untag_topic(&self, topic: &ResourceId, keys: &[String]) -> OpsResult<()> {
        self.call("untag-topic", || self.client.untag_topic(topic, keys))
            .await
    }

    pub async fn list_topic_tags(&self, topic: &ResourceId) -> OpsResult<Tags> {
        self.call("list-topic-tags", || self.client.list_topic_tags(topic))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMessaging;
    use crate::retry::RecordingSleeper;
    use crate::types::{ErrorClass, OpsError, ResourceKind};
    use crate::validate::Validator;

    fn adapter(memory: &Arc<MemoryMessaging>, sleeper: &Arc<RecordingSleeper>) -> RemoteAdapter {
        RemoteAdapter::new(memory.clone())
            .with_retry(RetryPolicy::default().with_max_attempts(3))
            .with_sleeper(sleeper.clone())
    }

    fn create(name: &str) -> CreateQueue {
        CreateQueue {
            name: name.to_string(),
            attributes: Attributes::new(),
            tags: Tags::new(),
        }
    }

    #[tokio::test]
    async fn test_retries_throttling_then_succeeds() {
        let memory = Arc::new(MemoryMessaging::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        memory.fail_next(RemoteErrorKind::Throttled, 2).await;

        let handle = adapter(&memory, &sleeper)
            .create_queue(&create("orders-queue"))
            .await
            .unwrap();
        assert_eq!(handle.name, "orders-queue");
        assert_eq!(memory.call_count(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_throttling_stays_throttled() {
        let memory = Arc::new(MemoryMessaging::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        memory.fail_next(RemoteErrorKind::Throttled, 10).await;

        let err = adapter(&memory, &sleeper)
            .create_queue(&create("orders-queue"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Throttled);
        assert!(matches!(err, OpsError::Throttled { attempts: 3, .. }));
        assert_eq!(memory.call_count(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let memory = Arc::new(MemoryMessaging::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        memory.fail_next(RemoteErrorKind::AccessDenied, 1).await;

        let err = adapter(&memory, &sleeper)
            .create_queue(&create("orders-queue"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::PermissionDenied);
        assert_eq!(memory.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let memory = Arc::new(MemoryMessaging::default());
        memory.set_latency(Duration::from_millis(500)).await;
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = adapter(&memory, &sleeper)
            .with_retry(RetryPolicy::none())
            .with_call_timeout(Duration::from_millis(20))
            .create_queue(&create("orders-queue"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::TransientTransport);
    }

    #[tokio::test]
    async fn test_fifo_send_gets_stable_dedup_id() {
        let memory = Arc::new(MemoryMessaging::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        let adapter = adapter(&memory, &sleeper);
        adapter.create_queue(&create("orders.fifo")).await.unwrap();

        let queue = Validator::default()
            .validate(ResourceKind::Queue, "orders.fifo")
            .unwrap();
        memory.fail_next(RemoteErrorKind::Transport, 1).await;
        let message = OutboundMessage {
            body: "hello".to_string(),
            group_id: Some("g1".to_string()),
            ..OutboundMessage::default()
        };
        let sent = adapter.send_message(&queue, &message).await.unwrap();
        assert!(sent.deduplication_id.is_some());
        assert_eq!(memory.queue_depth("orders.fifo").await, Some(1));
    }

    #[tokio::test]
    async fn test_standard_send_has_no_dedup_id() {
        let memory = Arc::new(MemoryMessaging::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        let adapter = adapter(&memory, &sleeper);
        adapter.create_queue(&create("orders-queue")).await.unwrap();

        let queue = Validator::default()
            .validate(ResourceKind::Queue, "orders-queue")
            .unwrap();
        let message = OutboundMessage {
            body: "hello".to_string(),
            ..OutboundMessage::default()
        };
        let sent = adapter.send_message(&queue, &message).await.unwrap();
        assert!(sent.deduplication_id.is_none());
    }
}
