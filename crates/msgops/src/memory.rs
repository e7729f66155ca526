//! In-process messaging backend.
//!
//! Emulates the remote service closely enough for tests and offline runs:
//! idempotent creates with attribute and tag conflict detection, FIFO
//! deduplication, ordered paging with continuation tokens, and tag storage.
//! Failures and latency can be injected, and every call is counted.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::client::{
    CreateQueue, CreateTopic, MessagingClient, OutboundMessage, RemoteError, RemoteErrorKind,
    RemoteResult, SubscribeRequest,
};
use crate::types::{
    Attributes, Page, QueueHandle, QueueSummary, ResourceId, SentMessage, SubscriptionSummary,
    Tags, TopicHandle, MANAGED_TAG_KEY,
};

/// Account used when none is configured.
pub const DEFAULT_ACCOUNT: &str = "000000000000";
pub const DEFAULT_REGION: &str = "us-east-1";
/// Topics returned per `list_topics` page, as the remote service does.
pub const DEFAULT_TOPIC_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
}

#[derive(Debug)]
struct QueueState {
    attributes: Attributes,
    tags: Tags,
    created_at: DateTime<Utc>,
    messages: Vec<StoredMessage>,
    dedup: HashMap<String, String>,
}

#[derive(Debug)]
struct TopicState {
    attributes: Attributes,
    tags: Tags,
    subscriptions: Vec<SubscriptionSummary>,
    published: usize,
    dedup: HashMap<String, String>,
}

#[derive(Debug)]
struct Fault {
    action: Option<&'static str>,
    kind: RemoteErrorKind,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    queues: BTreeMap<String, QueueState>,
    topics: BTreeMap<String, TopicState>,
    faults: Vec<Fault>,
    latency: Duration,
    sequence: u64,
}

/// Deterministic [`MessagingClient`] backed by process memory.
#[derive(Debug)]
pub struct MemoryMessaging {
    account: String,
    region: String,
    topic_page_size: usize,
    calls: AtomicUsize,
    state: Mutex<State>,
}

impl Default for MemoryMessaging {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT, DEFAULT_REGION)
    }
}

impl MemoryMessaging {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            topic_page_size: DEFAULT_TOPIC_PAGE_SIZE,
            calls: AtomicUsize::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// Page size of topic and subscription listings.
    pub fn with_topic_page_size(mut self, size: usize) -> Self {
        self.topic_page_size = size.max(1);
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Remote calls received so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `times` calls of any action with `kind`.
    pub async fn fail_next(&self, kind: RemoteErrorKind, times: usize) {
        self.state.lock().await.faults.push(Fault {
            action: None,
            kind,
            remaining: times,
        });
    }

    /// Fail the next `times` calls of one action (e.g. `"set_queue_attributes"`).
    pub async fn fail_action(&self, action: &'static str, kind: RemoteErrorKind, times: usize) {
        self.state.lock().await.faults.push(Fault {
            action: Some(action),
            kind,
            remaining: times,
        });
    }

    /// Delay every call by `latency` before it is served.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Messages currently held by a queue.
    pub async fn queue_depth(&self, name: &str) -> Option<usize> {
        self.state
            .lock()
            .await
            .queues
            .get(name)
            .map(|q| q.messages.len())
    }

    /// Bodies of the messages a queue holds, oldest first.
    pub async fn queue_messages(&self, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .await
            .queues
            .get(name)
            .map(|q| q.messages.iter().map(|m| m.body.clone()).collect())
    }

    /// Messages published to a topic so far.
    pub async fn published_count(&self, name: &str) -> Option<usize> {
        self.state.lock().await.topics.get(name).map(|t| t.published)
    }

    fn queue_url(&self, name: &str) -> String {
        format!(
            "https://sqs.{}.amazonaws.com/{}/{name}",
            self.region, self.account
        )
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{service}:{}:{}:{resource}", self.region, self.account)
    }

    fn queue_handle(&self, name: &str) -> QueueHandle {
        QueueHandle {
            name: name.to_string(),
            queue_url: self.queue_url(name),
            queue_arn: self.arn("sqs", name),
        }
    }

    fn topic_handle(&self, name: &str) -> TopicHandle {
        TopicHandle {
            name: name.to_string(),
            topic_arn: self.arn("sns", name),
        }
    }

    /// Count the call, wait out injected latency, then apply any fault.
    async fn enter(&self, action: &'static str) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.state.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        let position = state
            .faults
            .iter()
            .position(|f| f.remaining > 0 && f.action.map_or(true, |a| a == action));
        if let Some(i) = position {
            let fault = &mut state.faults[i];
            fault.remaining -= 1;
            let kind = fault.kind;
            if fault.remaining == 0 {
                state.faults.remove(i);
            }
            return Err(RemoteError::new(kind, format!("injected {kind:?} failure in {action}")));
        }
        Ok(())
    }

    /// Resources addressed by ARN must live in this account and region.
    fn owns(&self, id: &ResourceId) -> bool {
        id.arn()
            .map_or(true, |arn| arn.account == self.account && arn.region == self.region)
    }

    fn queue_key(&self, id: &ResourceId) -> RemoteResult<String> {
        if !self.owns(id) {
            return Err(queue_missing(id.name()));
        }
        Ok(id.name().to_string())
    }

    fn topic_key(&self, id: &ResourceId) -> RemoteResult<String> {
        if !self.owns(id) {
            return Err(topic_missing(id.name()));
        }
        Ok(id.name().to_string())
    }

    fn next_sequence(state: &mut State) -> String {
        state.sequence += 1;
        format!("{:020}", state.sequence)
    }
}

fn queue_missing(name: &str) -> RemoteError {
    RemoteError::not_found(format!("The specified queue {name} does not exist"))
}

fn topic_missing(name: &str) -> RemoteError {
    RemoteError::not_found(format!("Topic {name} does not exist"))
}

fn invalid(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorKind::InvalidRequest, message)
}

fn default_queue_attributes(fifo: bool) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("DelaySeconds".to_string(), "0".to_string());
    attrs.insert("MaximumMessageSize".to_string(), "262144".to_string());
    attrs.insert("MessageRetentionPeriod".to_string(), "345600".to_string());
    attrs.insert("ReceiveMessageWaitTimeSeconds".to_string(), "0".to_string());
    attrs.insert("VisibilityTimeout".to_string(), "30".to_string());
    if fifo {
        attrs.insert("FifoQueue".to_string(), "true".to_string());
        attrs.insert("ContentBasedDeduplication".to_string(), "false".to_string());
    }
    attrs
}

fn default_topic_attributes(fifo: bool) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("DisplayName".to_string(), String::new());
    if fifo {
        attrs.insert("FifoTopic".to_string(), "true".to_string());
        attrs.insert("ContentBasedDeduplication".to_string(), "false".to_string());
    }
    attrs
}

/// First attribute whose requested value differs from the stored one.
fn first_difference<'a>(requested: &'a Attributes, current: &Attributes) -> Option<&'a str> {
    requested
        .iter()
        .find(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, _)| k.as_str())
}

/// Tag sets compared without the managed marker.
fn same_tags(requested: &Tags, current: &Tags) -> bool {
    let user = |tags: &Tags| -> Vec<(String, String)> {
        tags.iter()
            .filter(|(k, _)| k.as_str() != MANAGED_TAG_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    user(requested) == user(current)
}

/// Resolve the deduplication key of a message sent to an ordered resource.
fn dedup_key(message: &OutboundMessage, content_based: bool) -> RemoteResult<String> {
    match (&message.deduplication_id, content_based) {
        (Some(id), _) => Ok(id.clone()),
        (None, true) => Ok(format!("content:{}", message.body)),
        (None, false) => Err(invalid(
            "The queue should either have ContentBasedDeduplication enabled or MessageDeduplicationId provided explicitly",
        )),
    }
}

fn page_after<T: Clone>(
    items: &[(String, T)],
    next_token: Option<&str>,
    page_size: usize,
) -> Page<T> {
    let start = match next_token {
        Some(token) => items.partition_point(|(k, _)| k.as_str() <= token),
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let page: Vec<T> = items[start..end].iter().map(|(_, v)| v.clone()).collect();
    let next_token = if end < items.len() {
        items.get(end.saturating_sub(1)).map(|(k, _)| k.clone())
    } else {
        None
    };
    Page {
        items: page,
        next_token,
    }
}

#[async_trait]
impl MessagingClient for MemoryMessaging {
    async fn create_queue(&self, request: &CreateQueue) -> RemoteResult<QueueHandle> {
        self.enter("create_queue").await?;
        let fifo = request.name.ends_with(crate::types::FIFO_SUFFIX);
        if fifo != (request.attributes.get("FifoQueue").map(String::as_str) == Some("true")) {
            return Err(invalid("FifoQueue attribute must match the .fifo name suffix"));
        }

        let mut effective = default_queue_attributes(fifo);
        effective.extend(request.attributes.clone());

        let mut state = self.state.lock().await;
        if let Some(existing) = state.queues.get(&request.name) {
            if let Some(attr) = first_difference(&effective, &existing.attributes) {
                return Err(RemoteError::conflict(format!(
                    "A queue already exists with the same name and a different value for attribute {attr}"
                )));
            }
            return Ok(self.queue_handle(&request.name));
        }

        state.queues.insert(
            request.name.clone(),
            QueueState {
                attributes: effective,
                tags: request.tags.clone(),
                created_at: Utc::now(),
                messages: Vec::new(),
                dedup: HashMap::new(),
            },
        );
        Ok(self.queue_handle(&request.name))
    }

    async fn get_queue_attributes(
        &self,
        queue: &ResourceId,
    ) -> RemoteResult<(QueueHandle, Attributes)> {
        self.enter("get_queue_attributes").await?;
        let key = self.queue_key(queue)?;
        let state = self.state.lock().await;
        let q = state.queues.get(&key).ok_or_else(|| queue_missing(&key))?;
        let handle = self.queue_handle(&key);
        let mut attrs = q.attributes.clone();
        attrs.insert("QueueArn".to_string(), handle.queue_arn.clone());
        attrs.insert(
            "ApproximateNumberOfMessages".to_string(),
            q.messages.len().to_string(),
        );
        attrs.insert(
            "CreatedTimestamp".to_string(),
            q.created_at.timestamp().to_string(),
        );
        Ok((handle, attrs))
    }

    async fn set_queue_attributes(
        &self,
        queue: &ResourceId,
        attributes: &Attributes,
    ) -> RemoteResult<()> {
        self.enter("set_queue_attributes").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        let q = state.queues.get_mut(&key).ok_or_else(|| queue_missing(&key))?;
        if attributes.contains_key("FifoQueue") {
            return Err(invalid("FifoQueue cannot be changed after creation"));
        }
        q.attributes.extend(attributes.clone());
        Ok(())
    }

    async fn delete_queue(&self, queue: &ResourceId) -> RemoteResult<()> {
        self.enter("delete_queue").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        state
            .queues
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| queue_missing(&key))
    }

    async fn list_queues(
        &self,
        prefix: Option<&str>,
        page_size: u32,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<QueueSummary>> {
        self.enter("list_queues").await?;
        let state = self.state.lock().await;
        let matching: Vec<(String, QueueSummary)> = state
            .queues
            .keys()
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|name| {
                (
                    name.clone(),
                    QueueSummary {
                        name: name.clone(),
                        queue_url: self.queue_url(name),
                    },
                )
            })
            .collect();
        Ok(page_after(&matching, next_token, page_size.max(1) as usize))
    }

    async fn send_message(
        &self,
        queue: &ResourceId,
        message: &OutboundMessage,
    ) -> RemoteResult<SentMessage> {
        self.enter("send_message").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        let sequence = Self::next_sequence(&mut state);
        let q = state.queues.get_mut(&key).ok_or_else(|| queue_missing(&key))?;
        let fifo = q.attributes.get("FifoQueue").map(String::as_str) == Some("true");

        if !fifo {
            let id = uuid::Uuid::new_v4().to_string();
            q.messages.push(StoredMessage {
                message_id: id.clone(),
                body: message.body.clone(),
            });
            return Ok(SentMessage {
                message_id: id,
                sequence_number: None,
                deduplication_id: None,
            });
        }

        if message.group_id.is_none() {
            return Err(invalid("MessageGroupId is required for FIFO queues"));
        }
        if message.delay_seconds.is_some() {
            return Err(invalid("DelaySeconds is not supported per message on FIFO queues"));
        }
        let content_based =
            q.attributes.get("ContentBasedDeduplication").map(String::as_str) == Some("true");
        let dedup = dedup_key(message, content_based)?;
        if let Some(existing) = q.dedup.get(&dedup) {
            return Ok(SentMessage {
                message_id: existing.clone(),
                sequence_number: Some(sequence),
                deduplication_id: message.deduplication_id.clone(),
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        q.dedup.insert(dedup, id.clone());
        q.messages.push(StoredMessage {
            message_id: id.clone(),
            body: message.body.clone(),
        });
        Ok(SentMessage {
            message_id: id,
            sequence_number: Some(sequence),
            deduplication_id: message.deduplication_id.clone(),
        })
    }

    async fn purge_queue(&self, queue: &ResourceId) -> RemoteResult<()> {
        self.enter("purge_queue").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        let q = state.queues.get_mut(&key).ok_or_else(|| queue_missing(&key))?;
        let purged: Vec<String> = q.messages.drain(..).map(|m| m.message_id).collect();
        tracing::debug!(queue = %key, purged = purged.len(), "Purged memory queue");
        Ok(())
    }

    async fn tag_queue(&self, queue: &ResourceId, tags: &Tags) -> RemoteResult<()> {
        self.enter("tag_queue").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        let q = state.queues.get_mut(&key).ok_or_else(|| queue_missing(&key))?;
        q.tags.extend(tags.clone());
        Ok(())
    }

    async fn untag_queue(&self, queue: &ResourceId, keys: &[String]) -> RemoteResult<()> {
        self.enter("untag_queue").await?;
        let key = self.queue_key(queue)?;
        let mut state = self.state.lock().await;
        let q = state.queues.get_mut(&key).ok_or_else(|| queue_missing(&key))?;
        for k in keys {
            q.tags.remove(k);
        }
        Ok(())
    }

    async fn list_queue_tags(&self, queue: &ResourceId) -> RemoteResult<Tags> {
        self.enter("list_queue_tags").await?;
        let key = self.queue_key(queue)?;
        let state = self.state.lock().await;
        state
            .queues
            .get(&key)
            .map(|q| q.tags.clone())
            .ok_or_else(|| queue_missing(&key))
    }

    async fn create_topic(&self, request: &CreateTopic) -> RemoteResult<TopicHandle> {
        self.enter("create_topic").await?;
        let fifo = request.name.ends_with(crate::types::FIFO_SUFFIX);
        if fifo != (request.attributes.get("FifoTopic").map(String::as_str) == Some("true")) {
            return Err(invalid("FifoTopic attribute must match the .fifo name suffix"));
        }

        let mut effective = default_topic_attributes(fifo);
        effective.extend(request.attributes.clone());

        let mut state = self.state.lock().await;
        if let Some(existing) = state.topics.get(&request.name) {
            if first_difference(&effective, &existing.attributes).is_some() {
                return Err(RemoteError::conflict(
                    "Invalid parameter: Attributes Reason: Topic already exists with different attributes",
                ));
            }
            if !same_tags(&request.tags, &existing.tags) {
                return Err(RemoteError::conflict(
                    "Invalid parameter: Tags Reason: Topic already exists with different tags",
                ));
            }
            return Ok(self.topic_handle(&request.name));
        }

        state.topics.insert(
            request.name.clone(),
            TopicState {
                attributes: effective,
                tags: request.tags.clone(),
                subscriptions: Vec::new(),
                published: 0,
                dedup: HashMap::new(),
            },
        );
        Ok(self.topic_handle(&request.name))
    }

    async fn get_topic_attributes(
        &self,
        topic: &ResourceId,
    ) -> RemoteResult<(TopicHandle, Attributes)> {
        self.enter("get_topic_attributes").await?;
        let key = self.topic_key(topic)?;
        let state = self.state.lock().await;
        let t = state.topics.get(&key).ok_or_else(|| topic_missing(&key))?;
        let handle = self.topic_handle(&key);
        let mut attrs = t.attributes.clone();
        attrs.insert("TopicArn".to_string(), handle.topic_arn.clone());
        attrs.insert("Owner".to_string(), self.account.clone());
        attrs.insert(
            "SubscriptionsConfirmed".to_string(),
            t.subscriptions.len().to_string(),
        );
        Ok((handle, attrs))
    }

    async fn set_topic_attribute(
        &self,
        topic: &ResourceId,
        name: &str,
        value: &str,
    ) -> RemoteResult<()> {
        self.enter("set_topic_attribute").await?;
        let key = self.topic_key(topic)?;
        let mut state = self.state.lock().await;
        let t = state.topics.get_mut(&key).ok_or_else(|| topic_missing(&key))?;
        if name == "FifoTopic" {
            return Err(invalid("FifoTopic cannot be changed after creation"));
        }
        t.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_topic(&self, topic: &ResourceId) -> RemoteResult<()> {
        self.enter("delete_topic").await?;
        let key = self.topic_key(topic)?;
        let mut state = self.state.lock().await;
        // Deleting a missing topic succeeds remotely.
        state.topics.remove(&key);
        Ok(())
    }

    async fn list_topics(&self, next_token: Option<&str>) -> RemoteResult<Page<TopicHandle>> {
        self.enter("list_topics").await?;
        let state = self.state.lock().await;
        let all: Vec<(String, TopicHandle)> = state
            .topics
            .keys()
            .map(|name| (name.clone(), self.topic_handle(name)))
            .collect();
        Ok(page_after(&all, next_token, self.topic_page_size))
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> RemoteResult<SubscriptionSummary> {
        self.enter("subscribe").await?;
        let key = self.topic_key(&request.topic)?;
        let topic_arn = self.topic_handle(&key).topic_arn;
        let mut state = self.state.lock().await;
        let t = state.topics.get_mut(&key).ok_or_else(|| topic_missing(&key))?;

        if let Some(existing) = t
            .subscriptions
            .iter()
            .find(|s| s.protocol == request.protocol && s.endpoint == request.endpoint)
        {
            return Ok(existing.clone());
        }

        let summary = SubscriptionSummary {
            subscription_arn: format!("{topic_arn}:{}", uuid::Uuid::new_v4()),
            topic_arn,
            protocol: request.protocol.clone(),
            endpoint: request.endpoint.clone(),
        };
        t.subscriptions.push(summary.clone());
        Ok(summary)
    }

    async fn unsubscribe(&self, subscription: &ResourceId) -> RemoteResult<()> {
        self.enter("unsubscribe").await?;
        let arn = subscription.display_id();
        let mut state = self.state.lock().await;
        for topic in state.topics.values_mut() {
            if let Some(i) = topic
                .subscriptions
                .iter()
                .position(|s| s.subscription_arn == arn)
            {
                topic.subscriptions.remove(i);
                return Ok(());
            }
        }
        Err(RemoteError::not_found(format!("Subscription {arn} does not exist")))
    }

    async fn list_subscriptions(
        &self,
        topic: &ResourceId,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<SubscriptionSummary>> {
        self.enter("list_subscriptions").await?;
        let key = self.topic_key(topic)?;
        let state = self.state.lock().await;
        let t = state.topics.get(&key).ok_or_else(|| topic_missing(&key))?;
        let mut subs: Vec<(String, SubscriptionSummary)> = t
            .subscriptions
            .iter()
            .map(|s| (s.subscription_arn.clone(), s.clone()))
            .collect();
        subs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(page_after(&subs, next_token, self.topic_page_size))
    }

    async fn publish(
        &self,
        topic: &ResourceId,
        message: &OutboundMessage,
    ) -> RemoteResult<SentMessage> {
        self.enter("publish").await?;
        let key = self.topic_key(topic)?;
        let mut state = self.state.lock().await;
        let sequence = Self::next_sequence(&mut state);
        let t = state.topics.get_mut(&key).ok_or_else(|| topic_missing(&key))?;
        let fifo = t.attributes.get("FifoTopic").map(String::as_str) == Some("true");

        if !fifo {
            t.published += 1;
            return Ok(SentMessage {
                message_id: uuid::Uuid::new_v4().to_string(),
                sequence_number: None,
                deduplication_id: None,
            });
        }

        if message.group_id.is_none() {
            return Err(invalid("MessageGroupId is required for FIFO topics"));
        }
        let content_based =
            t.attributes.get("ContentBasedDeduplication").map(String::as_str) == Some("true");
        let dedup = dedup_key(message, content_based)?;
        if let Some(existing) = t.dedup.get(&dedup) {
            return Ok(SentMessage {
                message_id: existing.clone(),
                sequence_number: Some(sequence),
                deduplication_id: message.deduplication_id.clone(),
            });
        }
        let id = uuid::Uuid::new_v4().to_string();
        t.dedup.insert(dedup, id.clone());
        t.published += 1;
        Ok(SentMessage {
            message_id: id,
            sequence_number: Some(sequence),
            deduplication_id: message.deduplication_id.clone(),
        })
    }

    async fn tag_topic(&self, topic: &ResourceId, tags: &Tags) -> RemoteResult<()> {
        self.enter("tag_topic").await?;
        let key = self.topic_key(topic)?;
        let mut state = self.state.lock().await;
        let t = state.topics.get_mut(&key).ok_or_else(|| topic_missing(&key))?;
        t.tags.extend(tags.clone());
        Ok(())
    }

    async fn untag_topic(&self, topic: &ResourceId, keys: &[String]) -> RemoteResult<()> {
        self.enter("untag_topic").await?;
        let key = self.topic_key(topic)?;
        let mut state = self.state.lock().await;
        let t = state.topics.get_mut(&key).ok_or_else(|| topic_missing(&key))?;
        for k in keys {
            t.tags.remove(k);
        }
        Ok(())
    }

    async fn list_topic_tags(&self, topic: &ResourceId) -> RemoteResult<Tags> {
        self.enter("list_topic_tags").await?;
        let key = self.topic_key(topic)?;
        let state = self.state.lock().await;
        state
            .topics
            .get(&key)
            .map(|t| t.tags.clone())
            .ok_or_else(|| topic_missing(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use crate::validate::Validator;

    fn queue(name: &str) -> ResourceId {
        Validator::default().validate(ResourceKind::Queue, name).unwrap()
    }

    fn topic(name: &str) -> ResourceId {
        Validator::default().validate(ResourceKind::Topic, name).unwrap()
    }

    fn create_queue(name: &str, attrs: &[(&str, &str)]) -> CreateQueue {
        CreateQueue {
            name: name.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tags: Tags::new(),
        }
    }

    #[tokio::test]
    async fn test_create_queue_idempotent() {
        let m = MemoryMessaging::default();
        let a = m
            .create_queue(&create_queue("orders-queue", &[("VisibilityTimeout", "60")]))
            .await
            .unwrap();
        let b = m
            .create_queue(&create_queue("orders-queue", &[("VisibilityTimeout", "60")]))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.queue_url,
            "https://sqs.us-east-1.amazonaws.com/000000000000/orders-queue"
        );

        let err = m
            .create_queue(&create_queue("orders-queue", &[("VisibilityTimeout", "90")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);
        assert!(err.message.contains("VisibilityTimeout"));
    }

    #[tokio::test]
    async fn test_default_attributes_count_toward_conflict() {
        let m = MemoryMessaging::default();
        m.create_queue(&create_queue("q1", &[("VisibilityTimeout", "60")]))
            .await
            .unwrap();
        let err = m.create_queue(&create_queue("q1", &[])).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_fifo_dedup() {
        let m = MemoryMessaging::default();
        m.create_queue(&create_queue("jobs.fifo", &[("FifoQueue", "true")]))
            .await
            .unwrap();
        let msg = OutboundMessage {
            body: "hello".to_string(),
            group_id: Some("g".to_string()),
            deduplication_id: Some("d1".to_string()),
            ..OutboundMessage::default()
        };
        let first = m.send_message(&queue("jobs.fifo"), &msg).await.unwrap();
        let second = m.send_message(&queue("jobs.fifo"), &msg).await.unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(m.queue_messages("jobs.fifo").await, Some(vec!["hello".to_string()]));

        let no_group = OutboundMessage {
            group_id: None,
            ..msg
        };
        let err = m.send_message(&queue("jobs.fifo"), &no_group).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_list_queues_pages() {
        let m = MemoryMessaging::default();
        for name in ["a1", "a2", "a3", "b1", "a4"] {
            m.create_queue(&create_queue(name, &[])).await.unwrap();
        }
        let p1 = m.list_queues(Some("a"), 3, None).await.unwrap();
        assert_eq!(
            p1.items.iter().map(|q| q.name.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a2", "a3"]
        );
        let p2 = m
            .list_queues(Some("a"), 3, p1.next_token.as_deref())
            .await
            .unwrap();
        assert_eq!(p2.items.len(), 1);
        assert_eq!(p2.items[0].name, "a4");
        assert!(p2.next_token.is_none());
    }

    #[tokio::test]
    async fn test_topic_paging_and_subscriptions() {
        let m = MemoryMessaging::default().with_topic_page_size(2);
        for name in ["t1", "t2", "t3"] {
            m.create_topic(&CreateTopic {
                name: name.to_string(),
                attributes: Attributes::new(),
                tags: Tags::new(),
            })
            .await
            .unwrap();
        }
        let p1 = m.list_topics(None).await.unwrap();
        assert_eq!(p1.items.len(), 2);
        let p2 = m.list_topics(p1.next_token.as_deref()).await.unwrap();
        assert_eq!(p2.items.len(), 1);
        assert!(p2.next_token.is_none());

        let request = SubscribeRequest {
            topic: topic("t1"),
            protocol: "email".to_string(),
            endpoint: "ops@example.com".to_string(),
            attributes: Attributes::new(),
        };
        let s1 = m.subscribe(&request).await.unwrap();
        let s2 = m.subscribe(&request).await.unwrap();
        assert_eq!(s1.subscription_arn, s2.subscription_arn);

        let sub = Validator::default()
            .validate(ResourceKind::Subscription, &s1.subscription_arn)
            .unwrap();
        m.unsubscribe(&sub).await.unwrap();
        assert_eq!(
            m.unsubscribe(&sub).await.unwrap_err().kind,
            RemoteErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let m = MemoryMessaging::default();
        m.fail_action("list_queues", RemoteErrorKind::Throttled, 1).await;
        m.create_queue(&create_queue("q1", &[])).await.unwrap();
        assert_eq!(
            m.list_queues(None, 10, None).await.unwrap_err().kind,
            RemoteErrorKind::Throttled
        );
        assert!(m.list_queues(None, 10, None).await.is_ok());
        assert_eq!(m.call_count(), 3);
    }

    #[tokio::test]
    async fn test_foreign_account_is_missing() {
        let m = MemoryMessaging::default();
        m.create_queue(&create_queue("q1", &[])).await.unwrap();
        let foreign = Validator::default()
            .validate(ResourceKind::Queue, "arn:aws:sqs:us-east-1:123456789012:q1")
            .unwrap();
        assert_eq!(
            m.get_queue_attributes(&foreign).await.unwrap_err().kind,
            RemoteErrorKind::NotFound
        );
    }
}
