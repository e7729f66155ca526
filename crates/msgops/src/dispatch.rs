//! Tool dispatcher.
//!
//! One call walks `Received → Validating → Invoking → Completed`, or stops at
//! `Rejected` when validation fails (no remote call is made) or `Failed` when
//! the remote side does. Everything ends as a [`ToolResult`]; nothing here
//! panics or propagates past [`Dispatcher::dispatch`].
//!
//! Some tools run more than one remote step (create-then-attach-policy,
//! grant-then-subscribe, guard lookups before mutations). A failure after a
//! mutating step completed is reported as [`OpsError::PartialFailure`], and a
//! cancellation reports the mutating steps that already went through.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::adapter::RemoteAdapter;
use crate::client::{CreateQueue, CreateTopic, OutboundMessage, SubscribeRequest};
use crate::pagination::{fingerprint, CursorManager, DEFAULT_CURSOR_TTL, DEFAULT_MAX_CURSORS};
use crate::policy::{topic_delivery_statement, PolicyBuilder, PolicyDocument, StatementInput};
use crate::request::{
    validate_body, CreateQueueArgs, CreateTopicArgs, ListQueuesArgs, ListSubscriptionsArgs,
    ListTopicsArgs, Operation, PublishMessageArgs, QueueArgs, QueueConfig, SendMessageArgs,
    SetPolicyArgs, SetQueueAttributesArgs, SubscribeArgs, TagArgs, TargetArgs, ToolRequest,
    TopicArgs, UnsubscribeArgs, UntagArgs, MAX_PAGE_SIZE, MAX_SUBJECT_LEN,
    SUBSCRIPTION_PROTOCOLS,
};
use crate::types::{
    Arn, Attributes, OpsError, OpsResult, ResourceId, ResourceKind, Tags, ToolResult,
    MANAGED_TAG_KEY, MANAGED_TAG_VALUE,
};
use crate::validate::{
    is_managed, parse_arn, validate_tag_key, validate_tags, AccountScope, Validator,
    MAX_QUEUE_NAME_LEN,
};

/// Default `list-queues` page size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Most message attributes per message.
pub const MAX_MESSAGE_ATTRIBUTES: usize = 10;
/// Longest message group / deduplication id.
pub const MAX_MESSAGE_ID_LEN: usize = 128;

/// Dispatcher settings, fixed at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub scope: AccountScope,
    /// Refuse reconfiguring or destroying resources without the managed tag.
    pub guard_managed_resources: bool,
    pub default_page_size: u32,
    pub cursor_ttl: Duration,
    pub max_cursors: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            scope: AccountScope::default(),
            guard_managed_resources: true,
            default_page_size: DEFAULT_PAGE_SIZE,
            cursor_ttl: DEFAULT_CURSOR_TTL,
            max_cursors: DEFAULT_MAX_CURSORS,
        }
    }
}

/// Progress of one in-flight call.
struct Call<'a> {
    operation: Operation,
    cancel: &'a CancellationToken,
    invoked: bool,
    completed: Vec<String>,
}

impl<'a> Call<'a> {
    fn new(operation: Operation, cancel: &'a CancellationToken) -> Self {
        Self {
            operation,
            cancel,
            invoked: false,
            completed: Vec::new(),
        }
    }

    /// A read-only remote step.
    async fn lookup<T, Fut>(&mut self, step: &str, fut: Fut) -> OpsResult<T>
    where
        Fut: Future<Output = OpsResult<T>>,
    {
        self.step(step, false, fut).await
    }

    /// A remote step that changes state; recorded once it succeeds.
    async fn apply<T, Fut>(&mut self, step: &str, fut: Fut) -> OpsResult<T>
    where
        Fut: Future<Output = OpsResult<T>>,
    {
        self.step(step, true, fut).await
    }

    async fn step<T, Fut>(&mut self, step: &str, mutates: bool, fut: Fut) -> OpsResult<T>
    where
        Fut: Future<Output = OpsResult<T>>,
    {
        if !self.invoked {
            self.invoked = true;
            tracing::debug!(tool = %self.operation, phase = "invoking");
        }
        tracing::debug!(tool = %self.operation, step, "Running step");

        let cancel = self.cancel;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OpsError::Cancelled {
                    completed_steps: self.completed.clone(),
                });
            }
            result = fut => result,
        };

        match outcome {
            Ok(value) => {
                if mutates {
                    self.completed.push(step.to_string());
                }
                Ok(value)
            }
            Err(e) if self.completed.is_empty() => Err(e),
            Err(e) => Err(OpsError::PartialFailure {
                completed_steps: self.completed.clone(),
                failed_step: step.to_string(),
                cause: Box::new(e),
            }),
        }
    }
}

/// Maps tool calls onto the remote adapter.
pub struct Dispatcher {
    adapter: RemoteAdapter,
    validator: Validator,
    cursors: CursorManager,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(adapter: RemoteAdapter, config: DispatcherConfig) -> Self {
        Self {
            adapter,
            validator: Validator::new(config.scope.clone()),
            cursors: CursorManager::new(config.cursor_ttl, config.max_cursors),
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Decode and dispatch a named tool call.
    pub async fn call(&self, name: &str, arguments: Value, cancel: &CancellationToken) -> ToolResult {
        match ToolRequest::from_call(name, arguments) {
            Ok(request) => self.dispatch(request, cancel).await,
            Err(e) => {
                tracing::debug!(tool = name, phase = "rejected", "{e}");
                e.into()
            }
        }
    }

    /// Run one decoded request to completion.
    pub async fn dispatch(&self, request: ToolRequest, cancel: &CancellationToken) -> ToolResult {
        let operation = request.operation();
        tracing::debug!(tool = %operation, phase = "received");

        let mut call = Call::new(operation, cancel);
        let result = if cancel.is_cancelled() {
            Err(OpsError::Cancelled {
                completed_steps: Vec::new(),
            })
        } else {
            tracing::debug!(tool = %operation, phase = "validating");
            self.run(request, &mut call).await
        };

        match result {
            Ok(payload) => {
                tracing::debug!(tool = %operation, phase = "completed", steps = ?call.completed);
                ToolResult::ok(payload)
            }
            Err(e) => {
                if !call.invoked {
                    tracing::debug!(tool = %operation, phase = "rejected", "{e}");
                } else if matches!(e, OpsError::Cancelled { .. }) {
                    tracing::warn!(tool = %operation, steps = ?call.completed, "Call cancelled");
                } else {
                    tracing::warn!(tool = %operation, phase = "failed", class = ?e.class(), "{e}");
                }
                e.into()
            }
        }
    }

    async fn run(&self, request: ToolRequest, call: &mut Call<'_>) -> OpsResult<Value> {
        match request {
            ToolRequest::CreateQueue(args) => self.create_queue(args, call).await,
            ToolRequest::GetQueueAttributes(args) => self.get_queue_attributes(args, call).await,
            ToolRequest::SetQueueAttributes(args) => self.set_queue_attributes(args, call).await,
            ToolRequest::SetQueuePolicy(args) => {
                self.set_policy(ResourceKind::Queue, args, call).await
            }
            ToolRequest::DeleteQueue(args) => self.delete_queue(args, call).await,
            ToolRequest::ListQueues(args) => self.list_queues(args, call).await,
            ToolRequest::SendMessage(args) => self.send_message(args, call).await,
            ToolRequest::PurgeQueue(args) => self.purge_queue(args, call).await,
            ToolRequest::TagQueue(args) => self.tag(ResourceKind::Queue, args, call).await,
            ToolRequest::UntagQueue(args) => self.untag(ResourceKind::Queue, args, call).await,
            ToolRequest::ListQueueTags(args) => {
                self.list_tags(ResourceKind::Queue, args, call).await
            }
            ToolRequest::CreateTopic(args) => self.create_topic(args, call).await,
            ToolRequest::GetTopicAttributes(args) => self.get_topic_attributes(args, call).await,
            ToolRequest::SetTopicPolicy(args) => {
                self.set_policy(ResourceKind::Topic, args, call).await
            }
            ToolRequest::DeleteTopic(args) => self.delete_topic(args, call).await,
            ToolRequest::ListTopics(args) => self.list_topics(args, call).await,
            ToolRequest::Subscribe(args) => self.subscribe(args, call).await,
            ToolRequest::Unsubscribe(args) => self.unsubscribe(args, call).await,
            ToolRequest::ListSubscriptions(args) => self.list_subscriptions(args, call).await,
            ToolRequest::PublishMessage(args) => self.publish_message(args, call).await,
            ToolRequest::TagTopic(args) => self.tag(ResourceKind::Topic, args, call).await,
            ToolRequest::UntagTopic(args) => self.untag(ResourceKind::Topic, args, call).await,
            ToolRequest::ListTopicTags(args) => {
                self.list_tags(ResourceKind::Topic, args, call).await
            }
        }
    }

    // -- validation helpers -------------------------------------------------

    fn bare_name(&self, kind: ResourceKind, name: &str) -> OpsResult<ResourceId> {
        let id = self.validator.validate(kind, name)?;
        if id.arn().is_some() {
            return Err(OpsError::InvalidIdentifier(format!(
                "a new {kind} takes a bare name, not an ARN"
            )));
        }
        Ok(id)
    }

    fn check_fifo_flag(id: &ResourceId, flag: Option<bool>) -> OpsResult<()> {
        match flag {
            Some(fifo) if fifo != id.is_fifo() => Err(OpsError::InvalidArgument(format!(
                "fifo={fifo} does not agree with the name '{}' (ordered resources end in .fifo)",
                id.name()
            ))),
            _ => Ok(()),
        }
    }

    /// User tags plus the managed marker.
    fn stamped_tags(tags: &Tags) -> OpsResult<Tags> {
        let mut stamped = tags.clone();
        stamped.insert(MANAGED_TAG_KEY.to_string(), MANAGED_TAG_VALUE.to_string());
        validate_tags(&stamped)?;
        Ok(stamped)
    }

    fn cross_resources(&self, arns: &[String]) -> OpsResult<Vec<ResourceId>> {
        arns.iter()
            .map(|raw| {
                let arn = parse_arn(raw)?;
                let kind = match arn.service.as_str() {
                    "sqs" => ResourceKind::Queue,
                    "sns" => ResourceKind::Topic,
                    other => {
                        return Err(OpsError::InvalidPolicy(format!(
                            "cross-resource target '{raw}' is a {other} resource; only queues and topics are allowed"
                        )))
                    }
                };
                self.validator.validate_arn(kind, raw)
            })
            .collect()
    }

    fn queue_attributes(&self, id: &ResourceId, config: &QueueConfig) -> OpsResult<Attributes> {
        let attributes = config.to_attributes(id.is_fifo())?;
        if let Some(redrive) = &config.redrive_policy {
            let dlq = self
                .validator
                .validate_arn(ResourceKind::Queue, &redrive.dead_letter_target_arn)?;
            if dlq.is_fifo() != id.is_fifo() {
                return Err(OpsError::InvalidArgument(
                    "dead-letter queue must be .fifo exactly when the source queue is".to_string(),
                ));
            }
            if dlq.name() == id.name() && dlq.account() == id.account() {
                return Err(OpsError::InvalidArgument(
                    "a queue cannot be its own dead-letter queue".to_string(),
                ));
            }
        }
        Ok(attributes)
    }

    fn check_message_fields(
        id: &ResourceId,
        group_id: Option<&str>,
        dedup_id: Option<&str>,
        attributes: &Attributes,
    ) -> OpsResult<()> {
        for (field, value) in [("message_group_id", group_id), ("message_deduplication_id", dedup_id)] {
            if let Some(value) = value {
                let valid = !value.is_empty()
                    && value.len() <= MAX_MESSAGE_ID_LEN
                    && value.chars().all(|c| c.is_ascii_graphic());
                if !valid {
                    return Err(OpsError::InvalidArgument(format!(
                        "{field} must be 1-{MAX_MESSAGE_ID_LEN} printable ASCII characters"
                    )));
                }
            }
        }
        if id.is_fifo() {
            if group_id.is_none() {
                return Err(OpsError::InvalidArgument(format!(
                    "message_group_id is required for ordered {} '{}'",
                    id.kind(),
                    id.name()
                )));
            }
        } else if group_id.is_some() || dedup_id.is_some() {
            return Err(OpsError::InvalidArgument(format!(
                "message_group_id and message_deduplication_id apply only to .fifo {}s",
                id.kind()
            )));
        }
        if attributes.len() > MAX_MESSAGE_ATTRIBUTES {
            return Err(OpsError::InvalidArgument(format!(
                "at most {MAX_MESSAGE_ATTRIBUTES} message attributes are allowed"
            )));
        }
        if let Some((name, _)) = attributes.iter().find(|(k, _)| k.is_empty() || k.len() > 256) {
            return Err(OpsError::InvalidArgument(format!(
                "invalid message attribute name '{name}'"
            )));
        }
        Ok(())
    }

    // -- remote helpers -----------------------------------------------------

    /// Refuse to let a guarded `action` touch a resource msgops did not
    /// create, unless configured to.
    async fn ensure_managed(
        &self,
        action: Operation,
        id: &ResourceId,
        call: &mut Call<'_>,
    ) -> OpsResult<()> {
        if !action.is_guarded() || !self.config.guard_managed_resources {
            return Ok(());
        }
        let tags = match id.kind() {
            ResourceKind::Queue => {
                call.lookup("check-managed-tag", self.adapter.list_queue_tags(id))
                    .await?
            }
            _ => {
                call.lookup("check-managed-tag", self.adapter.list_topic_tags(id))
                    .await?
            }
        };
        if !is_managed(&tags) {
            return Err(OpsError::ProtectedResource(format!(
                "{id} is not tagged '{MANAGED_TAG_KEY}={MANAGED_TAG_VALUE}'; start the server with --allow-unmanaged to manage it"
            )));
        }
        Ok(())
    }

    /// The full ARN of a queue or topic, asking the remote side if needed.
    async fn resolve_arn(&self, id: &ResourceId, call: &mut Call<'_>) -> OpsResult<Arn> {
        if let Some(arn) = id.arn() {
            return Ok(arn.clone());
        }
        let raw = match id.kind() {
            ResourceKind::Queue => {
                call.lookup("resolve-arn", self.adapter.get_queue_attributes(id))
                    .await?
                    .0
                    .queue_arn
            }
            _ => {
                call.lookup("resolve-arn", self.adapter.get_topic_attributes(id))
                    .await?
                    .0
                    .topic_arn
            }
        };
        remote_arn(&raw)
    }

    async fn attach_policy(&self, id: &ResourceId, document: &PolicyDocument) -> OpsResult<()> {
        let json = document.to_json()?;
        match id.kind() {
            ResourceKind::Queue => {
                let mut attributes = Attributes::new();
                attributes.insert("Policy".to_string(), json);
                self.adapter.set_queue_attributes(id, &attributes).await
            }
            _ => self.adapter.set_topic_attribute(id, "Policy", &json).await,
        }
    }

    // -- queue tools --------------------------------------------------------

    async fn create_queue(&self, args: CreateQueueArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.bare_name(ResourceKind::Queue, &args.queue_name)?;
        Self::check_fifo_flag(&id, args.fifo)?;
        let mut attributes = self.queue_attributes(&id, &args.attributes)?;
        if id.is_fifo() {
            attributes.insert("FifoQueue".to_string(), "true".to_string());
        }
        let tags = Self::stamped_tags(&args.tags)?;
        let cross = self.cross_resources(&args.allow_cross_resource)?;
        let builder = PolicyBuilder::new(&id).allow_resources(&cross)?;
        if let Some(statements) = &args.policy {
            builder.check(statements)?;
        }

        let request = CreateQueue {
            name: id.name().to_string(),
            attributes,
            tags,
        };
        let handle = call
            .apply("create-queue", self.adapter.create_queue(&request))
            .await?;

        let mut policy = None;
        if let Some(statements) = &args.policy {
            let document = call
                .apply("set-queue-policy", async {
                    let document = builder.build(&remote_arn(&handle.queue_arn)?, statements)?;
                    self.attach_policy(&id, &document).await?;
                    Ok::<_, OpsError>(document)
                })
                .await?;
            policy = Some(document);
        }

        Ok(json!({
            "queue_name": handle.name,
            "queue_url": handle.queue_url,
            "queue_arn": handle.queue_arn,
            "fifo": id.is_fifo(),
            "policy": policy,
        }))
    }

    async fn get_queue_attributes(&self, args: QueueArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Queue, &args.queue)?;
        let (handle, attributes) = call
            .lookup("get-queue-attributes", self.adapter.get_queue_attributes(&id))
            .await?;
        Ok(json!({
            "queue_name": handle.name,
            "queue_url": handle.queue_url,
            "queue_arn": handle.queue_arn,
            "attributes": attributes,
        }))
    }

    async fn set_queue_attributes(
        &self,
        args: SetQueueAttributesArgs,
        call: &mut Call<'_>,
    ) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Queue, &args.queue)?;
        if args.attributes.is_empty() {
            return Err(OpsError::InvalidArgument(
                "set-queue-attributes needs at least one attribute".to_string(),
            ));
        }
        let attributes = self.queue_attributes(&id, &args.attributes)?;

        self.ensure_managed(call.operation, &id, call).await?;
        call.apply(
            "set-queue-attributes",
            self.adapter.set_queue_attributes(&id, &attributes),
        )
        .await?;

        Ok(json!({
            "queue": id.display_id(),
            "updated": attributes.keys().collect::<Vec<_>>(),
        }))
    }

    async fn set_policy(
        &self,
        kind: ResourceKind,
        args: SetPolicyArgs,
        call: &mut Call<'_>,
    ) -> OpsResult<Value> {
        let id = self.validator.validate(kind, &args.target)?;
        let cross = self.cross_resources(&args.allow_cross_resource)?;
        let builder = PolicyBuilder::new(&id).allow_resources(&cross)?;
        builder.check(&args.statements)?;

        self.ensure_managed(call.operation, &id, call).await?;
        let arn = self.resolve_arn(&id, call).await?;
        let document = builder.build(&arn, &args.statements)?;
        let step = match kind {
            ResourceKind::Queue => "set-queue-policy",
            _ => "set-topic-policy",
        };
        call.apply(step, self.attach_policy(&id, &document)).await?;

        Ok(json!({
            "resource_arn": arn.to_string(),
            "policy": document,
        }))
    }

    async fn delete_queue(&self, args: QueueArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Queue, &args.queue)?;
        self.ensure_managed(call.operation, &id, call).await?;
        call.apply("delete-queue", self.adapter.delete_queue(&id))
            .await?;
        Ok(json!({ "queue": id.display_id(), "deleted": true }))
    }

    async fn list_queues(&self, args: ListQueuesArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        if let Some(prefix) = &args.prefix {
            let valid = prefix.len() <= MAX_QUEUE_NAME_LEN
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(OpsError::InvalidArgument(format!(
                    "invalid queue name prefix '{prefix}'"
                )));
            }
        }
        let page_size = args.page_size.unwrap_or(self.config.default_page_size);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(OpsError::InvalidArgument(format!(
                "page_size must be 1-{MAX_PAGE_SIZE}, got {page_size}"
            )));
        }

        let fp = fingerprint(&json!({ "prefix": args.prefix, "page_size": args.page_size }));
        let adapter = &self.adapter;
        let prefix = args.prefix.as_deref();
        let (queues, cursor) = self
            .cursors
            .next_page(
                Operation::ListQueues,
                &fp,
                args.cursor.as_deref(),
                |token| async move {
                    call.lookup(
                        "list-queues",
                        adapter.list_queues(prefix, page_size, token.as_deref()),
                    )
                    .await
                },
            )
            .await?;

        Ok(json!({ "queues": queues, "cursor": cursor }))
    }

    async fn send_message(&self, args: SendMessageArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Queue, &args.queue)?;
        validate_body("body", &args.body)?;
        Self::check_message_fields(
            &id,
            args.message_group_id.as_deref(),
            args.message_deduplication_id.as_deref(),
            &args.message_attributes,
        )?;
        if let Some(delay) = args.delay_seconds {
            if id.is_fifo() {
                return Err(OpsError::InvalidArgument(
                    "delay_seconds is not supported per message on .fifo queues".to_string(),
                ));
            }
            if delay > 900 {
                return Err(OpsError::InvalidArgument(format!(
                    "delay_seconds must be 0-900, got {delay}"
                )));
            }
        }

        let message = OutboundMessage {
            body: args.body,
            subject: None,
            delay_seconds: args.delay_seconds,
            group_id: args.message_group_id,
            deduplication_id: args.message_deduplication_id,
            attributes: args.message_attributes,
        };
        let sent = call
            .apply("send-message", self.adapter.send_message(&id, &message))
            .await?;

        Ok(json!({
            "queue": id.display_id(),
            "message_id": sent.message_id,
            "sequence_number": sent.sequence_number,
            "deduplication_id": sent.deduplication_id,
        }))
    }

    async fn purge_queue(&self, args: QueueArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Queue, &args.queue)?;
        self.ensure_managed(call.operation, &id, call).await?;
        call.apply("purge-queue", self.adapter.purge_queue(&id))
            .await?;
        Ok(json!({ "queue": id.display_id(), "purged": true }))
    }

    // -- tags (queues and topics) ------------------------------------------

    async fn tag(&self, kind: ResourceKind, args: TagArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(kind, &args.target)?;
        if args.tags.is_empty() {
            return Err(OpsError::InvalidArgument("tags must not be empty".to_string()));
        }
        validate_tags(&args.tags)?;

        match kind {
            ResourceKind::Queue => {
                call.apply("tag-queue", self.adapter.tag_queue(&id, &args.tags))
                    .await?
            }
            _ => {
                call.apply("tag-topic", self.adapter.tag_topic(&id, &args.tags))
                    .await?
            }
        }
        Ok(json!({
            kind.as_str(): id.display_id(),
            "tagged": args.tags.keys().collect::<Vec<_>>(),
        }))
    }

    async fn untag(&self, kind: ResourceKind, args: UntagArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(kind, &args.target)?;
        if args.tag_keys.is_empty() {
            return Err(OpsError::InvalidArgument("tag_keys must not be empty".to_string()));
        }
        for key in &args.tag_keys {
            validate_tag_key(key)?;
        }
        if self.config.guard_managed_resources && args.tag_keys.iter().any(|k| k == MANAGED_TAG_KEY)
        {
            return Err(OpsError::ProtectedResource(format!(
                "the '{MANAGED_TAG_KEY}' tag marks resources managed by msgops and cannot be removed"
            )));
        }

        match kind {
            ResourceKind::Queue => {
                call.apply("untag-queue", self.adapter.untag_queue(&id, &args.tag_keys))
                    .await?
            }
            _ => {
                call.apply("untag-topic", self.adapter.untag_topic(&id, &args.tag_keys))
                    .await?
            }
        }
        Ok(json!({
            kind.as_str(): id.display_id(),
            "removed": args.tag_keys,
        }))
    }

    async fn list_tags(
        &self,
        kind: ResourceKind,
        args: TargetArgs,
        call: &mut Call<'_>,
    ) -> OpsResult<Value> {
        let id = self.validator.validate(kind, &args.target)?;
        let tags = match kind {
            ResourceKind::Queue => {
                call.lookup("list-queue-tags", self.adapter.list_queue_tags(&id))
                    .await?
            }
            _ => {
                call.lookup("list-topic-tags", self.adapter.list_topic_tags(&id))
                    .await?
            }
        };
        Ok(json!({
            kind.as_str(): id.display_id(),
            "managed": is_managed(&tags),
            "tags": tags,
        }))
    }

    // -- topic tools --------------------------------------------------------

    async fn create_topic(&self, args: CreateTopicArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.bare_name(ResourceKind::Topic, &args.topic_name)?;
        Self::check_fifo_flag(&id, args.fifo)?;
        let mut attributes = args.attributes.to_attributes(id.is_fifo())?;
        if id.is_fifo() {
            attributes.insert("FifoTopic".to_string(), "true".to_string());
        }
        let tags = Self::stamped_tags(&args.tags)?;
        let cross = self.cross_resources(&args.allow_cross_resource)?;
        let builder = PolicyBuilder::new(&id).allow_resources(&cross)?;
        if let Some(statements) = &args.policy {
            builder.check(statements)?;
        }

        let request = CreateTopic {
            name: id.name().to_string(),
            attributes,
            tags,
        };
        let handle = call
            .apply("create-topic", self.adapter.create_topic(&request))
            .await?;

        let mut policy = None;
        if let Some(statements) = &args.policy {
            let document = call
                .apply("set-topic-policy", async {
                    let document = builder.build(&remote_arn(&handle.topic_arn)?, statements)?;
                    self.attach_policy(&id, &document).await?;
                    Ok::<_, OpsError>(document)
                })
                .await?;
            policy = Some(document);
        }

        Ok(json!({
            "topic_name": handle.name,
            "topic_arn": handle.topic_arn,
            "fifo": id.is_fifo(),
            "policy": policy,
        }))
    }

    async fn get_topic_attributes(&self, args: TopicArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Topic, &args.topic)?;
        let (handle, attributes) = call
            .lookup("get-topic-attributes", self.adapter.get_topic_attributes(&id))
            .await?;
        Ok(json!({
            "topic_name": handle.name,
            "topic_arn": handle.topic_arn,
            "attributes": attributes,
        }))
    }

    async fn delete_topic(&self, args: TopicArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Topic, &args.topic)?;
        self.ensure_managed(call.operation, &id, call).await?;
        call.apply("delete-topic", self.adapter.delete_topic(&id))
            .await?;
        Ok(json!({ "topic": id.display_id(), "deleted": true }))
    }

    async fn list_topics(&self, args: ListTopicsArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let fp = fingerprint(&json!({}));
        let adapter = &self.adapter;
        let (topics, cursor) = self
            .cursors
            .next_page(
                Operation::ListTopics,
                &fp,
                args.cursor.as_deref(),
                |token| async move {
                    call.lookup("list-topics", adapter.list_topics(token.as_deref()))
                        .await
                },
            )
            .await?;
        Ok(json!({ "topics": topics, "cursor": cursor }))
    }

    async fn subscribe(&self, args: SubscribeArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let topic = self.validator.validate(ResourceKind::Topic, &args.topic)?;
        let protocol = args.protocol.to_ascii_lowercase();
        if !SUBSCRIPTION_PROTOCOLS.contains(&protocol.as_str()) {
            return Err(OpsError::InvalidArgument(format!(
                "unsupported protocol '{}'; expected one of {}",
                args.protocol,
                SUBSCRIPTION_PROTOCOLS.join(", ")
            )));
        }
        let queue = self.check_endpoint(&topic, &protocol, &args.endpoint)?;

        let mut attributes = Attributes::new();
        if let Some(filter) = &args.filter_policy {
            if !filter.is_object() {
                return Err(OpsError::InvalidArgument(
                    "filter_policy must be a JSON object".to_string(),
                ));
            }
            attributes.insert("FilterPolicy".to_string(), filter.to_string());
        }
        if let Some(raw) = args.raw_message_delivery {
            if !matches!(protocol.as_str(), "sqs" | "http" | "https" | "firehose") {
                return Err(OpsError::InvalidArgument(format!(
                    "raw_message_delivery is not supported for protocol '{protocol}'"
                )));
            }
            attributes.insert("RawMessageDelivery".to_string(), raw.to_string());
        }
        if args.grant_queue_access && queue.is_none() {
            return Err(OpsError::InvalidArgument(
                "grant_queue_access applies only to the sqs protocol".to_string(),
            ));
        }

        let mut granted = false;
        if let (true, Some(queue)) = (args.grant_queue_access, &queue) {
            self.ensure_managed(Operation::SetQueuePolicy, queue, call).await?;
            let topic_arn = self.resolve_arn(&topic, call).await?;
            let (handle, existing) = call
                .lookup("get-queue-policy", self.adapter.get_queue_attributes(queue))
                .await?;
            let queue_arn = remote_arn(&handle.queue_arn)?;
            let policy = delivery_policy(
                queue,
                &queue_arn,
                &topic_arn,
                existing.get("Policy").map(String::as_str),
            )?;
            let mut update = Attributes::new();
            update.insert("Policy".to_string(), policy);
            call.apply(
                "grant-queue-access",
                self.adapter.set_queue_attributes(queue, &update),
            )
            .await?;
            granted = true;
        }

        let request = SubscribeRequest {
            topic,
            protocol,
            endpoint: args.endpoint,
            attributes,
        };
        let subscription = call
            .apply("subscribe", self.adapter.subscribe(&request))
            .await?;

        Ok(json!({
            "subscription_arn": subscription.subscription_arn,
            "topic_arn": subscription.topic_arn,
            "protocol": subscription.protocol,
            "endpoint": subscription.endpoint,
            "queue_access_granted": granted,
        }))
    }

    /// Check an endpoint against its protocol; `sqs` endpoints yield the queue.
    fn check_endpoint(
        &self,
        topic: &ResourceId,
        protocol: &str,
        endpoint: &str,
    ) -> OpsResult<Option<ResourceId>> {
        let expect_arn_service = |service: &str| -> OpsResult<()> {
            let arn = parse_arn(endpoint)?;
            if arn.service != service {
                return Err(OpsError::InvalidArgument(format!(
                    "{protocol} endpoints must be {service} ARNs, got '{endpoint}'"
                )));
            }
            Ok(())
        };

        match protocol {
            "sqs" => {
                let queue = self.validator.validate_arn(ResourceKind::Queue, endpoint)?;
                if queue.is_fifo() != topic.is_fifo() {
                    return Err(OpsError::InvalidArgument(
                        ".fifo topics deliver only to .fifo queues, and standard topics only to standard queues"
                            .to_string(),
                    ));
                }
                return Ok(Some(queue));
            }
            "http" | "https" => {
                let scheme = format!("{protocol}://");
                if !endpoint.to_ascii_lowercase().starts_with(&scheme) || endpoint.len() <= scheme.len() {
                    return Err(OpsError::InvalidArgument(format!(
                        "{protocol} endpoints must start with {scheme}"
                    )));
                }
            }
            "email" | "email-json" => {
                let valid = endpoint
                    .split_once('@')
                    .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
                if !valid {
                    return Err(OpsError::InvalidArgument(format!(
                        "'{endpoint}' is not an email address"
                    )));
                }
            }
            "sms" => {
                let digits = endpoint.strip_prefix('+').unwrap_or(endpoint);
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(OpsError::InvalidArgument(format!(
                        "'{endpoint}' is not an E.164 phone number"
                    )));
                }
            }
            "lambda" => expect_arn_service("lambda")?,
            "application" => expect_arn_service("sns")?,
            "firehose" => expect_arn_service("firehose")?,
            _ => {}
        }
        Ok(None)
    }

    async fn unsubscribe(&self, args: UnsubscribeArgs, call: &mut Call<'_>) -> OpsResult<Value> {
        let id = self
            .validator
            .validate(ResourceKind::Subscription, &args.subscription_arn)?;
        call.apply("unsubscribe", self.adapter.unsubscribe(&id))
            .await?;
        Ok(json!({ "subscription_arn": id.display_id(), "unsubscribed": true }))
    }

    async fn list_subscriptions(
        &self,
        args: ListSubscriptionsArgs,
        call: &mut Call<'_>,
    ) -> OpsResult<Value> {
        let topic = self.validator.validate(ResourceKind::Topic, &args.topic)?;
        let fp = fingerprint(&json!({ "topic": args.topic }));
        let adapter = &self.adapter;
        let topic_ref = &topic;
        let (subscriptions, cursor) = self
            .cursors
            .next_page(
                Operation::ListSubscriptions,
                &fp,
                args.cursor.as_deref(),
                |token| async move {
                    call.lookup(
                        "list-subscriptions",
                        adapter.list_subscriptions(topic_ref, token.as_deref()),
                    )
                    .await
                },
            )
            .await?;
        Ok(json!({
            "topic": topic.display_id(),
            "subscriptions": subscriptions,
            "cursor": cursor,
        }))
    }

    async fn publish_message(
        &self,
        args: PublishMessageArgs,
        call: &mut Call<'_>,
    ) -> OpsResult<Value> {
        let id = self.validator.validate(ResourceKind::Topic, &args.topic)?;
        validate_body("message", &args.message)?;
        Self::check_message_fields(
            &id,
            args.message_group_id.as_deref(),
            args.message_deduplication_id.as_deref(),
            &args.message_attributes,
        )?;
        if let Some(subject) = &args.subject {
            let valid = !subject.trim().is_empty()
                && subject.chars().count() <= MAX_SUBJECT_LEN
                && !subject.chars().any(|c| c.is_control());
            if !valid {
                return Err(OpsError::InvalidArgument(format!(
                    "subject must be 1-{MAX_SUBJECT_LEN} characters without line breaks"
                )));
            }
        }

        let message = OutboundMessage {
            body: args.message,
            subject: args.subject,
            delay_seconds: None,
            group_id: args.message_group_id,
            deduplication_id: args.message_deduplication_id,
            attributes: args.message_attributes,
        };
        let sent = call
            .apply("publish-message", self.adapter.publish(&id, &message))
            .await?;

        Ok(json!({
            "topic": id.display_id(),
            "message_id": sent.message_id,
            "sequence_number": sent.sequence_number,
            "deduplication_id": sent.deduplication_id,
        }))
    }
}

/// Parse an ARN the remote service handed back.
fn remote_arn(raw: &str) -> OpsResult<Arn> {
    parse_arn(raw)
        .map_err(|e| OpsError::RemoteFailure(format!("service returned an unusable ARN: {e}")))
}

/// Queue policy letting `topic_arn` deliver, merged into any existing policy.
///
/// An existing statement with the same sid is replaced, so granting twice
/// leaves one statement.
fn delivery_policy(
    queue: &ResourceId,
    queue_arn: &Arn,
    topic_arn: &Arn,
    existing: Option<&str>,
) -> OpsResult<String> {
    let mut statement: StatementInput = topic_delivery_statement(&topic_arn.to_string());
    let suffix: String = topic_arn
        .resource
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let sid = format!("AllowTopicDelivery{suffix}");
    statement.sid = Some(sid.clone());
    let document = PolicyBuilder::new(queue).build(queue_arn, &[statement])?;

    let Some(existing) = existing.filter(|p| !p.trim().is_empty()) else {
        return document.to_json();
    };

    let mut current: Value = serde_json::from_str(existing).map_err(|e| {
        OpsError::RemoteFailure(format!("existing queue policy is not valid JSON: {e}"))
    })?;
    let added = serde_json::to_value(&document.statement[0])
        .map_err(|e| OpsError::InvalidPolicy(format!("failed to encode statement: {e}")))?;

    let object = current.as_object_mut().ok_or_else(|| {
        OpsError::RemoteFailure("existing queue policy is not a JSON object".to_string())
    })?;
    let mut statements = match object.remove("Statement") {
        Some(Value::Array(items)) => items,
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };
    statements.retain(|s| s.get("Sid").and_then(Value::as_str) != Some(sid.as_str()));
    statements.push(added);
    object
        .entry("Version")
        .or_insert_with(|| Value::String(document.version.clone()));
    object.insert("Statement".to_string(), Value::Array(statements));
    Ok(current.to_string())
}
