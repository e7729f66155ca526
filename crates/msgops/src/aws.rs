//! AWS backend over the SQS and SNS SDKs.
//!
//! Configuration is loaded once from an explicit [`AwsClientConfig`]; the
//! SDK's own retry layer is disabled so [`crate::retry::RetryPolicy`] stays
//! the only retry authority. SDK failures are classified by error code.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{AppName, BehaviorVersion, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{MessageAttributeValue as SqsAttributeValue, QueueAttributeName};

use crate::client::{
    CreateQueue, CreateTopic, MessagingClient, OutboundMessage, RemoteError, RemoteErrorKind,
    RemoteResult, SubscribeRequest,
};
use crate::types::{
    Attributes, Page, QueueHandle, QueueSummary, ResourceId, SentMessage, SubscriptionSummary,
    Tags, TopicHandle,
};

/// App name attached to every request's user agent.
pub const APP_NAME: &str = "msgops-mcp";

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottled",
    "RequestThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "KMSThrottling",
    "KMS.ThrottlingException",
];

const NOT_FOUND_CODES: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    "NonExistentQueue",
    "NotFound",
    "NotFoundException",
    "ResourceNotFoundException",
];

const CONFLICT_CODES: &[&str] = &[
    "QueueAlreadyExists",
    "QueueNameExists",
    "AWS.SimpleQueueService.QueueDeletedRecently",
    "QueueDeletedRecently",
    "ConcurrentAccess",
    "ConcurrentAccessException",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthorizationError",
    "AuthorizationErrorException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidSecurity",
    "KMSAccessDenied",
];

const TRANSPORT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "InternalErrorException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "RequestTimeout",
];

const INVALID_CODES: &[&str] = &[
    "InvalidParameter",
    "InvalidParameterException",
    "InvalidParameterValue",
    "InvalidParameterValueException",
    "InvalidAttributeName",
    "InvalidAttributeValue",
    "InvalidMessageContents",
    "MissingParameter",
    "ValidationError",
    "ValidationException",
    "UnsupportedOperation",
];

/// Where and as whom to talk to AWS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsClientConfig {
    pub region: String,
    pub profile: Option<String>,
    /// Override for local emulators.
    pub endpoint_url: Option<String>,
}

/// [`MessagingClient`] backed by `aws-sdk-sqs` and `aws-sdk-sns`.
#[derive(Debug, Clone)]
pub struct AwsMessagingClient {
    sqs: aws_sdk_sqs::Client,
    sns: aws_sdk_sns::Client,
}

impl AwsMessagingClient {
    /// Resolve credentials and build both service clients.
    pub async fn connect(config: &AwsClientConfig) -> RemoteResult<Self> {
        let app_name = AppName::new(APP_NAME)
            .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidRequest, e.to_string()))?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled())
            .app_name(app_name);
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        tracing::info!(
            region = %config.region,
            profile = config.profile.as_deref().unwrap_or("default"),
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "AWS messaging client configured"
        );

        Ok(Self {
            sqs: aws_sdk_sqs::Client::new(&shared),
            sns: aws_sdk_sns::Client::new(&shared),
        })
    }

    async fn queue_url(&self, queue: &ResourceId) -> RemoteResult<String> {
        let out = self
            .sqs
            .get_queue_url()
            .queue_name(queue.name())
            .set_queue_owner_aws_account_id(queue.account().map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("GetQueueUrl", e))?;
        out.queue_url()
            .map(str::to_string)
            .ok_or_else(|| missing_field("GetQueueUrl", "QueueUrl"))
    }

    async fn queue_arn(&self, queue_url: &str) -> RemoteResult<String> {
        let out = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| classify("GetQueueAttributes", e))?;
        out.attributes()
            .and_then(|a| a.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| missing_field("GetQueueAttributes", "QueueArn"))
    }

    /// Topics addressed by bare name are looked up through `ListTopics`.
    async fn topic_arn(&self, topic: &ResourceId) -> RemoteResult<String> {
        if let Some(arn) = topic.arn() {
            return Ok(arn.to_string());
        }
        let suffix = format!(":{}", topic.name());
        let mut next_token = None;
        loop {
            let out = self
                .sns
                .list_topics()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| classify("ListTopics", e))?;
            if let Some(arn) = out
                .topics()
                .iter()
                .filter_map(|t| t.topic_arn())
                .find(|arn| arn.ends_with(&suffix))
            {
                return Ok(arn.to_string());
            }
            match out.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        Err(RemoteError::not_found(format!(
            "Topic {} does not exist",
            topic.name()
        )))
    }
}

fn classify<E, R>(action: &str, err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: fmt::Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => RemoteErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => RemoteErrorKind::Transport,
        SdkError::ConstructionFailure(_) => RemoteErrorKind::InvalidRequest,
        SdkError::ServiceError(ctx) => {
            classify_code(ctx.err().code().unwrap_or_default(), ctx.err().message())
        }
        _ => RemoteErrorKind::Service,
    };
    let message = match (&err, kind) {
        (SdkError::ServiceError(ctx), _) => format!(
            "{action}: {}",
            ctx.err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| ctx.err().code().unwrap_or("unknown error").to_string())
        ),
        _ => format!("{action}: {}", DisplayErrorContext(&err)),
    };
    RemoteError::new(kind, message)
}

fn classify_code(code: &str, message: Option<&str>) -> RemoteErrorKind {
    let message = message.unwrap_or_default().to_ascii_lowercase();
    if THROTTLING_CODES.contains(&code) {
        RemoteErrorKind::Throttled
    } else if NOT_FOUND_CODES.contains(&code) {
        RemoteErrorKind::NotFound
    } else if CONFLICT_CODES.contains(&code) || message.contains("already exists") {
        RemoteErrorKind::Conflict
    } else if ACCESS_DENIED_CODES.contains(&code) {
        RemoteErrorKind::AccessDenied
    } else if TRANSPORT_CODES.contains(&code) {
        RemoteErrorKind::Transport
    } else if INVALID_CODES.contains(&code) {
        RemoteErrorKind::InvalidRequest
    } else {
        RemoteErrorKind::Service
    }
}

fn missing_field(action: &str, field: &str) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::Service,
        format!("{action}: response is missing {field}"),
    )
}

fn queue_name_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

fn sqs_attributes(attributes: &Attributes) -> HashMap<QueueAttributeName, String> {
    attributes
        .iter()
        .map(|(k, v)| (QueueAttributeName::from(k.as_str()), v.clone()))
        .collect()
}

fn sqs_message_attributes(
    attributes: &Attributes,
) -> RemoteResult<Option<HashMap<String, SqsAttributeValue>>> {
    if attributes.is_empty() {
        return Ok(None);
    }
    let mut out = HashMap::with_capacity(attributes.len());
    for (name, value) in attributes {
        let value = SqsAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidRequest, e.to_string()))?;
        out.insert(name.clone(), value);
    }
    Ok(Some(out))
}

fn sns_message_attributes(
    attributes: &Attributes,
) -> RemoteResult<Option<HashMap<String, aws_sdk_sns::types::MessageAttributeValue>>> {
    if attributes.is_empty() {
        return Ok(None);
    }
    let mut out = HashMap::with_capacity(attributes.len());
    for (name, value) in attributes {
        let value = aws_sdk_sns::types::MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidRequest, e.to_string()))?;
        out.insert(name.clone(), value);
    }
    Ok(Some(out))
}

fn sns_tags(tags: &Tags) -> RemoteResult<Vec<aws_sdk_sns::types::Tag>> {
    tags.iter()
        .map(|(k, v)| {
            aws_sdk_sns::types::Tag::builder()
                .key(k)
                .value(v)
                .build()
                .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidRequest, e.to_string()))
        })
        .collect()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

#[async_trait]
impl MessagingClient for AwsMessagingClient {
    async fn create_queue(&self, request: &CreateQueue) -> RemoteResult<QueueHandle> {
        let tags: HashMap<String, String> = request.tags.clone().into_iter().collect();
        let out = self
            .sqs
            .create_queue()
            .queue_name(&request.name)
            .set_attributes(Some(sqs_attributes(&request.attributes)))
            .set_tags((!tags.is_empty()).then_some(tags))
            .send()
            .await
            .map_err(|e| classify("CreateQueue", e))?;
        let queue_url = out
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| missing_field("CreateQueue", "QueueUrl"))?;
        let queue_arn = self.queue_arn(&queue_url).await?;
        Ok(QueueHandle {
            name: request.name.clone(),
            queue_url,
            queue_arn,
        })
    }

    async fn get_queue_attributes(
        &self,
        queue: &ResourceId,
    ) -> RemoteResult<(QueueHandle, Attributes)> {
        let queue_url = self.queue_url(queue).await?;
        let out = self
            .sqs
            .get_queue_attributes()
            .queue_url(&queue_url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| classify("GetQueueAttributes", e))?;
        let attributes: Attributes = out
            .attributes()
            .map(|a| {
                a.iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let queue_arn = attributes
            .get("QueueArn")
            .cloned()
            .ok_or_else(|| missing_field("GetQueueAttributes", "QueueArn"))?;
        Ok((
            QueueHandle {
                name: queue.name().to_string(),
                queue_url,
                queue_arn,
            },
            attributes,
        ))
    }

    async fn set_queue_attributes(
        &self,
        queue: &ResourceId,
        attributes: &Attributes,
    ) -> RemoteResult<()> {
        let queue_url = self.queue_url(queue).await?;
        self.sqs
            .set_queue_attributes()
            .queue_url(queue_url)
            .set_attributes(Some(sqs_attributes(attributes)))
            .send()
            .await
            .map_err(|e| classify("SetQueueAttributes", e))?;
        Ok(())
    }

    async fn delete_queue(&self, queue: &ResourceId) -> RemoteResult<()> {
        let queue_url = self.queue_url(queue).await?;
        self.sqs
            .delete_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| classify("DeleteQueue", e))?;
        Ok(())
    }

    async fn list_queues(
        &self,
        prefix: Option<&str>,
        page_size: u32,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<QueueSummary>> {
        let out = self
            .sqs
            .list_queues()
            .set_queue_name_prefix(prefix.map(str::to_string))
            .max_results(i32::try_from(page_size).unwrap_or(i32::MAX))
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("ListQueues", e))?;
        let items = out
            .queue_urls()
            .iter()
            .map(|url| QueueSummary {
                name: queue_name_from_url(url),
                queue_url: url.clone(),
            })
            .collect();
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn send_message(
        &self,
        queue: &ResourceId,
        message: &OutboundMessage,
    ) -> RemoteResult<SentMessage> {
        let queue_url = self.queue_url(queue).await?;
        let out = self
            .sqs
            .send_message()
            .queue_url(queue_url)
            .message_body(&message.body)
            .set_delay_seconds(message.delay_seconds.map(|d| d as i32))
            .set_message_group_id(message.group_id.clone())
            .set_message_deduplication_id(message.deduplication_id.clone())
            .set_message_attributes(sqs_message_attributes(&message.attributes)?)
            .send()
            .await
            .map_err(|e| classify("SendMessage", e))?;
        Ok(SentMessage {
            message_id: out
                .message_id()
                .map(str::to_string)
                .ok_or_else(|| missing_field("SendMessage", "MessageId"))?,
            sequence_number: out.sequence_number().map(str::to_string),
            deduplication_id: message.deduplication_id.clone(),
        })
    }

    async fn purge_queue(&self, queue: &ResourceId) -> RemoteResult<()> {
        let queue_url = self.queue_url(queue).await?;
        self.sqs
            .purge_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| classify("PurgeQueue", e))?;
        Ok(())
    }

    async fn tag_queue(&self, queue: &ResourceId, tags: &Tags) -> RemoteResult<()> {
        let queue_url = self.queue_url(queue).await?;
        self.sqs
            .tag_queue()
            .queue_url(queue_url)
            .set_tags(Some(tags.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| classify("TagQueue", e))?;
        Ok(())
    }

    async fn untag_queue(&self, queue: &ResourceId, keys: &[String]) -> RemoteResult<()> {
        let queue_url = self.queue_url(queue).await?;
        self.sqs
            .untag_queue()
            .queue_url(queue_url)
            .set_tag_keys(Some(keys.to_vec()))
            .send()
            .await
            .map_err(|e| classify("UntagQueue", e))?;
        Ok(())
    }

    async fn list_queue_tags(&self, queue: &ResourceId) -> RemoteResult<Tags> {
        let queue_url = self.queue_url(queue).await?;
        let out = self
            .sqs
            .list_queue_tags()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| classify("ListQueueTags", e))?;
        Ok(out
            .tags()
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn create_topic(&self, request: &CreateTopic) -> RemoteResult<TopicHandle> {
        let attributes: HashMap<String, String> = request.attributes.clone().into_iter().collect();
        let out = self
            .sns
            .create_topic()
            .name(&request.name)
            .set_attributes((!attributes.is_empty()).then_some(attributes))
            .set_tags(non_empty(sns_tags(&request.tags)?))
            .send()
            .await
            .map_err(|e| classify("CreateTopic", e))?;
        Ok(TopicHandle {
            name: request.name.clone(),
            topic_arn: out
                .topic_arn()
                .map(str::to_string)
                .ok_or_else(|| missing_field("CreateTopic", "TopicArn"))?,
        })
    }

    async fn get_topic_attributes(
        &self,
        topic: &ResourceId,
    ) -> RemoteResult<(TopicHandle, Attributes)> {
        let topic_arn = self.topic_arn(topic).await?;
        let out = self
            .sns
            .get_topic_attributes()
            .topic_arn(&topic_arn)
            .send()
            .await
            .map_err(|e| classify("GetTopicAttributes", e))?;
        let attributes = out
            .attributes()
            .map(|a| a.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok((
            TopicHandle {
                name: topic.name().to_string(),
                topic_arn,
            },
            attributes,
        ))
    }

    async fn set_topic_attribute(
        &self,
        topic: &ResourceId,
        name: &str,
        value: &str,
    ) -> RemoteResult<()> {
        let topic_arn = self.topic_arn(topic).await?;
        self.sns
            .set_topic_attributes()
            .topic_arn(topic_arn)
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(|e| classify("SetTopicAttributes", e))?;
        Ok(())
    }

    async fn delete_topic(&self, topic: &ResourceId) -> RemoteResult<()> {
        let topic_arn = self.topic_arn(topic).await?;
        self.sns
            .delete_topic()
            .topic_arn(topic_arn)
            .send()
            .await
            .map_err(|e| classify("DeleteTopic", e))?;
        Ok(())
    }

    async fn list_topics(&self, next_token: Option<&str>) -> RemoteResult<Page<TopicHandle>> {
        let out = self
            .sns
            .list_topics()
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("ListTopics", e))?;
        let items = out
            .topics()
            .iter()
            .filter_map(|t| t.topic_arn())
            .map(|arn| TopicHandle {
                name: arn.rsplit(':').next().unwrap_or(arn).to_string(),
                topic_arn: arn.to_string(),
            })
            .collect();
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> RemoteResult<SubscriptionSummary> {
        let topic_arn = self.topic_arn(&request.topic).await?;
        let attributes: HashMap<String, String> = request.attributes.clone().into_iter().collect();
        let out = self
            .sns
            .subscribe()
            .topic_arn(&topic_arn)
            .protocol(&request.protocol)
            .endpoint(&request.endpoint)
            .set_attributes((!attributes.is_empty()).then_some(attributes))
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|e| classify("Subscribe", e))?;
        Ok(SubscriptionSummary {
            subscription_arn: out
                .subscription_arn()
                .map(str::to_string)
                .ok_or_else(|| missing_field("Subscribe", "SubscriptionArn"))?,
            topic_arn,
            protocol: request.protocol.clone(),
            endpoint: request.endpoint.clone(),
        })
    }

    async fn unsubscribe(&self, subscription: &ResourceId) -> RemoteResult<()> {
        self.sns
            .unsubscribe()
            .subscription_arn(subscription.display_id())
            .send()
            .await
            .map_err(|e| classify("Unsubscribe", e))?;
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        topic: &ResourceId,
        next_token: Option<&str>,
    ) -> RemoteResult<Page<SubscriptionSummary>> {
        let topic_arn = self.topic_arn(topic).await?;
        let out = self
            .sns
            .list_subscriptions_by_topic()
            .topic_arn(&topic_arn)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("ListSubscriptionsByTopic", e))?;
        let items = out
            .subscriptions()
            .iter()
            .map(|s| SubscriptionSummary {
                subscription_arn: s.subscription_arn().unwrap_or_default().to_string(),
                topic_arn: s.topic_arn().unwrap_or(&topic_arn).to_string(),
                protocol: s.protocol().unwrap_or_default().to_string(),
                endpoint: s.endpoint().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn publish(
        &self,
        topic: &ResourceId,
        message: &OutboundMessage,
    ) -> RemoteResult<SentMessage> {
        let topic_arn = self.topic_arn(topic).await?;
        let out = self
            .sns
            .publish()
            .topic_arn(topic_arn)
            .message(&message.body)
            .set_subject(message.subject.clone())
            .set_message_group_id(message.group_id.clone())
            .set_message_deduplication_id(message.deduplication_id.clone())
            .set_message_attributes(sns_message_attributes(&message.attributes)?)
            .send()
            .await
            .map_err(|e| classify("Publish", e))?;
        Ok(SentMessage {
            message_id: out
                .message_id()
                .map(str::to_string)
                .ok_or_else(|| missing_field("Publish", "MessageId"))?,
            sequence_number: out.sequence_number().map(str::to_string),
            deduplication_id: message.deduplication_id.clone(),
        })
    }

    async fn tag_topic(&self, topic: &ResourceId, tags: &Tags) -> RemoteResult<()> {
        let topic_arn = self.topic_arn(topic).await?;
        self.sns
            .tag_resource()
            .resource_arn(topic_arn)
            .set_tags(Some(sns_tags(tags)?))
            .send()
            .await
            .map_err(|e| classify("TagResource", e))?;
        Ok(())
    }

    async fn untag_topic(&self, topic: &ResourceId, keys: &[String]) -> RemoteResult<()> {
        let topic_arn = self.topic_arn(topic).await?;
        self.sns
            .untag_resource()
            .resource_arn(topic_arn)
            .set_tag_keys(Some(keys.to_vec()))
            .send()
            .await
            .map_err(|e| classify("UntagResource", e))?;
        Ok(())
    }

    async fn list_topic_tags(&self, topic: &ResourceId) -> RemoteResult<Tags> {
        let topic_arn = self.topic_arn(topic).await?;
        let out = self
            .sns
            .list_tags_for_resource()
            .resource_arn(topic_arn)
            .send()
            .await
            .map_err(|e| classify("ListTagsForResource", e))?;
        Ok(out
            .tags()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect())
    }
}
