//! Resource name, ARN, and tag validation.
//!
//! Everything here is pure and runs before any remote call. Identifiers are
//! either bare names or full ARNs; ARNs are parsed, matched against the
//! requested resource kind, and checked against the configured account and
//! region allow-lists.

use std::collections::BTreeSet;

use crate::types::{
    Arn, OpsError, OpsResult, ResourceId, ResourceKind, Tags, FIFO_SUFFIX, MANAGED_TAG_KEY,
};

/// Longest queue name, `.fifo` suffix included.
pub const MAX_QUEUE_NAME_LEN: usize = 80;
/// Longest topic name, `.fifo` suffix included.
pub const MAX_TOPIC_NAME_LEN: usize = 256;
pub const MAX_TAGS: usize = 50;
pub const MAX_TAG_KEY_LEN: usize = 128;
pub const MAX_TAG_VALUE_LEN: usize = 256;

/// Account and region allow-lists applied to ARNs.
///
/// Empty lists allow everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountScope {
    pub allowed_accounts: BTreeSet<String>,
    pub allowed_regions: BTreeSet<String>,
}

impl AccountScope {
    pub fn new<A, R>(accounts: A, regions: R) -> Self
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        Self {
            allowed_accounts: accounts.into_iter().collect(),
            allowed_regions: regions.into_iter().collect(),
        }
    }

    fn check(&self, arn: &Arn) -> OpsResult<()> {
        if !self.allowed_accounts.is_empty() && !self.allowed_accounts.contains(&arn.account) {
            return Err(OpsError::InvalidIdentifier(format!(
                "account {} is not in the allowed account list",
                arn.account
            )));
        }
        if !self.allowed_regions.is_empty() && !self.allowed_regions.contains(&arn.region) {
            return Err(OpsError::InvalidIdentifier(format!(
                "region {} is not in the allowed region list",
                arn.region
            )));
        }
        Ok(())
    }
}

/// Identifier validator bound to an account scope.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    scope: AccountScope,
}

impl Validator {
    pub fn new(scope: AccountScope) -> Self {
        Self { scope }
    }

    /// Validate a bare name or ARN for the given resource kind.
    pub fn validate(&self, kind: ResourceKind, identifier: &str) -> OpsResult<ResourceId> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(OpsError::InvalidIdentifier(format!(
                "{kind} identifier must not be empty"
            )));
        }

        if identifier.starts_with("arn:") {
            let arn = parse_arn(identifier)?;
            if arn.service != kind.service() {
                return Err(OpsError::InvalidIdentifier(format!(
                    "ARN service '{}' does not match a {kind} (expected '{}')",
                    arn.service,
                    kind.service()
                )));
            }
            self.scope.check(&arn)?;
            let name = match kind {
                ResourceKind::Subscription => {
                    validate_subscription_resource(&arn.resource)?;
                    arn.resource.clone()
                }
                _ => {
                    validate_name(kind, &arn.resource)?;
                    arn.resource.clone()
                }
            };
            return Ok(ResourceId {
                kind,
                name,
                arn: Some(arn),
            });
        }

        if kind == ResourceKind::Subscription {
            return Err(OpsError::InvalidIdentifier(
                "subscriptions must be addressed by ARN".to_string(),
            ));
        }

        validate_name(kind, identifier)?;
        Ok(ResourceId {
            kind,
            name: identifier.to_string(),
            arn: None,
        })
    }

    /// Validate an identifier that must be a full ARN (policy resources,
    /// redrive targets, subscription endpoints).
    pub fn validate_arn(&self, kind: ResourceKind, identifier: &str) -> OpsResult<ResourceId> {
        if !identifier.trim().starts_with("arn:") {
            return Err(OpsError::InvalidIdentifier(format!(
                "expected a {kind} ARN, got '{identifier}'"
            )));
        }
        self.validate(kind, identifier)
    }
}

/// Check a queue or topic name against the service's naming rules.
pub fn validate_name(kind: ResourceKind, name: &str) -> OpsResult<()> {
    let max = match kind {
        ResourceKind::Queue => MAX_QUEUE_NAME_LEN,
        ResourceKind::Topic => MAX_TOPIC_NAME_LEN,
        ResourceKind::Subscription => {
            return Err(OpsError::InvalidIdentifier(
                "subscriptions have no bare name".to_string(),
            ))
        }
    };

    if name.is_empty() || name.len() > max {
        return Err(OpsError::InvalidIdentifier(format!(
            "{kind} name must be 1-{max} characters, got {}",
            name.len()
        )));
    }

    let base = name.strip_suffix(FIFO_SUFFIX).unwrap_or(name);
    if base.is_empty() {
        return Err(OpsError::InvalidIdentifier(format!(
            "{kind} name must not be only the '{FIFO_SUFFIX}' suffix"
        )));
    }
    if let Some(bad) = base
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(OpsError::InvalidIdentifier(format!(
            "{kind} name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Parse the six-segment ARN structure.
pub fn parse_arn(input: &str) -> OpsResult<Arn> {
    let parts: Vec<&str> = input.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err(OpsError::InvalidIdentifier(format!(
            "'{input}' is not of the form arn:partition:service:region:account:resource"
        )));
    }
    let (partition, service, region, account, resource) =
        (parts[1], parts[2], parts[3], parts[4], parts[5]);

    let partition_ok = partition == "aws"
        || partition
            .strip_prefix("aws-")
            .is_some_and(|rest| !rest.is_empty() && rest.split('-').all(is_lower_word));
    if !partition_ok {
        return Err(OpsError::InvalidIdentifier(format!(
            "unknown ARN partition '{partition}'"
        )));
    }
    if service.is_empty() || !service.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
        return Err(OpsError::InvalidIdentifier(format!(
            "invalid ARN service '{service}'"
        )));
    }
    if !is_region(region) {
        return Err(OpsError::InvalidIdentifier(format!(
            "invalid ARN region '{region}'"
        )));
    }
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(OpsError::InvalidIdentifier(format!(
            "ARN account must be 12 digits, got '{account}'"
        )));
    }
    if resource.is_empty() {
        return Err(OpsError::InvalidIdentifier(
            "ARN resource segment is empty".to_string(),
        ));
    }

    Ok(Arn {
        partition: partition.to_string(),
        service: service.to_string(),
        region: region.to_string(),
        account: account.to_string(),
        resource: resource.to_string(),
    })
}

/// Validate a tag set about to be applied.
pub fn validate_tags(tags: &Tags) -> OpsResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(OpsError::InvalidArgument(format!(
            "at most {MAX_TAGS} tags may be applied, got {}",
            tags.len()
        )));
    }
    for (key, value) in tags {
        validate_tag_key(key)?;
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            return Err(OpsError::InvalidArgument(format!(
                "tag '{key}' value exceeds {MAX_TAG_VALUE_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// Validate a tag key about to be applied or removed.
pub fn validate_tag_key(key: &str) -> OpsResult<()> {
    let len = key.chars().count();
    if len == 0 || len > MAX_TAG_KEY_LEN {
        return Err(OpsError::InvalidArgument(format!(
            "tag keys must be 1-{MAX_TAG_KEY_LEN} characters, got {len}"
        )));
    }
    if key.to_ascii_lowercase().starts_with("aws:") {
        return Err(OpsError::InvalidArgument(format!(
            "tag key '{key}' uses the reserved 'aws:' prefix"
        )));
    }
    Ok(())
}

/// Whether a tag set marks a resource as created through msgops.
pub fn is_managed(tags: &Tags) -> bool {
    tags.get(MANAGED_TAG_KEY)
        .is_some_and(|v| v.eq_ignore_ascii_case(crate::types::MANAGED_TAG_VALUE))
}

fn validate_subscription_resource(resource: &str) -> OpsResult<()> {
    let (topic, id) = resource.rsplit_once(':').ok_or_else(|| {
        OpsError::InvalidIdentifier(format!(
            "subscription ARN resource '{resource}' must be topic:subscription-id"
        ))
    })?;
    validate_name(ResourceKind::Topic, topic)?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(OpsError::InvalidIdentifier(format!(
            "invalid subscription id '{id}'"
        )));
    }
    Ok(())
}

fn is_lower_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase())
}

/// `us-east-1`, `eu-central-2`, `us-gov-west-1`, `cn-north-1` ...
fn is_region(region: &str) -> bool {
    let segments: Vec<&str> = region.split('-').collect();
    if segments.len() < 3 {
        return false;
    }
    let (last, head) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };
    !last.is_empty()
        && last.chars().all(|c| c.is_ascii_digit())
        && head.iter().all(|s| is_lower_word(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const QUEUE_ARN: &str = "arn:aws:sqs:us-east-1:123456789012:orders-queue";
    const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:123456789012:orders";

    #[test]
    fn test_bare_names() {
        let v = Validator::default();
        let id = v.validate(ResourceKind::Queue, "orders-queue").unwrap();
        assert_eq!(id.name(), "orders-queue");
        assert!(id.arn().is_none());
        assert!(!id.is_fifo());

        let fifo = v.validate(ResourceKind::Queue, "orders_1.fifo").unwrap();
        assert!(fifo.is_fifo());
    }

    #[test]
    fn test_name_charset_and_length() {
        assert!(validate_name(ResourceKind::Queue, "has space").is_err());
        assert!(validate_name(ResourceKind::Queue, "dots.not.allowed").is_err());
        assert!(validate_name(ResourceKind::Queue, ".fifo").is_err());
        assert!(validate_name(ResourceKind::Queue, &"q".repeat(80)).is_ok());
        assert!(validate_name(ResourceKind::Queue, &"q".repeat(81)).is_err());
        assert!(validate_name(ResourceKind::Queue, &format!("{}.fifo", "q".repeat(75))).is_ok());
        assert!(validate_name(ResourceKind::Queue, &format!("{}.fifo", "q".repeat(76))).is_err());
        assert!(validate_name(ResourceKind::Topic, &"t".repeat(256)).is_ok());
        assert!(validate_name(ResourceKind::Topic, &"t".repeat(257)).is_err());
    }

    #[test]
    fn test_arn_kind_mismatch() {
        let v = Validator::default();
        let err = v.validate(ResourceKind::Topic, QUEUE_ARN).unwrap_err();
        assert_eq!(err.class(), crate::types::ErrorClass::InvalidIdentifier);

        let err = v.validate(ResourceKind::Queue, TOPIC_ARN).unwrap_err();
        assert!(matches!(err, OpsError::InvalidIdentifier(_)));

        for service in ["s3", "kafka", "lambda", "sqs"] {
            let arn = format!("arn:aws:{service}:us-east-1:123456789012:orders");
            let result = v.validate(ResourceKind::Topic, &arn);
            assert_eq!(result.is_ok(), service == "sns", "service {service}");
        }
    }

    #[test]
    fn test_arn_parsing() {
        let arn = parse_arn(QUEUE_ARN).unwrap();
        assert_eq!(arn.partition, "aws");
        assert_eq!(arn.region, "us-east-1");
        assert_eq!(arn.account, "123456789012");
        assert_eq!(arn.to_string(), QUEUE_ARN);

        assert_ok!(parse_arn("arn:aws-us-gov:sqs:us-gov-west-1:123456789012:q"));
        assert_ok!(parse_arn("arn:aws-cn:sns:cn-north-1:123456789012:t"));
        assert_err!(parse_arn("arn:aws:sqs:us-east-1:1234:q"));
        assert_err!(parse_arn("arn:aws:sqs:useast1:123456789012:q"));
        assert_err!(parse_arn("arn:gcp:sqs:us-east-1:123456789012:q"));
        assert_err!(parse_arn("arn:aws:sqs:us-east-1:123456789012:"));
        assert_err!(parse_arn("arn:aws:sqs"));
    }

    #[test]
    fn test_subscription_ids() {
        let v = Validator::default();
        let sub = "arn:aws:sns:us-east-1:123456789012:orders:4f1c2a9e-8d3b-4c7a-9f0e-1a2b3c4d5e6f";
        let id = v.validate(ResourceKind::Subscription, sub).unwrap();
        assert_eq!(id.account(), Some("123456789012"));

        assert!(v.validate(ResourceKind::Subscription, "orders").is_err());
        assert!(v
            .validate(ResourceKind::Subscription, "arn:aws:sns:us-east-1:123456789012:orders")
            .is_err());
    }

    #[test]
    fn test_account_scope() {
        let v = Validator::new(AccountScope::new(
            ["123456789012".to_string()],
            ["us-east-1".to_string()],
        ));
        assert!(v.validate(ResourceKind::Queue, QUEUE_ARN).is_ok());
        assert!(v
            .validate(ResourceKind::Queue, "arn:aws:sqs:us-east-1:999999999999:orders-queue")
            .is_err());
        assert!(v
            .validate(ResourceKind::Queue, "arn:aws:sqs:eu-west-1:123456789012:orders-queue")
            .is_err());
        // Bare names carry no account and stay in the configured region.
        assert!(v.validate(ResourceKind::Queue, "orders-queue").is_ok());
    }

    #[test]
    fn test_validate_arn_requires_arn() {
        let v = Validator::default();
        assert!(v.validate_arn(ResourceKind::Queue, "orders-queue").is_err());
        assert!(v.validate_arn(ResourceKind::Queue, QUEUE_ARN).is_ok());
    }

    #[test]
    fn test_tags() {
        let mut tags = Tags::new();
        tags.insert("team".to_string(), "payments".to_string());
        assert!(validate_tags(&tags).is_ok());

        tags.insert("aws:createdBy".to_string(), "x".to_string());
        assert!(validate_tags(&tags).is_err());

        let too_many: Tags = (0..51).map(|i| (format!("k{i}"), "v".to_string())).collect();
        assert!(validate_tags(&too_many).is_err());

        let mut long_value = Tags::new();
        long_value.insert("k".to_string(), "v".repeat(257));
        assert!(validate_tags(&long_value).is_err());
        assert!(validate_tag_key("").is_err());
        assert!(validate_tag_key(&"k".repeat(129)).is_err());
    }

    #[test]
    fn test_is_managed() {
        let mut tags = Tags::new();
        assert!(!is_managed(&tags));
        tags.insert(MANAGED_TAG_KEY.to_string(), "TRUE".to_string());
        assert!(is_managed(&tags));
        tags.insert(MANAGED_TAG_KEY.to_string(), "no".to_string());
        assert!(!is_managed(&tags));
    }
}
