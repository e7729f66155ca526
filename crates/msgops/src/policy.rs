//! Access-policy documents for queues and topics.
//!
//! Statements arrive in a loose caller form ([`StatementInput`]) and leave as
//! a canonical [`PolicyDocument`]: declared order kept, sids filled in,
//! duplicate actions collapsed. The same input always yields byte-identical
//! JSON. Two rules are enforced before anything is attached:
//!
//! - every statement targets the configured resource or an ARN the caller
//!   listed explicitly as a cross-resource target;
//! - `Allow` with a wildcard principal requires a non-empty condition.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Arn, OpsError, OpsResult, ResourceId};
use crate::validate::parse_arn;

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

const PRINCIPAL_KEYS: &[&str] = &["AWS", "Service", "Federated", "CanonicalUser"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    #[serde(alias = "allow")]
    Allow,
    #[serde(alias = "deny")]
    Deny,
}

/// A single value or a list, as the policy grammar allows for both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }

    fn from_vec(mut values: Vec<T>) -> Self {
        if values.len() == 1 {
            OneOrMany::One(values.remove(0))
        } else {
            OneOrMany::Many(values)
        }
    }
}

/// `"*"` or a map such as `{"AWS": ["arn:..."]}` / `{"Service": "sns.amazonaws.com"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    Any(String),
    Scoped(BTreeMap<String, OneOrMany<String>>),
}

impl Principal {
    fn is_wildcard(&self) -> bool {
        match self {
            Principal::Any(s) => s == "*",
            Principal::Scoped(map) => map
                .get("AWS")
                .is_some_and(|v| v.to_vec().iter().any(|p| p == "*")),
        }
    }

    fn check(&self, sid: &str) -> OpsResult<()> {
        match self {
            Principal::Any(s) if s == "*" => Ok(()),
            Principal::Any(s) => Err(OpsError::InvalidPolicy(format!(
                "statement {sid}: bare principal must be \"*\", got \"{s}\""
            ))),
            Principal::Scoped(map) => {
                if map.is_empty() {
                    return Err(OpsError::InvalidPolicy(format!(
                        "statement {sid}: principal map is empty"
                    )));
                }
                for (key, values) in map {
                    if !PRINCIPAL_KEYS.contains(&key.as_str()) {
                        return Err(OpsError::InvalidPolicy(format!(
                            "statement {sid}: unknown principal type '{key}'"
                        )));
                    }
                    let values = values.to_vec();
                    if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) {
                        return Err(OpsError::InvalidPolicy(format!(
                            "statement {sid}: principal '{key}' has an empty value"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Caller-supplied statement. `resource` defaults to the policy's target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatementInput {
    #[serde(default)]
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Principal,
    pub action: OneOrMany<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub condition: Option<Map<String, Value>>,
}

/// A canonical statement inside a [`PolicyDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: Effect,
    pub principal: Principal,
    pub action: OneOrMany<String>,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Map<String, Value>>,
}

/// A complete access-policy document, ready to attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Compact JSON as sent to the remote service.
    pub fn to_json(&self) -> OpsResult<String> {
        serde_json::to_string(self)
            .map_err(|e| OpsError::InvalidPolicy(format!("failed to encode policy: {e}")))
    }
}

/// Validates statements against a target resource and builds documents.
#[derive(Debug, Clone)]
pub struct PolicyBuilder<'a> {
    target: &'a ResourceId,
    cross_resources: Vec<String>,
}

impl<'a> PolicyBuilder<'a> {
    pub fn new(target: &'a ResourceId) -> Self {
        Self {
            target,
            cross_resources: Vec::new(),
        }
    }

    /// Opt into statements targeting other, explicitly listed resources.
    pub fn allow_resources(mut self, resources: &[ResourceId]) -> OpsResult<Self> {
        for resource in resources {
            let arn = resource.arn().ok_or_else(|| {
                OpsError::InvalidPolicy(format!(
                    "cross-resource targets must be ARNs, got '{}'",
                    resource.name()
                ))
            })?;
            self.cross_resources.push(arn.to_string());
        }
        Ok(self)
    }

    /// Structural and security checks that need no remote lookups.
    pub fn check(&self, statements: &[StatementInput]) -> OpsResult<()> {
        self.canonicalize(statements, None).map(|_| ())
    }

    /// Build the document once the target's ARN is known.
    pub fn build(&self, target_arn: &Arn, statements: &[StatementInput]) -> OpsResult<PolicyDocument> {
        if target_arn.service != self.target.kind().service()
            || target_arn.resource != self.target.name()
        {
            return Err(OpsError::InvalidPolicy(format!(
                "resolved ARN {target_arn} does not belong to {}",
                self.target
            )));
        }
        let statement = self.canonicalize(statements, Some(target_arn))?;
        Ok(PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement,
        })
    }

    fn canonicalize(
        &self,
        statements: &[StatementInput],
        target_arn: Option<&Arn>,
    ) -> OpsResult<Vec<PolicyStatement>> {
        if statements.is_empty() {
            return Err(OpsError::InvalidPolicy(
                "a policy needs at least one statement".to_string(),
            ));
        }

        let mut seen_sids = BTreeSet::new();
        let mut out = Vec::with_capacity(statements.len());

        for (index, input) in statements.iter().enumerate() {
            let sid = match &input.sid {
                Some(sid) if sid.is_empty() || !sid.chars().all(|c| c.is_ascii_alphanumeric()) => {
                    return Err(OpsError::InvalidPolicy(format!(
                        "statement sid '{sid}' must be non-empty and alphanumeric"
                    )))
                }
                Some(sid) => sid.clone(),
                None => format!("Stmt{}", index + 1),
            };
            if !seen_sids.insert(sid.clone()) {
                return Err(OpsError::InvalidPolicy(format!("duplicate statement sid '{sid}'")));
            }

            input.principal.check(&sid)?;
            let action = self.actions(&sid, &input.action)?;
            let condition = input.condition.clone().filter(|c| !c.is_empty());
            if let Some(condition) = &condition {
                for (op, keys) in condition {
                    match keys.as_object() {
                        Some(keys) if !keys.is_empty() => {}
                        Some(_) => {
                            return Err(OpsError::InvalidPolicy(format!(
                                "statement {sid}: condition operator '{op}' has no keys"
                            )))
                        }
                        None => {
                            return Err(OpsError::InvalidPolicy(format!(
                                "statement {sid}: condition operator '{op}' must map to an object"
                            )))
                        }
                    }
                }
            }

            if input.effect == Effect::Allow && input.principal.is_wildcard() && condition.is_none()
            {
                return Err(OpsError::InvalidPolicy(format!(
                    "statement {sid}: Allow for principal \"*\" requires a restricting condition"
                )));
            }

            let resource = self.resource(&sid, input.resource.as_deref(), target_arn)?;

            out.push(PolicyStatement {
                sid,
                effect: input.effect,
                principal: input.principal.clone(),
                action,
                resource,
                condition,
            });
        }

        Ok(out)
    }

    fn actions(&self, sid: &str, action: &OneOrMany<String>) -> OpsResult<OneOrMany<String>> {
        let prefix = format!("{}:", self.target.kind().service());
        let mut unique: Vec<String> = Vec::new();
        for a in action.to_vec() {
            let valid = a.len() > prefix.len() && a.to_ascii_lowercase().starts_with(&prefix);
            if !valid {
                return Err(OpsError::InvalidPolicy(format!(
                    "statement {sid}: action '{a}' is not a {prefix}* action"
                )));
            }
            if !unique.contains(&a) {
                unique.push(a);
            }
        }
        if unique.is_empty() {
            return Err(OpsError::InvalidPolicy(format!(
                "statement {sid}: at least one action is required"
            )));
        }
        Ok(OneOrMany::from_vec(unique))
    }

    /// Resolve a statement's resource, enforcing the target/allow-list rule.
    ///
    /// Without a resolved target ARN (check phase) only the parts of the ARN
    /// already known from the caller's identifier are compared.
    fn resource(&self, sid: &str, requested: Option<&str>, target_arn: Option<&Arn>) -> OpsResult<String> {
        let Some(requested) = requested else {
            return Ok(target_arn.map(Arn::to_string).unwrap_or_default());
        };

        if self.cross_resources.iter().any(|r| r == requested) {
            return Ok(requested.to_string());
        }

        let arn = parse_arn(requested).map_err(|_| {
            OpsError::InvalidPolicy(format!(
                "statement {sid}: resource '{requested}' is neither the target nor an allowed resource"
            ))
        })?;
        let matches_target = match (target_arn, self.target.arn()) {
            (Some(resolved), _) => &arn == resolved,
            (None, Some(known)) => &arn == known,
            (None, None) => {
                arn.service == self.target.kind().service() && arn.resource == self.target.name()
            }
        };
        if !matches_target {
            return Err(OpsError::InvalidPolicy(format!(
                "statement {sid}: resource '{requested}' is not {} and cross-resource access was not granted for it",
                self.target
            )));
        }
        Ok(arn.to_string())
    }
}

/// Statement letting a topic deliver into a queue.
pub fn topic_delivery_statement(topic_arn: &str) -> StatementInput {
    let mut source = Map::new();
    source.insert("aws:SourceArn".to_string(), Value::String(topic_arn.to_string()));
    let mut condition = Map::new();
    condition.insert("ArnEquals".to_string(), Value::Object(source));

    let mut principal = BTreeMap::new();
    principal.insert(
        "Service".to_string(),
        OneOrMany::One("sns.amazonaws.com".to_string()),
    );

    StatementInput {
        sid: Some("AllowTopicDelivery".to_string()),
        effect: Effect::Allow,
        principal: Principal::Scoped(principal),
        action: OneOrMany::One("sqs:SendMessage".to_string()),
        resource: None,
        condition: Some(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorClass, ResourceKind};
    use crate::validate::Validator;
    use serde_json::json;

    const QUEUE_ARN: &str = "arn:aws:sqs:us-east-1:123456789012:orders-queue";

    fn queue() -> ResourceId {
        Validator::default()
            .validate(ResourceKind::Queue, "orders-queue")
            .unwrap()
    }

    fn statements(value: Value) -> Vec<StatementInput> {
        serde_json::from_value(value).unwrap()
    }

    fn target_arn() -> Arn {
        parse_arn(QUEUE_ARN).unwrap()
    }

    #[test]
    fn test_builds_canonical_document() {
        let q = queue();
        let input = statements(json!([{
            "effect": "Allow",
            "principal": { "AWS": "arn:aws:iam::123456789012:role/worker" },
            "action": ["sqs:SendMessage", "sqs:ReceiveMessage", "sqs:SendMessage"]
        }]));
        let doc = PolicyBuilder::new(&q).build(&target_arn(), &input).unwrap();

        assert_eq!(doc.version, POLICY_VERSION);
        assert_eq!(doc.statement[0].sid, "Stmt1");
        assert_eq!(doc.statement[0].resource, QUEUE_ARN);
        assert_eq!(
            doc.statement[0].action,
            OneOrMany::Many(vec!["sqs:SendMessage".to_string(), "sqs:ReceiveMessage".to_string()])
        );

        let encoded: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(encoded["Statement"][0]["Effect"], "Allow");
        assert!(encoded["Statement"][0].get("Condition").is_none());
    }

    #[test]
    fn test_generation_is_reproducible() {
        let q = queue();
        let input = statements(json!([
            { "effect": "Deny", "principal": "*", "action": "sqs:DeleteQueue" },
            { "sid": "Workers", "effect": "Allow",
              "principal": { "AWS": ["arn:aws:iam::123456789012:root"] },
              "action": "sqs:*" }
        ]));
        let builder = PolicyBuilder::new(&q);
        let a = builder.build(&target_arn(), &input).unwrap().to_json().unwrap();
        let b = builder.build(&target_arn(), &input).unwrap().to_json().unwrap();
        assert_eq!(a, b);
        assert!(a.find("Stmt1").unwrap() < a.find("Workers").unwrap());
    }

    #[test]
    fn test_rejects_open_wildcard_allow() {
        let q = queue();
        for principal in [json!("*"), json!({ "AWS": "*" }), json!({ "AWS": ["*"] })] {
            let input = statements(json!([{
                "effect": "Allow", "principal": principal, "action": "sqs:SendMessage"
            }]));
            let err = PolicyBuilder::new(&q).check(&input).unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidPolicy);
        }

        let empty_condition = statements(json!([{
            "effect": "Allow", "principal": "*", "action": "sqs:SendMessage", "condition": {}
        }]));
        assert!(PolicyBuilder::new(&q).check(&empty_condition).is_err());

        let empty_operator = statements(json!([{
            "effect": "Allow", "principal": "*", "action": "sqs:SendMessage",
            "condition": { "ArnEquals": {} }
        }]));
        let err = PolicyBuilder::new(&q).check(&empty_operator).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidPolicy);
    }

    #[test]
    fn test_wildcard_allowed_with_condition_or_deny() {
        let q = queue();
        let input = statements(json!([
            { "effect": "Allow", "principal": "*", "action": "sqs:SendMessage",
              "condition": { "ArnEquals": { "aws:SourceArn": "arn:aws:sns:us-east-1:123456789012:orders" } } },
            { "effect": "Deny", "principal": "*", "action": "sqs:PurgeQueue" }
        ]));
        assert!(PolicyBuilder::new(&q).build(&target_arn(), &input).is_ok());
    }

    #[test]
    fn test_foreign_resource_requires_opt_in() {
        let q = queue();
        let other = "arn:aws:sqs:us-east-1:123456789012:audit-queue";
        let input = statements(json!([{
            "effect": "Allow", "principal": { "AWS": "arn:aws:iam::123456789012:root" },
            "action": "sqs:SendMessage", "resource": other
        }]));
        assert!(PolicyBuilder::new(&q).check(&input).is_err());

        let audit = Validator::default().validate(ResourceKind::Queue, other).unwrap();
        let builder = PolicyBuilder::new(&q).allow_resources(&[audit]).unwrap();
        let doc = builder.build(&target_arn(), &input).unwrap();
        assert_eq!(doc.statement[0].resource, other);
    }

    #[test]
    fn test_explicit_target_resource_checked_on_build() {
        let q = queue();
        let input = statements(json!([{
            "effect": "Allow", "principal": { "Service": "sns.amazonaws.com" },
            "action": "sqs:SendMessage",
            "resource": "arn:aws:sqs:us-east-1:999999999999:orders-queue",
            "condition": { "ArnEquals": { "aws:SourceArn": "arn:aws:sns:us-east-1:123456789012:t" } }
        }]));
        // Name matches, so the check phase accepts it...
        assert!(PolicyBuilder::new(&q).check(&input).is_ok());
        // ...but the resolved ARN lives in another account.
        assert!(PolicyBuilder::new(&q).build(&target_arn(), &input).is_err());
    }

    #[test]
    fn test_structural_errors() {
        let q = queue();
        let builder = PolicyBuilder::new(&q);
        assert!(builder.check(&[]).is_err());

        let wrong_service = statements(json!([{
            "effect": "Allow", "principal": { "AWS": "arn:aws:iam::123456789012:root" },
            "action": "sns:Publish"
        }]));
        assert!(builder.check(&wrong_service).is_err());

        let dup_sid = statements(json!([
            { "sid": "A", "effect": "Deny", "principal": "*", "action": "sqs:SendMessage" },
            { "sid": "A", "effect": "Deny", "principal": "*", "action": "sqs:PurgeQueue" }
        ]));
        assert!(builder.check(&dup_sid).is_err());

        let bad_principal = statements(json!([{
            "effect": "Deny", "principal": { "Robot": "x" }, "action": "sqs:SendMessage"
        }]));
        assert!(builder.check(&bad_principal).is_err());

        let unknown_field: Result<Vec<StatementInput>, _> = serde_json::from_value(json!([{
            "effect": "Deny", "principal": "*", "action": "sqs:SendMessage", "NotAction": "x"
        }]));
        assert!(unknown_field.is_err());
    }

    #[test]
    fn test_topic_delivery_statement() {
        let q = queue();
        let stmt = topic_delivery_statement("arn:aws:sns:us-east-1:123456789012:orders");
        let doc = PolicyBuilder::new(&q).build(&target_arn(), &[stmt]).unwrap();
        assert_eq!(doc.statement[0].sid, "AllowTopicDelivery");
        assert!(doc.statement[0].condition.is_some());
    }
}
