//! Structured permission grants for the execution identity.
//!
//! Statements are built from typed upstream identifiers, so a grant can
//! only reference resources the unit graph actually produces. The action
//! sets are the minimum the deployed function's I/O pattern requires:
//! object read/write under the bucket, list on the bucket, consume on the
//! primary queue, pull on the image repository, and write to its own log
//! group.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ProvisionError;
use crate::graph::UnitKind;
use crate::identifiers::{BucketName, QueueArn};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const EXECUTION_POLICY_NAME: &str = "pdf-processor-execution";
/// Role tag recording the sha256 of the inline policy document, used to
/// detect policy drift without re-reading the document on every apply.
pub const POLICY_FINGERPRINT_TAG_KEY: &str = "PolicyFingerprint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid")]
    pub sid: &'static str,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<String>,
}

pub fn storage_object_statement(bucket: &BucketName) -> PolicyStatement {
    PolicyStatement {
        sid: "StorageObjects",
        effect: Effect::Allow,
        actions: vec![
            "s3:GetObject".to_string(),
            "s3:PutObject".to_string(),
            "s3:PutObjectAcl".to_string(),
        ],
        resources: vec![format!("{}/*", bucket.arn())],
    }
}

pub fn storage_list_statement(bucket: &BucketName) -> PolicyStatement {
    PolicyStatement {
        sid: "StorageList",
        effect: Effect::Allow,
        actions: vec!["s3:ListBucket".to_string()],
        resources: vec![bucket.arn()],
    }
}

pub fn queue_consumer_statement(queue_arn: &QueueArn) -> PolicyStatement {
    PolicyStatement {
        sid: "QueueConsume",
        effect: Effect::Allow,
        actions: vec![
            "sqs:ReceiveMessage".to_string(),
            "sqs:DeleteMessage".to_string(),
            "sqs:GetQueueAttributes".to_string(),
        ],
        resources: vec![queue_arn.as_str().to_string()],
    }
}

pub fn registry_pull_statement(repository_resource: &str) -> PolicyStatement {
    PolicyStatement {
        sid: "RegistryPull",
        effect: Effect::Allow,
        actions: vec![
            "ecr:BatchGetImage".to_string(),
            "ecr:GetDownloadUrlForLayer".to_string(),
            "ecr:BatchCheckLayerAvailability".to_string(),
        ],
        resources: vec![repository_resource.to_string()],
    }
}

pub fn log_delivery_statement(log_group_resource: &str) -> PolicyStatement {
    PolicyStatement {
        sid: "LogDelivery",
        effect: Effect::Allow,
        actions: vec![
            "logs:CreateLogGroup".to_string(),
            "logs:CreateLogStream".to_string(),
            "logs:PutLogEvents".to_string(),
        ],
        resources: vec![log_group_resource.to_string()],
    }
}

/// The complete statement set for the execution identity.
pub fn execution_statements(
    queue_arn: &QueueArn,
    bucket: &BucketName,
    repository_resource: &str,
    log_group_resource: &str,
) -> Vec<PolicyStatement> {
    vec![
        storage_object_statement(bucket),
        storage_list_statement(bucket),
        queue_consumer_statement(queue_arn),
        registry_pull_statement(repository_resource),
        log_delivery_statement(log_group_resource),
    ]
}

/// Rejects any statement granting an account-wide resource scope.
pub fn ensure_least_privilege(statements: &[PolicyStatement]) -> Result<(), ProvisionError> {
    for statement in statements {
        if statement.actions.iter().any(|action| action == "*") {
            return Err(ProvisionError::InvariantViolation {
                message: format!("statement '{}' grants the wildcard action", statement.sid),
            });
        }
        if statement.resources.iter().any(|resource| resource == "*") {
            return Err(ProvisionError::InvariantViolation {
                message: format!(
                    "statement '{}' is scoped to the account-wide '*' resource",
                    statement.sid
                ),
            });
        }
    }
    Ok(())
}

pub fn execution_policy_document(
    statements: &[PolicyStatement],
) -> Result<Value, ProvisionError> {
    ensure_least_privilege(statements)?;
    serde_json::to_value(statements)
        .map(|rendered| {
            json!({
                "Version": POLICY_VERSION,
                "Statement": rendered,
            })
        })
        .map_err(|error| ProvisionError::adapter(UnitKind::Identity, error.to_string()))
}

/// Trust document allowing the function service to assume the role.
pub fn lambda_trust_document() -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }
        ],
    })
}
