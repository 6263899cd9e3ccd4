//! Typed output bundles and apply-time reference resolution.
//!
//! Each unit publishes a typed output bundle into the per-environment
//! ledger. A downstream unit resolves its inputs from the ledger
//! immediately before it provisions; resolution is never cached across
//! runs, and a missing output is a typed error naming the consuming unit
//! and the dangling input.

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::graph::UnitKind;
use crate::identifiers::{
    BucketName, FunctionArn, ImageUri, ParameterPath, QueueArn, QueueUrl, RepositoryArn,
    RepositoryUri, RoleArn,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOutputs {
    pub repository_uri: RepositoryUri,
    pub repository_arn: RepositoryArn,
    pub image_uri: ImageUri,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOutputs {
    pub queue_url: QueueUrl,
    pub queue_arn: QueueArn,
    pub dead_letter_queue_url: QueueUrl,
    pub dead_letter_queue_arn: QueueArn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOutputs {
    pub role_arn: RoleArn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOutputs {
    pub function_arn: FunctionArn,
    pub function_name: String,
    pub trigger_binding_id: String,
}

/// Everything an external collaborator (CI/CD, enqueuing systems) needs
/// to hand work to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentOutputs {
    pub registry: RegistryOutputs,
    pub queue: QueueOutputs,
    pub identity: IdentityOutputs,
    pub compute: ComputeOutputs,
    pub queue_url_parameter: ParameterPath,
    pub dead_letter_queue_url_parameter: ParameterPath,
}

/// Inputs the Identity unit resolves at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityInputs {
    pub queue_arn: QueueArn,
    pub bucket: BucketName,
}

/// Inputs the Compute unit resolves at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeInputs {
    pub image_uri: ImageUri,
    pub role_arn: RoleArn,
    pub queue_arn: QueueArn,
    pub queue_url: QueueUrl,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputLedger {
    registry: Option<RegistryOutputs>,
    queue: Option<QueueOutputs>,
    identity: Option<IdentityOutputs>,
    compute: Option<ComputeOutputs>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registry(&mut self, outputs: RegistryOutputs) {
        self.registry = Some(outputs);
    }

    pub fn record_queue(&mut self, outputs: QueueOutputs) {
        self.queue = Some(outputs);
    }

    pub fn record_identity(&mut self, outputs: IdentityOutputs) {
        self.identity = Some(outputs);
    }

    pub fn record_compute(&mut self, outputs: ComputeOutputs) {
        self.compute = Some(outputs);
    }

    pub fn registry(&self) -> Option<&RegistryOutputs> {
        self.registry.as_ref()
    }

    pub fn queue(&self) -> Option<&QueueOutputs> {
        self.queue.as_ref()
    }

    pub fn identity(&self) -> Option<&IdentityOutputs> {
        self.identity.as_ref()
    }

    pub fn compute(&self) -> Option<&ComputeOutputs> {
        self.compute.as_ref()
    }

    /// Resolves the Identity unit's reference inputs. The bucket is an
    /// externally supplied identifier and is always considered resolved
    /// once validated.
    pub fn identity_inputs(&self, bucket: &BucketName) -> Result<IdentityInputs, ProvisionError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or(ProvisionError::UnresolvedReference {
                unit: UnitKind::Identity,
                input: "queue_arn",
            })?;

        Ok(IdentityInputs {
            queue_arn: queue.queue_arn.clone(),
            bucket: bucket.clone(),
        })
    }

    /// Resolves the Compute unit's reference inputs from all three
    /// upstream units.
    pub fn compute_inputs(&self) -> Result<ComputeInputs, ProvisionError> {
        let registry = self
            .registry
            .as_ref()
            .ok_or(ProvisionError::UnresolvedReference {
                unit: UnitKind::Compute,
                input: "image_uri",
            })?;
        let identity = self
            .identity
            .as_ref()
            .ok_or(ProvisionError::UnresolvedReference {
                unit: UnitKind::Compute,
                input: "role_arn",
            })?;
        let queue = self
            .queue
            .as_ref()
            .ok_or(ProvisionError::UnresolvedReference {
                unit: UnitKind::Compute,
                input: "queue_arn",
            })?;

        Ok(ComputeInputs {
            image_uri: registry.image_uri.clone(),
            role_arn: identity.role_arn.clone(),
            queue_arn: queue.queue_arn.clone(),
            queue_url: queue.queue_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_queue_outputs() -> QueueOutputs {
        QueueOutputs {
            queue_url: QueueUrl::new(
                "https://sqs.eu-central-1.amazonaws.com/123456789012/docpipe-dev-pdf-jobs.fifo",
            )
            .expect("url should parse"),
            queue_arn: QueueArn::new(
                "arn:aws:sqs:eu-central-1:123456789012:docpipe-dev-pdf-jobs.fifo",
            )
            .expect("arn should parse"),
            dead_letter_queue_url: QueueUrl::new(
                "https://sqs.eu-central-1.amazonaws.com/123456789012/docpipe-dev-pdf-jobs-dlq.fifo",
            )
            .expect("url should parse"),
            dead_letter_queue_arn: QueueArn::new(
                "arn:aws:sqs:eu-central-1:123456789012:docpipe-dev-pdf-jobs-dlq.fifo",
            )
            .expect("arn should parse"),
        }
    }

    #[test]
    fn identity_inputs_fail_while_queue_is_unresolved() {
        let ledger = OutputLedger::new();
        let bucket = BucketName::new("docpipe-dev-contracts").expect("bucket should parse");

        let error = ledger
            .identity_inputs(&bucket)
            .expect_err("unresolved queue should fail");

        assert_eq!(
            error,
            ProvisionError::UnresolvedReference {
                unit: UnitKind::Identity,
                input: "queue_arn",
            }
        );
    }

    #[test]
    fn identity_inputs_resolve_after_queue_is_recorded() {
        let mut ledger = OutputLedger::new();
        let bucket = BucketName::new("docpipe-dev-contracts").expect("bucket should parse");
        ledger.record_queue(sample_queue_outputs());

        let inputs = ledger
            .identity_inputs(&bucket)
            .expect("inputs should resolve");

        assert!(inputs.queue_arn.as_str().ends_with("pdf-jobs.fifo"));
    }

    #[test]
    fn compute_inputs_report_first_missing_upstream() {
        let mut ledger = OutputLedger::new();
        ledger.record_queue(sample_queue_outputs());

        let error = ledger
            .compute_inputs()
            .expect_err("missing registry should fail");

        assert_eq!(
            error,
            ProvisionError::UnresolvedReference {
                unit: UnitKind::Compute,
                input: "image_uri",
            }
        );
    }
}
