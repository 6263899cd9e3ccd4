//! Desired-state computation and plan/diff logic.
//!
//! `build_desired` is a pure function from configuration to the complete
//! target state of one environment. `diff` compares it against what the
//! adapters observed and yields per-unit planned actions plus every
//! validation error, before any resource is touched. Re-applying a
//! converged environment therefore plans zero mutations.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::EnvironmentConfig;
use crate::context::ProvisioningContext;
use crate::error::ProvisionError;
use crate::graph::UnitKind;
use crate::identifiers::ParameterPath;
use crate::naming;

/// Batch size 1 and a zero batching window preserve the strict
/// per-message ordering the FIFO queue guarantees, trading invocation
/// overhead for ordering.
pub const TRIGGER_BATCH_SIZE: u32 = 1;
pub const TRIGGER_BATCHING_WINDOW_SECONDS: u32 = 0;

pub fn stable_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of plan value should not fail")
}

pub fn fingerprint_of(value: impl Serialize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_json(value));
    format!("{:x}", hasher.finalize())
}

// ── desired state ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredRegistry {
    pub name: String,
    pub retained_image_count: u32,
    pub image_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredQueue {
    pub queue_name: String,
    pub dead_letter_queue_name: String,
    pub visibility_timeout_seconds: u32,
    pub delivery_delay_seconds: u32,
    pub max_receive_count: u32,
    pub message_retention_seconds: u32,
    pub dead_letter_retention_seconds: u32,
    pub content_based_deduplication: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredIdentity {
    pub role_name: String,
    pub policy_name: String,
    pub repository_resource: String,
    pub log_group_resource: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredCompute {
    pub function_name: String,
    pub timeout_seconds: u32,
    pub memory_mb: u32,
    pub image_tag: String,
    pub bucket: String,
    pub storage_endpoint: String,
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredParameters {
    pub queue_url_path: ParameterPath,
    pub dead_letter_queue_url_path: ParameterPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredEnvironment {
    pub environment: String,
    pub registry: DesiredRegistry,
    pub queue: DesiredQueue,
    pub identity: DesiredIdentity,
    pub compute: DesiredCompute,
    pub parameters: DesiredParameters,
    pub trigger_batch_size: u32,
    pub trigger_batching_window_seconds: u32,
}

impl DesiredQueue {
    pub fn redrive_policy(&self, dead_letter_queue_arn: &str) -> String {
        json!({
            "deadLetterTargetArn": dead_letter_queue_arn,
            "maxReceiveCount": self.max_receive_count,
        })
        .to_string()
    }

    /// Wire attributes for the primary queue. `FifoQueue` is create-only
    /// and ignored by attribute updates.
    pub fn primary_attributes(&self, dead_letter_queue_arn: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("FifoQueue".to_string(), "true".to_string()),
            (
                "ContentBasedDeduplication".to_string(),
                self.content_based_deduplication.to_string(),
            ),
            (
                "VisibilityTimeout".to_string(),
                self.visibility_timeout_seconds.to_string(),
            ),
            (
                "DelaySeconds".to_string(),
                self.delivery_delay_seconds.to_string(),
            ),
            (
                "MessageRetentionPeriod".to_string(),
                self.message_retention_seconds.to_string(),
            ),
            (
                "RedrivePolicy".to_string(),
                self.redrive_policy(dead_letter_queue_arn),
            ),
        ])
    }

    pub fn dead_letter_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("FifoQueue".to_string(), "true".to_string()),
            (
                "ContentBasedDeduplication".to_string(),
                self.content_based_deduplication.to_string(),
            ),
            (
                "MessageRetentionPeriod".to_string(),
                self.dead_letter_retention_seconds.to_string(),
            ),
        ])
    }
}

impl DesiredCompute {
    /// The full runtime configuration surface handed to the deployed
    /// function. `QUEUE_URL` resolves at apply time.
    pub fn environment_variables(&self, queue_url: Option<&str>) -> BTreeMap<String, String> {
        let mut variables = BTreeMap::from([
            ("API_KEY".to_string(), self.api_key.clone()),
            ("API_URL".to_string(), self.api_url.clone()),
            ("S3_BUCKET_NAME".to_string(), self.bucket.clone()),
            ("S3_ENDPOINT".to_string(), self.storage_endpoint.clone()),
        ]);
        if let Some(url) = queue_url {
            variables.insert("QUEUE_URL".to_string(), url.to_string());
        }
        variables
    }
}

impl DesiredEnvironment {
    pub fn fingerprint(&self) -> String {
        fingerprint_of(self)
    }
}

pub fn build_desired(
    config: &EnvironmentConfig,
) -> Result<DesiredEnvironment, Vec<ProvisionError>> {
    let errors = config.validation_errors();
    if !errors.is_empty() {
        return Err(errors);
    }

    let context = config.context();
    Ok(DesiredEnvironment {
        environment: config.environment.clone(),
        registry: DesiredRegistry {
            name: naming::repository_name(&context),
            retained_image_count: config.registry.retained_image_count,
            image_tag: config.registry.image_tag.clone(),
        },
        queue: DesiredQueue {
            queue_name: naming::queue_name(&context),
            dead_letter_queue_name: naming::dead_letter_queue_name(&context),
            visibility_timeout_seconds: config.queue.visibility_timeout_seconds,
            delivery_delay_seconds: config.queue.delivery_delay_seconds,
            max_receive_count: config.queue.max_receive_count,
            message_retention_seconds: config.queue.message_retention_seconds,
            dead_letter_retention_seconds: config.queue.dead_letter_retention_seconds,
            content_based_deduplication: config.queue.content_based_deduplication,
        },
        identity: DesiredIdentity {
            role_name: naming::role_name(&context),
            policy_name: crate::policy::EXECUTION_POLICY_NAME.to_string(),
            repository_resource: naming::repository_resource(&context),
            log_group_resource: naming::log_group_resource(&context),
        },
        compute: DesiredCompute {
            function_name: naming::function_name(&context),
            timeout_seconds: config.compute.timeout_seconds,
            memory_mb: config.compute.memory_mb,
            image_tag: config.registry.image_tag.clone(),
            bucket: config.bucket.clone(),
            storage_endpoint: config.compute.storage_endpoint.clone(),
            api_url: config.compute.api_url.clone(),
            api_key: config.compute.api_key.clone(),
        },
        parameters: DesiredParameters {
            queue_url_path: naming::parameter_path(&context, naming::QUEUE_URL_PARAMETER),
            dead_letter_queue_url_path: naming::parameter_path(
                &context,
                naming::DEAD_LETTER_QUEUE_URL_PARAMETER,
            ),
        },
        trigger_batch_size: TRIGGER_BATCH_SIZE,
        trigger_batching_window_seconds: TRIGGER_BATCHING_WINDOW_SECONDS,
    })
}

// ── observed state ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedRepository {
    pub name: String,
    pub uri: String,
    pub arn: String,
    pub retained_image_count: Option<u32>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedQueue {
    pub url: String,
    pub arn: String,
    pub visibility_timeout_seconds: Option<u32>,
    pub delivery_delay_seconds: Option<u32>,
    pub message_retention_seconds: Option<u32>,
    pub content_based_deduplication: Option<bool>,
    pub max_receive_count: Option<u32>,
    pub dead_letter_target_arn: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedRole {
    pub name: String,
    pub arn: String,
    pub policy_fingerprint: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedFunction {
    pub name: String,
    pub arn: String,
    pub image_uri: Option<String>,
    pub role_arn: Option<String>,
    pub timeout_seconds: Option<u32>,
    pub memory_mb: Option<u32>,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedTrigger {
    pub id: String,
    pub queue_arn: String,
    pub batch_size: Option<u32>,
    pub batching_window_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedEnvironment {
    pub repository: Option<ObservedRepository>,
    pub queue: Option<ObservedQueue>,
    pub dead_letter_queue: Option<ObservedQueue>,
    pub role: Option<ObservedRole>,
    pub function: Option<ObservedFunction>,
    pub trigger: Option<ObservedTrigger>,
    /// Discovery parameter values by path.
    pub parameters: BTreeMap<String, String>,
}

// ── diff ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "diffs")]
pub enum PlannedChange {
    Create,
    Update(Vec<FieldDiff>),
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub unit: UnitKind,
    pub resource: String,
    pub change: PlannedChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub environment: String,
    pub fingerprint: String,
    pub actions: Vec<PlannedAction>,
    pub errors: Vec<ProvisionError>,
}

impl Plan {
    /// A plan that failed validation before any live state was read.
    pub fn invalid(environment: impl Into<String>, errors: Vec<ProvisionError>) -> Self {
        Self {
            environment: environment.into(),
            fingerprint: String::new(),
            actions: Vec::new(),
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| action.change != PlannedChange::Noop)
            .count()
    }

    /// A converged plan has nothing to create or update and no errors;
    /// applying it performs zero mutations.
    pub fn is_converged(&self) -> bool {
        !self.has_errors() && self.mutation_count() == 0
    }
}

struct FieldComparison {
    diffs: Vec<FieldDiff>,
}

impl FieldComparison {
    fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    fn check(&mut self, field: &'static str, expected: impl ToString, actual: Option<String>) {
        let expected = expected.to_string();
        let actual = actual.unwrap_or_else(|| "<unset>".to_string());
        if expected != actual {
            self.diffs.push(FieldDiff {
                field,
                expected,
                actual,
            });
        }
    }

    fn into_change(self) -> PlannedChange {
        if self.diffs.is_empty() {
            PlannedChange::Noop
        } else {
            PlannedChange::Update(self.diffs)
        }
    }
}

fn guard_managed(
    unit: UnitKind,
    name: &str,
    tags: &BTreeMap<String, String>,
    context: &ProvisioningContext,
    errors: &mut Vec<ProvisionError>,
) -> bool {
    if context.is_managed(tags) {
        true
    } else {
        errors.push(ProvisionError::NamingCollision {
            unit,
            name: name.to_string(),
        });
        false
    }
}

/// Compares desired and observed state. Ordering of the returned actions
/// follows the apply stages: Registry, Queue, Identity, Compute.
pub fn diff(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
    context: &ProvisioningContext,
) -> Plan {
    let mut actions = Vec::new();
    let mut errors = Vec::new();

    actions.push(diff_repository(desired, observed, context, &mut errors));
    actions.push(diff_dead_letter_queue(desired, observed));
    actions.push(diff_primary_queue(desired, observed, context, &mut errors));
    actions.push(diff_parameters(desired, observed));
    actions.push(diff_role(desired, observed, context, &mut errors));
    actions.push(diff_function(desired, observed, context, &mut errors));
    actions.push(diff_trigger(desired, observed));

    Plan {
        environment: desired.environment.clone(),
        fingerprint: desired.fingerprint(),
        actions,
        errors,
    }
}

fn diff_repository(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
    context: &ProvisioningContext,
    errors: &mut Vec<ProvisionError>,
) -> PlannedAction {
    let change = match &observed.repository {
        None => PlannedChange::Create,
        Some(repository) => {
            if !guard_managed(
                UnitKind::Registry,
                &repository.name,
                &repository.tags,
                context,
                errors,
            ) {
                PlannedChange::Noop
            } else {
                let mut comparison = FieldComparison::new();
                comparison.check(
                    "retained_image_count",
                    desired.registry.retained_image_count,
                    repository
                        .retained_image_count
                        .map(|count| count.to_string()),
                );
                comparison.into_change()
            }
        }
    };

    PlannedAction {
        unit: UnitKind::Registry,
        resource: desired.registry.name.clone(),
        change,
    }
}

fn diff_dead_letter_queue(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
) -> PlannedAction {
    let change = match &observed.dead_letter_queue {
        None => PlannedChange::Create,
        Some(queue) => {
            let mut comparison = FieldComparison::new();
            comparison.check(
                "message_retention_seconds",
                desired.queue.dead_letter_retention_seconds,
                queue
                    .message_retention_seconds
                    .map(|seconds| seconds.to_string()),
            );
            comparison.into_change()
        }
    };

    PlannedAction {
        unit: UnitKind::Queue,
        resource: desired.queue.dead_letter_queue_name.clone(),
        change,
    }
}

fn diff_primary_queue(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
    context: &ProvisioningContext,
    errors: &mut Vec<ProvisionError>,
) -> PlannedAction {
    let change = match &observed.queue {
        None => PlannedChange::Create,
        Some(queue) => {
            if !guard_managed(UnitKind::Queue, &desired.queue.queue_name, &queue.tags, context, errors)
            {
                PlannedChange::Noop
            } else {
                let mut comparison = FieldComparison::new();
                comparison.check(
                    "visibility_timeout_seconds",
                    desired.queue.visibility_timeout_seconds,
                    queue
                        .visibility_timeout_seconds
                        .map(|seconds| seconds.to_string()),
                );
                comparison.check(
                    "delivery_delay_seconds",
                    desired.queue.delivery_delay_seconds,
                    queue
                        .delivery_delay_seconds
                        .map(|seconds| seconds.to_string()),
                );
                comparison.check(
                    "message_retention_seconds",
                    desired.queue.message_retention_seconds,
                    queue
                        .message_retention_seconds
                        .map(|seconds| seconds.to_string()),
                );
                comparison.check(
                    "content_based_deduplication",
                    desired.queue.content_based_deduplication,
                    queue
                        .content_based_deduplication
                        .map(|enabled| enabled.to_string()),
                );
                comparison.check(
                    "max_receive_count",
                    desired.queue.max_receive_count,
                    queue.max_receive_count.map(|count| count.to_string()),
                );
                if let Some(dead_letter) = &observed.dead_letter_queue {
                    comparison.check(
                        "dead_letter_target_arn",
                        &dead_letter.arn,
                        queue.dead_letter_target_arn.clone(),
                    );
                }
                comparison.into_change()
            }
        }
    };

    PlannedAction {
        unit: UnitKind::Queue,
        resource: desired.queue.queue_name.clone(),
        change,
    }
}

fn diff_parameters(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
) -> PlannedAction {
    let change = match &observed.queue {
        // Parameters publish queue addresses; without a live queue they
        // are created alongside it.
        None => PlannedChange::Create,
        Some(queue) => {
            let dead_letter_url = observed
                .dead_letter_queue
                .as_ref()
                .map(|dead_letter| dead_letter.url.clone());
            let mut comparison = FieldComparison::new();
            comparison.check(
                "queue_url_parameter",
                &queue.url,
                observed
                    .parameters
                    .get(desired.parameters.queue_url_path.as_str())
                    .cloned(),
            );
            if let Some(expected) = dead_letter_url {
                comparison.check(
                    "dead_letter_queue_url_parameter",
                    expected,
                    observed
                        .parameters
                        .get(desired.parameters.dead_letter_queue_url_path.as_str())
                        .cloned(),
                );
            }
            comparison.into_change()
        }
    };

    PlannedAction {
        unit: UnitKind::Queue,
        resource: "discovery parameters".to_string(),
        change,
    }
}

fn diff_role(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
    context: &ProvisioningContext,
    errors: &mut Vec<ProvisionError>,
) -> PlannedAction {
    let change = match &observed.role {
        None => PlannedChange::Create,
        Some(role) => {
            if !guard_managed(UnitKind::Identity, &role.name, &role.tags, context, errors) {
                PlannedChange::Noop
            } else {
                match expected_policy_fingerprint(desired, observed) {
                    // Upstream outputs not live yet; the policy document is
                    // recomputed and reconciled during apply.
                    None => PlannedChange::Noop,
                    Some(expected) => {
                        let mut comparison = FieldComparison::new();
                        comparison.check(
                            "policy_fingerprint",
                            expected,
                            role.policy_fingerprint.clone(),
                        );
                        comparison.into_change()
                    }
                }
            }
        }
    };

    PlannedAction {
        unit: UnitKind::Identity,
        resource: desired.identity.role_name.clone(),
        change,
    }
}

/// Expected fingerprint of the execution policy document. Computable
/// only once the queue exists, since the queue ARN is a resolved
/// reference rather than a derivable name.
pub fn expected_policy_fingerprint(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
) -> Option<String> {
    let queue = observed.queue.as_ref()?;

    let queue_arn = crate::identifiers::QueueArn::new(queue.arn.clone()).ok()?;
    let bucket = crate::identifiers::BucketName::new(desired.compute.bucket.clone()).ok()?;

    let statements = crate::policy::execution_statements(
        &queue_arn,
        &bucket,
        &desired.identity.repository_resource,
        &desired.identity.log_group_resource,
    );
    let document = crate::policy::execution_policy_document(&statements).ok()?;
    Some(fingerprint_of(&document))
}

fn diff_function(
    desired: &DesiredEnvironment,
    observed: &ObservedEnvironment,
    context: &ProvisioningContext,
    errors: &mut Vec<ProvisionError>,
) -> PlannedAction {
    let change = match &observed.function {
        None => PlannedChange::Create,
        Some(function) => {
            if !guard_managed(
                UnitKind::Compute,
                &function.name,
                &function.tags,
                context,
                errors,
            ) {
                PlannedChange::Noop
            } else {
                let mut comparison = FieldComparison::new();
                comparison.check(
                    "timeout_seconds",
                    desired.compute.timeout_seconds,
                    function.timeout_seconds.map(|seconds| seconds.to_string()),
                );
                comparison.check(
                    "memory_mb",
                    desired.compute.memory_mb,
                    function.memory_mb.map(|memory| memory.to_string()),
                );
                if let Some(repository) = &observed.repository {
                    comparison.check(
                        "image_uri",
                        format!("{}:{}", repository.uri, desired.compute.image_tag),
                        function.image_uri.clone(),
                    );
                }
                if let Some(role) = &observed.role {
                    comparison.check("role_arn", &role.arn, function.role_arn.clone());
                }
                // Environment variables carry the credential value, so the
                // diff compares fingerprints rather than printing them.
                let queue_url = observed.queue.as_ref().map(|queue| queue.url.as_str());
                let expected_environment = desired.compute.environment_variables(queue_url);
                comparison.check(
                    "environment_fingerprint",
                    fingerprint_of(&expected_environment),
                    Some(fingerprint_of(&function.environment)),
                );
                comparison.into_change()
            }
        }
    };

    PlannedAction {
        unit: UnitKind::Compute,
        resource: desired.compute.function_name.clone(),
        change,
    }
}

fn diff_trigger(desired: &DesiredEnvironment, observed: &ObservedEnvironment) -> PlannedAction {
    let change = match &observed.trigger {
        None => PlannedChange::Create,
        Some(trigger) => {
            let mut comparison = FieldComparison::new();
            comparison.check(
                "batch_size",
                desired.trigger_batch_size,
                trigger.batch_size.map(|size| size.to_string()),
            );
            comparison.check(
                "batching_window_seconds",
                desired.trigger_batching_window_seconds,
                trigger
                    .batching_window_seconds
                    .map(|seconds| seconds.to_string()),
            );
            comparison.into_change()
        }
    };

    PlannedAction {
        unit: UnitKind::Compute,
        resource: "trigger binding".to_string(),
        change,
    }
}
