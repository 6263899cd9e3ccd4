use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::context::ProvisioningContext;
use docpipe_provision_core::error::ProvisionError;
use docpipe_provision_core::graph::{apply_stages, UnitKind, UnitStatus};
use docpipe_provision_core::identifiers::{
    BucketName, FunctionArn, QueueArn, QueueUrl, RepositoryArn, RepositoryUri, RoleArn,
};
use docpipe_provision_core::outputs::{
    ComputeInputs, ComputeOutputs, EnvironmentOutputs, IdentityOutputs, OutputLedger,
    QueueOutputs, RegistryOutputs,
};
use docpipe_provision_core::plan::{
    build_desired, fingerprint_of, DesiredEnvironment, ObservedEnvironment, Plan, PlannedChange,
};
use docpipe_provision_core::policy;

use crate::adapters::function::FunctionSpec;
use crate::adapters::repository::lifecycle_policy_text;

use super::observe::{check_bucket_precondition, observe_environment, plan_environment};
use super::ProviderAdapters;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyReport {
    pub environment: String,
    pub fingerprint: String,
    pub applied_at: String,
    pub statuses: BTreeMap<UnitKind, UnitStatus>,
    /// Cloud mutations performed by this run. A converged environment
    /// re-applies with zero.
    pub mutation_count: usize,
    pub outputs: EnvironmentOutputs,
}

/// Converges one environment onto its declared state, stage by stage in
/// dependency order. The first failing unit aborts the run; resources
/// already applied stay applied.
pub fn apply_environment(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<ApplyReport, ProvisionError> {
    let plan = plan_environment(adapters, config)?;
    if plan.has_errors() {
        for plan_error in &plan.errors {
            error!(environment = %config.environment, %plan_error, "apply blocked");
        }
        return Err(plan.errors[0].clone());
    }

    // plan_environment validated the config, so desired state rebuilds
    // without errors here.
    let desired = build_desired(config).map_err(|mut errors| errors.remove(0))?;
    let context = config.context();
    let bucket = config.bucket_name()?;
    let observed = observe_environment(adapters, &desired)?;

    let mut statuses: BTreeMap<UnitKind, UnitStatus> = UnitKind::ALL
        .iter()
        .map(|unit| (*unit, UnitStatus::Absent))
        .collect();
    let mut ledger = OutputLedger::new();
    let mut mutations = 0usize;

    for stage in apply_stages() {
        for unit in stage {
            // Resolve every declared reference input before the unit may
            // enter pending; an unresolved input leaves it absent.
            let result = match unit {
                UnitKind::Registry => {
                    statuses.insert(unit, UnitStatus::Pending);
                    apply_registry(adapters, &desired, &context, &observed, &plan, &mut mutations)
                        .map(|outputs| ledger.record_registry(outputs))
                }
                UnitKind::Queue => {
                    statuses.insert(unit, UnitStatus::Pending);
                    apply_queue(adapters, &desired, &context, &observed, &plan, &mut mutations)
                        .map(|outputs| ledger.record_queue(outputs))
                }
                UnitKind::Identity => {
                    let inputs = ledger.identity_inputs(&bucket)?;
                    statuses.insert(unit, UnitStatus::Pending);
                    apply_identity(
                        adapters,
                        &desired,
                        &context,
                        &observed,
                        &plan,
                        &inputs.queue_arn,
                        &inputs.bucket,
                        &mut mutations,
                    )
                    .map(|outputs| ledger.record_identity(outputs))
                }
                UnitKind::Compute => {
                    let inputs = ledger.compute_inputs()?;
                    statuses.insert(unit, UnitStatus::Pending);
                    apply_compute(
                        adapters,
                        &desired,
                        &context,
                        &observed,
                        &plan,
                        &inputs,
                        &mut mutations,
                    )
                    .map(|outputs| ledger.record_compute(outputs))
                }
            };

            match result {
                Ok(()) => {
                    statuses.insert(unit, UnitStatus::Applied);
                    info!(environment = %config.environment, %unit, "unit applied");
                }
                Err(unit_error) => {
                    statuses.insert(unit, UnitStatus::Failed);
                    error!(environment = %config.environment, %unit, %unit_error, "unit failed; aborting apply");
                    return Err(unit_error);
                }
            }
        }
    }

    let outputs = environment_outputs(&desired, &ledger)?;
    info!(
        environment = %config.environment,
        mutations,
        "environment converged"
    );

    Ok(ApplyReport {
        environment: config.environment.clone(),
        fingerprint: desired.fingerprint(),
        applied_at: Utc::now().to_rfc3339(),
        statuses,
        mutation_count: mutations,
        outputs,
    })
}

/// Validates configuration and the external bucket precondition without
/// touching any managed resource.
pub fn init_environment(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<(), ProvisionError> {
    config.validate()?;
    check_bucket_precondition(adapters, config)?;
    info!(
        environment = %config.environment,
        bucket = %config.bucket,
        "environment initialized"
    );
    Ok(())
}

fn change_for(plan: &Plan, resource: &str) -> PlannedChange {
    plan.actions
        .iter()
        .find(|action| action.resource == resource)
        .map(|action| action.change.clone())
        .unwrap_or(PlannedChange::Noop)
}

fn adapter_error(unit: UnitKind) -> impl Fn(String) -> ProvisionError {
    move |message| ProvisionError::adapter(unit, message)
}

fn apply_registry(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    context: &ProvisioningContext,
    observed: &ObservedEnvironment,
    plan: &Plan,
    mutations: &mut usize,
) -> Result<RegistryOutputs, ProvisionError> {
    let into_error = adapter_error(UnitKind::Registry);

    let repository = match change_for(plan, &desired.registry.name) {
        PlannedChange::Create => {
            let created = adapters
                .repositories
                .create(&desired.registry.name, &context.default_tags)
                .map_err(&into_error)?;
            *mutations += 1;
            adapters
                .repositories
                .put_lifecycle_policy(
                    &desired.registry.name,
                    &lifecycle_policy_text(desired.registry.retained_image_count),
                )
                .map_err(&into_error)?;
            *mutations += 1;
            created
        }
        PlannedChange::Update(_) => {
            adapters
                .repositories
                .put_lifecycle_policy(
                    &desired.registry.name,
                    &lifecycle_policy_text(desired.registry.retained_image_count),
                )
                .map_err(&into_error)?;
            *mutations += 1;
            observed
                .repository
                .clone()
                .ok_or_else(|| into_error("repository update planned but none observed".into()))?
        }
        PlannedChange::Noop => observed
            .repository
            .clone()
            .ok_or_else(|| into_error("repository expected but none observed".into()))?,
    };

    let repository_uri =
        RepositoryUri::new(repository.uri).map_err(|e| into_error(e.to_string()))?;
    let image_uri = repository_uri.image_uri(&desired.registry.image_tag);
    let repository_arn =
        RepositoryArn::new(repository.arn).map_err(|e| into_error(e.to_string()))?;

    Ok(RegistryOutputs {
        repository_uri,
        repository_arn,
        image_uri,
    })
}

fn apply_queue(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    context: &ProvisioningContext,
    observed: &ObservedEnvironment,
    plan: &Plan,
    mutations: &mut usize,
) -> Result<QueueOutputs, ProvisionError> {
    let into_error = adapter_error(UnitKind::Queue);

    // The dead-letter queue provisions first; the primary queue's
    // redrive policy references its ARN.
    let dead_letter = match change_for(plan, &desired.queue.dead_letter_queue_name) {
        PlannedChange::Create => {
            let created = adapters
                .queues
                .create(
                    &desired.queue.dead_letter_queue_name,
                    &desired.queue.dead_letter_attributes(),
                    &context.default_tags,
                )
                .map_err(&into_error)?;
            *mutations += 1;
            created
        }
        PlannedChange::Update(_) => {
            let existing = observed
                .dead_letter_queue
                .clone()
                .ok_or_else(|| into_error("dead-letter queue update planned but none observed".into()))?;
            adapters
                .queues
                .set_attributes(&existing.url, &desired.queue.dead_letter_attributes())
                .map_err(&into_error)?;
            *mutations += 1;
            existing
        }
        PlannedChange::Noop => observed
            .dead_letter_queue
            .clone()
            .ok_or_else(|| into_error("dead-letter queue expected but none observed".into()))?,
    };

    let primary = match change_for(plan, &desired.queue.queue_name) {
        PlannedChange::Create => {
            let created = adapters
                .queues
                .create(
                    &desired.queue.queue_name,
                    &desired.queue.primary_attributes(&dead_letter.arn),
                    &context.default_tags,
                )
                .map_err(&into_error)?;
            *mutations += 1;
            created
        }
        PlannedChange::Update(_) => {
            let existing = observed
                .queue
                .clone()
                .ok_or_else(|| into_error("queue update planned but none observed".into()))?;
            adapters
                .queues
                .set_attributes(
                    &existing.url,
                    &desired.queue.primary_attributes(&dead_letter.arn),
                )
                .map_err(&into_error)?;
            *mutations += 1;
            existing
        }
        PlannedChange::Noop => observed
            .queue
            .clone()
            .ok_or_else(|| into_error("queue expected but none observed".into()))?,
    };

    if change_for(plan, "discovery parameters") != PlannedChange::Noop {
        adapters
            .parameters
            .put(desired.parameters.queue_url_path.as_str(), &primary.url)
            .map_err(&into_error)?;
        *mutations += 1;
        adapters
            .parameters
            .put(
                desired.parameters.dead_letter_queue_url_path.as_str(),
                &dead_letter.url,
            )
            .map_err(&into_error)?;
        *mutations += 1;
    }

    Ok(QueueOutputs {
        queue_url: QueueUrl::new(primary.url).map_err(|e| into_error(e.to_string()))?,
        queue_arn: QueueArn::new(primary.arn).map_err(|e| into_error(e.to_string()))?,
        dead_letter_queue_url: QueueUrl::new(dead_letter.url)
            .map_err(|e| into_error(e.to_string()))?,
        dead_letter_queue_arn: QueueArn::new(dead_letter.arn)
            .map_err(|e| into_error(e.to_string()))?,
    })
}

#[allow(clippy::too_many_arguments)]
fn apply_identity(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    context: &ProvisioningContext,
    observed: &ObservedEnvironment,
    plan: &Plan,
    queue_arn: &QueueArn,
    bucket: &BucketName,
    mutations: &mut usize,
) -> Result<IdentityOutputs, ProvisionError> {
    let into_error = adapter_error(UnitKind::Identity);

    let statements = policy::execution_statements(
        queue_arn,
        bucket,
        &desired.identity.repository_resource,
        &desired.identity.log_group_resource,
    );
    let document = policy::execution_policy_document(&statements)?;
    let fingerprint = fingerprint_of(&document);

    let (role, existing_fingerprint) = match change_for(plan, &desired.identity.role_name) {
        PlannedChange::Create => {
            let created = adapters
                .identities
                .create(
                    &desired.identity.role_name,
                    &policy::lambda_trust_document(),
                    &context.default_tags,
                )
                .map_err(&into_error)?;
            *mutations += 1;
            (created, None)
        }
        _ => {
            let existing = observed
                .role
                .clone()
                .ok_or_else(|| into_error("role expected but none observed".into()))?;
            let recorded = existing.policy_fingerprint.clone();
            (existing, recorded)
        }
    };

    // The plan can only predict policy drift when the queue already
    // existed; the authoritative comparison happens here, against the
    // fingerprint recomputed from resolved inputs.
    if existing_fingerprint.as_deref() != Some(fingerprint.as_str()) {
        adapters
            .identities
            .put_execution_policy(
                &role.name,
                &desired.identity.policy_name,
                &document,
                &fingerprint,
            )
            .map_err(&into_error)?;
        *mutations += 1;
    }

    Ok(IdentityOutputs {
        role_arn: RoleArn::new(role.arn).map_err(|e| into_error(e.to_string()))?,
    })
}

fn apply_compute(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    context: &ProvisioningContext,
    observed: &ObservedEnvironment,
    plan: &Plan,
    inputs: &ComputeInputs,
    mutations: &mut usize,
) -> Result<ComputeOutputs, ProvisionError> {
    let into_error = adapter_error(UnitKind::Compute);

    let spec = FunctionSpec {
        name: desired.compute.function_name.clone(),
        image_uri: inputs.image_uri.as_str().to_string(),
        role_arn: inputs.role_arn.as_str().to_string(),
        timeout_seconds: desired.compute.timeout_seconds,
        memory_mb: desired.compute.memory_mb,
        environment: desired
            .compute
            .environment_variables(Some(inputs.queue_url.as_str())),
        tags: context.default_tags.clone(),
    };

    let function = match change_for(plan, &desired.compute.function_name) {
        PlannedChange::Create => {
            let created = adapters.functions.create(&spec).map_err(&into_error)?;
            *mutations += 1;
            created
        }
        PlannedChange::Update(diffs) => {
            let existing = observed
                .function
                .clone()
                .ok_or_else(|| into_error("function update planned but none observed".into()))?;
            if diffs.iter().any(|diff| diff.field == "image_uri") {
                adapters
                    .functions
                    .update_code(&spec.name, &spec.image_uri)
                    .map_err(&into_error)?;
                *mutations += 1;
            }
            if diffs.iter().any(|diff| diff.field != "image_uri") {
                adapters
                    .functions
                    .update_configuration(&spec)
                    .map_err(&into_error)?;
                *mutations += 1;
            }
            existing
        }
        PlannedChange::Noop => observed
            .function
            .clone()
            .ok_or_else(|| into_error("function expected but none observed".into()))?,
    };

    let trigger = match change_for(plan, "trigger binding") {
        PlannedChange::Create => {
            let created = adapters
                .functions
                .create_trigger(
                    &function.name,
                    inputs.queue_arn.as_str(),
                    desired.trigger_batch_size,
                    desired.trigger_batching_window_seconds,
                )
                .map_err(&into_error)?;
            *mutations += 1;
            created
        }
        PlannedChange::Update(_) => {
            let existing = observed
                .trigger
                .clone()
                .ok_or_else(|| into_error("trigger update planned but none observed".into()))?;
            adapters
                .functions
                .update_trigger(
                    &existing.id,
                    desired.trigger_batch_size,
                    desired.trigger_batching_window_seconds,
                )
                .map_err(&into_error)?;
            *mutations += 1;
            existing
        }
        PlannedChange::Noop => observed
            .trigger
            .clone()
            .ok_or_else(|| into_error("trigger binding expected but none observed".into()))?,
    };

    Ok(ComputeOutputs {
        function_arn: FunctionArn::new(function.arn).map_err(|e| into_error(e.to_string()))?,
        function_name: function.name,
        trigger_binding_id: trigger.id,
    })
}

fn environment_outputs(
    desired: &DesiredEnvironment,
    ledger: &OutputLedger,
) -> Result<EnvironmentOutputs, ProvisionError> {
    let registry = ledger
        .registry()
        .cloned()
        .ok_or(ProvisionError::UnresolvedReference {
            unit: UnitKind::Registry,
            input: "repository_uri",
        })?;
    let queue = ledger
        .queue()
        .cloned()
        .ok_or(ProvisionError::UnresolvedReference {
            unit: UnitKind::Queue,
            input: "queue_url",
        })?;
    let identity = ledger
        .identity()
        .cloned()
        .ok_or(ProvisionError::UnresolvedReference {
            unit: UnitKind::Identity,
            input: "role_arn",
        })?;
    let compute = ledger
        .compute()
        .cloned()
        .ok_or(ProvisionError::UnresolvedReference {
            unit: UnitKind::Compute,
            input: "function_arn",
        })?;

    Ok(EnvironmentOutputs {
        registry,
        queue,
        identity,
        compute,
        queue_url_parameter: desired.parameters.queue_url_path.clone(),
        dead_letter_queue_url_parameter: desired.parameters.dead_letter_queue_url_path.clone(),
    })
}

