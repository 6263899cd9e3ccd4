use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::error::ProvisionError;
use docpipe_provision_core::graph::UnitKind;
use docpipe_provision_core::plan::{build_desired, diff, DesiredEnvironment, ObservedEnvironment, Plan};

use super::ProviderAdapters;

/// Reads the live state of every resource the desired state names.
/// Adapter failures are attributed to the unit whose resource was being
/// read.
pub fn observe_environment(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
) -> Result<ObservedEnvironment, ProvisionError> {
    let repository = adapters
        .repositories
        .describe(&desired.registry.name)
        .map_err(|message| ProvisionError::adapter(UnitKind::Registry, message))?;

    let dead_letter_queue = adapters
        .queues
        .describe(&desired.queue.dead_letter_queue_name)
        .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?;
    let queue = adapters
        .queues
        .describe(&desired.queue.queue_name)
        .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?;

    let role = adapters
        .identities
        .describe(&desired.identity.role_name)
        .map_err(|message| ProvisionError::adapter(UnitKind::Identity, message))?;

    let function = adapters
        .functions
        .describe(&desired.compute.function_name)
        .map_err(|message| ProvisionError::adapter(UnitKind::Compute, message))?;

    let trigger = match (&function, &queue) {
        (Some(function), Some(queue)) => adapters
            .functions
            .describe_trigger(&function.name, &queue.arn)
            .map_err(|message| ProvisionError::adapter(UnitKind::Compute, message))?,
        _ => None,
    };

    let mut parameters = std::collections::BTreeMap::new();
    for path in [
        desired.parameters.queue_url_path.as_str(),
        desired.parameters.dead_letter_queue_url_path.as_str(),
    ] {
        if let Some(value) = adapters
            .parameters
            .get(path)
            .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?
        {
            parameters.insert(path.to_string(), value);
        }
    }

    Ok(ObservedEnvironment {
        repository,
        queue,
        dead_letter_queue,
        role,
        function,
        trigger,
        parameters,
    })
}

/// Verifies the external storage bucket precondition. The bucket is not
/// managed here, so a missing bucket is a hard validation failure, not
/// something apply would create.
pub fn check_bucket_precondition(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<(), ProvisionError> {
    let bucket = config.bucket_name()?;
    let exists = adapters
        .storage
        .bucket_exists(bucket.as_str())
        .map_err(|message| ProvisionError::ExternalPrecondition { message })?;

    if exists {
        Ok(())
    } else {
        Err(ProvisionError::ExternalPrecondition {
            message: format!(
                "storage bucket '{bucket}' does not exist; provision it before applying"
            ),
        })
    }
}

/// Computes the delta between declared and live state. Validation errors
/// and the bucket precondition surface inside the plan; only adapter
/// failures abort it.
pub fn plan_environment(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<Plan, ProvisionError> {
    let desired = match build_desired(config) {
        Ok(desired) => desired,
        Err(errors) => return Ok(Plan::invalid(config.environment.clone(), errors)),
    };

    let mut precondition_errors = Vec::new();
    if let Err(error) = check_bucket_precondition(adapters, config) {
        precondition_errors.push(error);
    }

    let observed = observe_environment(adapters, &desired)?;
    let mut plan = diff(&desired, &observed, &config.context());
    plan.errors.splice(0..0, precondition_errors);

    tracing::info!(
        environment = %plan.environment,
        mutations = plan.mutation_count(),
        errors = plan.errors.len(),
        "plan computed"
    );

    Ok(plan)
}
