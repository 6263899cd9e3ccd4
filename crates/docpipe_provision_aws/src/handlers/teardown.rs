use serde::Serialize;
use tracing::info;

use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::error::ProvisionError;
use docpipe_provision_core::graph::{teardown_order, UnitKind};
use docpipe_provision_core::plan::{build_desired, DesiredEnvironment, ObservedEnvironment};

use super::observe::observe_environment;
use super::ProviderAdapters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub environment: String,
    /// Resources deleted, in deletion order.
    pub deleted: Vec<String>,
}

/// Destroys an environment in the exact reverse of creation order so no
/// deletion leaves a dangling reference behind. Unobserved resources are
/// skipped; the run aborts on the first failure.
pub fn teardown_environment(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<TeardownReport, ProvisionError> {
    let desired = build_desired(config).map_err(|mut errors| errors.remove(0))?;
    let mut observed = observe_environment(adapters, &desired)?;
    let mut deleted = Vec::new();

    for unit in teardown_order() {
        match unit {
            UnitKind::Compute => {
                teardown_compute(adapters, &desired, &mut observed, &mut deleted)?
            }
            UnitKind::Identity => {
                teardown_identity(adapters, &desired, &mut observed, &mut deleted)?
            }
            UnitKind::Queue => teardown_queue(adapters, &desired, &mut observed, &mut deleted)?,
            UnitKind::Registry => {
                teardown_registry(adapters, &desired, &mut observed, &mut deleted)?
            }
        }
        info!(environment = %config.environment, %unit, "unit torn down");
    }

    Ok(TeardownReport {
        environment: config.environment.clone(),
        deleted,
    })
}

/// The trigger binding goes before the function; both go before any
/// resource they reference.
pub fn teardown_compute(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    observed: &mut ObservedEnvironment,
    deleted: &mut Vec<String>,
) -> Result<(), ProvisionError> {
    if let Some(trigger) = observed.trigger.take() {
        adapters
            .functions
            .delete_trigger(&trigger.id)
            .map_err(|message| ProvisionError::adapter(UnitKind::Compute, message))?;
        deleted.push("trigger binding".to_string());
    }

    if observed.function.take().is_some() {
        adapters
            .functions
            .delete(&desired.compute.function_name)
            .map_err(|message| ProvisionError::adapter(UnitKind::Compute, message))?;
        deleted.push(desired.compute.function_name.clone());
    }

    Ok(())
}

pub fn teardown_identity(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    observed: &mut ObservedEnvironment,
    deleted: &mut Vec<String>,
) -> Result<(), ProvisionError> {
    if observed.role.take().is_some() {
        adapters
            .identities
            .delete(&desired.identity.role_name, &desired.identity.policy_name)
            .map_err(|message| ProvisionError::adapter(UnitKind::Identity, message))?;
        deleted.push(desired.identity.role_name.clone());
    }

    Ok(())
}

/// Refuses to delete the queue while a live trigger binding still
/// references it; that binding belongs to the Compute unit and must be
/// destroyed first.
pub fn teardown_queue(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    observed: &mut ObservedEnvironment,
    deleted: &mut Vec<String>,
) -> Result<(), ProvisionError> {
    if let Some(trigger) = &observed.trigger {
        return Err(ProvisionError::TeardownBlocked {
            unit: UnitKind::Queue,
            message: format!(
                "trigger binding '{}' still references the queue; tear down compute first",
                trigger.id
            ),
        });
    }

    for path in [
        desired.parameters.queue_url_path.as_str(),
        desired.parameters.dead_letter_queue_url_path.as_str(),
    ] {
        if observed.parameters.remove(path).is_some() {
            adapters
                .parameters
                .delete(path)
                .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?;
            deleted.push(path.to_string());
        }
    }

    if let Some(queue) = observed.queue.take() {
        adapters
            .queues
            .delete(&queue.url)
            .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?;
        deleted.push(desired.queue.queue_name.clone());
    }

    if let Some(dead_letter) = observed.dead_letter_queue.take() {
        adapters
            .queues
            .delete(&dead_letter.url)
            .map_err(|message| ProvisionError::adapter(UnitKind::Queue, message))?;
        deleted.push(desired.queue.dead_letter_queue_name.clone());
    }

    Ok(())
}

pub fn teardown_registry(
    adapters: &ProviderAdapters<'_>,
    desired: &DesiredEnvironment,
    observed: &mut ObservedEnvironment,
    deleted: &mut Vec<String>,
) -> Result<(), ProvisionError> {
    if observed.repository.take().is_some() {
        adapters
            .repositories
            .delete(&desired.registry.name)
            .map_err(|message| ProvisionError::adapter(UnitKind::Registry, message))?;
        deleted.push(desired.registry.name.clone());
    }

    Ok(())
}
