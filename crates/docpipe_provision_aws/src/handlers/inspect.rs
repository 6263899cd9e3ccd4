use std::collections::BTreeMap;

use serde::Serialize;

use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::error::ProvisionError;
use docpipe_provision_core::plan::build_desired;

use super::observe::observe_environment;
use super::ProviderAdapters;

/// Current output identifiers of one environment. Every field an
/// external collaborator consumes is optional: an unprovisioned unit
/// simply reports nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub environment: String,
    pub repository_uri: Option<String>,
    pub repository_arn: Option<String>,
    pub image_uri: Option<String>,
    pub queue_url: Option<String>,
    pub queue_arn: Option<String>,
    pub dead_letter_queue_url: Option<String>,
    pub dead_letter_queue_arn: Option<String>,
    pub role_arn: Option<String>,
    pub function_arn: Option<String>,
    pub function_name: Option<String>,
    pub trigger_binding_id: Option<String>,
    pub discovery_parameters: BTreeMap<String, String>,
}

pub fn inspect_environment(
    adapters: &ProviderAdapters<'_>,
    config: &EnvironmentConfig,
) -> Result<InspectReport, ProvisionError> {
    let desired = build_desired(config).map_err(|mut errors| errors.remove(0))?;
    let observed = observe_environment(adapters, &desired)?;

    let image_uri = observed
        .repository
        .as_ref()
        .map(|repository| format!("{}:{}", repository.uri, desired.registry.image_tag));

    Ok(InspectReport {
        environment: config.environment.clone(),
        repository_uri: observed
            .repository
            .as_ref()
            .map(|repository| repository.uri.clone()),
        repository_arn: observed
            .repository
            .as_ref()
            .map(|repository| repository.arn.clone()),
        image_uri,
        queue_url: observed.queue.as_ref().map(|queue| queue.url.clone()),
        queue_arn: observed.queue.as_ref().map(|queue| queue.arn.clone()),
        dead_letter_queue_url: observed
            .dead_letter_queue
            .as_ref()
            .map(|queue| queue.url.clone()),
        dead_letter_queue_arn: observed
            .dead_letter_queue
            .as_ref()
            .map(|queue| queue.arn.clone()),
        role_arn: observed.role.as_ref().map(|role| role.arn.clone()),
        function_arn: observed
            .function
            .as_ref()
            .map(|function| function.arn.clone()),
        function_name: observed
            .function
            .as_ref()
            .map(|function| function.name.clone()),
        trigger_binding_id: observed.trigger.as_ref().map(|trigger| trigger.id.clone()),
        discovery_parameters: observed.parameters,
    })
}
