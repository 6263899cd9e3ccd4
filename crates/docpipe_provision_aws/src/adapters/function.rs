use std::collections::{BTreeMap, HashMap};

use aws_sdk_lambda::types::{Environment, FunctionCode, PackageType};
use docpipe_provision_core::plan::{ObservedFunction, ObservedTrigger};

/// Everything the function resource needs at create/update time, with
/// every upstream reference already resolved to a concrete value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub image_uri: String,
    pub role_arn: String,
    pub timeout_seconds: u32,
    pub memory_mb: u32,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

pub trait FunctionStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedFunction>, String>;
    fn create(&self, spec: &FunctionSpec) -> Result<ObservedFunction, String>;
    fn update_code(&self, name: &str, image_uri: &str) -> Result<(), String>;
    fn update_configuration(&self, spec: &FunctionSpec) -> Result<(), String>;
    fn delete(&self, name: &str) -> Result<(), String>;

    fn describe_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
    ) -> Result<Option<ObservedTrigger>, String>;
    fn create_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<ObservedTrigger, String>;
    fn update_trigger(
        &self,
        id: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<(), String>;
    fn delete_trigger(&self, id: &str) -> Result<(), String>;
}

pub struct LambdaFunctionStore {
    client: aws_sdk_lambda::Client,
}

impl LambdaFunctionStore {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }
}

fn sdk_environment(variables: &BTreeMap<String, String>) -> Environment {
    let variables: HashMap<String, String> = variables
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

impl FunctionStore for LambdaFunctionStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedFunction>, String> {
        let client = self.client.clone();
        let function_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let fetched = client
                    .get_function()
                    .function_name(&function_name)
                    .send()
                    .await;

                let output = match fetched {
                    Ok(output) => output,
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_resource_not_found_exception())
                        {
                            return Ok(None);
                        }
                        return Err(format!("failed to read function: {error}"));
                    }
                };

                let Some(configuration) = output.configuration() else {
                    return Ok(None);
                };

                let environment = configuration
                    .environment()
                    .and_then(|environment| environment.variables())
                    .map(|variables| {
                        variables
                            .iter()
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect::<BTreeMap<String, String>>()
                    })
                    .unwrap_or_default();
                let tags = output
                    .tags()
                    .map(|tags| {
                        tags.iter()
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect::<BTreeMap<String, String>>()
                    })
                    .unwrap_or_default();

                Ok(Some(ObservedFunction {
                    name: function_name,
                    arn: configuration
                        .function_arn()
                        .ok_or_else(|| "function is missing an ARN".to_string())?
                        .to_string(),
                    image_uri: output
                        .code()
                        .and_then(|code| code.image_uri())
                        .map(str::to_string),
                    role_arn: configuration.role().map(str::to_string),
                    timeout_seconds: configuration
                        .timeout()
                        .and_then(|timeout| u32::try_from(timeout).ok()),
                    memory_mb: configuration
                        .memory_size()
                        .and_then(|memory| u32::try_from(memory).ok()),
                    environment,
                    tags,
                }))
            })
        })
    }

    fn create(&self, spec: &FunctionSpec) -> Result<ObservedFunction, String> {
        let client = self.client.clone();
        let spec = spec.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let tags: HashMap<String, String> = spec
                    .tags
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();

                let created = client
                    .create_function()
                    .function_name(&spec.name)
                    .package_type(PackageType::Image)
                    .code(FunctionCode::builder().image_uri(&spec.image_uri).build())
                    .role(&spec.role_arn)
                    .timeout(spec.timeout_seconds as i32)
                    .memory_size(spec.memory_mb as i32)
                    .environment(sdk_environment(&spec.environment))
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|error| format!("failed to create function: {error}"))?;

                Ok(ObservedFunction {
                    name: spec.name.clone(),
                    arn: created
                        .function_arn()
                        .ok_or_else(|| "created function is missing an ARN".to_string())?
                        .to_string(),
                    image_uri: Some(spec.image_uri.clone()),
                    role_arn: Some(spec.role_arn.clone()),
                    timeout_seconds: Some(spec.timeout_seconds),
                    memory_mb: Some(spec.memory_mb),
                    environment: spec.environment.clone(),
                    tags: spec.tags.clone(),
                })
            })
        })
    }

    fn update_code(&self, name: &str, image_uri: &str) -> Result<(), String> {
        let client = self.client.clone();
        let function_name = name.to_string();
        let image_uri = image_uri.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .update_function_code()
                    .function_name(function_name)
                    .image_uri(image_uri)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to update function code: {error}"))
            })
        })
    }

    fn update_configuration(&self, spec: &FunctionSpec) -> Result<(), String> {
        let client = self.client.clone();
        let spec = spec.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .update_function_configuration()
                    .function_name(&spec.name)
                    .role(&spec.role_arn)
                    .timeout(spec.timeout_seconds as i32)
                    .memory_size(spec.memory_mb as i32)
                    .environment(sdk_environment(&spec.environment))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to update function configuration: {error}"))
            })
        })
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        let client = self.client.clone();
        let function_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client
                    .delete_function()
                    .function_name(function_name)
                    .send()
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_resource_not_found_exception())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete function: {error}"))
                        }
                    }
                }
            })
        })
    }

    fn describe_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
    ) -> Result<Option<ObservedTrigger>, String> {
        let client = self.client.clone();
        let function_name = function_name.to_string();
        let queue_arn = queue_arn.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let listed = client
                    .list_event_source_mappings()
                    .function_name(function_name)
                    .event_source_arn(&queue_arn)
                    .send()
                    .await
                    .map_err(|error| format!("failed to list trigger bindings: {error}"))?;

                let Some(mapping) = listed.event_source_mappings().first() else {
                    return Ok(None);
                };

                Ok(Some(ObservedTrigger {
                    id: mapping
                        .uuid()
                        .ok_or_else(|| "trigger binding is missing an id".to_string())?
                        .to_string(),
                    queue_arn,
                    batch_size: mapping
                        .batch_size()
                        .and_then(|size| u32::try_from(size).ok()),
                    batching_window_seconds: mapping
                        .maximum_batching_window_in_seconds()
                        .and_then(|seconds| u32::try_from(seconds).ok()),
                }))
            })
        })
    }

    fn create_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<ObservedTrigger, String> {
        let client = self.client.clone();
        let function_name = function_name.to_string();
        let queue_arn = queue_arn.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let created = client
                    .create_event_source_mapping()
                    .function_name(function_name)
                    .event_source_arn(&queue_arn)
                    .batch_size(batch_size as i32)
                    .maximum_batching_window_in_seconds(batching_window_seconds as i32)
                    .send()
                    .await
                    .map_err(|error| format!("failed to create trigger binding: {error}"))?;

                Ok(ObservedTrigger {
                    id: created
                        .uuid()
                        .ok_or_else(|| "created trigger binding is missing an id".to_string())?
                        .to_string(),
                    queue_arn,
                    batch_size: Some(batch_size),
                    batching_window_seconds: Some(batching_window_seconds),
                })
            })
        })
    }

    fn update_trigger(
        &self,
        id: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let id = id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .update_event_source_mapping()
                    .uuid(id)
                    .batch_size(batch_size as i32)
                    .maximum_batching_window_in_seconds(batching_window_seconds as i32)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to update trigger binding: {error}"))
            })
        })
    }

    fn delete_trigger(&self, id: &str) -> Result<(), String> {
        let client = self.client.clone();
        let id = id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.delete_event_source_mapping().uuid(id).send().await {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_resource_not_found_exception())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete trigger binding: {error}"))
                        }
                    }
                }
            })
        })
    }
}
