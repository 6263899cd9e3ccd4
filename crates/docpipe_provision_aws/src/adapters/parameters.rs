use aws_sdk_ssm::types::ParameterType;

/// Discovery parameters published for systems outside the provisioning
/// graph.
pub trait DiscoveryParameterStore {
    fn get(&self, path: &str) -> Result<Option<String>, String>;
    fn put(&self, path: &str, value: &str) -> Result<(), String>;
    fn delete(&self, path: &str) -> Result<(), String>;
}

pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

impl DiscoveryParameterStore for SsmParameterStore {
    fn get(&self, path: &str) -> Result<Option<String>, String> {
        let client = self.client.clone();
        let name = path.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.get_parameter().name(name).send().await {
                    Ok(output) => Ok(output
                        .parameter()
                        .and_then(|parameter| parameter.value())
                        .map(str::to_string)),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_parameter_not_found())
                        {
                            Ok(None)
                        } else {
                            Err(format!("failed to read parameter: {error}"))
                        }
                    }
                }
            })
        })
    }

    fn put(&self, path: &str, value: &str) -> Result<(), String> {
        let client = self.client.clone();
        let name = path.to_string();
        let value = value.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_parameter()
                    .name(name)
                    .value(value)
                    .r#type(ParameterType::String)
                    .overwrite(true)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to put parameter: {error}"))
            })
        })
    }

    fn delete(&self, path: &str) -> Result<(), String> {
        let client = self.client.clone();
        let name = path.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.delete_parameter().name(name).send().await {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_parameter_not_found())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete parameter: {error}"))
                        }
                    }
                }
            })
        })
    }
}
