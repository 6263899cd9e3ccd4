use std::collections::BTreeMap;

use docpipe_provision_core::plan::ObservedRepository;

pub trait RepositoryStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedRepository>, String>;
    fn create(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRepository, String>;
    fn put_lifecycle_policy(&self, name: &str, policy_text: &str) -> Result<(), String>;
    fn delete(&self, name: &str) -> Result<(), String>;
}

/// Lifecycle policy text bounding the number of retained image versions.
pub fn lifecycle_policy_text(retained_image_count: u32) -> String {
    serde_json::json!({
        "rules": [
            {
                "rulePriority": 1,
                "description": format!("keep the newest {retained_image_count} images"),
                "selection": {
                    "tagStatus": "any",
                    "countType": "imageCountMoreThan",
                    "countNumber": retained_image_count,
                },
                "action": { "type": "expire" },
            }
        ]
    })
    .to_string()
}

pub fn retained_count_from_policy_text(policy_text: &str) -> Option<u32> {
    let parsed: serde_json::Value = serde_json::from_str(policy_text).ok()?;
    parsed["rules"][0]["selection"]["countNumber"]
        .as_u64()
        .and_then(|count| u32::try_from(count).ok())
}

pub struct EcrRepositoryStore {
    client: aws_sdk_ecr::Client,
}

impl EcrRepositoryStore {
    pub fn new(client: aws_sdk_ecr::Client) -> Self {
        Self { client }
    }
}

impl RepositoryStore for EcrRepositoryStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedRepository>, String> {
        let client = self.client.clone();
        let repository_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let described = client
                    .describe_repositories()
                    .repository_names(&repository_name)
                    .send()
                    .await;

                let output = match described {
                    Ok(output) => output,
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_repository_not_found_exception())
                        {
                            return Ok(None);
                        }
                        return Err(format!("failed to describe repository: {error}"));
                    }
                };

                let Some(repository) = output.repositories().first() else {
                    return Ok(None);
                };
                let arn = repository
                    .repository_arn()
                    .ok_or_else(|| "repository is missing an ARN".to_string())?
                    .to_string();
                let uri = repository
                    .repository_uri()
                    .ok_or_else(|| "repository is missing a URI".to_string())?
                    .to_string();

                let tags = client
                    .list_tags_for_resource()
                    .resource_arn(&arn)
                    .send()
                    .await
                    .map_err(|error| format!("failed to list repository tags: {error}"))?
                    .tags()
                    .iter()
                    .filter_map(|tag| {
                        Some((tag.key().to_string(), tag.value().to_string()))
                    })
                    .collect::<BTreeMap<String, String>>();

                let retained_image_count = match client
                    .get_lifecycle_policy()
                    .repository_name(&repository_name)
                    .send()
                    .await
                {
                    Ok(policy) => policy
                        .lifecycle_policy_text()
                        .and_then(retained_count_from_policy_text),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_lifecycle_policy_not_found_exception())
                        {
                            None
                        } else {
                            return Err(format!(
                                "failed to read repository lifecycle policy: {error}"
                            ));
                        }
                    }
                };

                Ok(Some(ObservedRepository {
                    name: repository_name.clone(),
                    uri,
                    arn,
                    retained_image_count,
                    tags,
                }))
            })
        })
    }

    fn create(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRepository, String> {
        let client = self.client.clone();
        let repository_name = name.to_string();
        let tags = tags.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let sdk_tags: Vec<aws_sdk_ecr::types::Tag> = tags
                    .iter()
                    .map(|(key, value)| {
                        aws_sdk_ecr::types::Tag::builder()
                            .key(key)
                            .value(value)
                            .build()
                            .map_err(|error| format!("failed to build repository tag: {error}"))
                    })
                    .collect::<Result<_, String>>()?;

                let created = client
                    .create_repository()
                    .repository_name(&repository_name)
                    .set_tags(Some(sdk_tags))
                    .send()
                    .await
                    .map_err(|error| format!("failed to create repository: {error}"))?;

                let repository = created
                    .repository()
                    .ok_or_else(|| "create repository returned no repository".to_string())?;

                Ok(ObservedRepository {
                    name: repository_name,
                    uri: repository
                        .repository_uri()
                        .ok_or_else(|| "created repository is missing a URI".to_string())?
                        .to_string(),
                    arn: repository
                        .repository_arn()
                        .ok_or_else(|| "created repository is missing an ARN".to_string())?
                        .to_string(),
                    retained_image_count: None,
                    tags,
                })
            })
        })
    }

    fn put_lifecycle_policy(&self, name: &str, policy_text: &str) -> Result<(), String> {
        let client = self.client.clone();
        let repository_name = name.to_string();
        let policy_text = policy_text.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_lifecycle_policy()
                    .repository_name(repository_name)
                    .lifecycle_policy_text(policy_text)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to put repository lifecycle policy: {error}"))
            })
        })
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        let client = self.client.clone();
        let repository_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client
                    .delete_repository()
                    .repository_name(repository_name)
                    .force(true)
                    .send()
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_repository_not_found_exception())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete repository: {error}"))
                        }
                    }
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_policy_round_trips_the_retained_count() {
        let text = lifecycle_policy_text(5);
        assert_eq!(retained_count_from_policy_text(&text), Some(5));
    }

    #[test]
    fn malformed_lifecycle_policy_yields_none() {
        assert_eq!(retained_count_from_policy_text("not json"), None);
        assert_eq!(retained_count_from_policy_text("{\"rules\":[]}"), None);
    }
}
