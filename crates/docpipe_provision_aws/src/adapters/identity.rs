use std::collections::BTreeMap;

use docpipe_provision_core::plan::ObservedRole;
use docpipe_provision_core::policy::POLICY_FINGERPRINT_TAG_KEY;
use serde_json::Value;

pub trait IdentityStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedRole>, String>;
    fn create(
        &self,
        name: &str,
        trust_document: &Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRole, String>;
    /// Writes the inline execution policy and records its fingerprint as
    /// a role tag so later applies can detect drift without re-reading
    /// the document.
    fn put_execution_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &Value,
        fingerprint: &str,
    ) -> Result<(), String>;
    fn delete(&self, role_name: &str, policy_name: &str) -> Result<(), String>;
}

fn observed_from_tags(name: String, arn: String, tags: BTreeMap<String, String>) -> ObservedRole {
    let policy_fingerprint = tags.get(POLICY_FINGERPRINT_TAG_KEY).cloned();
    ObservedRole {
        name,
        arn,
        policy_fingerprint,
        tags,
    }
}

pub struct IamIdentityStore {
    client: aws_sdk_iam::Client,
}

impl IamIdentityStore {
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

fn iam_tags(tags: &BTreeMap<String, String>) -> Result<Vec<aws_sdk_iam::types::Tag>, String> {
    tags.iter()
        .map(|(key, value)| {
            aws_sdk_iam::types::Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| format!("failed to build role tag: {error}"))
        })
        .collect()
}

impl IdentityStore for IamIdentityStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedRole>, String> {
        let client = self.client.clone();
        let role_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let fetched = client.get_role().role_name(&role_name).send().await;

                let output = match fetched {
                    Ok(output) => output,
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_no_such_entity_exception())
                        {
                            return Ok(None);
                        }
                        return Err(format!("failed to read role: {error}"));
                    }
                };

                let Some(role) = output.role() else {
                    return Ok(None);
                };
                let tags = role
                    .tags()
                    .iter()
                    .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                    .collect::<BTreeMap<String, String>>();

                Ok(Some(observed_from_tags(
                    role_name,
                    role.arn().to_string(),
                    tags,
                )))
            })
        })
    }

    fn create(
        &self,
        name: &str,
        trust_document: &Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRole, String> {
        let client = self.client.clone();
        let role_name = name.to_string();
        let trust_document = trust_document.to_string();
        let tags = tags.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let sdk_tags = iam_tags(&tags)?;

                let created = client
                    .create_role()
                    .role_name(&role_name)
                    .assume_role_policy_document(trust_document)
                    .set_tags(Some(sdk_tags))
                    .send()
                    .await
                    .map_err(|error| format!("failed to create role: {error}"))?;

                let role = created
                    .role()
                    .ok_or_else(|| "create role returned no role".to_string())?;

                Ok(observed_from_tags(role_name, role.arn().to_string(), tags))
            })
        })
    }

    fn put_execution_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &Value,
        fingerprint: &str,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let role_name = role_name.to_string();
        let policy_name = policy_name.to_string();
        let document = document.to_string();
        let fingerprint = fingerprint.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_role_policy()
                    .role_name(&role_name)
                    .policy_name(policy_name)
                    .policy_document(document)
                    .send()
                    .await
                    .map_err(|error| format!("failed to put role policy: {error}"))?;

                let fingerprint_tag = aws_sdk_iam::types::Tag::builder()
                    .key(POLICY_FINGERPRINT_TAG_KEY)
                    .value(fingerprint)
                    .build()
                    .map_err(|error| format!("failed to build fingerprint tag: {error}"))?;

                client
                    .tag_role()
                    .role_name(role_name)
                    .tags(fingerprint_tag)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to tag role: {error}"))
            })
        })
    }

    fn delete(&self, role_name: &str, policy_name: &str) -> Result<(), String> {
        let client = self.client.clone();
        let role_name = role_name.to_string();
        let policy_name = policy_name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                if let Err(error) = client
                    .delete_role_policy()
                    .role_name(&role_name)
                    .policy_name(policy_name)
                    .send()
                    .await
                {
                    if !error
                        .as_service_error()
                        .is_some_and(|service| service.is_no_such_entity_exception())
                    {
                        return Err(format!("failed to delete role policy: {error}"));
                    }
                }

                match client.delete_role().role_name(role_name).send().await {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_no_such_entity_exception())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete role: {error}"))
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
    fn fingerprint_tag_becomes_the_observed_policy_fingerprint() {
        let observed = observed_from_tags(
            "docpipe-dev-pdf-processor-role".to_string(),
            "arn:aws:iam::123456789012:role/docpipe-dev-pdf-processor-role".to_string(),
            BTreeMap::from([(
                POLICY_FINGERPRINT_TAG_KEY.to_string(),
                "abc123".to_string(),
            )]),
        );

        assert_eq!(observed.policy_fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_fingerprint_tag_yields_none() {
        let observed = observed_from_tags(
            "docpipe-dev-pdf-processor-role".to_string(),
            "arn:aws:iam::123456789012:role/docpipe-dev-pdf-processor-role".to_string(),
            BTreeMap::new(),
        );

        assert_eq!(observed.policy_fingerprint, None);
    }
}
