use std::collections::{BTreeMap, HashMap};

use aws_sdk_sqs::types::QueueAttributeName;
use docpipe_provision_core::plan::ObservedQueue;

pub trait QueueStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedQueue>, String>;
    fn create(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedQueue, String>;
    fn set_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), String>;
    fn delete(&self, url: &str) -> Result<(), String>;
}

fn parse_u32(value: Option<&String>) -> Option<u32> {
    value.and_then(|raw| raw.parse().ok())
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    value.and_then(|raw| raw.parse().ok())
}

fn observed_from_attributes(
    url: String,
    attributes: &HashMap<QueueAttributeName, String>,
    tags: BTreeMap<String, String>,
) -> Result<ObservedQueue, String> {
    let arn = attributes
        .get(&QueueAttributeName::QueueArn)
        .ok_or_else(|| "queue attributes are missing the queue ARN".to_string())?
        .to_string();

    let (max_receive_count, dead_letter_target_arn) = attributes
        .get(&QueueAttributeName::RedrivePolicy)
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .map(|redrive| {
            (
                redrive["maxReceiveCount"]
                    .as_u64()
                    .and_then(|count| u32::try_from(count).ok()),
                redrive["deadLetterTargetArn"]
                    .as_str()
                    .map(str::to_string),
            )
        })
        .unwrap_or((None, None));

    Ok(ObservedQueue {
        url,
        arn,
        visibility_timeout_seconds: parse_u32(
            attributes.get(&QueueAttributeName::VisibilityTimeout),
        ),
        delivery_delay_seconds: parse_u32(attributes.get(&QueueAttributeName::DelaySeconds)),
        message_retention_seconds: parse_u32(
            attributes.get(&QueueAttributeName::MessageRetentionPeriod),
        ),
        content_based_deduplication: parse_bool(
            attributes.get(&QueueAttributeName::ContentBasedDeduplication),
        ),
        max_receive_count,
        dead_letter_target_arn,
        tags,
    })
}

pub struct SqsQueueStore {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueStore {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

impl SqsQueueStore {
    async fn observe_by_url(
        client: &aws_sdk_sqs::Client,
        url: String,
    ) -> Result<ObservedQueue, String> {
        let attributes = client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|error| format!("failed to read queue attributes: {error}"))?
            .attributes
            .unwrap_or_default();

        let tags = client
            .list_queue_tags()
            .queue_url(&url)
            .send()
            .await
            .map_err(|error| format!("failed to list queue tags: {error}"))?
            .tags
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<String, String>>();

        observed_from_attributes(url, &attributes, tags)
    }
}

impl QueueStore for SqsQueueStore {
    fn describe(&self, name: &str) -> Result<Option<ObservedQueue>, String> {
        let client = self.client.clone();
        let queue_name = name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let resolved = client.get_queue_url().queue_name(&queue_name).send().await;

                let url = match resolved {
                    Ok(output) => output
                        .queue_url()
                        .ok_or_else(|| "queue URL lookup returned no URL".to_string())?
                        .to_string(),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_queue_does_not_exist())
                        {
                            return Ok(None);
                        }
                        return Err(format!("failed to resolve queue URL: {error}"));
                    }
                };

                Self::observe_by_url(&client, url).await.map(Some)
            })
        })
    }

    fn create(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedQueue, String> {
        let client = self.client.clone();
        let queue_name = name.to_string();
        let attributes = attributes.clone();
        let tags = tags.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let sdk_attributes: HashMap<QueueAttributeName, String> = attributes
                    .iter()
                    .map(|(key, value)| (QueueAttributeName::from(key.as_str()), value.clone()))
                    .collect();
                let sdk_tags: HashMap<String, String> = tags.into_iter().collect();

                let created = client
                    .create_queue()
                    .queue_name(&queue_name)
                    .set_attributes(Some(sdk_attributes))
                    .set_tags(Some(sdk_tags))
                    .send()
                    .await
                    .map_err(|error| format!("failed to create queue: {error}"))?;

                let url = created
                    .queue_url()
                    .ok_or_else(|| "create queue returned no URL".to_string())?
                    .to_string();

                Self::observe_by_url(&client, url).await
            })
        })
    }

    fn set_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let queue_url = url.to_string();
        let attributes = attributes.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                // FifoQueue is create-only; updates must not resend it.
                let sdk_attributes: HashMap<QueueAttributeName, String> = attributes
                    .iter()
                    .filter(|(key, _)| key.as_str() != "FifoQueue")
                    .map(|(key, value)| (QueueAttributeName::from(key.as_str()), value.clone()))
                    .collect();

                client
                    .set_queue_attributes()
                    .queue_url(queue_url)
                    .set_attributes(Some(sdk_attributes))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to set queue attributes: {error}"))
            })
        })
    }

    fn delete(&self, url: &str) -> Result<(), String> {
        let client = self.client.clone();
        let queue_url = url.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.delete_queue().queue_url(queue_url).send().await {
                    Ok(_) => Ok(()),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_queue_does_not_exist())
                        {
                            Ok(())
                        } else {
                            Err(format!("failed to delete queue: {error}"))
                        }
                    }
                }
            })
        })
    }
}
