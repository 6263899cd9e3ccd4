//! Declared environment configuration.
//!
//! One JSON document per environment instantiates the same unit graph
//! with different naming and sizing parameters. Defaults follow the
//! production pipeline's settings; validation runs before any plan or
//! apply touches a resource.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::ProvisioningContext;
use crate::error::ProvisionError;
use crate::identifiers::BucketName;

pub const DEFAULT_RETAINED_IMAGE_COUNT: u32 = 5;
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u32 = 900;
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 4;
pub const DEFAULT_MESSAGE_RETENTION_SECONDS: u32 = 345_600;
pub const DEFAULT_DEAD_LETTER_RETENTION_SECONDS: u32 = 1_209_600;
pub const DEFAULT_FUNCTION_TIMEOUT_SECONDS: u32 = 900;
pub const DEFAULT_FUNCTION_MEMORY_MB: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub name_prefix: String,
    pub region: String,
    /// External precondition: the bucket is provisioned outside this
    /// system and only referenced here.
    pub bucket: String,
    #[serde(default)]
    pub registry: RegistryParams,
    #[serde(default)]
    pub queue: QueueParams,
    #[serde(default)]
    pub compute: ComputeParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryParams {
    #[serde(default = "default_retained_image_count")]
    pub retained_image_count: u32,
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueParams {
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u32,
    #[serde(default)]
    pub delivery_delay_seconds: u32,
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
    #[serde(default = "default_message_retention")]
    pub message_retention_seconds: u32,
    #[serde(default = "default_dead_letter_retention")]
    pub dead_letter_retention_seconds: u32,
    #[serde(default = "default_true")]
    pub content_based_deduplication: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeParams {
    #[serde(default = "default_function_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_function_memory")]
    pub memory_mb: u32,
    /// Callback endpoint the deployed function reports results to.
    #[serde(default)]
    pub api_url: String,
    /// Sensitive input; accepted as a value, usually injected through the
    /// CLI rather than committed in the config file.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            retained_image_count: default_retained_image_count(),
            image_tag: default_image_tag(),
        }
    }
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            visibility_timeout_seconds: default_visibility_timeout(),
            delivery_delay_seconds: 0,
            max_receive_count: default_max_receive_count(),
            message_retention_seconds: default_message_retention(),
            dead_letter_retention_seconds: default_dead_letter_retention(),
            content_based_deduplication: true,
        }
    }
}

impl Default for ComputeParams {
    fn default() -> Self {
        Self {
            timeout_seconds: default_function_timeout(),
            memory_mb: default_function_memory(),
            api_url: String::new(),
            api_key: String::new(),
            storage_endpoint: default_storage_endpoint(),
        }
    }
}

fn default_retained_image_count() -> u32 {
    DEFAULT_RETAINED_IMAGE_COUNT
}

fn default_image_tag() -> String {
    "latest".to_string()
}

fn default_visibility_timeout() -> u32 {
    DEFAULT_VISIBILITY_TIMEOUT_SECONDS
}

fn default_max_receive_count() -> u32 {
    DEFAULT_MAX_RECEIVE_COUNT
}

fn default_message_retention() -> u32 {
    DEFAULT_MESSAGE_RETENTION_SECONDS
}

fn default_dead_letter_retention() -> u32 {
    DEFAULT_DEAD_LETTER_RETENTION_SECONDS
}

fn default_function_timeout() -> u32 {
    DEFAULT_FUNCTION_TIMEOUT_SECONDS
}

fn default_function_memory() -> u32 {
    DEFAULT_FUNCTION_MEMORY_MB
}

fn default_storage_endpoint() -> String {
    "https://s3.amazonaws.com".to_string()
}

fn default_true() -> bool {
    true
}

fn is_valid_name_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

impl EnvironmentConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ProvisionError> {
        serde_json::from_str(raw)
            .map_err(|error| ProvisionError::config(format!("malformed config: {error}")))
    }

    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            ProvisionError::config(format!(
                "failed to read config '{}': {error}",
                path.display()
            ))
        })?;
        let config = Self::from_json_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn context(&self) -> ProvisioningContext {
        ProvisioningContext::new(&self.name_prefix, &self.environment, &self.region)
    }

    pub fn bucket_name(&self) -> Result<BucketName, ProvisionError> {
        BucketName::new(self.bucket.clone())
            .map_err(|error| ProvisionError::config(error.to_string()))
    }

    /// Validates scalar parameters and the cross-unit invariants that can
    /// be checked without touching live state. Returns every violation,
    /// not just the first.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let errors = self.validation_errors();
        match errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(first),
        }
    }

    pub fn validation_errors(&self) -> Vec<ProvisionError> {
        let mut errors = Vec::new();

        if !is_valid_name_segment(&self.environment) {
            errors.push(ProvisionError::config(format!(
                "environment '{}' must be lowercase alphanumeric with interior hyphens",
                self.environment
            )));
        }
        if !is_valid_name_segment(&self.name_prefix) {
            errors.push(ProvisionError::config(format!(
                "name_prefix '{}' must be lowercase alphanumeric with interior hyphens",
                self.name_prefix
            )));
        }
        if self.region.trim().is_empty() {
            errors.push(ProvisionError::config("region cannot be empty"));
        }
        if let Err(error) = self.bucket_name() {
            errors.push(error);
        }

        if self.registry.retained_image_count == 0 {
            errors.push(ProvisionError::config(
                "registry.retained_image_count must be at least 1",
            ));
        }
        if self.registry.image_tag.trim().is_empty() {
            errors.push(ProvisionError::config("registry.image_tag cannot be empty"));
        }

        if self.queue.max_receive_count == 0 {
            errors.push(ProvisionError::config(
                "queue.max_receive_count must be at least 1",
            ));
        }
        if self.queue.delivery_delay_seconds > 900 {
            errors.push(ProvisionError::config(
                "queue.delivery_delay_seconds cannot exceed 900",
            ));
        }

        if !(1..=900).contains(&self.compute.timeout_seconds) {
            errors.push(ProvisionError::config(
                "compute.timeout_seconds must be between 1 and 900",
            ));
        }
        if !(128..=10_240).contains(&self.compute.memory_mb) {
            errors.push(ProvisionError::config(
                "compute.memory_mb must be between 128 and 10240",
            ));
        }

        // Cross-unit invariant: a message must stay invisible for at least
        // as long as one processing attempt can run, or it gets redelivered
        // while still in flight.
        if self.queue.visibility_timeout_seconds < self.compute.timeout_seconds {
            errors.push(ProvisionError::invariant(format!(
                "queue.visibility_timeout_seconds ({}) must be >= compute.timeout_seconds ({})",
                self.queue.visibility_timeout_seconds, self.compute.timeout_seconds
            )));
        }

        errors
    }
}
