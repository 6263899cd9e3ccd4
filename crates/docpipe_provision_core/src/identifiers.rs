//! Typed resource identifiers.
//!
//! Every value that crosses a unit boundary (repository URIs, queue URLs
//! and ARNs, role ARNs) is a newtype validated at construction, so a
//! reference to another unit's output can never silently carry a
//! malformed or wrong-kind string.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct IdentifierError {
    kind: &'static str,
    value: String,
    reason: &'static str,
}

impl IdentifierError {
    fn new(kind: &'static str, value: impl Into<String>, reason: &'static str) -> Self {
        Self {
            kind,
            value: value.into(),
            reason,
        }
    }
}

macro_rules! string_identifier {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(RepositoryUri);
string_identifier!(RepositoryArn);
string_identifier!(ImageUri);
string_identifier!(QueueUrl);
string_identifier!(QueueArn);
string_identifier!(RoleArn);
string_identifier!(FunctionArn);
string_identifier!(BucketName);
string_identifier!(ParameterPath);

impl RepositoryUri {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.contains('/') {
            return Err(IdentifierError::new(
                "repository URI",
                value,
                "must contain a registry host and repository path",
            ));
        }
        Ok(Self(value))
    }

    /// Fully qualified image reference for a mutable tag.
    pub fn image_uri(&self, tag: &str) -> ImageUri {
        ImageUri(format!("{}:{tag}", self.0))
    }
}

impl RepositoryArn {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with("arn:aws:ecr:") {
            return Err(IdentifierError::new(
                "repository ARN",
                value,
                "must start with arn:aws:ecr:",
            ));
        }
        Ok(Self(value))
    }
}

impl ImageUri {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        let tag_separator = value.rfind(':');
        let path_separator = value.rfind('/');
        match (tag_separator, path_separator) {
            (Some(tag), Some(path)) if tag > path + 1 && tag + 1 < value.len() => Ok(Self(value)),
            _ => Err(IdentifierError::new(
                "image URI",
                value,
                "must be a repository URI followed by ':<tag>'",
            )),
        }
    }
}

impl QueueUrl {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with("https://") || !value.contains("sqs") {
            return Err(IdentifierError::new(
                "queue URL",
                value,
                "must be an https SQS endpoint URL",
            ));
        }
        Ok(Self(value))
    }
}

impl QueueArn {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with("arn:aws:sqs:") {
            return Err(IdentifierError::new(
                "queue ARN",
                value,
                "must start with arn:aws:sqs:",
            ));
        }
        Ok(Self(value))
    }
}

impl RoleArn {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with("arn:aws:iam::") || !value.contains(":role/") {
            return Err(IdentifierError::new(
                "role ARN",
                value,
                "must be an IAM role ARN",
            ));
        }
        Ok(Self(value))
    }
}

impl FunctionArn {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with("arn:aws:lambda:") {
            return Err(IdentifierError::new(
                "function ARN",
                value,
                "must start with arn:aws:lambda:",
            ));
        }
        Ok(Self(value))
    }
}

impl BucketName {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.len() < 3 || value.len() > 63 {
            return Err(IdentifierError::new(
                "bucket name",
                value,
                "must be 3-63 characters",
            ));
        }
        let valid_chars = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
        if !valid_chars || value.starts_with('-') || value.ends_with('-') {
            return Err(IdentifierError::new(
                "bucket name",
                value,
                "must be lowercase alphanumeric with interior hyphens or dots",
            ));
        }
        Ok(Self(value))
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.0)
    }
}

impl ParameterPath {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if !value.starts_with('/') || value.ends_with('/') {
            return Err(IdentifierError::new(
                "parameter path",
                value,
                "must start with '/' and not end with '/'",
            ));
        }
        if value[1..].split('/').any(|segment| segment.is_empty()) {
            return Err(IdentifierError::new(
                "parameter path",
                value,
                "must not contain empty segments",
            ));
        }
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_uri_builds_tagged_image_uri() {
        let uri = RepositoryUri::new("123456789012.dkr.ecr.eu-central-1.amazonaws.com/docpipe")
            .expect("uri should parse");

        assert_eq!(
            uri.image_uri("latest").as_str(),
            "123456789012.dkr.ecr.eu-central-1.amazonaws.com/docpipe:latest"
        );
    }

    #[test]
    fn image_uri_requires_tag() {
        let error = ImageUri::new("123456789012.dkr.ecr.eu-central-1.amazonaws.com/docpipe")
            .expect_err("untagged uri should fail");
        assert!(error.to_string().contains("image URI"));

        ImageUri::new("123456789012.dkr.ecr.eu-central-1.amazonaws.com/docpipe:v3")
            .expect("tagged uri should parse");
    }

    #[test]
    fn queue_arn_rejects_wrong_service() {
        QueueArn::new("arn:aws:sns:eu-central-1:123456789012:topic")
            .expect_err("sns arn should fail");
        QueueArn::new("arn:aws:sqs:eu-central-1:123456789012:docpipe-dev-pdf-jobs.fifo")
            .expect("sqs arn should parse");
    }

    #[test]
    fn role_arn_requires_role_path() {
        RoleArn::new("arn:aws:iam::123456789012:user/alice").expect_err("user arn should fail");
        RoleArn::new("arn:aws:iam::123456789012:role/docpipe-dev-pdf-processor-role")
            .expect("role arn should parse");
    }

    #[test]
    fn bucket_name_derives_arn() {
        let bucket = BucketName::new("docpipe-dev-contracts").expect("bucket name should parse");
        assert_eq!(bucket.arn(), "arn:aws:s3:::docpipe-dev-contracts");
    }

    #[test]
    fn bucket_name_rejects_uppercase() {
        BucketName::new("Docpipe-Contracts").expect_err("uppercase bucket should fail");
    }

    #[test]
    fn parameter_path_rejects_trailing_slash() {
        ParameterPath::new("/docpipe/dev/queue-url/").expect_err("trailing slash should fail");
        ParameterPath::new("/docpipe/dev/queue-url").expect("path should parse");
    }
}
