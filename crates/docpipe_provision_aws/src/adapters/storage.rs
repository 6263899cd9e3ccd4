/// Probe for the externally provisioned storage bucket. The bucket is a
/// precondition of the environment, never a managed resource, so the
/// only operation is an existence check.
pub trait StorageProbe {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String>;
}

pub struct S3StorageProbe {
    client: aws_sdk_s3::Client,
}

impl S3StorageProbe {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl StorageProbe for S3StorageProbe {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String> {
        let client = self.client.clone();
        let bucket = bucket.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.head_bucket().bucket(bucket).send().await {
                    Ok(_) => Ok(true),
                    Err(error) => {
                        if error
                            .as_service_error()
                            .is_some_and(|service| service.is_not_found())
                        {
                            Ok(false)
                        } else {
                            Err(format!("failed to probe bucket: {error}"))
                        }
                    }
                }
            })
        })
    }
}
