use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::BehaviorVersion, config::Credentials, config::Region, Client};
use bytes::Bytes;
use tracing::{debug, info};
use url::Url;

use super::{content_type_for, BlobStore, StorageError};
use crate::config::settings::StorageConfig;

#[derive(Clone)]
pub struct StorageService {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<Url>,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .endpoint_url(endpoint.as_str().trim_end_matches('/'))
                .force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, region = %config.region, "✅ S3 storage configured");

        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        }
    }
}

/// Public URL of `key`.
///
/// AWS uses the virtual-host form, without a region segment for
/// `us-east-1`. A custom endpoint is addressed path-style.
pub fn object_url(bucket: &str, region: &str, endpoint: Option<&Url>, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.as_str().trim_end_matches('/'), bucket, key),
        None if region == "us-east-1" => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<String, StorageError> {
        let content_type = content_type.map(str::to_string).unwrap_or_else(|| content_type_for(key));
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(&content_type)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put object '{}' failed: {}", key, e)))?;

        debug!(key, size, content_type = %content_type, "Uploaded object");
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref err) if matches!(err.err(), GetObjectError::NoSuchKey(_)) => {
                    StorageError::NotFound(key.to_string())
                }
                other => StorageError::Backend(format!("get object '{}' failed: {}", key, other)),
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to read object '{}': {}", key, e)))?;

        Ok(body.into_bytes())
    }

    fn url_for(&self, key: &str) -> String {
        object_url(&self.bucket, &self.region, self.endpoint.as_ref(), key)
    }
}
