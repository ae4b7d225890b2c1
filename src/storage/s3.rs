use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use super::{ImageStore, StoredImage};

/// Images kept in an S3-compatible bucket.
pub struct S3ImageStore {
    bucket: Box<Bucket>,
}

impl S3ImageStore {
    /// Create a store for `bucket`, with credentials from `AWS_ACCESS_KEY_ID`
    /// and `AWS_SECRET_ACCESS_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the bucket handle cannot be built.
    pub fn new(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
        let secret_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;

        let credentials = Credentials::new(Some(&access_key), Some(&secret_key), None, None, None)
            .context("Failed to create S3 credentials")?;

        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region.parse().unwrap_or(Region::UsEast1),
        };

        let handle =
            Bucket::new(bucket, region, credentials).context("Failed to create S3 bucket")?;

        // Path-style addressing for MinIO, R2 and other custom endpoints
        let handle = if endpoint.is_some() {
            handle.with_path_style()
        } else {
            handle
        };

        Ok(Self { bucket: handle })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        debug!(key = %key, content_type = %content_type, size = bytes.len(), "Uploading image to S3");

        self.bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await
            .context("Failed to upload image to S3")?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredImage>> {
        debug!(key = %key, "Getting image from S3");

        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(None),
            Ok(response) if response.status_code() >= 300 => Err(anyhow::anyhow!(
                "S3 get object failed with status {}",
                response.status_code()
            )),
            Ok(response) => {
                let content_type = response
                    .headers()
                    .get("content-type")
                    .map_or("application/octet-stream", |v| v.as_str())
                    .to_string();
                Ok(Some(StoredImage {
                    bytes: response.bytes().to_vec(),
                    content_type,
                }))
            }
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("S3 get object failed: {e}")),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key = %key, "Deleting image from S3");

        self.bucket
            .delete_object(key)
            .await
            .context("Failed to delete image from S3")?;

        Ok(())
    }
}

impl std::fmt::Debug for S3ImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ImageStore")
            .field("bucket", &self.bucket.name())
            .finish()
    }
}
