//! Object storage for uploaded images.

mod memory;
mod s3;

pub use memory::MemoryImageStore;
pub use self::s3::S3ImageStore;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::Config;

/// A stored object and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// `Ok(None)` when no object exists under `key`.
    async fn get(&self, key: &str) -> Result<Option<StoredImage>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Folder an uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFolder {
    PostImages,
    ProfilePictures,
}

impl ImageFolder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostImages => "post-images",
            Self::ProfilePictures => "profile-pictures",
        }
    }
}

/// Build the object key for a new upload: `<prefix><folder>/<millis>-<nonce>.<subtype>`.
///
/// Stores overwrite on `put`, so `nonce` must differ between uploads made in
/// the same millisecond.
#[must_use]
pub fn image_key(
    prefix: &str,
    folder: ImageFolder,
    millis: i64,
    nonce: &str,
    content_type: &str,
) -> String {
    let ext = content_type
        .split_once('/')
        .map_or("bin", |(_, subtype)| subtype)
        .split(['+', ';'])
        .next()
        .unwrap_or("bin")
        .trim();
    format!("{prefix}{}/{millis}-{nonce}.{ext}", folder.as_str())
}

/// Pick the store from configuration: S3 when a bucket is set, memory otherwise.
///
/// # Errors
///
/// Returns an error if the S3 client cannot be created.
pub fn from_config(config: &Config) -> Result<Arc<dyn ImageStore>> {
    if let Some(bucket) = &config.s3_bucket {
        info!(bucket = %bucket, region = %config.s3_region, "Storing images in S3");
        Ok(Arc::new(S3ImageStore::new(
            bucket,
            &config.s3_region,
            config.s3_endpoint.as_deref(),
        )?))
    } else {
        info!("S3_BUCKET not set, storing images in memory");
        Ok(Arc::new(MemoryImageStore::default()))
    }
}
