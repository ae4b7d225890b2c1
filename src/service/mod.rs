//! Business rules for each resource, between the HTTP handlers and the queries.

pub mod comments;
pub mod engagements;
pub mod posts;
pub mod sessions;
pub mod users;

use tracing::warn;

use crate::auth::generate_token_id;
use crate::storage::{image_key, ImageFolder};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::UploadedImage;
use crate::web::AppState;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Reject uploads that are not images or exceed the configured size.
///
/// # Errors
///
/// Returns a bad request describing the first violated rule.
pub fn check_image(state: &AppState, image: &UploadedImage) -> AppResult<()> {
    if !image.content_type.starts_with("image/") {
        return Err(AppError::bad_request("Only image files are allowed!"));
    }

    let max = state.config.image_max_bytes;
    if image.bytes.len() > max {
        let mb = max.div_ceil(BYTES_PER_MB);
        return Err(AppError::bad_request(format!(
            "Image size must be less than {mb}MB!"
        )));
    }

    Ok(())
}

/// Upload an already-checked image and return its key.
///
/// # Errors
///
/// Returns an internal error if the store rejects the upload.
pub async fn store_image(
    state: &AppState,
    folder: ImageFolder,
    image: &UploadedImage,
) -> AppResult<String> {
    let key = image_key(
        &state.config.s3_prefix,
        folder,
        state.clock.now().timestamp_millis(),
        &generate_token_id(),
        &image.content_type,
    );
    state
        .images
        .put(&key, &image.bytes, &image.content_type)
        .await?;
    Ok(key)
}

/// Remove an image that is no longer referenced. Failures are only logged.
pub async fn discard_image(state: &AppState, key: &str) {
    if let Err(e) = state.images.delete(key).await {
        warn!(key = %key, "Failed to delete image: {e:#}");
    }
}
