use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domain::{Storage, StoredFile};
use crate::error::{AppError, TransformError};
use crate::retry::{with_retry, RetryPolicy};
use crate::transform::{self, CompressedImage, OutputFormat, TransformParams};

/// Transform stage wrapped in the retry executor.
pub async fn compress_with_retry(
    ctx: &RequestContext,
    policy: RetryPolicy,
    data: &Bytes,
    params: TransformParams,
) -> Result<CompressedImage, TransformError> {
    let image = with_retry(policy, || transform::compress(data.clone(), params)).await?;
    tracing::debug!(
        request_id = %ctx.request_id,
        format = %image.format,
        width = image.width,
        height = image.height,
        size = image.data.len(),
        "image compressed"
    );
    Ok(image)
}

/// Persists `image` under `name` and returns the stored file with its download URL.
pub async fn persist(
    storage: &dyn Storage,
    name: &str,
    image: &CompressedImage,
) -> Result<(StoredFile, String), AppError> {
    let stored = storage.save(name, &image.data).await?;
    let url = storage.download_url(&stored.name);
    Ok((stored, url))
}

#[must_use]
pub fn unix_millis(now: SystemTime) -> u128 {
    now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis())
}

/// Twelve random hex characters.
#[must_use]
pub fn random_token() -> String {
    let mut random = Uuid::new_v4().simple().to_string();
    random.truncate(12);
    random
}

/// `compressed_<millis>_<random>.<ext>`
#[must_use]
pub fn single_file_name(now: SystemTime, format: OutputFormat) -> String {
    format!("compressed_{}_{}.{format}", unix_millis(now), random_token())
}
