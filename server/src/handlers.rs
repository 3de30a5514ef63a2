#![allow(clippy::unused_async)]
use std::time::SystemTime;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kernel::{
    BatchReply, CleanupReply, DownloadLink, ErrorReply, Health, StatsReply, UploadReply,
};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::batch::BatchJob;
use crate::context::RequestContext;
use crate::error::{ApiError, AppError};
use crate::file_reply::ImageReply;
use crate::pipeline::{compress_with_retry, persist, single_file_name};
use crate::transform::{RawParams, TransformParams};
use crate::upload::{read_form, UploadRules};
use crate::{ApiDoc, AppState};

const SINGLE_FIELD: &str = "image";
const BATCH_FIELD: &str = "images";

/// Compresses one image and streams it back, or stores it and returns a
/// download link when `uploadToStorage` is true.
#[utoipa::path(
    post,
    path = "/compress",
    tag = "compression",
    responses(
        (status = 200, response = ImageReply),
        (status = 400, description = "Invalid parameters or upload", body = ErrorReply),
        (status = 413, description = "File too large", body = ErrorReply),
        (status = 422, description = "Image cannot be processed", body = ErrorReply),
        (status = 507, description = "Storage full", body = ErrorReply)
    ),
)]
pub async fn compress(
    ctx: RequestContext,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|e| ctx.fail(AppError::Validation(e.body_text())))?;
    let rules = UploadRules {
        field: SINGLE_FIELD,
        max_files: 1,
        max_file_size: state.config.max_file_size,
        allowed_mimes: &state.config.allowed_mimes,
    };
    let mut form = read_form(&mut multipart, rules)
        .await
        .map_err(|e| ctx.fail(e))?;

    let params = TransformParams::parse(
        &RawParams::from_fields(&form.fields),
        &state.config.allowed_formats,
    )
    .map_err(|e| ctx.fail(e))?;
    let Some(upload) = form.files.pop() else {
        return Err(ctx.fail(AppError::Validation("No image file provided".to_owned())));
    };
    tracing::info!(
        request_id = %ctx.request_id,
        file = %upload.file_name,
        size = upload.data.len(),
        format = %params.format,
        "compressing image"
    );

    let image = compress_with_retry(&ctx, state.retry, &upload.data, params)
        .await
        .map_err(|e| ctx.fail(e))?;

    if form.flag("uploadToStorage") {
        state.storage.ensure_ready().await.map_err(|e| ctx.fail(e))?;
        let name = single_file_name(SystemTime::now(), image.format);
        let (stored, download_url) = persist(state.storage.as_ref(), &name, &image)
            .await
            .map_err(|e| ctx.fail(e))?;
        tracing::info!(request_id = %ctx.request_id, file = %stored.name, size = stored.size, "compressed image stored");
        let reply = UploadReply {
            success: true,
            message: "Image compressed and uploaded".to_owned(),
            data: DownloadLink { download_url },
        };
        return Ok(Json(reply).into_response());
    }

    Ok(ImageReply::new(image, form.flag("download")).into_response())
}

/// Compresses several images with shared parameters and stores every result.
#[utoipa::path(
    post,
    path = "/compress/batch",
    tag = "compression",
    responses(
        (status = 200, description = "Per-file outcomes in upload order", body = BatchReply),
        (status = 400, description = "No files, too many files or invalid parameters", body = ErrorReply),
        (status = 413, description = "File too large", body = ErrorReply)
    ),
)]
pub async fn compress_batch(
    ctx: RequestContext,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchReply>, ApiError> {
    let mut multipart = multipart.map_err(|e| ctx.fail(AppError::Validation(e.body_text())))?;
    let rules = UploadRules {
        field: BATCH_FIELD,
        max_files: state.config.batch_size_limit,
        max_file_size: state.config.max_file_size,
        allowed_mimes: &state.config.allowed_mimes,
    };
    let form = read_form(&mut multipart, rules)
        .await
        .map_err(|e| ctx.fail(e))?;

    let params = TransformParams::parse(
        &RawParams::from_fields(&form.fields),
        &state.config.allowed_formats,
    )
    .map_err(|e| ctx.fail(e))?;
    tracing::info!(request_id = %ctx.request_id, files = form.files.len(), "batch compression started");

    let job = BatchJob {
        storage: state.storage.as_ref(),
        retry: state.retry,
        limit: state.config.batch_size_limit,
    };
    let summary = job
        .run(&ctx, form.files, params)
        .await
        .map_err(|e| ctx.fail(e))?;

    Ok(Json(BatchReply {
        success: true,
        message: summary.message(),
        data: summary.items,
        request_id: ctx.request_id,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CleanupQuery {
    /// Retention in hours overriding the configured one
    retention: Option<String>,
}

impl CleanupQuery {
    fn retention_hours(&self) -> Result<Option<u64>, AppError> {
        let Some(raw) = self.retention.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        match raw.parse::<u64>() {
            Ok(hours) if hours > 0 => Ok(Some(hours)),
            _ => Err(AppError::Validation(
                "Retention must be a positive number of hours".to_owned(),
            )),
        }
    }
}

/// Deletes stored files older than the retention window.
#[utoipa::path(
    delete,
    path = "/admin/cleanup",
    tag = "admin",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Sweep counters and remaining storage", body = CleanupReply),
        (status = 400, description = "Invalid retention", body = ErrorReply)
    ),
)]
pub async fn cleanup(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupReply>, ApiError> {
    let hours = query.retention_hours().map_err(|e| ctx.fail(e))?;
    tracing::info!(request_id = %ctx.request_id, retention_hours = ?hours, "manual cleanup requested");
    let report = state.sweeper.cleanup(hours).await;
    Ok(Json(CleanupReply {
        success: true,
        message: "Cleanup completed".to_owned(),
        data: report,
    }))
}

/// Describes the files currently kept in storage.
#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "admin",
    responses(
        (status = 200, description = "Storage snapshot", body = StatsReply)
    ),
)]
pub async fn stats(State(state): State<AppState>) -> Json<StatsReply> {
    Json(StatsReply {
        success: true,
        data: state.sweeper.stats().await,
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "admin",
    responses(
        (status = 200, description = "Service is alive", body = Health)
    ),
)]
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_owned(),
    })
}

pub async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None)]
    #[case(Some(""), None)]
    #[case(Some("12"), Some(12))]
    #[case(Some(" 3 "), Some(3))]
    #[trace]
    fn retention_accepts_positive_hours(#[case] raw: Option<&str>, #[case] expected: Option<u64>) {
        // Arrange
        let query = CleanupQuery {
            retention: raw.map(str::to_owned),
        };

        // Act
        let hours = query.retention_hours().unwrap();

        // Assert
        assert_eq!(hours, expected);
    }

    #[rstest]
    #[case("0")]
    #[case("-4")]
    #[case("abc")]
    #[case("1.5")]
    #[trace]
    fn retention_rejects_invalid_values(#[case] raw: &str) {
        // Arrange
        let query = CleanupQuery {
            retention: Some(raw.to_owned()),
        };

        // Act
        let result = query.retention_hours();

        // Assert
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
