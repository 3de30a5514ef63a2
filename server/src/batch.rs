//! Sequential compression of several uploads under shared parameters.
//!
//! Files are handled one after another to bound peak memory. A failing file
//! becomes a failed [`BatchItem`]; only missing files, too many files or bad
//! shared parameters fail the batch itself.

use std::time::SystemTime;

use kernel::{BatchItem, BatchOutcome};

use crate::context::RequestContext;
use crate::domain::Storage;
use crate::error::AppError;
use crate::pipeline::{compress_with_retry, persist, random_token, unix_millis};
use crate::retry::RetryPolicy;
use crate::transform::{OutputFormat, TransformParams};
use crate::upload::Upload;

const MAX_STEM_LEN: usize = 64;
const FALLBACK_STEM: &str = "image";

#[derive(Debug)]
pub struct BatchSummary {
    /// One item per upload in upload order
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Batch compression completed: {}/{} successful",
            self.succeeded,
            self.items.len()
        )
    }
}

pub struct BatchJob<'a> {
    pub storage: &'a dyn Storage,
    pub retry: RetryPolicy,
    pub limit: usize,
}

impl BatchJob<'_> {
    pub async fn run(
        &self,
        ctx: &RequestContext,
        uploads: Vec<Upload>,
        params: TransformParams,
    ) -> Result<BatchSummary, AppError> {
        if uploads.is_empty() {
            return Err(AppError::Validation("No image files provided".to_owned()));
        }
        if uploads.len() > self.limit {
            return Err(AppError::Validation(format!(
                "Too many files. Maximum {} files allowed per batch",
                self.limit
            )));
        }
        params.validate()?;
        self.storage.ensure_ready().await?;

        let total = uploads.len();
        let prefix = BatchPrefix {
            millis: unix_millis(SystemTime::now()),
            token: random_token(),
        };
        let mut items = Vec::with_capacity(total);
        let mut succeeded = 0;

        for (i, upload) in uploads.into_iter().enumerate() {
            tracing::info!(
                request_id = %ctx.request_id,
                file = %upload.file_name,
                "processing file {}/{total}",
                i + 1
            );
            let name = batch_file_name(&prefix, i, &upload.file_name, params.format);
            let outcome = match self.process(ctx, &upload, params, &name).await {
                Ok(download_url) => {
                    succeeded += 1;
                    BatchOutcome::Compressed {
                        download_url,
                        format: params.format.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        file = %upload.file_name,
                        error_code = e.code(),
                        error = %e,
                        "file failed, continuing batch"
                    );
                    BatchOutcome::Failed {
                        error: e.to_string(),
                        error_code: e.code().to_owned(),
                    }
                }
            };
            items.push(BatchItem {
                original_name: upload.file_name,
                outcome,
                index: i + 1,
                total,
            });
        }

        let summary = BatchSummary { items, succeeded };
        tracing::info!(request_id = %ctx.request_id, "{}", summary.message());
        Ok(summary)
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        upload: &Upload,
        params: TransformParams,
        name: &str,
    ) -> Result<String, AppError> {
        let image = compress_with_retry(ctx, self.retry, &upload.data, params).await?;
        let (_, url) = persist(self.storage, name, &image).await?;
        Ok(url)
    }
}

/// Name part shared by every file of one batch request.
#[derive(Debug, Clone)]
pub struct BatchPrefix {
    pub millis: u128,
    pub token: String,
}

/// `batch_compressed_<millis>_<random>_<index>_<stem>.<ext>` with a sanitized stem.
#[must_use]
pub fn batch_file_name(prefix: &BatchPrefix, index: usize, original: &str, format: OutputFormat) -> String {
    format!(
        "batch_compressed_{}_{}_{index}_{}.{format}",
        prefix.millis,
        prefix.token,
        sanitize_stem(original)
    )
}

/// Reduces an untrusted upload name to a safe file stem.
///
/// Directories are dropped, the extension is removed and everything outside
/// `[A-Za-z0-9_-]` becomes `_`.
#[must_use]
pub fn sanitize_stem(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_STEM.to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskStorage;
    use crate::domain::validate_file_name;
    use axum::body::Bytes;
    use image::{DynamicImage, ImageFormat};
    use rstest::rstest;
    use std::io::Cursor;
    use std::time::Duration;

    fn png_upload(name: &str) -> Upload {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(24, 16)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        Upload {
            file_name: name.to_owned(),
            content_type: "image/png".to_owned(),
            data: Bytes::from(buf.into_inner()),
        }
    }

    fn broken_upload(name: &str) -> Upload {
        Upload {
            file_name: name.to_owned(),
            content_type: "image/png".to_owned(),
            data: Bytes::from_static(b"definitely not a png"),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    #[rstest]
    #[case("cat.png", "cat")]
    #[case("holiday photo.final.jpg", "holiday_photo_final")]
    #[case("../../etc/passwd", "passwd")]
    #[case("..\\..\\windows\\win.ini", "win")]
    #[case("....", "image")]
    #[case("", "image")]
    #[case(".hidden", "hidden")]
    #[case("ünïcødé.webp", "n_c_d")]
    #[trace]
    fn stems_are_sanitized(#[case] original: &str, #[case] expected: &str) {
        // Act
        let stem = sanitize_stem(original);

        // Assert
        assert_eq!(stem, expected);
    }

    #[rstest]
    #[case("../../x.png")]
    #[case("a/b/c.jpeg")]
    #[case("..")]
    #[case("a\0b.png")]
    #[trace]
    fn batch_names_are_single_components(#[case] original: &str) {
        // Arrange
        let prefix = BatchPrefix {
            millis: 1,
            token: "abc123".to_owned(),
        };

        // Act
        let name = batch_file_name(&prefix, 0, original, OutputFormat::Png);

        // Assert
        assert!(validate_file_name(&name).is_ok(), "{name}");
        assert!(name.starts_with("batch_compressed_1_abc123_0_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn long_names_are_capped() {
        // Arrange
        let original = format!("{}.png", "a".repeat(500));

        // Act
        let stem = sanitize_stem(&original);

        // Assert
        assert_eq!(stem.len(), MAX_STEM_LEN);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_batch() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().join("temp"), "http://localhost:3000");
        let job = BatchJob {
            storage: &storage,
            retry: fast_retry(),
            limit: 10,
        };
        let uploads = vec![
            png_upload("one.png"),
            png_upload("two.png"),
            broken_upload("three.png"),
            png_upload("four.png"),
            png_upload("five.png"),
        ];
        let ctx = RequestContext::new("batch-test");

        // Act
        let summary = job
            .run(&ctx, uploads, TransformParams::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(summary.items.len(), 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.message(), "Batch compression completed: 4/5 successful");
        for (i, item) in summary.items.iter().enumerate() {
            assert_eq!(item.index, i + 1);
            assert_eq!(item.total, 5);
            if i == 2 {
                match &item.outcome {
                    BatchOutcome::Failed { error_code, .. } => assert_eq!(error_code, "PROCESSING_ERROR"),
                    other => panic!("expected failure, got {other:?}"),
                }
            } else {
                match &item.outcome {
                    BatchOutcome::Compressed { download_url, format } => {
                        assert!(download_url.starts_with("http://localhost:3000/downloads/batch_compressed_"));
                        assert_eq!(format, "jpeg");
                    }
                    other => panic!("expected success, got {other:?}"),
                }
            }
        }
        assert_eq!(summary.items[2].original_name, "three.png");
        let stored = std::fs::read_dir(dir.path().join("temp")).unwrap().count();
        assert_eq!(stored, 4);
    }

    #[tokio::test]
    async fn concurrent_batches_with_same_names_keep_every_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "http://localhost:3000");
        let job = BatchJob {
            storage: &storage,
            retry: fast_retry(),
            limit: 10,
        };
        let first_ctx = RequestContext::new("first");
        let second_ctx = RequestContext::new("second");

        // Act
        let (first, second) = tokio::join!(
            job.run(&first_ctx, vec![png_upload("a b.png")], TransformParams::default()),
            job.run(&second_ctx, vec![png_upload("a_b.png")], TransformParams::default()),
        );

        // Assert
        let url = |summary: &BatchSummary| match &summary.items[0].outcome {
            BatchOutcome::Compressed { download_url, .. } => download_url.clone(),
            other => panic!("expected success, got {other:?}"),
        };
        let first = first.unwrap();
        let second = second.unwrap();
        assert_ne!(url(&first), url(&second));
        let stored = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(stored, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "http://localhost:3000");
        let job = BatchJob {
            storage: &storage,
            retry: fast_retry(),
            limit: 10,
        };

        // Act
        let result = job
            .run(&RequestContext::new("t"), Vec::new(), TransformParams::default())
            .await;

        // Assert
        assert!(matches!(result, Err(AppError::Validation(m)) if m == "No image files provided"));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_processing() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("never-created");
        let storage = DiskStorage::new(&root, "http://localhost:3000");
        let job = BatchJob {
            storage: &storage,
            retry: fast_retry(),
            limit: 2,
        };
        let uploads = vec![png_upload("a.png"), png_upload("b.png"), png_upload("c.png")];

        // Act
        let result = job
            .run(&RequestContext::new("t"), uploads, TransformParams::default())
            .await;

        // Assert
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn invalid_shared_params_are_rejected() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "http://localhost:3000");
        let job = BatchJob {
            storage: &storage,
            retry: fast_retry(),
            limit: 10,
        };
        let params = TransformParams {
            width: Some(0),
            ..TransformParams::default()
        };

        // Act
        let result = job
            .run(&RequestContext::new("t"), vec![png_upload("a.png")], params)
            .await;

        // Assert
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
