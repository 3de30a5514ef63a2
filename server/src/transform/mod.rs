//! Decode → resize → re-encode of a single image buffer.

pub mod encode;
pub mod params;
pub mod resize;

use axum::body::Bytes;

pub use encode::encode_image;
pub use params::{FitMode, OutputFormat, RawParams, TransformParams};
pub use resize::ResizePlan;

use crate::error::TransformError;

/// A re-encoded image owned by the caller.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Synchronous transform, the caller decides which thread it runs on.
pub fn compress_blocking(
    data: &[u8],
    params: &TransformParams,
) -> Result<CompressedImage, TransformError> {
    params.validate()?;

    let img = image::load_from_memory(data).map_err(TransformError::decode)?;
    let plan = resize::plan(img.width(), img.height(), params.width, params.height, params.fit);
    let img = resize::apply(img, plan);
    let encoded = encode_image(&img, params.format, params.quality)?;

    Ok(CompressedImage {
        data: encoded,
        format: params.format,
        width: img.width(),
        height: img.height(),
    })
}

/// Runs [`compress_blocking`] on the blocking pool.
///
/// Parameters are validated before anything is scheduled.
pub async fn compress(data: Bytes, params: TransformParams) -> Result<CompressedImage, TransformError> {
    params.validate()?;
    tokio::task::spawn_blocking(move || compress_blocking(&data, &params))
        .await
        .map_err(|e| TransformError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, ImageFormat};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn resizes_and_reencodes() {
        // Arrange
        let params = TransformParams {
            width: Some(20),
            format: OutputFormat::Webp,
            ..TransformParams::default()
        };

        // Act
        let out = compress(Bytes::from(png(40, 30)), params).await.unwrap();

        // Assert
        assert_eq!((out.width, out.height), (20, 15));
        assert_eq!(out.content_type(), "image/webp");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!(decoded.dimensions(), (20, 15));
    }

    #[tokio::test]
    async fn never_upscales() {
        // Arrange
        let params = TransformParams {
            width: Some(400),
            height: Some(300),
            format: OutputFormat::Png,
            ..TransformParams::default()
        };

        // Act
        let out = compress(Bytes::from(png(40, 30)), params).await.unwrap();

        // Assert
        assert_eq!((out.width, out.height), (40, 30));
    }

    #[tokio::test]
    async fn invalid_params_fail_before_decoding() {
        // Arrange
        let params = TransformParams {
            quality: 0,
            ..TransformParams::default()
        };

        // Act
        let result = compress(Bytes::from_static(b"not an image"), params).await;

        // Assert
        assert!(matches!(result, Err(TransformError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn garbage_is_a_decode_error() {
        // Act
        let result = compress(Bytes::from_static(b"not an image"), TransformParams::default()).await;

        // Assert
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }
}
