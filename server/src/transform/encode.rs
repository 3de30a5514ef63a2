use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;

use super::params::OutputFormat;
use crate::error::TransformError;

// 1 is slowest, 10 fastest
const AVIF_SPEED: u8 = 8;

/// Encodes `img` into `format`.
///
/// Quality only affects the lossy encoders, png and the pure-Rust webp
/// encoder are lossless.
pub fn encode_image(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();

    let result = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        OutputFormat::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
    };
    result.map_err(|e| TransformError::encode(format, e))?;

    Ok(buf)
}
