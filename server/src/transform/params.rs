use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use image::ImageFormat;

use crate::error::TransformError;

pub const DEFAULT_QUALITY: u8 = 80;

/// Encodings the service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Jpeg, Self::Png, Self::Webp, Self::Avif];

    /// Name used on the wire and as file extension.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    #[must_use]
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
            Self::Avif => ImageFormat::Avif,
        }
    }

    /// Picks the requested format when it is known and allowed, jpeg otherwise.
    #[must_use]
    pub fn negotiate(requested: Option<&str>, allowed: &[OutputFormat]) -> Self {
        requested
            .and_then(|s| s.parse::<OutputFormat>().ok())
            .filter(|f| allowed.contains(f))
            .unwrap_or(Self::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            other => Err(TransformError::InvalidParams(format!(
                "Unsupported output format: {other}"
            ))),
        }
    }
}

/// How the source aspect ratio maps onto a width × height box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Fill the box and crop the overflow
    #[default]
    Cover,
    /// Fit inside the box and letterbox to its size
    Contain,
    /// Stretch to the box
    Fill,
    /// Fit inside the box without padding
    Inside,
    /// Cover the box without cropping
    Outside,
}

impl FromStr for FitMode {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            other => Err(TransformError::InvalidParams(format!(
                "Fit must be one of cover, contain, fill, inside, outside; got {other}"
            ))),
        }
    }
}

/// Transform parameters exactly as they arrived in the form.
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub width: Option<String>,
    pub height: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub fit: Option<String>,
}

impl RawParams {
    /// Collects the known text fields, blank values count as absent.
    #[must_use]
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        Self {
            width: get("width"),
            height: get("height"),
            format: get("format"),
            quality: get("quality"),
            fit: get("fit"),
        }
    }
}

/// Validated transform parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: OutputFormat,
    pub quality: u8,
    pub fit: FitMode,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            fit: FitMode::Cover,
        }
    }
}

impl TransformParams {
    /// Parses form values. Unknown or disallowed formats become jpeg.
    pub fn parse(raw: &RawParams, allowed: &[OutputFormat]) -> Result<Self, TransformError> {
        let width = parse_dimension(raw.width.as_deref(), "Width")?;
        let height = parse_dimension(raw.height.as_deref(), "Height")?;
        let quality = match raw.quality.as_deref() {
            None => DEFAULT_QUALITY,
            Some(q) => q
                .parse::<i64>()
                .ok()
                .and_then(|q| u8::try_from(q).ok())
                .ok_or_else(quality_error)?,
        };
        let fit = raw
            .fit
            .as_deref()
            .map_or(Ok(FitMode::default()), FitMode::from_str)?;

        let params = Self {
            width,
            height,
            format: OutputFormat::negotiate(raw.format.as_deref(), allowed),
            quality,
            fit,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        if self.width == Some(0) {
            return Err(dimension_error("Width"));
        }
        if self.height == Some(0) {
            return Err(dimension_error("Height"));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(quality_error());
        }
        Ok(())
    }
}

fn parse_dimension(value: Option<&str>, name: &str) -> Result<Option<u32>, TransformError> {
    match value {
        None => Ok(None),
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(dimension_error(name)),
        },
    }
}

fn dimension_error(name: &str) -> TransformError {
    TransformError::InvalidParams(format!("{name} must be a positive number"))
}

fn quality_error() -> TransformError {
    TransformError::InvalidParams("Quality must be between 1 and 100".to_owned())
}
