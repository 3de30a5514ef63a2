use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use utoipa::{
    openapi::{self, content, schema::Type, ObjectBuilder, RefOr, ResponseBuilder, Schema},
    ToResponse,
};

use crate::transform::CompressedImage;

/// Compressed image streamed back in the response body.
pub struct ImageReply {
    image: CompressedImage,
    attachment: bool,
}

impl ImageReply {
    #[must_use]
    pub fn new(image: CompressedImage, attachment: bool) -> Self {
        Self { image, attachment }
    }

    fn file_name(&self) -> String {
        format!("compressed.{}", self.image.format)
    }
}

impl IntoResponse for ImageReply {
    fn into_response(self) -> Response {
        let content_type = self.image.content_type();
        let disposition = self
            .attachment
            .then(|| format!(r#"attachment; filename="{}""#, self.file_name()));
        let len = self.image.data.len();

        let mut res = Body::from(self.image.data).into_response();
        let headers = res.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(val) = disposition.and_then(|d| HeaderValue::from_str(&d).ok()) {
            headers.insert(header::CONTENT_DISPOSITION, val);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));

        res
    }
}

impl ToResponse<'static> for ImageReply {
    fn response() -> (&'static str, RefOr<openapi::Response>) {
        let object = ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(openapi::SchemaFormat::KnownFormat(
                openapi::KnownFormat::Binary,
            )))
            .build();
        let content = content::Content::new(Some(Schema::Object(object)));
        (
            "ImageReply",
            ResponseBuilder::new()
                .description("Compressed image binary content")
                .content("image/jpeg", content.clone())
                .content("image/png", content.clone())
                .content("image/webp", content.clone())
                .content("image/avif", content)
                .build()
                .into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::OutputFormat;
    use rstest::rstest;

    fn image(format: OutputFormat) -> CompressedImage {
        CompressedImage {
            data: vec![1, 2, 3, 4, 5],
            format,
            width: 1,
            height: 1,
        }
    }

    #[rstest]
    #[case(OutputFormat::Jpeg, "image/jpeg")]
    #[case(OutputFormat::Png, "image/png")]
    #[case(OutputFormat::Webp, "image/webp")]
    #[case(OutputFormat::Avif, "image/avif")]
    #[trace]
    fn inline_reply_headers(#[case] format: OutputFormat, #[case] expected: &str) {
        // Arrange
        let reply = ImageReply::new(image(format), false);

        // Act
        let res = reply.into_response();

        // Assert
        assert_eq!(res.headers()[header::CONTENT_TYPE], expected);
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "5");
        assert!(res.headers().get(header::CONTENT_DISPOSITION).is_none());
    }

    #[test]
    fn attachment_reply_names_file_by_format() {
        // Arrange
        let reply = ImageReply::new(image(OutputFormat::Webp), true);

        // Act
        let res = reply.into_response();

        // Assert
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION],
            r#"attachment; filename="compressed.webp""#
        );
    }
}
