use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;
use tower_http::request_id::RequestId;

use crate::error::{ApiError, AppError};

const UNKNOWN_REQUEST: &str = "unknown";

/// Per-request values handed explicitly to everything a handler calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Reads the id set by the request id layer.
    #[must_use]
    pub fn from_extensions(extensions: &Extensions) -> Self {
        let id = extensions
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or(UNKNOWN_REQUEST);
        Self::new(id)
    }

    /// Binds `error` to this request.
    pub fn fail(&self, error: impl Into<AppError>) -> ApiError {
        ApiError::new(self.request_id.clone(), error)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}
