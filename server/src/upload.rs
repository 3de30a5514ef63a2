use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::AppError;

/// One uploaded image held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Files and text fields of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<Upload>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// `"true"` text fields switch flags on, anything else leaves them off.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| v.trim() == "true")
    }
}

/// Limits applied while the form is read.
#[derive(Debug, Clone, Copy)]
pub struct UploadRules<'a> {
    /// Name of the only field allowed to carry files
    pub field: &'a str,
    pub max_files: usize,
    pub max_file_size: usize,
    pub allowed_mimes: &'a [String],
}

/// Reads the whole form, rejecting files as soon as they break a rule.
pub async fn read_form(multipart: &mut Multipart, rules: UploadRules<'_>) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
            continue;
        };

        if name != rules.field {
            return Err(AppError::Validation(format!("Unexpected field {name}")));
        }
        if form.files.len() >= rules.max_files {
            return Err(too_many_files(rules.max_files));
        }

        let content_type = field
            .content_type()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !rules.allowed_mimes.iter().any(|m| *m == content_type) {
            return Err(AppError::Validation(format!(
                "Invalid file type {content_type:?}. Allowed types: {}",
                rules.allowed_mimes.join(", ")
            )));
        }

        let data = read_field(field, rules.max_file_size).await?;
        tracing::debug!(file = %file_name, size = data.len(), "upload received");
        form.files.push(Upload {
            file_name,
            content_type,
            data,
        });
    }

    Ok(form)
}

fn too_many_files(max: usize) -> AppError {
    if max == 1 {
        AppError::Validation("Only one image can be compressed per request".to_owned())
    } else {
        AppError::Validation(format!(
            "Too many files. Maximum {max} files allowed per batch"
        ))
    }
}

async fn read_field(mut field: Field<'_>, limit: usize) -> Result<Bytes, AppError> {
    let mut buffer = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buffer.len() + chunk.len() > limit {
            return Err(file_too_large(limit));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

fn file_too_large(limit: usize) -> AppError {
    AppError::FileTooLarge(format!("File too large. Maximum size is {limit} bytes"))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge(format!("Request body too large: {}", e.body_text()))
    } else {
        AppError::Validation(format!("Malformed multipart form: {}", e.body_text()))
    }
}
