use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use endpoint::Endpoint;
use kernel::{CleanupReply, CleanupReport, ErrorReply, FileSummary, StatsReply, StorageStats, UploadReply};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub mod endpoint;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid service uri: {0}")]
    Uri(#[from] url::ParseError),

    #[error("cannot read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{} ({}): {} [request {}]", .0.error_code, .0.status_code, .0.message, .0.request_id)]
    Service(ErrorReply),

    #[error("unexpected response status {0}")]
    Status(StatusCode),
}

/// Transform options sent along with an image.
#[derive(Debug, Default, Clone)]
pub struct CompressParams {
    pub uri: String,
    pub file: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub fit: Option<String>,
}

impl CompressParams {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("uploadToStorage", "true".to_owned())];
        if let Some(w) = self.width {
            fields.push(("width", w.to_string()));
        }
        if let Some(h) = self.height {
            fields.push(("height", h.to_string()));
        }
        if let Some(f) = &self.format {
            fields.push(("format", f.clone()));
        }
        if let Some(q) = self.quality {
            fields.push(("quality", q.to_string()));
        }
        if let Some(f) = &self.fit {
            fields.push(("fit", f.clone()));
        }
        fields
    }
}

/// Uploads `params.file`, has it stored and returns the download link.
pub async fn compress_file(params: &CompressParams) -> Result<UploadReply, ClientError> {
    let endpoint = Endpoint::new(&params.uri)?.join("compress");
    let path = PathBuf::from(&params.file);
    let file_error = |source| ClientError::File {
        path: path.clone(),
        source,
    };

    let f = File::open(&path).await.map_err(file_error)?;
    let len = f.metadata().await.map_err(file_error)?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::new(f));
    let part = Part::stream_with_length(body, len)
        .file_name(file_name(&path))
        .mime_str(guess_mime(&path))?;

    let form = params
        .fields()
        .into_iter()
        .fold(Form::new().part("image", part), |form, (k, v)| form.text(k, v));

    let response = Client::new()
        .post(endpoint.as_str())
        .multipart(form)
        .send()
        .await?;
    decode(response).await
}

pub async fn storage_stats(uri: &str) -> Result<StorageStats, ClientError> {
    let endpoint = Endpoint::new(uri)?.join("admin/stats");
    let response = Client::new().get(endpoint.as_str()).send().await?;
    let reply: StatsReply = decode(response).await?;
    Ok(reply.data)
}

pub async fn cleanup(uri: &str, retention_hours: Option<u64>) -> Result<CleanupReport, ClientError> {
    let mut endpoint = Endpoint::new(uri)?.join("admin/cleanup");
    if let Some(hours) = retention_hours {
        endpoint = endpoint.query("retention", &hours.to_string());
    }
    let response = Client::new().delete(endpoint.as_str()).send().await?;
    let reply: CleanupReply = decode(response).await?;
    Ok(reply.data)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    match response.json::<ErrorReply>().await {
        Ok(reply) => Err(ClientError::Service(reply)),
        Err(_) => Err(ClientError::Status(status)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

fn describe(file: Option<&FileSummary>) -> String {
    file.map_or_else(
        || "-".to_owned(),
        |f| format!("{} ({} bytes, {})", f.name, f.size, f.mtime.to_rfc3339()),
    )
}

#[must_use]
pub fn stats_table(stats: &StorageStats) -> Table {
    let mut table = new_table(&["Metric", "Value"]);
    table
        .add_row(vec![Cell::new("Files"), Cell::new(stats.total_files)])
        .add_row(vec![Cell::new("Total size (bytes)"), Cell::new(stats.total_size)])
        .add_row(vec![Cell::new("Oldest file"), Cell::new(describe(stats.oldest_file.as_ref()))])
        .add_row(vec![Cell::new("Newest file"), Cell::new(describe(stats.newest_file.as_ref()))]);
    table
}

#[must_use]
pub fn cleanup_table(report: &CleanupReport) -> Table {
    let mut table = new_table(&["Metric", "Value"]);
    table
        .add_row(vec![Cell::new("Files seen"), Cell::new(report.sweep.total_files)])
        .add_row(vec![Cell::new("Deleted"), Cell::new(report.sweep.deleted_files)])
        .add_row(vec![Cell::new("Errors"), Cell::new(report.sweep.errors)])
        .add_row(vec![Cell::new("Freed (bytes)"), Cell::new(report.sweep.freed_space)])
        .add_row(vec![Cell::new("Files left"), Cell::new(report.storage_stats.total_files)]);
    table
}
