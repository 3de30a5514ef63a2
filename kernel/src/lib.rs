#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Link to a compressed image kept in temporary storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    /// Absolute URL the file can be fetched from until it is swept
    pub download_url: String,
}

/// Reply of a single compression that was uploaded to storage.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadReply {
    pub success: bool,
    pub message: String,
    pub data: DownloadLink,
}

/// Outcome of one file inside a batch.
///
/// Serialized flat into the owning [`BatchItem`], so a success carries
/// `downloadUrl` + `format` and a failure carries `error` + `errorCode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BatchOutcome {
    #[serde(rename_all = "camelCase")]
    Compressed { download_url: String, format: String },
    #[serde(rename_all = "camelCase")]
    Failed { error: String, error_code: String },
}

/// Result for one file of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// File name as sent by the client
    pub original_name: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    /// 1-based position of the file in the request
    pub index: usize,
    /// Number of files in the request
    pub total: usize,
}

impl BatchItem {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Compressed { .. })
    }
}

/// Reply of a batch compression.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchReply {
    pub success: bool,
    pub message: String,
    pub data: Vec<BatchItem>,
    pub request_id: String,
}

/// Counters produced by a single retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    /// Entries seen in the directory
    pub total_files: usize,
    /// Entries removed because they outlived the retention window
    pub deleted_files: usize,
    /// Entries that could not be inspected or removed
    pub errors: usize,
    /// Sum of the sizes of removed entries in bytes
    pub freed_space: u64,
}

/// Short description of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileSummary {
    pub name: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

/// Read-only snapshot of the temporary storage.
///
/// Used for monitoring, so computing it never changes the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: usize,
    /// Total size of all stored files in bytes
    pub total_size: u64,
    pub oldest_file: Option<FileSummary>,
    pub newest_file: Option<FileSummary>,
}

/// Sweep counters together with the storage state after the sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    #[serde(flatten)]
    pub sweep: SweepStats,
    pub storage_stats: StorageStats,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupReply {
    pub success: bool,
    pub message: String,
    pub data: CleanupReport,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsReply {
    pub success: bool,
    pub data: StorageStats,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub success: bool,
    pub message: String,
    /// Stable machine readable code like `VALIDATION_ERROR`
    pub error_code: String,
    pub request_id: String,
    pub status_code: u16,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_item_success_is_flat() {
        // Arrange
        let item = BatchItem {
            original_name: "cat.png".to_owned(),
            outcome: BatchOutcome::Compressed {
                download_url: "http://localhost:3000/downloads/x.webp".to_owned(),
                format: "webp".to_owned(),
            },
            index: 1,
            total: 2,
        };

        // Act
        let json = serde_json::to_value(&item).unwrap();

        // Assert
        assert_eq!(json["originalName"], "cat.png");
        assert_eq!(json["downloadUrl"], "http://localhost:3000/downloads/x.webp");
        assert_eq!(json["format"], "webp");
        assert_eq!(json["index"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn batch_item_failure_is_flat() {
        // Arrange
        let json = r#"{"originalName":"a.jpg","error":"broken","errorCode":"PROCESSING_ERROR","index":3,"total":5}"#;

        // Act
        let item: BatchItem = serde_json::from_str(json).unwrap();

        // Assert
        assert!(!item.is_success());
        assert_eq!(
            item.outcome,
            BatchOutcome::Failed {
                error: "broken".to_owned(),
                error_code: "PROCESSING_ERROR".to_owned()
            }
        );
    }

    #[test]
    fn cleanup_report_flattens_sweep() {
        // Arrange
        let report = CleanupReport {
            sweep: SweepStats {
                total_files: 3,
                deleted_files: 2,
                errors: 0,
                freed_space: 10,
            },
            storage_stats: StorageStats::default(),
        };

        // Act
        let json = serde_json::to_value(&report).unwrap();

        // Assert
        assert_eq!(json["deletedFiles"], 2);
        assert_eq!(json["freedSpace"], 10);
        assert_eq!(json["storageStats"]["totalFiles"], 0);
        assert!(json["storageStats"]["oldestFile"].is_null());
    }
}
