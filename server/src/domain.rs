use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::StorageError;

/// A file written by the storage writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Destination of persisted compression results.
///
/// Writers only ever create new, uniquely named entries. Deleting is left to
/// the retention sweeper.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Creates the backing location when it does not exist yet.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Stores `data` as a new entry. An existing `name` is never replaced.
    async fn save(&self, name: &str, data: &[u8]) -> Result<StoredFile, StorageError>;

    /// Public URL clients download `name` from.
    fn download_url(&self, name: &str) -> String;

    /// Directory the sweeper and the download route operate on.
    fn root(&self) -> &Path;
}

/// Checks that `name` is one plain path component.
pub fn validate_file_name(name: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidName(name.to_owned());
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("compressed_1_ab.jpeg", true)]
    #[case("batch_compressed_1_0_cat.webp", true)]
    #[case("", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("../etc/passwd", false)]
    #[case("dir/file.png", false)]
    #[case("dir\\file.png", false)]
    #[case("/abs.png", false)]
    #[trace]
    fn file_name_validation(#[case] name: &str, #[case] valid: bool) {
        // Act
        let result = validate_file_name(name);

        // Assert
        assert_eq!(result.is_ok(), valid);
    }
}
