use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::errors::Result;

/// One entry from a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// The three object-store calls a backup run needs.
///
/// Implementations report upload problems as `UploadFailed` and listing or
/// deletion problems as `RetentionFailed`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, local: &Path, key: &str) -> Result<()>;

    /// Every object under `prefix`, across all listing pages.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
