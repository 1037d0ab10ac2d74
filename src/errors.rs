use thiserror::Error;

/// Failure of a single backup run, tagged with the stage that failed.
///
/// Each variant carries the rendered cause chain of the underlying error so
/// the run boundary can log it without holding on to SDK error types.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backup creation failed: {0}")]
    DumpFailed(String),

    #[error("Compression/encryption failed: {0}")]
    PackagingFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Retention pruning failed: {0}")]
    RetentionFailed(String),
}

impl BackupError {
    /// Renders an `anyhow` chain as `outer: inner: root` for the stage error.
    pub fn chain(err: &anyhow::Error) -> String {
        format!("{:#}", err)
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn chain_includes_every_context_layer() {
        let err = std::fs::read("/definitely/not/here")
            .context("Failed to open snapshot")
            .unwrap_err();

        let rendered = BackupError::chain(&err);

        assert!(rendered.starts_with("Failed to open snapshot: "));
        assert!(rendered.len() > "Failed to open snapshot: ".len());
    }

    #[test]
    fn display_names_the_stage() {
        let err = BackupError::UploadFailed("bucket missing".to_string());
        assert_eq!(err.to_string(), "Upload failed: bucket missing");
    }
}
