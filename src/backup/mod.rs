mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod object_store;
pub(crate) mod retention;
pub(crate) mod s3_upload;

#[cfg(test)]
pub(crate) mod testing;

use std::io::ErrorKind;
use tempfile::TempPath;
use tracing::{debug, error, warn};

use crate::config::{EnvSource, RunConfig};
use crate::errors::Result;
use db_dump::PgDump;
use s3_upload::S3Store;

pub use logic::{BackupReport, perform_backup};

/// Removes a local artifact now instead of waiting for the guard to drop,
/// logging anything other than an already-missing file.
pub(crate) fn discard(path: TempPath) {
    let shown = path.display().to_string();
    match path.close() {
        Ok(()) => debug!("Removed local file {}", shown),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove local file {}: {}", shown, e),
    }
}

/// Resolves the configuration from `env` and runs the backup against the
/// real `pg_dump` and bucket.
pub async fn run_backup_flow(env: &dyn EnvSource) -> Result<BackupReport> {
    let config = RunConfig::resolve(env)?;
    debug!(
        "Resolved configuration: format {}, keeping {} backup(s), daily at {} UTC",
        config.dump_format.pg_dump_flag(),
        config.max_backups,
        config.backup_time
    );
    let store = S3Store::new(config.storage.clone());
    perform_backup(&config, &PgDump::default(), &store).await
}

/// Runs one backup and logs its failure instead of returning it. This is the
/// boundary the scheduler calls, so nothing escapes to the loop.
pub async fn run_backup_logged(env: &dyn EnvSource) -> bool {
    match run_backup_flow(env).await {
        Ok(report) => {
            debug!(
                "Run finished: {} ({} bytes), {} old backup(s) pruned",
                report.remote_key,
                report.size_bytes,
                report.deleted.len()
            );
            true
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}
