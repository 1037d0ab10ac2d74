// pg-r2-backup/src/backup/db_dump.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DumpFormat;
use crate::errors::{BackupError, Result};
use crate::utils::{PG_DUMP, find_executable};

/// Produces one uncompressed snapshot of a database.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Checks the dump binary is installed. Called before any file is
    /// created.
    fn locate(&self) -> Result<PathBuf>;

    /// Writes a snapshot of `database_url` in `format` to `output`.
    async fn dump(&self, database_url: &str, format: DumpFormat, output: &Path) -> Result<()>;
}

/// Runs `pg_dump` from the PATH.
#[derive(Debug, Clone)]
pub struct PgDump {
    program: String,
}

impl PgDump {
    pub fn with_program(program: impl Into<String>) -> Self {
        PgDump {
            program: program.into(),
        }
    }
}

impl Default for PgDump {
    fn default() -> Self {
        PgDump::with_program(PG_DUMP)
    }
}

#[async_trait]
impl DumpTool for PgDump {
    fn locate(&self) -> Result<PathBuf> {
        find_executable(&self.program).map_err(|e| BackupError::DumpFailed(BackupError::chain(&e)))
    }

    async fn dump(&self, database_url: &str, format: DumpFormat, output: &Path) -> Result<()> {
        let program = self.locate()?;
        debug!("Found {} executable at: {}", self.program, program.display());
        info!("Running {} with format {}", self.program, format.pg_dump_flag());

        let result = Command::new(&program)
            .arg(format!("--dbname={}", database_url))
            .arg("-F")
            .arg(format.pg_dump_flag())
            .arg("-f")
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BackupError::DumpFailed(format!("Failed to execute {}: {}", self.program, e))
            })?;

        if !result.status.success() {
            return Err(BackupError::DumpFailed(format!(
                "{} exited with {}\nStderr: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}
