pub mod logging;
pub mod setting;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

pub const PG_DUMP: &str = "pg_dump";

/// Finds an executable in the system PATH.
pub fn find_executable(program: &str) -> Result<PathBuf> {
    which(program).with_context(|| {
        format!(
            "{} not found in PATH. Install postgresql-client.",
            program
        )
    })
}
