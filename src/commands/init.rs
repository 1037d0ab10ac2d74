// pg-r2-backup/src/commands/init.rs
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, warn};

use crate::success;

pub const TEMPLATE_FILE: &str = ".env.example";
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
    TemplateMissing,
}

impl InitOutcome {
    pub fn is_failure(self) -> bool {
        self == InitOutcome::TemplateMissing
    }
}

/// Copies `.env.example` to `.env` inside `dir`. An existing `.env` is
/// never overwritten.
pub fn execute(dir: &Path) -> Result<InitOutcome> {
    let env_file = dir.join(ENV_FILE);
    let template = dir.join(TEMPLATE_FILE);

    if env_file.exists() {
        warn!("{} already exists, leaving it untouched", env_file.display());
        return Ok(InitOutcome::AlreadyExists);
    }
    if !template.is_file() {
        error!("{} not found in {}", TEMPLATE_FILE, dir.display());
        return Ok(InitOutcome::TemplateMissing);
    }

    std::fs::copy(&template, &env_file).with_context(|| {
        format!("Failed to copy {} to {}", template.display(), env_file.display())
    })?;
    success!("Created {} from {}", ENV_FILE, TEMPLATE_FILE);
    println!("Edit the file before running backups.");
    Ok(InitOutcome::Created)
}
