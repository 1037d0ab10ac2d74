// pg-r2-backup/src/commands/config_show.rs
use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{
    DumpFormat, EnvSource, ScheduleTime, StorageConfig, flag, lookup, mask, resolve_backup_prefix,
    resolve_backup_time, resolve_dump_format, resolve_filename_prefix, resolve_max_backups,
};

const UNSET: &str = "(not set)";

/// Effective configuration with credentials masked. Connection strings are
/// never included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ConfigSummary {
    pub use_public_url: bool,
    pub dump_format: DumpFormat,
    pub filename_prefix: String,
    pub backup_prefix: String,
    pub max_backups: usize,
    pub backup_time: ScheduleTime,
    pub backup_password: &'static str,
    pub r2_bucket_name: Option<String>,
    pub r2_endpoint: Option<String>,
    pub r2_region: String,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<String>,
}

impl ConfigSummary {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let storage = StorageConfig::from_env(env);
        ConfigSummary {
            use_public_url: flag(env, "USE_PUBLIC_URL"),
            dump_format: resolve_dump_format(env),
            filename_prefix: resolve_filename_prefix(env),
            backup_prefix: resolve_backup_prefix(env),
            max_backups: resolve_max_backups(lookup(env, "MAX_BACKUPS").as_deref()).value,
            backup_time: resolve_backup_time(lookup(env, "BACKUP_TIME").as_deref()).value,
            backup_password: if lookup(env, "BACKUP_PASSWORD").is_some() {
                "set"
            } else {
                "not set"
            },
            r2_access_key: storage.access_key.as_ref().map(|key| mask(key.expose())),
            r2_secret_key: storage.secret_key.as_ref().map(|key| mask(key.expose())),
            r2_bucket_name: storage.bucket_name,
            r2_endpoint: storage.endpoint_url,
            r2_region: storage.region,
        }
    }

    /// Name/value pairs in display order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let or_unset = |value: &Option<String>| value.clone().unwrap_or_else(|| UNSET.to_string());
        vec![
            ("USE_PUBLIC_URL", self.use_public_url.to_string()),
            ("DUMP_FORMAT", self.dump_format.pg_dump_flag().to_string()),
            ("FILENAME_PREFIX", self.filename_prefix.clone()),
            ("BACKUP_PREFIX", self.backup_prefix.clone()),
            ("MAX_BACKUPS", self.max_backups.to_string()),
            ("BACKUP_TIME", format!("{} UTC", self.backup_time)),
            ("BACKUP_PASSWORD", self.backup_password.to_string()),
            ("R2_BUCKET_NAME", or_unset(&self.r2_bucket_name)),
            ("R2_ENDPOINT", or_unset(&self.r2_endpoint)),
            ("R2_REGION", self.r2_region.clone()),
            ("R2_ACCESS_KEY", or_unset(&self.r2_access_key)),
            ("R2_SECRET_KEY", or_unset(&self.r2_secret_key)),
        ]
    }
}

pub fn execute(env: &dyn EnvSource, json: bool) -> Result<()> {
    let summary = ConfigSummary::from_env(env);
    if json {
        let rendered =
            serde_json::to_string_pretty(&summary).context("Failed to serialize configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("pg-r2-backup configuration\n");
    for (name, value) in summary.rows() {
        println!("{:<16} : {}", name, value);
    }
    Ok(())
}
