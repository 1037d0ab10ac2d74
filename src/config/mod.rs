// pg-r2-backup/src/config/mod.rs
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::warn;

use crate::errors::{BackupError, Result};

pub const DEFAULT_BACKUP_TIME: ScheduleTime = ScheduleTime { hour: 0, minute: 0 };
pub const DEFAULT_MAX_BACKUPS: usize = 7;
pub const DEFAULT_FILENAME_PREFIX: &str = "backup";
pub const DEFAULT_REGION: &str = "auto";

static BACKUP_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}):(\d{2})$").expect("BACKUP_TIME pattern compiles"));

/// Where named settings come from. The binary reads the process environment;
/// tests hand in a map.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment, after `.env` has been loaded into it.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Reads a setting, treating blank values the same as unset ones.
pub fn lookup(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|value| !value.trim().is_empty())
}

/// Case-insensitive `true`; anything else, including unset, is false.
pub fn flag(env: &dyn EnvSource, key: &str) -> bool {
    lookup(env, key).is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

/// A value that must never show up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Output format handed to `pg_dump -F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    Plain,
    Custom,
    Tar,
}

impl DumpFormat {
    /// Maps a `DUMP_FORMAT` value to a format. Unknown values fall back to
    /// the custom format without complaint.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sql" | "plain" => DumpFormat::Plain,
            "tar" => DumpFormat::Tar,
            _ => DumpFormat::Custom,
        }
    }

    pub fn pg_dump_flag(self) -> &'static str {
        match self {
            DumpFormat::Plain => "plain",
            DumpFormat::Custom => "custom",
            DumpFormat::Tar => "tar",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DumpFormat::Plain => "sql",
            DumpFormat::Custom => "dump",
            DumpFormat::Tar => "tar",
        }
    }
}

/// Wall-clock time of day (UTC) for the daily run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    hour: u32,
    minute: u32,
}

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(ScheduleTime { hour, minute })
    }

    /// Parses a strict `HH:MM` string.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let captures = BACKUP_TIME_PATTERN
            .captures(raw)
            .ok_or_else(|| format!("'{}' is not in HH:MM form", raw))?;
        let hour: u32 = captures[1]
            .parse()
            .map_err(|_| format!("'{}' has a non-numeric hour", raw))?;
        let minute: u32 = captures[2]
            .parse()
            .map_err(|_| format!("'{}' has a non-numeric minute", raw))?;
        ScheduleTime::new(hour, minute).ok_or_else(|| format!("'{}' is out of range", raw))
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    pub fn minute(self) -> u32 {
        self.minute
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of validating a setting that falls back to a default instead of
/// failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Resolved<T> {
    fn clean(value: T) -> Self {
        Resolved { value, warning: None }
    }

    /// Emits the warning, if any, and hands back the value.
    pub fn into_logged(self) -> T {
        if let Some(warning) = &self.warning {
            warn!("{}", warning);
        }
        self.value
    }
}

pub fn resolve_backup_time(raw: Option<&str>) -> Resolved<ScheduleTime> {
    let Some(raw) = raw else {
        return Resolved::clean(DEFAULT_BACKUP_TIME);
    };
    match ScheduleTime::parse(raw.trim()) {
        Ok(time) => Resolved::clean(time),
        Err(reason) => Resolved {
            value: DEFAULT_BACKUP_TIME,
            warning: Some(format!(
                "Invalid BACKUP_TIME format ({}). Using default: {}",
                reason, DEFAULT_BACKUP_TIME
            )),
        },
    }
}

/// `0` is rejected along with non-numbers: a retention count of zero would
/// delete every backup, including the one just uploaded.
pub fn resolve_max_backups(raw: Option<&str>) -> Resolved<usize> {
    let Some(raw) = raw else {
        return Resolved::clean(DEFAULT_MAX_BACKUPS);
    };
    match raw.trim().parse::<usize>() {
        Ok(count) if count >= 1 => Resolved::clean(count),
        _ => Resolved {
            value: DEFAULT_MAX_BACKUPS,
            warning: Some(format!(
                "Invalid MAX_BACKUPS value '{}'. Using default: {}",
                raw, DEFAULT_MAX_BACKUPS
            )),
        },
    }
}

/// `DUMP_FORMAT`, defaulting to the custom format.
pub fn resolve_dump_format(env: &dyn EnvSource) -> DumpFormat {
    lookup(env, "DUMP_FORMAT")
        .map(|raw| DumpFormat::parse_lenient(&raw))
        .unwrap_or(DumpFormat::Custom)
}

pub fn resolve_filename_prefix(env: &dyn EnvSource) -> String {
    lookup(env, "FILENAME_PREFIX").unwrap_or_else(|| DEFAULT_FILENAME_PREFIX.to_string())
}

/// `BACKUP_PREFIX` is taken as-is; an empty prefix means the bucket root.
pub fn resolve_backup_prefix(env: &dyn EnvSource) -> String {
    env.var("BACKUP_PREFIX").unwrap_or_default()
}

/// Object store settings as found in the environment. Nothing here is
/// required until an upload is attempted.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub access_key: Option<Secret>,
    pub secret_key: Option<Secret>,
    pub bucket_name: Option<String>,
    pub endpoint_url: Option<String>,
    pub region: String,
}

/// Complete object store settings, ready for building a client.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub access_key: Secret,
    pub secret_key: Secret,
    pub bucket_name: String,
    pub endpoint_url: String,
    pub region: String,
}

impl StorageConfig {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        StorageConfig {
            access_key: lookup(env, "R2_ACCESS_KEY").map(Secret::new),
            secret_key: lookup(env, "R2_SECRET_KEY").map(Secret::new),
            bucket_name: lookup(env, "R2_BUCKET_NAME"),
            endpoint_url: lookup(env, "R2_ENDPOINT"),
            region: lookup(env, "R2_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }

    /// Returns the full credential set, or a message naming every missing
    /// variable.
    pub fn credentials(&self) -> std::result::Result<StorageCredentials, String> {
        if let (Some(access_key), Some(secret_key), Some(bucket), Some(endpoint)) = (
            self.access_key.as_ref(),
            self.secret_key.as_ref(),
            self.bucket_name.as_ref(),
            self.endpoint_url.as_ref(),
        ) {
            return Ok(StorageCredentials {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                bucket_name: bucket.clone(),
                endpoint_url: endpoint.clone(),
                region: self.region.clone(),
            });
        }

        let missing: Vec<&str> = [
            ("R2_ACCESS_KEY", self.access_key.is_none()),
            ("R2_SECRET_KEY", self.secret_key.is_none()),
            ("R2_BUCKET_NAME", self.bucket_name.is_none()),
            ("R2_ENDPOINT", self.endpoint_url.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        Err(format!(
            "object storage is not configured, missing: {}",
            missing.join(", ")
        ))
    }
}

/// Settings for one backup run. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub database_url: Secret,
    pub use_public_url: bool,
    pub dump_format: DumpFormat,
    pub filename_prefix: String,
    pub backup_prefix: String,
    pub max_backups: usize,
    pub password: Option<Secret>,
    pub backup_time: ScheduleTime,
    pub storage: StorageConfig,
    pub work_dir: PathBuf,
}

impl RunConfig {
    /// Resolves the run settings. The only hard failure is a missing
    /// connection string; invalid optional values are logged and defaulted.
    pub fn resolve(env: &dyn EnvSource) -> Result<Self> {
        let use_public_url = flag(env, "USE_PUBLIC_URL");
        let database_url = select_database_url(env, use_public_url)?;

        Ok(RunConfig {
            database_url,
            use_public_url,
            dump_format: resolve_dump_format(env),
            filename_prefix: resolve_filename_prefix(env),
            backup_prefix: resolve_backup_prefix(env),
            max_backups: resolve_max_backups(lookup(env, "MAX_BACKUPS").as_deref()).into_logged(),
            password: lookup(env, "BACKUP_PASSWORD").map(Secret::new),
            backup_time: resolve_backup_time(lookup(env, "BACKUP_TIME").as_deref()).into_logged(),
            storage: StorageConfig::from_env(env),
            work_dir: lookup(env, "BACKUP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    pub fn url_mode(&self) -> &'static str {
        if self.use_public_url { "public" } else { "private" }
    }
}

/// Picks `DATABASE_PUBLIC_URL` when `use_public_url` is set, `DATABASE_URL`
/// otherwise.
pub fn select_database_url(env: &dyn EnvSource, use_public_url: bool) -> Result<Secret> {
    if use_public_url {
        return lookup(env, "DATABASE_PUBLIC_URL")
            .map(Secret::new)
            .ok_or_else(|| {
                BackupError::Configuration(
                    "DATABASE_PUBLIC_URL not set but USE_PUBLIC_URL=true!".to_string(),
                )
            });
    }
    lookup(env, "DATABASE_URL")
        .map(Secret::new)
        .ok_or_else(|| BackupError::Configuration("DATABASE_URL not set!".to_string()))
}

/// Keeps the first four characters of a credential and stars out the rest.
pub fn mask(value: &str) -> String {
    const SHOWN: usize = 4;
    let len = value.chars().count();
    if len <= SHOWN {
        return "*".repeat(len);
    }
    value
        .chars()
        .take(SHOWN)
        .chain(std::iter::repeat_n('*', len - SHOWN))
        .collect()
}
