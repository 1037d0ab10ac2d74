// pg-r2-backup/src/backup/logic.rs
use chrono::{DateTime, Utc};
use std::fs;
use tempfile::TempPath;
use tracing::info;

use super::archive::{self, Packaging};
use super::db_dump::DumpTool;
use super::object_store::ObjectStore;
use super::retention;
use super::discard;
use crate::config::RunConfig;
use crate::errors::{BackupError, Result};
use crate::success;
use crate::utils::setting::database_name;

/// File and key names for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub snapshot: String,
    pub remote_key: String,
}

pub fn artifact_names(config: &RunConfig, packaging: &Packaging, now: DateTime<Utc>) -> ArtifactNames {
    let snapshot = format!(
        "{}_{}.{}",
        config.filename_prefix,
        now.format("%Y%m%d_%H%M%S"),
        config.dump_format.extension()
    );
    let remote_key = format!("{}{}", config.backup_prefix, packaging.output_name(&snapshot));
    ArtifactNames { snapshot, remote_key }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub remote_key: String,
    pub size_bytes: u64,
    pub deleted: Vec<String>,
}

/// Dump, package, upload, prune.
///
/// Each stage runs to completion before the next starts and the first
/// failure ends the run. Local files are owned by [`TempPath`] guards,
/// so neither the snapshot nor the packaged artifact survives this call.
/// An upload is never rolled back when pruning fails afterwards.
pub async fn perform_backup(
    config: &RunConfig,
    dumper: &dyn DumpTool,
    store: &dyn ObjectStore,
) -> Result<BackupReport> {
    dumper.locate()?;

    match database_name(config.database_url.expose()) {
        Some(name) => info!("Using {} database URL (database: {})", config.url_mode(), name),
        None => info!("Using {} database URL", config.url_mode()),
    }

    let packaging = Packaging::for_password(config.password.as_ref());
    let names = artifact_names(config, &packaging, Utc::now());

    fs::create_dir_all(&config.work_dir).map_err(|e| {
        BackupError::DumpFailed(format!(
            "Failed to create working directory {}: {}",
            config.work_dir.display(),
            e
        ))
    })?;

    let snapshot = TempPath::from_path(config.work_dir.join(&names.snapshot));
    info!("Creating backup {}", names.snapshot);
    dumper
        .dump(config.database_url.expose(), config.dump_format, &snapshot)
        .await?;

    let packaged = archive::package(snapshot, &packaging).await?;

    let size_bytes = fs::metadata(&packaged)
        .map_err(|e| {
            BackupError::UploadFailed(format!(
                "Packaged backup {} is unreadable: {}",
                packaged.display(),
                e
            ))
        })?
        .len();
    info!("Final backup size: {:.2} MB", size_bytes as f64 / 1024.0 / 1024.0);

    store.upload(&packaged, &names.remote_key).await?;
    success!("Backup uploaded: {}", names.remote_key);
    discard(packaged);

    let deleted = retention::prune(store, &config.backup_prefix, config.max_backups).await?;

    Ok(BackupReport {
        remote_key: names.remote_key,
        size_bytes,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testing::{MemoryStore, ScriptedDump, object_at};
    use crate::config::DumpFormat;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    const DUMP: &[u8] = b"PGDMP custom format payload";

    fn config_in(dir: &Path, extra: &[(&str, &str)]) -> RunConfig {
        let mut env: HashMap<String, String> = HashMap::from([
            ("DATABASE_URL".to_string(), "postgres://app:pw@db:5432/app".to_string()),
            ("BACKUP_WORK_DIR".to_string(), dir.display().to_string()),
        ]);
        for (key, value) in extra {
            env.insert(key.to_string(), value.to_string());
        }
        RunConfig::resolve(&env).unwrap()
    }

    fn leftovers(dir: &TempDir) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn names_embed_prefix_timestamp_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            &[("FILENAME_PREFIX", "shop"), ("BACKUP_PREFIX", "nightly/"), ("DUMP_FORMAT", "sql")],
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 4, 5, 6).unwrap();

        let plain = artifact_names(&config, &Packaging::Gzip, now);
        assert_eq!(plain.snapshot, "shop_20250309_040506.sql");
        assert_eq!(plain.remote_key, "nightly/shop_20250309_040506.sql.gz");

        let secret = crate::config::Secret::new("pw");
        let encrypted = artifact_names(&config, &Packaging::for_password(Some(&secret)), now);
        assert_eq!(encrypted.remote_key, "nightly/shop_20250309_040506.sql.7z");
    }

    #[tokio::test]
    async fn keeps_only_the_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("MAX_BACKUPS", "2")]);
        let store = MemoryStore::with_objects(vec![
            object_at("backup_t1.dump.gz", 1),
            object_at("backup_t2.dump.gz", 2),
            object_at("backup_t3.dump.gz", 3),
        ]);
        let dumper = ScriptedDump::writing(DUMP);

        let report = perform_backup(&config, &dumper, &store).await.unwrap();

        assert_eq!(report.deleted, ["backup_t1.dump.gz", "backup_t2.dump.gz"]);
        let mut expected = vec!["backup_t3.dump.gz".to_string(), report.remote_key.clone()];
        expected.sort();
        assert_eq!(store.keys(), expected);
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn uploads_gzip_of_the_dump_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("DUMP_FORMAT", "tar")]);
        let store = MemoryStore::default();
        let dumper = ScriptedDump::writing(DUMP);

        let report = perform_backup(&config, &dumper, &store).await.unwrap();

        let invocations = dumper.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, "postgres://app:pw@db:5432/app");
        assert_eq!(invocations[0].1, DumpFormat::Tar);
        assert!(report.remote_key.starts_with("backup_"));
        assert!(report.remote_key.ends_with(".tar.gz"));

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1[..2], [0x1f_u8, 0x8b]);
        assert_eq!(report.size_bytes, uploads[0].1.len() as u64);
        assert!(report.deleted.is_empty());
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn uploads_encrypted_archive_with_password() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("BACKUP_PASSWORD", "s3cret")]);
        let store = MemoryStore::default();

        let report = perform_backup(&config, &ScriptedDump::writing(DUMP), &store)
            .await
            .unwrap();

        assert!(report.remote_key.ends_with(".dump.7z"));
        let uploads = store.uploads();
        assert_eq!(uploads[0].1[..2], [0x37_u8, 0x7a]);
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn missing_dump_tool_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");
        let config = config_in(&work_dir, &[]);
        let dumper = ScriptedDump::not_installed();
        let store = MemoryStore::default();

        let err = perform_backup(&config, &dumper, &store).await.unwrap_err();

        assert!(matches!(err, BackupError::DumpFailed(ref msg) if msg.contains("not found")));
        assert!(dumper.invocations().is_empty());
        assert_eq!(store.calls(), 0);
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn failed_dump_removes_partial_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[]);
        let store = MemoryStore::default();

        let err = perform_backup(&config, &ScriptedDump::failing_midway(), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::DumpFailed(_)));
        assert_eq!(store.calls(), 0);
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn failed_upload_skips_pruning_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("MAX_BACKUPS", "1")]);
        let store = MemoryStore::with_objects(vec![object_at("backup_old.dump.gz", 0)]).failing_upload();

        let err = perform_backup(&config, &ScriptedDump::writing(DUMP), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::UploadFailed(_)));
        assert_eq!(store.calls(), 1);
        assert_eq!(store.keys(), ["backup_old.dump.gz"]);
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn pruning_failure_keeps_the_new_upload() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("MAX_BACKUPS", "1")]);
        let store = MemoryStore::with_objects(vec![object_at("backup_old.dump.gz", 0)]).failing_delete();

        let err = perform_backup(&config, &ScriptedDump::writing(DUMP), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::RetentionFailed(_)));
        assert_eq!(store.uploads().len(), 1);
        assert_eq!(store.keys().len(), 2);
        assert!(leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn pruning_is_scoped_to_the_backup_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[("MAX_BACKUPS", "1"), ("BACKUP_PREFIX", "nightly/")]);
        let store = MemoryStore::with_objects(vec![
            object_at("nightly/backup_old.dump.gz", 0),
            object_at("weekly/backup_old.dump.gz", 0),
        ]);

        let report = perform_backup(&config, &ScriptedDump::writing(DUMP), &store)
            .await
            .unwrap();

        assert!(report.remote_key.starts_with("nightly/backup_"));
        assert_eq!(report.deleted, ["nightly/backup_old.dump.gz"]);
        assert!(store.keys().contains(&"weekly/backup_old.dump.gz".to_string()));
    }
}
