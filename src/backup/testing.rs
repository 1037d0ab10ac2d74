//! In-memory stand-ins for `pg_dump` and the bucket, used by the pipeline
//! tests.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::db_dump::DumpTool;
use super::object_store::{ObjectStore, RemoteObject};
use crate::config::DumpFormat;
use crate::errors::{BackupError, Result};

/// An object whose last-modified time is `offset_secs` after a fixed epoch
/// in the past.
pub fn object_at(key: &str, offset_secs: i64) -> RemoteObject {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    RemoteObject {
        key: key.to_string(),
        last_modified: base + Duration::seconds(offset_secs),
        size: 1024,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<RemoteObject>>,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    calls: AtomicUsize,
    fail_upload: bool,
    fail_list: bool,
    fail_delete: bool,
}

impl MemoryStore {
    pub fn with_objects(objects: Vec<RemoteObject>) -> Self {
        MemoryStore {
            objects: Mutex::new(objects),
            ..MemoryStore::default()
        }
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Remaining keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload {
            return Err(BackupError::UploadFailed("bucket rejected the upload".to_string()));
        }
        let bytes = fs::read(local).map_err(|e| BackupError::UploadFailed(e.to_string()))?;
        self.objects.lock().unwrap().push(RemoteObject {
            key: key.to_string(),
            last_modified: Utc::now(),
            size: bytes.len() as u64,
        });
        self.uploads.lock().unwrap().push((key.to_string(), bytes));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(BackupError::RetentionFailed("listing denied".to_string()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(BackupError::RetentionFailed(format!("cannot delete {key}")));
        }
        self.objects.lock().unwrap().retain(|o| o.key != key);
        Ok(())
    }
}

/// What the scripted dump does when invoked.
#[derive(Clone)]
pub enum DumpBehaviour {
    Writes(Vec<u8>),
    /// Writes some bytes, then reports a non-zero exit.
    FailsMidway,
}

pub struct ScriptedDump {
    installed: bool,
    behaviour: DumpBehaviour,
    invocations: Mutex<Vec<(String, DumpFormat, PathBuf)>>,
}

impl ScriptedDump {
    pub fn writing(bytes: &[u8]) -> Self {
        ScriptedDump {
            installed: true,
            behaviour: DumpBehaviour::Writes(bytes.to_vec()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_midway() -> Self {
        ScriptedDump {
            behaviour: DumpBehaviour::FailsMidway,
            ..ScriptedDump::writing(b"")
        }
    }

    pub fn not_installed() -> Self {
        ScriptedDump {
            installed: false,
            ..ScriptedDump::writing(b"")
        }
    }

    pub fn invocations(&self) -> Vec<(String, DumpFormat, PathBuf)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DumpTool for ScriptedDump {
    fn locate(&self) -> Result<PathBuf> {
        if self.installed {
            Ok(PathBuf::from("/usr/bin/pg_dump"))
        } else {
            Err(BackupError::DumpFailed(
                "pg_dump not found in PATH. Install postgresql-client.".to_string(),
            ))
        }
    }

    async fn dump(&self, database_url: &str, format: DumpFormat, output: &Path) -> Result<()> {
        self.invocations
            .lock()
            .unwrap()
            .push((database_url.to_string(), format, output.to_path_buf()));
        match &self.behaviour {
            DumpBehaviour::Writes(bytes) => {
                fs::write(output, bytes).map_err(|e| BackupError::DumpFailed(e.to_string()))
            }
            DumpBehaviour::FailsMidway => {
                fs::write(output, b"-- partial").map_err(|e| BackupError::DumpFailed(e.to_string()))?;
                Err(BackupError::DumpFailed(
                    "pg_dump exited with exit status: 1\nStderr: connection reset".to_string(),
                ))
            }
        }
    }
}
