// pg-r2-backup/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::TempPath;
use tracing::info;

use super::discard;
use crate::config::Secret;
use crate::errors::BackupError;
use crate::success;

/// How a snapshot is packaged before upload.
#[derive(Debug, Clone)]
pub enum Packaging {
    /// Single-stream gzip, no encryption.
    Gzip,
    /// AES-256 encrypted 7z archive holding the snapshot as its only entry.
    SevenZip { password: Secret },
}

impl Packaging {
    /// A configured password always selects the encrypted archive.
    pub fn for_password(password: Option<&Secret>) -> Self {
        match password {
            Some(password) => Packaging::SevenZip {
                password: password.clone(),
            },
            None => Packaging::Gzip,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Packaging::Gzip => "gz",
            Packaging::SevenZip { .. } => "7z",
        }
    }

    pub fn output_name(&self, snapshot_name: &str) -> String {
        format!("{}.{}", snapshot_name, self.extension())
    }
}

/// Packages the snapshot into a sibling file and returns the guard that owns
/// it.
///
/// Takes ownership of the snapshot guard, so the uncompressed dump is gone
/// once this returns, whether packaging worked or not. A half-written output
/// file is removed on failure as well.
pub async fn package(snapshot: TempPath, packaging: &Packaging) -> crate::errors::Result<TempPath> {
    let snapshot_name = snapshot
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = TempPath::from_path(snapshot.with_file_name(packaging.output_name(&snapshot_name)));

    match packaging {
        Packaging::Gzip => info!("Compressing backup with gzip..."),
        Packaging::SevenZip { .. } => info!("Encrypting backup with 7z..."),
    }

    let src = snapshot.to_path_buf();
    let dest = output.to_path_buf();
    let job = packaging.clone();
    let outcome = tokio::task::spawn_blocking(move || match &job {
        Packaging::Gzip => gzip_file(&src, &dest),
        Packaging::SevenZip { password } => encrypt_7z(&src, &dest, password),
    })
    .await;
    discard(snapshot);

    match outcome {
        Ok(Ok(())) => {
            match packaging {
                Packaging::Gzip => success!("Backup compressed successfully"),
                Packaging::SevenZip { .. } => success!("Backup encrypted successfully"),
            }
            Ok(output)
        }
        Ok(Err(e)) => Err(BackupError::PackagingFailed(BackupError::chain(&e))),
        Err(e) => Err(BackupError::PackagingFailed(format!(
            "packaging task did not complete: {}",
            e
        ))),
    }
}

fn gzip_file(src: &Path, dest: &Path) -> Result<()> {
    let input = File::open(src)
        .with_context(|| format!("Failed to open snapshot: {}", src.display()))?;
    let output = File::create(dest)
        .with_context(|| format!("Failed to create compressed file: {}", dest.display()))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut reader, &mut encoder)
        .with_context(|| format!("Failed to compress {}", src.display()))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("Failed to finish gzip stream for {}", dest.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", dest.display()))?;
    Ok(())
}

fn encrypt_7z(src: &Path, dest: &Path, password: &Secret) -> Result<()> {
    if !src.is_file() {
        anyhow::bail!("Snapshot to encrypt is not a file: {}", src.display());
    }
    sevenz_rust::compress_to_path_encrypted(src, dest, password.expose().into()).map_err(|e| {
        anyhow::anyhow!("Failed to write encrypted archive {}: {}", dest.display(), e)
    })
}
