// pg-r2-backup/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::primitives::{ByteStream, Length};
use s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::object_store::{ObjectStore, RemoteObject};
use crate::config::{StorageConfig, StorageCredentials};
use crate::errors::BackupError;

pub const MIB: u64 = 1024 * 1024;
/// S3 rejects multipart uploads with more parts than this.
pub const MAX_PARTS: u64 = 10_000;

/// When and how to split an upload into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Files larger than this go through multipart upload.
    pub threshold: u64,
    pub chunk_size: u64,
    /// Upper bound on parts in flight at once.
    pub max_concurrency: usize,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        TransferPolicy {
            threshold: 8 * MIB,
            chunk_size: 8 * MIB,
            max_concurrency: 4,
        }
    }
}

impl TransferPolicy {
    /// The configured chunk size, grown just enough to stay under
    /// [`MAX_PARTS`] for very large files.
    pub fn chunk_size_for(&self, size: u64) -> u64 {
        self.chunk_size.max(1).max(size.div_ceil(MAX_PARTS))
    }
}

/// Byte range of one multipart part. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

pub fn plan_parts(size: u64, chunk_size: u64) -> Vec<PartRange> {
    let chunk = chunk_size.max(1);
    (0..size.div_ceil(chunk))
        .map(|index| {
            let offset = index * chunk;
            PartRange {
                number: index as i32 + 1,
                offset,
                length: chunk.min(size - offset),
            }
        })
        .collect()
}

struct Connected {
    client: s3::Client,
    bucket: String,
}

/// S3-compatible bucket (Cloudflare R2 by default).
///
/// The client is built on first use, so a missing credential only matters
/// once something is actually uploaded.
pub struct S3Store {
    storage: StorageConfig,
    policy: TransferPolicy,
    connected: OnceCell<Connected>,
}

impl S3Store {
    pub fn new(storage: StorageConfig) -> Self {
        S3Store {
            storage,
            policy: TransferPolicy::default(),
            connected: OnceCell::new(),
        }
    }

    async fn connect(&self) -> std::result::Result<&Connected, String> {
        self.connected
            .get_or_try_init(|| async {
                let credentials = self.storage.credentials()?;
                let client = build_client(&credentials).await;
                Ok::<_, String>(Connected {
                    client,
                    bucket: credentials.bucket_name,
                })
            })
            .await
    }

    /// HEAD on the configured bucket, to confirm credentials and endpoint.
    pub async fn check_bucket(&self) -> Result<()> {
        let connected = self.connect().await.map_err(anyhow::Error::msg)?;
        connected
            .client
            .head_bucket()
            .bucket(&connected.bucket)
            .send()
            .await
            .with_context(|| format!("Bucket {} is not accessible", connected.bucket))?;
        Ok(())
    }
}

async fn build_client(credentials: &StorageCredentials) -> s3::Client {
    let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .endpoint_url(&credentials.endpoint_url)
        .region(Region::new(credentials.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            credentials.access_key.expose(),
            credentials.secret_key.expose(),
            None, // session_token
            None, // expiry
            "Static",
        ))
        .load()
        .await;

    s3::Client::new(&sdk_config)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, local: &Path, key: &str) -> crate::errors::Result<()> {
        let connected = self.connect().await.map_err(BackupError::UploadFailed)?;
        upload_file(&connected.client, &connected.bucket, local, key, self.policy)
            .await
            .map_err(|e| BackupError::UploadFailed(BackupError::chain(&e)))
    }

    async fn list(&self, prefix: &str) -> crate::errors::Result<Vec<RemoteObject>> {
        let connected = self.connect().await.map_err(BackupError::RetentionFailed)?;
        list_objects(&connected.client, &connected.bucket, prefix)
            .await
            .map_err(|e| BackupError::RetentionFailed(BackupError::chain(&e)))
    }

    async fn delete(&self, key: &str) -> crate::errors::Result<()> {
        let connected = self.connect().await.map_err(BackupError::RetentionFailed)?;
        connected
            .client
            .delete_object()
            .bucket(&connected.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete {} from bucket {}", key, connected.bucket))
            .map_err(|e| BackupError::RetentionFailed(BackupError::chain(&e)))?;
        Ok(())
    }
}

/// Uploads a file with a single PUT, or in parts once it is larger than the
/// policy threshold.
pub async fn upload_file(
    client: &s3::Client,
    bucket: &str,
    file_path: &Path,
    key: &str,
    policy: TransferPolicy,
) -> Result<()> {
    let size = tokio::fs::metadata(file_path)
        .await
        .with_context(|| format!("Failed to stat {}", file_path.display()))?
        .len();

    info!("Uploading {} to bucket {} with key {}", file_path.display(), bucket, key);

    if size <= policy.threshold {
        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", file_path.display()))?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to bucket {} with key {}", file_path.display(), bucket, key))?;
        return Ok(());
    }

    let created = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("Failed to start multipart upload for {}", key))?;
    let upload_id = created
        .upload_id()
        .context("Multipart upload started without an upload id")?
        .to_string();

    let parts = plan_parts(size, policy.chunk_size_for(size));
    debug!("Uploading {} in {} part(s), upload id {}", key, parts.len(), upload_id);

    let outcome = upload_and_complete(client, bucket, key, &upload_id, file_path, parts, policy.max_concurrency).await;
    if outcome.is_err() {
        if let Err(abort_err) = client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .send()
            .await
        {
            warn!("Failed to abort multipart upload {} for {}: {}", upload_id, key, abort_err);
        }
    }
    outcome
}

async fn upload_and_complete(
    client: &s3::Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    file_path: &Path,
    parts: Vec<PartRange>,
    max_concurrency: usize,
) -> Result<()> {
    let mut in_flight = JoinSet::new();
    let mut completed = Vec::with_capacity(parts.len());

    for part in parts {
        if in_flight.len() >= max_concurrency.max(1) {
            if let Some(done) = in_flight.join_next().await {
                completed.push(done.context("Part upload task failed to run")??);
            }
        }
        let client = client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let upload_id = upload_id.to_string();
        let path = file_path.to_path_buf();
        in_flight.spawn(async move { upload_part(&client, &bucket, &key, &upload_id, &path, part).await });
    }
    while let Some(done) = in_flight.join_next().await {
        completed.push(done.context("Part upload task failed to run")??);
    }
    completed.sort_by_key(|part| part.part_number());

    client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(completed))
                .build(),
        )
        .send()
        .await
        .with_context(|| format!("Failed to complete multipart upload for {}", key))?;
    Ok(())
}

async fn upload_part(
    client: &s3::Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    file_path: &Path,
    part: PartRange,
) -> Result<CompletedPart> {
    let body = ByteStream::read_from()
        .path(file_path)
        .offset(part.offset)
        .length(Length::Exact(part.length))
        .build()
        .await
        .with_context(|| format!("Failed to read part {} of {}", part.number, file_path.display()))?;

    let output = client
        .upload_part()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .part_number(part.number)
        .content_length(part.length as i64)
        .body(body)
        .send()
        .await
        .with_context(|| format!("Failed to upload part {} of {}", part.number, key))?;

    Ok(CompletedPart::builder()
        .part_number(part.number)
        .set_e_tag(output.e_tag().map(str::to_string))
        .build())
}

/// Lists every object under `prefix`, following continuation tokens until
/// the listing is exhausted.
pub async fn list_objects(client: &s3::Client, bucket: &str, prefix: &str) -> Result<Vec<RemoteObject>> {
    let mut pages = client
        .list_objects_v2()
        .bucket(bucket)
        .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
        .into_paginator()
        .send();

    let mut objects = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.with_context(|| {
            format!("Failed to list objects in bucket {} under prefix '{}'", bucket, prefix)
        })?;
        for object in page.contents() {
            let Some(key) = object.key() else { continue };
            objects.push(RemoteObject {
                key: key.to_string(),
                // Undated entries sort as the oldest.
                last_modified: object
                    .last_modified()
                    .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                size: object.size().unwrap_or(0).max(0) as u64,
            });
        }
    }
    Ok(objects)
}
