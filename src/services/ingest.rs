//! src/services/ingest.rs
//!
//! IngestCoordinator — receives an upload stream, stores the bytes in the
//! blob store and only then registers a record in the metadata index. A crash
//! between the two steps orphans the blob; it never leaves a record pointing
//! at missing bytes.

use crate::{
    models::record::{NewRecord, Record},
    services::{
        blob_store::BlobStore,
        error::{StorageError, StorageResult},
        metadata_index::MetadataIndex,
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::io;
use tracing::{debug, info};

/// Longest display name kept, in bytes.
const MAX_NAME_LEN: usize = 255;

#[derive(Clone)]
pub struct IngestCoordinator {
    blobs: BlobStore,
    index: MetadataIndex,
    max_upload_bytes: Option<u64>,
}

impl IngestCoordinator {
    pub fn new(blobs: BlobStore, index: MetadataIndex, max_upload_bytes: Option<u64>) -> Self {
        Self {
            blobs,
            index,
            max_upload_bytes,
        }
    }

    /// Store an upload and register it.
    ///
    /// `declared_size`, when the client sent one, must match the number of
    /// bytes actually received. Empty, oversized or mismatched uploads leave
    /// neither a blob nor a record behind.
    pub async fn ingest<S>(
        &self,
        stream: S,
        original_name: Option<&str>,
        declared_size: Option<u64>,
    ) -> StorageResult<Record>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let staged = self.blobs.stage(stream, self.max_upload_bytes).await?;

        if staged.size_bytes() == 0 {
            return Err(StorageError::EmptyPayload);
        }
        if let Some(declared) = declared_size {
            if declared != staged.size_bytes() {
                return Err(StorageError::SizeMismatch {
                    declared,
                    observed: staged.size_bytes(),
                });
            }
        }

        let stored = self.blobs.commit(staged).await?;
        if stored.already_existed {
            debug!("upload deduplicated onto existing blob {}", stored.address);
        }

        let created_at = Utc::now();
        let original_name = original_name
            .and_then(normalize_name)
            .unwrap_or_else(|| format!("recording-{}.webm", created_at.timestamp_millis()));

        let record = self
            .index
            .insert(NewRecord {
                original_name,
                content_address: stored.address,
                size_bytes: stored.size_bytes as i64,
                created_at,
            })
            .await?;

        info!(
            "ingested recording {} `{}` ({} bytes, blob {})",
            record.id, record.original_name, record.size_bytes, record.content_address
        );
        Ok(record)
    }
}

/// Reduce a client-supplied name to a plain display name.
///
/// Drops directory components and control characters, trims whitespace and
/// caps the length on a char boundary. Returns `None` when nothing is left.
fn normalize_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }

    let mut end = trimmed.len().min(MAX_NAME_LEN);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    Some(trimmed[..end].to_string())
}
