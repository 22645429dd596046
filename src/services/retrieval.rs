//! src/services/retrieval.rs
//!
//! RetrievalService — resolves a record id to its blob for streaming.

use crate::{
    models::record::Record,
    services::{
        blob_store::BlobStore,
        error::{StorageError, StorageResult},
        metadata_index::MetadataIndex,
    },
};
use tokio::fs::File;
use tracing::error;

#[derive(Clone)]
pub struct RetrievalService {
    blobs: BlobStore,
    index: MetadataIndex,
}

/// A record together with its opened payload.
#[derive(Debug)]
pub struct Retrieved {
    pub record: Record,
    pub file: File,
}

impl RetrievalService {
    pub fn new(blobs: BlobStore, index: MetadataIndex) -> Self {
        Self { blobs, index }
    }

    /// Look up a record and open its blob.
    ///
    /// Unknown ids fail with `RecordNotFound` before the blob store is
    /// consulted. A record whose blob is gone, or whose blob length differs
    /// from `size_bytes`, is an integrity fault and surfaces as `CorruptState`.
    pub async fn retrieve(&self, id: i64) -> StorageResult<Retrieved> {
        let record = self.index.get_by_id(id).await?;
        let file = match self.blobs.get(&record.content_address).await {
            Ok(file) => file,
            Err(StorageError::BlobNotFound(_)) => return Err(corrupt(record, "is missing")),
            Err(err) => return Err(err),
        };
        if file.metadata().await?.len() != record.size_bytes as u64 {
            return Err(corrupt(record, "has the wrong length"));
        }
        Ok(Retrieved { record, file })
    }

    /// Metadata only, for HEAD requests. Applies the same integrity checks.
    pub async fn describe(&self, id: i64) -> StorageResult<Record> {
        let record = self.index.get_by_id(id).await?;
        match self.blobs.size(&record.content_address).await {
            Ok(size) if size == record.size_bytes as u64 => Ok(record),
            Ok(_) => Err(corrupt(record, "has the wrong length")),
            Err(StorageError::BlobNotFound(_)) => Err(corrupt(record, "is missing")),
            Err(err) => Err(err),
        }
    }
}

fn corrupt(record: Record, problem: &str) -> StorageError {
    error!(
        "integrity fault: blob {} for recording {} {}",
        record.content_address, record.id, problem
    );
    StorageError::CorruptState {
        id: record.id,
        address: record.content_address,
    }
}
