//! Shared application state handed to every handler.

use crate::services::{
    blob_store::BlobStore, ingest::IngestCoordinator, metadata_index::MetadataIndex,
    retrieval::RetrievalService,
};

/// Process-owned services. Cloning is cheap: every field is a handle over
/// the same pool and storage root.
#[derive(Clone)]
pub struct AppState {
    pub blobs: BlobStore,
    pub index: MetadataIndex,
    pub ingest: IngestCoordinator,
    pub retrieval: RetrievalService,
}

impl AppState {
    pub fn new(blobs: BlobStore, index: MetadataIndex, max_upload_bytes: Option<u64>) -> Self {
        Self {
            ingest: IngestCoordinator::new(blobs.clone(), index.clone(), max_upload_bytes),
            retrieval: RetrievalService::new(blobs.clone(), index.clone()),
            blobs,
            index,
        }
    }
}
