//! Error taxonomy shared by the blob store, metadata index, ingest and retrieval.

use crate::models::content_address::{ContentAddress, InvalidAddress};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload contained no bytes")]
    EmptyPayload,
    #[error("declared size {declared} does not match received size {observed}")]
    SizeMismatch { declared: u64, observed: u64 },
    #[error("upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("upload stream failed: {0}")]
    UploadAborted(#[source] io::Error),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("failed to write blob: {0}")]
    WriteFailure(#[source] io::Error),
    #[error("recording `{0}` not found")]
    RecordNotFound(i64),
    #[error("blob `{0}` not found")]
    BlobNotFound(ContentAddress),
    #[error("blob `{address}` for recording `{id}` is missing or damaged")]
    CorruptState { id: i64, address: ContentAddress },
    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
