//! Represents one stored recording in the metadata index.

use crate::models::content_address::ContentAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A catalog entry describing one ingested recording.
///
/// The struct holds metadata only. The bytes are owned by the blob store and
/// reached through `content_address`; several records may share one blob.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Auto-incremented identifier assigned by SQLite.
    pub id: i64,

    /// SHA-256 address of the payload in the blob store.
    pub content_address: ContentAddress,

    /// Display name supplied by the uploader, after normalization.
    pub original_name: String,

    /// Payload length in bytes.
    pub size_bytes: i64,

    /// When ingest completed.
    pub created_at: DateTime<Utc>,
}

/// Fields required to append a record. The index assigns the `id`.
#[derive(Clone, Debug)]
pub struct NewRecord {
    pub original_name: String,
    pub content_address: ContentAddress,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
