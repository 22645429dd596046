//! Core data models for the recording store.
//!
//! A `Record` is the catalog entry for one uploaded recording; the payload
//! itself lives in the blob store under its `ContentAddress`. Records map to
//! the `recordings` table via `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod content_address;
pub mod record;
