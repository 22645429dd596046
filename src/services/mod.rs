//! Storage engine: content-addressed blob store, SQLite metadata index, and
//! the ingest/retrieval coordinators built on top of them.

pub mod blob_store;
pub mod error;
pub mod ingest;
pub mod metadata_index;
pub mod retrieval;
