//! Content-addressed storage for screen recordings.
//!
//! Uploaded payloads are written once to a blob store keyed by their SHA-256
//! digest and catalogued in a single SQLite table; the HTTP layer exposes
//! upload, listing and playback over those two stores.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
