//! Defines routes for the recording API.
//!
//! ## Structure
//! - **Catalog endpoints**
//!   - `POST   /api/recordings`      — multipart upload (`video` part, optional `name`/`size`)
//!   - `GET    /api/recordings`      — list records, newest first
//!
//! - **Recording endpoints**
//!   - `GET    /api/recordings/{id}` — stream the recording bytes
//!   - `HEAD   /api/recordings/{id}` — headers only

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        recording_handlers::{get_recording, head_recording, list_recordings, upload_recording},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Headroom above the payload limit for multipart boundaries and text parts,
/// so an oversized payload is reported by the ingest path rather than cut off
/// mid-parse.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build and return the router for all recording routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit =
        usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/recordings",
            post(upload_recording)
                .get(list_recordings)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/recordings/{id}",
            get(get_recording).head(head_recording),
        )
}
