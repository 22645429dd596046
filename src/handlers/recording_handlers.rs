//! HTTP handlers for recording upload, listing and playback.
//! Uploads and downloads are streamed; storage concerns are delegated to the
//! ingest coordinator and retrieval service in `AppState`.

use crate::{
    errors::AppError,
    models::record::Record,
    services::retrieval::Retrieved,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Multipart part carrying the recording bytes.
pub const VIDEO_FIELD: &str = "video";
/// Optional text part overriding the display name. Must precede the video.
pub const NAME_FIELD: &str = "name";
/// Optional text part with the expected byte count. Must precede the video.
pub const SIZE_FIELD: &str = "size";

/// `POST /api/recordings` — multipart upload.
pub async fn upload_recording(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut name: Option<String> = None;
    let mut declared_size: Option<u64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(NAME_FIELD) => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::bad_request(err.body_text()))?,
                );
            }
            Some(SIZE_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
                let size = text
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| AppError::bad_request(format!("invalid size `{}`", text)))?;
                declared_size = Some(size);
            }
            Some(VIDEO_FIELD) => {
                let display_name = name.take().or_else(|| field.file_name().map(str::to_owned));
                let stream = field.map(|chunk| chunk.map_err(io::Error::other));

                let record = state
                    .ingest
                    .ingest(stream, display_name.as_deref(), declared_size)
                    .await?;
                return Ok((StatusCode::CREATED, Json(record)));
            }
            other => debug!("ignoring multipart field {:?}", other),
        }
    }

    Err(AppError::bad_request("No file uploaded"))
}

/// `GET /api/recordings` — every record, newest first.
pub async fn list_recordings(
    State(state): State<AppState>,
) -> Result<Json<Vec<Record>>, AppError> {
    Ok(Json(state.index.list_all().await?))
}

/// `GET /api/recordings/{id}` — stream the recording bytes.
pub async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let Retrieved { record, file } = state.retrieval.retrieve(id).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_recording_headers(response.headers_mut(), &record);
    Ok(response)
}

/// `HEAD /api/recordings/{id}` — same headers as GET but no body.
pub async fn head_recording(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let record = state.retrieval.describe(id).await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_recording_headers(response.headers_mut(), &record);
    Ok(response)
}

fn set_recording_headers(headers: &mut HeaderMap, record: &Record) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&record.original_name)),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(record.size_bytes.max(0) as u64),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", record.content_address)) {
        headers.insert(header::ETAG, value);
    }

    let last_modified = record
        .created_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let disposition = format!(
        "inline; filename=\"{}\"",
        ascii_filename(&record.original_name)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// MIME type from the display name's extension.
fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webm" => "video/webm",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Filename safe to embed in a quoted header parameter.
fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::routes::routes,
        services::{blob_store::BlobStore, metadata_index::tests::memory_index},
    };
    use axum::{Router, http::Request};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "recording-store-test-boundary";

    async fn app(max_upload_bytes: u64) -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::open(dir.path()).await.unwrap();
        let state = AppState::new(blobs, memory_index().await, Some(max_upload_bytes));
        (dir, routes(max_upload_bytes).with_state(state))
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
                Part::File(name, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: video/webm\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/recordings")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_then_stream_back() {
        let (_dir, app) = app(1024).await;

        let response = app
            .clone()
            .oneshot(upload_request(&[
                Part::Text("size", "10"),
                Part::File("video", "t.webm", b"abcdefghij"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["sizeBytes"], 10);
        assert_eq!(created["originalName"], "t.webm");
        assert!(created["createdAt"].is_string());
        let id = created["id"].as_i64().unwrap();

        let response = app
            .oneshot(get(&format!("/api/recordings/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(
            response.headers()[header::ETAG],
            format!("\"{}\"", created["contentAddress"].as_str().unwrap()).as_str()
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"abcdefghij");
    }

    #[tokio::test]
    async fn name_field_overrides_filename() {
        let (_dir, app) = app(1024).await;

        let response = app
            .oneshot(upload_request(&[
                Part::Text("name", "demo.mp4"),
                Part::File("video", "blob", b"data"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["originalName"], "demo.mp4");
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_dir, app) = app(1024).await;
        for (name, data) in [("a.webm", &b"first"[..]), ("b.webm", &b"second"[..])] {
            let response = app
                .clone()
                .oneshot(upload_request(&[Part::File("video", name, data)]))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app.oneshot(get("/api/recordings")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        let names: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["originalName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b.webm", "a.webm"]);
    }

    #[tokio::test]
    async fn missing_or_empty_payload_is_bad_request() {
        let (_dir, app) = app(1024).await;

        let response = app
            .clone()
            .oneshot(upload_request(&[Part::Text("name", "x.webm")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No file uploaded");

        let response = app
            .clone()
            .oneshot(upload_request(&[Part::File("video", "t.webm", b"")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/api/recordings")).await.unwrap();
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn size_mismatch_is_bad_request() {
        let (_dir, app) = app(1024).await;

        let response = app
            .oneshot(upload_request(&[
                Part::Text("size", "11"),
                Part::File("video", "t.webm", b"abcdefghij"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (_dir, app) = app(8).await;

        let response = app
            .oneshot(upload_request(&[Part::File("video", "t.webm", b"0123456789")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unknown_recording_is_not_found() {
        let (_dir, app) = app(1024).await;

        let response = app.oneshot(get("/api/recordings/999")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["status"], 404);
    }

    #[tokio::test]
    async fn head_reports_headers_without_body() {
        let (_dir, app) = app(1024).await;
        let response = app
            .clone()
            .oneshot(upload_request(&[Part::File("video", "clip.mp4", b"12345")]))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri(format!("/api/recordings/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.WEBM"), "video/webm");
        assert_eq!(content_type_for("a.mkv"), "video/x-matroska");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(ascii_filename("a\"b\\c é.webm"), "a_b_c _.webm");
    }
}
