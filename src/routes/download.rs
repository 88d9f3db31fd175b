use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::Response,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{info, warn};

use super::routes_state::RouteState;
use crate::http_objects::ReleaseAPIError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// RFC 5987 attr-char.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

fn key_filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

// Header-safe ASCII rendition of the last key segment.
fn attachment_filename(key: &str) -> String {
    key_filename(key)
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

/// `attachment` with an ASCII fallback name plus the exact UTF-8 name.
fn content_disposition(key: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        attachment_filename(key),
        utf8_percent_encode(key_filename(key), ATTR_CHAR)
    )
}

// Stored attributes are producer-controlled; unusable values are dropped.
fn header_value(key: &str, name: &str, value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = %key, header = name, value = ?value, "ignoring invalid stored header value");
            None
        }
    }
}

/// Download a release artifact
#[utoipa::path(
    get,
    path = "/download/{key}",
    tag = "releases",
    params(
        ("key" = String, Path, description = "Storage key, percent-encoded")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = NOT_FOUND, description = "No artifact with this key"),
        (status = INTERNAL_SERVER_ERROR, description = "Release store unavailable")
    ),
)]
pub async fn download_release(
    Path(key): Path<String>,
    State(state): State<RouteState>,
) -> Result<Response<Body>, ReleaseAPIError> {
    let download = state
        .blob_storage
        .get(&key)
        .await
        .map_err(ReleaseAPIError::internal_error)?
        .ok_or_else(|| ReleaseAPIError::not_found(&format!("release not found: {key}")))?;
    info!(key = %key, size = download.size, "streaming release");

    let content_type = download
        .content_type
        .as_deref()
        .and_then(|value| header_value(&key, "content-type", value))
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, download.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&key));
    if let Some(etag) = download
        .etag
        .as_deref()
        .and_then(|value| header_value(&key, "etag", value))
    {
        response = response.header(header::ETAG, etag);
    }
    response
        .body(Body::from_stream(download.stream))
        .map_err(|e| ReleaseAPIError::internal_error_str(&e.to_string()))
}
