//! HTTP handlers for uploading, listing, deleting and serving files.
//! Payloads are streamed back from disk; uploads are read part by part and
//! refused as soon as a part grows past the configured limit.

use crate::{
    errors::AppError,
    models::{
        descriptor::{DeleteRequest, FileDescriptor, ListedFile, UploadTarget},
        digest::ContentDigest,
    },
    services::{
        retrieval::StoredFile, storage_service::StorageService, upload::IncomingFile,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// Query params of `GET /api/files`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "ownerType")]
    pub owner_type: String,
    pub item: String,
    #[serde(rename = "linkID")]
    pub link_id: i64,
}

/// Body of a successful `DELETE /api/files`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub rows_affected: u64,
    pub removed: usize,
    pub purged: Vec<String>,
    pub missing: Vec<String>,
}

/// POST `/api/files`: multipart upload.
///
/// Expects one `meta` text field holding the target slot as JSON and one or
/// more `file` parts.
pub async fn upload_files(
    State(service): State<StorageService>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ListedFile>>, AppError> {
    let limit = service.settings().max_upload_size;
    let request_limit = service.settings().max_request_size;
    let mut received: u64 = 0;
    let mut target: Option<UploadTarget> = None;
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("meta") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let parsed = serde_json::from_str::<UploadTarget>(&raw)
                    .map_err(|err| AppError::bad_request(format!("invalid meta: {}", err)))?;
                target = Some(parsed);
            }
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    received += chunk.len() as u64;
                    if received > request_limit {
                        return Err(AppError::new(
                            StatusCode::PAYLOAD_TOO_LARGE,
                            format!("upload is larger than the {} byte limit", request_limit),
                        ));
                    }
                    if (data.len() + chunk.len()) as u64 > limit {
                        return Err(AppError::bad_request(format!(
                            "file {} is larger than the {} byte limit",
                            name, limit
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }
                files.push(IncomingFile::new(name, data.freeze()));
            }
            other => {
                tracing::debug!("ignoring multipart field {:?}", other);
            }
        }
    }

    let target = target.ok_or_else(|| AppError::bad_request("missing meta field"))?;
    let listed = service.upload(&target, files).await?;
    Ok(Json(listed))
}

/// DELETE `/api/files`: remove entries from an owner slot.
pub async fn delete_files(
    State(service): State<StorageService>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = service.delete_files(&req).await?;
    Ok(Json(DeleteResponse {
        rows_affected: outcome.rows_affected,
        removed: outcome.removed.len(),
        purged: outcome.purged,
        missing: outcome.missing,
    }))
}

/// GET `/api/files?ownerType=&item=&linkID=`: current list of a slot.
pub async fn list_files(
    State(service): State<StorageService>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<FileDescriptor>>, AppError> {
    let list = service.list_files(&q.owner_type, &q.item, q.link_id).await?;
    Ok(Json(list))
}

/// GET `/api/files/{digest}`: stream the content.
pub async fn get_file(
    State(service): State<StorageService>,
    Path(digest): Path<String>,
) -> Result<Response, AppError> {
    let digest = parse_digest(&digest)?;
    let (stored, file) = service.open_blob(&digest).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &stored);
    Ok(response)
}

/// HEAD `/api/files/{digest}`: same headers as GET but no body.
pub async fn head_file(
    State(service): State<StorageService>,
    Path(digest): Path<String>,
) -> Result<Response, AppError> {
    let digest = parse_digest(&digest)?;
    let stored = service.blob_metadata(&digest).await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &stored);
    Ok(response)
}

/// Keep the status the multipart reader chose, e.g. 413 when the body
/// limit was hit.
fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn parse_digest(raw: &str) -> Result<ContentDigest, AppError> {
    ContentDigest::from_hex(raw).map_err(|err| AppError::bad_request(err.to_string()))
}

fn set_file_headers(headers: &mut HeaderMap, stored: &StoredFile) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(stored.size_bytes.max(0) as u64),
    );
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", stored.digest)) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&stored.name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// `inline` disposition with a plain ASCII fallback and the exact name
/// percent-encoded per RFC 5987.
pub(crate) fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .filter(|c| !matches!(c, '"' | '\\' | ';'))
        .collect();
    let fallback = match fallback.trim() {
        "" => "download",
        trimmed => trimmed,
    };

    let mut encoded = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }

    format!("inline; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_names_pass_through() {
        assert_eq!(
            content_disposition("report.pdf"),
            "inline; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn unsafe_and_non_ascii_names_are_escaped() {
        let value = content_disposition("保单 \"v2\";.pdf");
        assert!(value.starts_with("inline; filename=\"v2.pdf\""));
        assert!(value.contains("filename*=UTF-8''%E4%BF%9D%E5%8D%95%20%22v2%22%3B.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn empty_fallback_uses_placeholder() {
        assert!(content_disposition("图片").starts_with("inline; filename=\"download\""));
    }
}
