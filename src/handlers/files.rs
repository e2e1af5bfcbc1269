use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::entities::stored_file;
use crate::storage::Bucket;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BucketQuery {
    /// `images`, `videos` or `documents`
    pub bucket: Option<String>,
}

fn parse_bucket(value: Option<&str>) -> Result<Option<Bucket>, ServiceError> {
    match value {
        None => Ok(None),
        Some(raw) => Bucket::parse(raw)
            .map(Some)
            .ok_or_else(|| ServiceError::InvalidInput(format!("Unknown bucket '{}'", raw))),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/files",
    params(BucketQuery),
    responses(
        (status = 200, description = "Stored files, newest first", body = ApiResponse<Vec<stored_file::Model>>),
        (status = 400, description = "Unknown bucket", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<BucketQuery>,
) -> ApiResult<Vec<stored_file::Model>> {
    let bucket = parse_bucket(query.bucket.as_deref())?;
    let files = state.services.files.list(bucket).await?;
    Ok(Json(ApiResponse::success(files)))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = ApiResponse<stored_file::Model>),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<stored_file::Model> {
    let file = state.services.files.get_file(id).await?;
    Ok(Json(ApiResponse::success(file)))
}

/// Stream the stored bytes back with their original content type
#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/download",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let download = state.services.files.download(id).await?;
    let content_type = HeaderValue::from_str(&download.file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        download.file.file_name
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.data,
    )
        .into_response())
}

/// Upload the first file part of a multipart body into `bucket`
#[utoipa::path(
    post,
    path = "/api/v1/files",
    params(BucketQuery),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = ApiResponse<stored_file::Model>),
        (status = 400, description = "Missing or empty file, or unknown bucket", body = crate::errors::ErrorResponse),
        (status = 413, description = "File too large", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Query(query): Query<BucketQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<stored_file::Model>>), ServiceError> {
    let bucket = parse_bucket(query.bucket.as_deref())?
        .ok_or_else(|| ServiceError::InvalidInput("Query parameter 'bucket' is required".to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ServiceError::PayloadTooLarge(e.body_text())
            } else {
                ServiceError::InvalidInput(format!("Failed to read upload: {}", e))
            }
        })?;

        let stored = state
            .services
            .files
            .upload(bucket, &file_name, content_type.as_deref(), data)
            .await?;
        return Ok(created(stored));
    }

    Err(ServiceError::ValidationError(
        "Multipart body carries no file".to_string(),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 409, description = "A tutorial still links the file", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.files.delete(id).await?;
    Ok(no_content_response())
}
