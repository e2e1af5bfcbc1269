use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::common::created;
use crate::auth::AuthUser;
use crate::entities::qc_record;
use crate::services::qc::{QcProgress, QcRecordResult, RecordQcRequest};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

/// QC progress of an order item across all its batches
#[utoipa::path(
    get,
    path = "/api/v1/order-items/{id}/qc-progress",
    params(("id" = Uuid, Path, description = "Order item ID")),
    responses(
        (status = 200, description = "Progress per size", body = ApiResponse<QcProgress>),
        (status = 404, description = "Order item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "qc"
)]
pub async fn item_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QcProgress> {
    let progress = state.services.qc.qc_progress(id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

#[utoipa::path(
    get,
    path = "/api/v1/batch-assignments/{id}/qc",
    params(("id" = Uuid, Path, description = "Batch assignment ID")),
    responses((status = 200, description = "QC records, oldest first", body = ApiResponse<Vec<qc_record::Model>>)),
    security(("Bearer" = [])),
    tag = "qc"
)]
pub async fn list_qc_records(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<qc_record::Model>> {
    let records = state.services.qc.list_qc_records(id).await?;
    Ok(Json(ApiResponse::success(records)))
}

#[utoipa::path(
    get,
    path = "/api/v1/batch-assignments/{id}/qc-progress",
    params(("id" = Uuid, Path, description = "Batch assignment ID")),
    responses(
        (status = 200, description = "Progress per size", body = ApiResponse<QcProgress>),
        (status = 404, description = "Batch assignment not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "qc"
)]
pub async fn assignment_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QcProgress> {
    let progress = state.services.qc.assignment_progress(id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

/// Record approved and rejected pieces; the reviewer defaults to the caller
#[utoipa::path(
    post,
    path = "/api/v1/batch-assignments/{id}/qc",
    params(("id" = Uuid, Path, description = "Batch assignment ID")),
    request_body = RecordQcRequest,
    responses(
        (status = 201, description = "QC recorded", body = ApiResponse<QcRecordResult>),
        (status = 400, description = "Reviewed pieces exceed what the batch holds", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "qc"
)]
pub async fn record_qc(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut request): Json<RecordQcRequest>,
) -> Result<(StatusCode, Json<ApiResponse<QcRecordResult>>), ServiceError> {
    if request
        .reviewed_by
        .as_deref()
        .map_or(true, |name| name.trim().is_empty())
    {
        request.reviewed_by = Some(auth_user.display_name());
    }
    let result = state.services.qc.record_qc(id, request).await?;
    Ok(created(result))
}
