use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::entities::batch;
use crate::services::production::{
    AssignBatchesRequest, BatchAssignmentDetail, BatchAssignmentFilter, CreateBatchRequest,
    CreateCuttingAssignmentRequest, CuttingAssignmentDetail, CuttingSummary, ReassignBatchRequest,
    ReassignCuttingRequest, UpdateBatchRequest, UpdateCutRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BatchListQuery {
    /// Hide batches marked inactive
    #[serde(default)]
    pub active_only: bool,
}

// ---------------------------------------------------------------------------
// Cutting
// ---------------------------------------------------------------------------

/// Cutting assignments of one order item
#[utoipa::path(
    get,
    path = "/api/v1/order-items/{id}/cutting",
    params(("id" = Uuid, Path, description = "Order item ID")),
    responses(
        (status = 200, description = "Cutting assignments", body = ApiResponse<Vec<CuttingAssignmentDetail>>),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn list_cutting_assignments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CuttingAssignmentDetail>> {
    let assignments = state.services.production.list_cutting_assignments(id).await?;
    Ok(Json(ApiResponse::success(assignments)))
}

/// Ordered, assigned, cut and batchable pieces per size
#[utoipa::path(
    get,
    path = "/api/v1/order-items/{id}/cutting-summary",
    params(("id" = Uuid, Path, description = "Order item ID")),
    responses(
        (status = 200, description = "Cutting summary", body = ApiResponse<CuttingSummary>),
        (status = 404, description = "Order item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn cutting_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CuttingSummary> {
    let summary = state.services.production.cutting_summary(id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cutting-assignments",
    request_body = CreateCuttingAssignmentRequest,
    responses(
        (status = 201, description = "Cutting assigned", body = ApiResponse<CuttingAssignmentDetail>),
        (status = 400, description = "Pieces exceed what is left to assign", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn create_cutting_assignment(
    State(state): State<AppState>,
    Json(request): Json<CreateCuttingAssignmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CuttingAssignmentDetail>>), ServiceError> {
    let detail = state
        .services
        .production
        .create_cutting_assignment(request)
        .await?;
    Ok(created(detail))
}

/// Record cumulative cut pieces
#[utoipa::path(
    put,
    path = "/api/v1/cutting-assignments/{id}/cut",
    params(("id" = Uuid, Path, description = "Cutting assignment ID")),
    request_body = UpdateCutRequest,
    responses(
        (status = 200, description = "Cut quantities saved", body = ApiResponse<CuttingAssignmentDetail>),
        (status = 400, description = "Cut exceeds assigned or drops below batched", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn update_cut_quantities(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCutRequest>,
) -> ApiResult<CuttingAssignmentDetail> {
    let detail = state
        .services
        .production
        .update_cut_quantities(id, request)
        .await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Move uncut pieces to another cutting master
#[utoipa::path(
    post,
    path = "/api/v1/cutting-assignments/{id}/reassign",
    params(("id" = Uuid, Path, description = "Cutting assignment ID")),
    request_body = ReassignCuttingRequest,
    responses(
        (status = 200, description = "Pieces moved; returns the receiving assignment", body = ApiResponse<CuttingAssignmentDetail>),
        (status = 400, description = "More pieces than are left uncut", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn reassign_cutting_master(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReassignCuttingRequest>,
) -> ApiResult<CuttingAssignmentDetail> {
    let detail = state
        .services
        .production
        .reassign_cutting_master(id, request)
        .await?;
    Ok(Json(ApiResponse::success(detail)))
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/batches",
    params(BatchListQuery),
    responses((status = 200, description = "Sewing batches", body = ApiResponse<Vec<batch::Model>>)),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchListQuery>,
) -> ApiResult<Vec<batch::Model>> {
    let batches = state.services.production.list_batches(query.active_only).await?;
    Ok(Json(ApiResponse::success(batches)))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    params(("id" = Uuid, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch returned", body = ApiResponse<batch::Model>),
        (status = 404, description = "Batch not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<batch::Model> {
    let batch = state.services.production.get_batch(id).await?;
    Ok(Json(ApiResponse::success(batch)))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches",
    request_body = CreateBatchRequest,
    responses(
        (status = 201, description = "Batch created", body = ApiResponse<batch::Model>),
        (status = 409, description = "Batch name taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<batch::Model>>), ServiceError> {
    let batch = state.services.production.create_batch(request).await?;
    Ok(created(batch))
}

#[utoipa::path(
    put,
    path = "/api/v1/batches/{id}",
    params(("id" = Uuid, Path, description = "Batch ID")),
    request_body = UpdateBatchRequest,
    responses(
        (status = 200, description = "Batch updated", body = ApiResponse<batch::Model>),
        (status = 404, description = "Batch not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn update_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBatchRequest>,
) -> ApiResult<batch::Model> {
    let batch = state.services.production.update_batch(id, request).await?;
    Ok(Json(ApiResponse::success(batch)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/batches/{id}",
    params(("id" = Uuid, Path, description = "Batch ID")),
    responses(
        (status = 204, description = "Batch deleted"),
        (status = 409, description = "Batch holds assignments", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.production.delete_batch(id).await?;
    Ok(no_content_response())
}

// ---------------------------------------------------------------------------
// Batch assignments
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/batch-assignments",
    params(BatchAssignmentFilter),
    responses((status = 200, description = "Batch assignments", body = ApiResponse<Vec<BatchAssignmentDetail>>)),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn list_batch_assignments(
    State(state): State<AppState>,
    Query(filter): Query<BatchAssignmentFilter>,
) -> ApiResult<Vec<BatchAssignmentDetail>> {
    let assignments = state
        .services
        .production
        .list_batch_assignments(&filter)
        .await?;
    Ok(Json(ApiResponse::success(assignments)))
}

/// Hand cut pieces of an order item to one or more batches
#[utoipa::path(
    post,
    path = "/api/v1/batch-assignments",
    request_body = AssignBatchesRequest,
    responses(
        (status = 201, description = "Batches assigned", body = ApiResponse<Vec<BatchAssignmentDetail>>),
        (status = 400, description = "More pieces than are cut and unassigned", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn assign_batches(
    State(state): State<AppState>,
    Json(request): Json<AssignBatchesRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<BatchAssignmentDetail>>>), ServiceError> {
    let assignments = state.services.production.assign_batches(request).await?;
    Ok(created(assignments))
}

/// Move unreviewed pieces to another batch
#[utoipa::path(
    post,
    path = "/api/v1/batch-assignments/{id}/reassign",
    params(("id" = Uuid, Path, description = "Batch assignment ID")),
    request_body = ReassignBatchRequest,
    responses(
        (status = 200, description = "Pieces moved; returns the receiving assignment", body = ApiResponse<BatchAssignmentDetail>),
        (status = 400, description = "More pieces than are left unreviewed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "production"
)]
pub async fn reassign_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReassignBatchRequest>,
) -> ApiResult<BatchAssignmentDetail> {
    let detail = state.services.production.reassign_batch(id, request).await?;
    Ok(Json(ApiResponse::success(detail)))
}
