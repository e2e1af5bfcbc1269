use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::common::created;
use crate::entities::invoice;
use crate::services::invoicing::{CreateInvoiceRequest, InvoiceDetail, InvoiceFilter};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(ListQuery, InvoiceFilter),
    responses((status = 200, description = "Invoices page", body = ApiResponse<PaginatedResponse<invoice::Model>>)),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<InvoiceFilter>,
) -> ApiResult<PaginatedResponse<invoice::Model>> {
    let query = query.normalized(&state.config);
    let page = state.services.invoices.list_invoices(&query, &filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice with lines", body = ApiResponse<InvoiceDetail>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceDetail> {
    let detail = state.services.invoices.get_invoice(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Draft an invoice from an order's items
#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Draft invoice created", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Order cannot be invoiced", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already has an invoice", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceDetail>>), ServiceError> {
    let detail = state.services.invoices.create_invoice(request).await?;
    Ok(created(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/issue",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice issued", body = ApiResponse<invoice::Model>),
        (status = 400, description = "Invoice is not a draft", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn issue_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<invoice::Model> {
    let invoice = state.services.invoices.issue_invoice(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/pay",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice marked paid", body = ApiResponse<invoice::Model>),
        (status = 400, description = "Invoice is not issued", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<invoice::Model> {
    let invoice = state.services.invoices.mark_paid(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/cancel",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice cancelled", body = ApiResponse<invoice::Model>),
        (status = 400, description = "Paid invoices cannot be cancelled", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<invoice::Model> {
    let invoice = state.services.invoices.cancel_invoice(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}
