use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::entities::{inventory_item, stock_movement};
use crate::services::inventory::{
    AdjustStockRequest, CreateInventoryItemRequest, ImportSummary, InventoryFilter,
    StockAdjustment, UpdateInventoryItemRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List inventory items
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(ListQuery, InventoryFilter),
    responses(
        (status = 200, description = "Inventory page", body = ApiResponse<PaginatedResponse<inventory_item::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<InventoryFilter>,
) -> ApiResult<PaginatedResponse<inventory_item::Model>> {
    let query = query.normalized(&state.config);
    let page = state.services.inventory.list_items(&query, &filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Item returned", body = ApiResponse<inventory_item::Model>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_item::Model> {
    let item = state.services.inventory.get_item(id).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Stock ledger of one item, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}/movements",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Stock movements", body = ApiResponse<Vec<stock_movement::Model>>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let movements = state.services.inventory.list_movements(id).await?;
    Ok(Json(ApiResponse::success(movements)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    request_body = CreateInventoryItemRequest,
    responses(
        (status = 201, description = "Item created", body = ApiResponse<inventory_item::Model>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<CreateInventoryItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<inventory_item::Model>>), ServiceError> {
    let item = state.services.inventory.create_item(request).await?;
    Ok(created(item))
}

/// Bulk create items from a CSV body; all rows or none
#[utoipa::path(
    post,
    path = "/api/v1/inventory/import",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 201, description = "Items imported", body = ApiResponse<ImportSummary>),
        (status = 400, description = "A row failed validation", body = crate::errors::ErrorResponse),
        (status = 409, description = "A SKU already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn import_items(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<ImportSummary>>), ServiceError> {
    let summary = state.services.inventory.import_items_csv(&body).await?;
    Ok(created(summary))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = UpdateInventoryItemRequest,
    responses(
        (status = 200, description = "Item updated", body = ApiResponse<inventory_item::Model>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateInventoryItemRequest>,
) -> ApiResult<inventory_item::Model> {
    let item = state.services.inventory.update_item(id, request).await?;
    Ok(Json(ApiResponse::success(item)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 409, description = "Item is on purchase orders", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.inventory.delete_item(id).await?;
    Ok(no_content_response())
}

/// Manual stock correction with a reason
#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/adjust",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<StockAdjustment>),
        (status = 422, description = "Stock would go negative", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdjustStockRequest>,
) -> ApiResult<StockAdjustment> {
    let adjustment = state.services.inventory.adjust_stock(id, request).await?;
    Ok(Json(ApiResponse::success(adjustment)))
}
