use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::entities::order;
use crate::services::orders::{
    CreateOrderRequest, OrderDetail, OrderFilter, OrderItemDetail, OrderItemInput, StageCount,
    UpdateOrderRequest, UpdateOrderStatusRequest, UpdateSizesRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListQuery, OrderFilter),
    responses(
        (status = 200, description = "Orders page", body = ApiResponse<PaginatedResponse<order::Model>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let query = query.normalized(&state.config);
    let page = state.services.orders.list_orders(&query, &filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Create an order with its items and size distributions
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let detail = state.services.orders.create_order(request).await?;
    Ok(created(detail))
}

/// Get an order with items, sizes and customer name
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order returned", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let detail = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<order::Model>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> ApiResult<order::Model> {
    let updated = state.services.orders.update_order(id, request).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Move an order to another production stage
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<order::Model>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<order::Model> {
    let updated = state.services.orders.update_status(id, request.status).await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/items",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = OrderItemInput,
    responses(
        (status = 201, description = "Item added", body = ApiResponse<OrderItemDetail>),
        (status = 400, description = "Invalid item", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn add_order_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<OrderItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderItemDetail>>), ServiceError> {
    let item = state.services.orders.add_item(id, input).await?;
    Ok(created(item))
}

/// Replace an item's size distribution
#[utoipa::path(
    put,
    path = "/api/v1/order-items/{id}/sizes",
    params(("id" = Uuid, Path, description = "Order item ID")),
    request_body = UpdateSizesRequest,
    responses(
        (status = 200, description = "Sizes replaced", body = ApiResponse<OrderItemDetail>),
        (status = 400, description = "Sizes below what cutting already holds", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_item_sizes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSizesRequest>,
) -> ApiResult<OrderItemDetail> {
    let item = state
        .services
        .orders
        .update_size_distribution(id, request.sizes)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 409, description = "Order has production or billing records", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(no_content_response())
}

/// Order counts per status for the dashboard
#[utoipa::path(
    get,
    path = "/api/v1/orders/summary/stages",
    responses((status = 200, description = "Counts per stage", body = ApiResponse<Vec<StageCount>>)),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn stage_summary(State(state): State<AppState>) -> ApiResult<Vec<StageCount>> {
    let counts = state.services.orders.stage_summary().await?;
    Ok(Json(ApiResponse::success(counts)))
}
