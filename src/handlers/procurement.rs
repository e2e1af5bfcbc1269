use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::common::created;
use crate::auth::AuthUser;
use crate::entities::purchase_order;
use crate::services::procurement::{
    CreatePurchaseOrderRequest, GoodsReceiptDetail, PurchaseOrderDetail, PurchaseOrderFilter,
    ReceiveGoodsRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(ListQuery, PurchaseOrderFilter),
    responses(
        (status = 200, description = "Purchase orders page", body = ApiResponse<PaginatedResponse<purchase_order::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> ApiResult<PaginatedResponse<purchase_order::Model>> {
    let query = query.normalized(&state.config);
    let page = state
        .services
        .procurement
        .list_purchase_orders(&query, &filter)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order with lines", body = ApiResponse<PurchaseOrderDetail>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderDetail> {
    let detail = state.services.procurement.get_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Goods receipt notes posted against a purchase order
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/receipts",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses((status = 200, description = "Goods receipts", body = ApiResponse<Vec<GoodsReceiptDetail>>)),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn list_goods_receipts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<GoodsReceiptDetail>> {
    let receipts = state.services.procurement.list_goods_receipts(id).await?;
    Ok(Json(ApiResponse::success(receipts)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Purchase order raised", body = ApiResponse<PurchaseOrderDetail>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    Json(request): Json<CreatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseOrderDetail>>), ServiceError> {
    let detail = state
        .services
        .procurement
        .create_purchase_order(request)
        .await?;
    Ok(created(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order cancelled", body = ApiResponse<purchase_order::Model>),
        (status = 400, description = "Goods already received", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<purchase_order::Model> {
    let cancelled = state.services.procurement.cancel_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}

/// Post a goods receipt note; accepted quantities go into stock
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receipts",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = ReceiveGoodsRequest,
    responses(
        (status = 201, description = "Goods received", body = ApiResponse<GoodsReceiptDetail>),
        (status = 400, description = "Receipt exceeds what is outstanding", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn receive_goods(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut request): Json<ReceiveGoodsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GoodsReceiptDetail>>), ServiceError> {
    if request.received_by.is_none() {
        request.received_by = Some(auth_user.display_name());
    }
    let receipt = state.services.procurement.receive_goods(id, request).await?;
    Ok(created(receipt))
}
