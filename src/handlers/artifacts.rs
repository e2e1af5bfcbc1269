use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::csv_attachment;
use crate::errors::ServiceError;
use crate::services::artifacts::{inventory_import_template, order_import_template};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BundleLabelQuery {
    /// Pieces per bundle; the configured size when absent
    pub bundle_size: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/api/v1/artifacts/templates/orders",
    responses((status = 200, description = "Order import template", content_type = "text/csv")),
    security(("Bearer" = [])),
    tag = "artifacts"
)]
pub async fn order_template() -> Result<Response, ServiceError> {
    Ok(csv_attachment(order_import_template()?))
}

#[utoipa::path(
    get,
    path = "/api/v1/artifacts/templates/inventory",
    responses((status = 200, description = "Inventory import template", content_type = "text/csv")),
    security(("Bearer" = [])),
    tag = "artifacts"
)]
pub async fn inventory_template() -> Result<Response, ServiceError> {
    Ok(csv_attachment(inventory_import_template()?))
}

/// Bundle tickets for a batch assignment, one row per bundle
#[utoipa::path(
    get,
    path = "/api/v1/artifacts/bundle-labels/{id}",
    params(("id" = Uuid, Path, description = "Batch assignment ID"), BundleLabelQuery),
    responses(
        (status = 200, description = "Bundle labels", content_type = "text/csv"),
        (status = 404, description = "Batch assignment not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "artifacts"
)]
pub async fn bundle_labels(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BundleLabelQuery>,
) -> Result<Response, ServiceError> {
    let artifact = state
        .services
        .artifacts
        .bundle_labels(id, query.bundle_size)
        .await?;
    Ok(csv_attachment(artifact))
}

/// Per-master cutting sheet for an order item
#[utoipa::path(
    get,
    path = "/api/v1/artifacts/cutting-sheet/{id}",
    params(("id" = Uuid, Path, description = "Order item ID")),
    responses(
        (status = 200, description = "Cutting sheet", content_type = "text/csv"),
        (status = 404, description = "Order item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "artifacts"
)]
pub async fn cutting_sheet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let artifact = state.services.artifacts.cutting_sheet(id).await?;
    Ok(csv_attachment(artifact))
}
