use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::entities::tutorial;
use crate::services::tutorials::{CreateTutorialRequest, TutorialFilter, UpdateTutorialRequest};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/tutorials",
    params(ListQuery, TutorialFilter),
    responses((status = 200, description = "Tutorials page", body = ApiResponse<PaginatedResponse<tutorial::Model>>)),
    security(("Bearer" = [])),
    tag = "tutorials"
)]
pub async fn list_tutorials(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<TutorialFilter>,
) -> ApiResult<PaginatedResponse<tutorial::Model>> {
    let query = query.normalized(&state.config);
    let page = state.services.tutorials.list_tutorials(&query, &filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tutorials/{id}",
    params(("id" = Uuid, Path, description = "Tutorial ID")),
    responses(
        (status = 200, description = "Tutorial returned", body = ApiResponse<tutorial::Model>),
        (status = 404, description = "Tutorial not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tutorials"
)]
pub async fn get_tutorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<tutorial::Model> {
    let tutorial = state.services.tutorials.get_tutorial(id).await?;
    Ok(Json(ApiResponse::success(tutorial)))
}

/// Create a tutorial, optionally linked to an uploaded video
#[utoipa::path(
    post,
    path = "/api/v1/tutorials",
    request_body = CreateTutorialRequest,
    responses(
        (status = 201, description = "Tutorial created", body = ApiResponse<tutorial::Model>),
        (status = 400, description = "Linked file is not a video", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tutorials"
)]
pub async fn create_tutorial(
    State(state): State<AppState>,
    Json(request): Json<CreateTutorialRequest>,
) -> Result<(StatusCode, Json<ApiResponse<tutorial::Model>>), ServiceError> {
    let tutorial = state.services.tutorials.create_tutorial(request).await?;
    Ok(created(tutorial))
}

#[utoipa::path(
    put,
    path = "/api/v1/tutorials/{id}",
    params(("id" = Uuid, Path, description = "Tutorial ID")),
    request_body = UpdateTutorialRequest,
    responses(
        (status = 200, description = "Tutorial updated", body = ApiResponse<tutorial::Model>),
        (status = 404, description = "Tutorial not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tutorials"
)]
pub async fn update_tutorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTutorialRequest>,
) -> ApiResult<tutorial::Model> {
    let tutorial = state.services.tutorials.update_tutorial(id, request).await?;
    Ok(Json(ApiResponse::success(tutorial)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tutorials/{id}",
    params(("id" = Uuid, Path, description = "Tutorial ID")),
    responses(
        (status = 204, description = "Tutorial deleted; the video file is kept"),
        (status = 404, description = "Tutorial not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tutorials"
)]
pub async fn delete_tutorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.tutorials.delete_tutorial(id).await?;
    Ok(no_content_response())
}
