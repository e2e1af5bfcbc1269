use axum::{extract::State, response::Json};

use crate::auth::{permissions::SidebarEntry, AuthUser};
use crate::services::access::MeResponse;
use crate::{ApiResponse, ApiResult, AppState};

/// The caller's profile and effective permission keys
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<MeResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "me"
)]
pub async fn profile(State(state): State<AppState>, auth_user: AuthUser) -> ApiResult<MeResponse> {
    let me = state.services.access.me(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(me)))
}

/// Sidebar rows the caller may see, in display order
#[utoipa::path(
    get,
    path = "/api/v1/me/sidebar",
    responses(
        (status = 200, description = "Visible sidebar entries", body = ApiResponse<Vec<SidebarEntry>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "me"
)]
pub async fn sidebar(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<SidebarEntry>> {
    let entries = state.services.access.sidebar(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(entries)))
}
