//! User, department, designation and permission administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use uuid::Uuid;

use super::common::{created, no_content_response};
use crate::auth::{permissions::PermissionNode, AuthUser};
use crate::entities::{department, designation};
use crate::services::access::{
    CreateDesignationRequest, CreateUserRequest, DepartmentRequest, DesignationDetail,
    SetPermissionsRequest, UpdateDesignationRequest, UpdateUserRequest, UserFilter, UserProfile,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    params(ListQuery, UserFilter),
    responses(
        (status = 200, description = "Users page", body = ApiResponse<PaginatedResponse<UserProfile>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<PaginatedResponse<UserProfile>> {
    let query = query.normalized(&state.config);
    let page = state.services.access.list_users(&query, &filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User returned", body = ApiResponse<UserProfile>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserProfile> {
    let user = state.services.access.get_user(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserProfile>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserProfile>>), ServiceError> {
    let user = state.services.access.create_user(request).await?;
    Ok(created(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = ApiResponse<UserProfile>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<UserProfile> {
    let user = state.services.access.update_user(id, request).await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete your own account", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .access
        .delete_user(id, auth_user.user_id)
        .await?;
    Ok(no_content_response())
}

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/departments",
    responses((status = 200, description = "Departments by name", body = ApiResponse<Vec<department::Model>>)),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_departments(
    State(state): State<AppState>,
) -> ApiResult<Vec<department::Model>> {
    let departments = state.services.access.list_departments().await?;
    Ok(Json(ApiResponse::success(departments)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/departments",
    request_body = DepartmentRequest,
    responses(
        (status = 201, description = "Department created", body = ApiResponse<department::Model>),
        (status = 409, description = "Department name taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_department(
    State(state): State<AppState>,
    Json(request): Json<DepartmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<department::Model>>), ServiceError> {
    let department = state.services.access.create_department(request).await?;
    Ok(created(department))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/departments/{id}",
    params(("id" = Uuid, Path, description = "Department ID")),
    request_body = DepartmentRequest,
    responses(
        (status = 200, description = "Department renamed", body = ApiResponse<department::Model>),
        (status = 404, description = "Department not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DepartmentRequest>,
) -> ApiResult<department::Model> {
    let department = state.services.access.update_department(id, request).await?;
    Ok(Json(ApiResponse::success(department)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/departments/{id}",
    params(("id" = Uuid, Path, description = "Department ID")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 409, description = "Department still has designations", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_department(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.access.delete_department(id).await?;
    Ok(no_content_response())
}

// ---------------------------------------------------------------------------
// Designations and permissions
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/designations",
    responses((status = 200, description = "Designations with their permission keys", body = ApiResponse<Vec<DesignationDetail>>)),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_designations(
    State(state): State<AppState>,
) -> ApiResult<Vec<DesignationDetail>> {
    let designations = state.services.access.list_designations().await?;
    Ok(Json(ApiResponse::success(designations)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/designations/{id}",
    params(("id" = Uuid, Path, description = "Designation ID")),
    responses(
        (status = 200, description = "Designation returned", body = ApiResponse<DesignationDetail>),
        (status = 404, description = "Designation not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_designation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DesignationDetail> {
    let designation = state.services.access.get_designation(id).await?;
    Ok(Json(ApiResponse::success(designation)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/designations",
    request_body = CreateDesignationRequest,
    responses(
        (status = 201, description = "Designation created", body = ApiResponse<designation::Model>),
        (status = 404, description = "Department not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_designation(
    State(state): State<AppState>,
    Json(request): Json<CreateDesignationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<designation::Model>>), ServiceError> {
    let designation = state.services.access.create_designation(request).await?;
    Ok(created(designation))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/designations/{id}",
    params(("id" = Uuid, Path, description = "Designation ID")),
    request_body = UpdateDesignationRequest,
    responses(
        (status = 200, description = "Designation updated", body = ApiResponse<designation::Model>),
        (status = 404, description = "Designation not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_designation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDesignationRequest>,
) -> ApiResult<designation::Model> {
    let designation = state
        .services
        .access
        .update_designation(id, request)
        .await?;
    Ok(Json(ApiResponse::success(designation)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/designations/{id}",
    params(("id" = Uuid, Path, description = "Designation ID")),
    responses(
        (status = 204, description = "Designation deleted"),
        (status = 409, description = "Users still hold the designation", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_designation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.access.delete_designation(id).await?;
    Ok(no_content_response())
}

/// Replace the permission keys granted to a designation
#[utoipa::path(
    put,
    path = "/api/v1/admin/designations/{id}/permissions",
    params(("id" = Uuid, Path, description = "Designation ID")),
    request_body = SetPermissionsRequest,
    responses(
        (status = 200, description = "Permissions replaced", body = ApiResponse<DesignationDetail>),
        (status = 400, description = "Unknown permission key", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn set_designation_permissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetPermissionsRequest>,
) -> ApiResult<DesignationDetail> {
    let designation = state
        .services
        .access
        .set_designation_permissions(id, request)
        .await?;
    Ok(Json(ApiResponse::success(designation)))
}

/// The full permission tree, parents before children
#[utoipa::path(
    get,
    path = "/api/v1/admin/permissions",
    responses((status = 200, description = "Permission nodes", body = ApiResponse<Vec<PermissionNode>>)),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn permission_tree(State(state): State<AppState>) -> ApiResult<Vec<PermissionNode>> {
    let nodes = state.services.access.permission_tree().await?;
    Ok(Json(ApiResponse::success(nodes)))
}
