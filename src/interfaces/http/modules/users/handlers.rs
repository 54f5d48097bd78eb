//! User management API handlers
//!
//! Thin wrappers that delegate to `UserService` from the
//! application/identity layer.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use super::dto::{ListUsersParams, PagedResponse, UserRequest, UserResponse};
use crate::application::UserService;
use crate::interfaces::http::common::{ApiPath, ApiQuery, ValidatedJson};
use crate::interfaces::http::error::{ApiResult, ErrorResponse};
use crate::interfaces::http::middleware::CurrentClaims;

/// User handler state
#[derive(Clone)]
pub struct UserHandlerState {
    pub user_service: Arc<UserService>,
}

/// Routes mounted under `/api/v1/users`
pub fn routes(state: UserHandlerState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/current", get(get_current_user))
        .route(
            "/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(ListUsersParams),
    responses(
        (status = 200, description = "One page of users", body = PagedResponse<UserResponse>),
        (status = 400, description = "Malformed query parameters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 422, description = "Unknown sort field", body = ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<UserHandlerState>,
    ApiQuery(params): ApiQuery<ListUsersParams>,
) -> ApiResult<Json<PagedResponse<UserResponse>>> {
    let result = state
        .user_service
        .list(params.page, params.size, &params.sort, &params.sort_dir)
        .await?;

    Ok(Json(PagedResponse::from_result(result)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 404, description = "No user with this id", body = ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<UserHandlerState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.user_service.get(id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/current",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The user the token belongs to", body = UserResponse),
        (status = 401, description = "Token carries no usable identity", body = ErrorResponse),
        (status = 404, description = "Token user does not exist", body = ErrorResponse)
    )
)]
pub async fn get_current_user(
    State(state): State<UserHandlerState>,
    CurrentClaims(claims): CurrentClaims,
) -> ApiResult<Json<UserResponse>> {
    let user = state.user_service.get_current(&claims).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = UserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Malformed JSON", body = ErrorResponse),
        (status = 422, description = "Validation failed or email taken", body = ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<UserHandlerState>,
    ValidatedJson(request): ValidatedJson<UserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.user_service.create(request.into_create()?).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User ID")),
    request_body = UserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "No user with this id", body = ErrorResponse),
        (status = 422, description = "Validation failed or email taken", body = ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<UserHandlerState>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(request): ValidatedJson<UserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.user_service.update(id, request.into_update()?).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "No user with this id", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<UserHandlerState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    state.user_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
