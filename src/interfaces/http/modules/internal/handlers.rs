//! Internal API handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::debug;

use super::dto::{ByEmailParams, LoginLookupResponse};
use crate::application::UserService;
use crate::interfaces::http::common::{ApiPath, ApiQuery};
use crate::interfaces::http::error::{ApiResult, ErrorResponse};
use crate::interfaces::http::middleware::Principal;

#[derive(Clone)]
pub struct InternalHandlerState {
    pub user_service: Arc<UserService>,
}

/// Routes mounted under `/internal`
pub fn routes(state: InternalHandlerState) -> Router {
    Router::new()
        .route("/users/by-email", get(find_for_login))
        .route(
            "/users/{id}/token-version/increment",
            post(increment_token_version),
        )
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/internal/users/by-email",
    tag = "Internal",
    security(("internal_secret" = [])),
    params(ByEmailParams),
    responses(
        (status = 200, description = "Login record", body = LoginLookupResponse),
        (status = 403, description = "Missing or wrong internal secret", body = ErrorResponse),
        (status = 404, description = "No user with this email", body = ErrorResponse)
    )
)]
pub async fn find_for_login(
    State(state): State<InternalHandlerState>,
    Extension(principal): Extension<Principal>,
    ApiQuery(params): ApiQuery<ByEmailParams>,
) -> ApiResult<Json<LoginLookupResponse>> {
    debug!(authority = ?principal.authority(), "Login lookup");
    let user = state.user_service.find_for_login(&params.email).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/internal/users/{id}/token-version/increment",
    tag = "Internal",
    security(("internal_secret" = [])),
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Token version incremented"),
        (status = 403, description = "Missing or wrong internal secret", body = ErrorResponse),
        (status = 404, description = "No user with this id", body = ErrorResponse)
    )
)]
pub async fn increment_token_version(
    State(state): State<InternalHandlerState>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    debug!(authority = ?principal.authority(), user_id = id, "Token version increment");
    state.user_service.increment_token_version(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
