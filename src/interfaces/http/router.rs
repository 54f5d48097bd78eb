//! API Router with Swagger UI

use std::sync::Arc;
use std::time::Duration;

use axum::{http::Uri, middleware, Router};
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use super::error::{ApiError, ErrorResponse};
use super::middleware::{authorize, AuthState, INTERNAL_SECRET_HEADER};
use super::modules::request_id::request_id_middleware;
use super::modules::{health, internal, users};
use crate::application::UserService;
use crate::shared::FieldError;

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token issued by the auth service"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "internal_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(INTERNAL_SECRET_HEADER))),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health_check,
        // Users
        users::list_users,
        users::get_user,
        users::get_current_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Internal
        internal::find_for_login,
        internal::increment_token_version,
    ),
    components(
        schemas(
            ErrorResponse,
            FieldError,
            health::HealthResponse,
            users::UserRequest,
            users::UserResponse,
            users::PagedResponse<users::UserResponse>,
            internal::LoginLookupResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health probe"),
        (name = "Users", description = "User account management"),
        (name = "Internal", description = "Lookups for the authentication service, shared-secret protected"),
    ),
    info(
        title = "User Service API",
        version = "1.0.0",
        description = "CRUD for user accounts plus internal endpoints used by the authentication service"
    )
)]
pub struct ApiDoc;

/// Router-level settings
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub request_timeout: Duration,
    /// Mount Swagger UI at `/docs` and leave it public
    pub docs_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            docs_enabled: false,
        }
    }
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}

/// Create the API router with all routes
pub fn create_api_router(
    user_service: Arc<UserService>,
    db: DatabaseConnection,
    mut auth: AuthState,
    config: RouterConfig,
) -> Router {
    auth.docs_public = config.docs_enabled;

    let user_routes = users::routes(users::UserHandlerState {
        user_service: Arc::clone(&user_service),
    });
    let internal_routes = internal::routes(internal::InternalHandlerState { user_service });

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .merge(health::routes(health::HealthState { db }))
        .nest("/api/v1/users", user_routes)
        .nest("/internal", internal_routes);

    if config.docs_enabled {
        router = router
            .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));
    }

    router
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(auth, authorize))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
