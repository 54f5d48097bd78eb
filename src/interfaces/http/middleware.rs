//! Request authorization middleware for Axum
//!
//! Every request falls into one trust class:
//! - public: health probe and (when enabled) the API docs
//! - internal: `/internal/**`, authenticated by a shared secret header
//! - authenticated: everything else, requires a valid bearer token
//!
//! The resolved [`Principal`] (and for end users the [`CurrentClaims`]) is
//! attached to the request extensions for the handlers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::error::ApiError;
use crate::infrastructure::crypto::{InvalidTokenError, TokenClaims, TokenValidator};

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";
pub const INTERNAL_PATH_PREFIX: &str = "/internal/";
pub const INTERNAL_AUTHORITY: &str = "ROLE_INTERNAL";
pub const HEALTH_PATH: &str = "/actuator/health";

const DOCS_PATH: &str = "/docs";
const OPENAPI_PATH_PREFIX: &str = "/api-doc/";

/// Authorization state shared by every request
#[derive(Clone)]
pub struct AuthState {
    pub validator: TokenValidator,
    pub internal_secret: Arc<str>,
    /// Serve the OpenAPI document and Swagger UI without a token
    pub docs_public: bool,
}

/// How much a request must prove before it reaches a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustClass {
    Public,
    Internal,
    Authenticated,
}

impl AuthState {
    pub fn new(validator: TokenValidator, internal_secret: impl Into<Arc<str>>) -> Self {
        Self {
            validator,
            internal_secret: internal_secret.into(),
            docs_public: false,
        }
    }

    pub fn classify(&self, path: &str) -> TrustClass {
        if path.starts_with(INTERNAL_PATH_PREFIX) {
            TrustClass::Internal
        } else if path == HEALTH_PATH || (self.docs_public && is_docs_path(path)) {
            TrustClass::Public
        } else {
            TrustClass::Authenticated
        }
    }
}

fn is_docs_path(path: &str) -> bool {
    path == DOCS_PATH || path.starts_with("/docs/") || path.starts_with(OPENAPI_PATH_PREFIX)
}

/// Who is calling
#[derive(Clone, Debug)]
pub enum Principal {
    /// Another backend service holding the shared secret
    InternalService,
    EndUser(Arc<TokenClaims>),
}

impl Principal {
    pub fn authority(&self) -> Option<&'static str> {
        match self {
            Principal::InternalService => Some(INTERNAL_AUTHORITY),
            Principal::EndUser(_) => None,
        }
    }
}

/// Validated claims of the calling end user.
#[derive(Clone, Debug)]
pub struct CurrentClaims(pub Arc<TokenClaims>);

impl<S> FromRequestParts<S> for CurrentClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentClaims>()
            .cloned()
            .ok_or(ApiError::MissingToken)
    }
}

/// Authorization middleware
pub async fn authorize(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_owned();

    match auth.classify(&path) {
        TrustClass::Public => {}
        TrustClass::Internal => {
            let authorized = request
                .headers()
                .get(INTERNAL_SECRET_HEADER)
                .is_some_and(|v| constant_time_eq(v.as_bytes(), auth.internal_secret.as_bytes()));
            if !authorized {
                warn!(path = %path, "Rejected internal call without a valid secret");
                return Err(ApiError::Forbidden("Access denied".to_string()));
            }
            request.extensions_mut().insert(Principal::InternalService);
        }
        TrustClass::Authenticated => {
            let token = bearer_token(request.headers())?;
            let claims = Arc::new(auth.validator.validate(&token).await?);
            debug!(sub = ?claims.sub, path = %path, "Bearer token accepted");
            request
                .extensions_mut()
                .insert(CurrentClaims(Arc::clone(&claims)));
            request.extensions_mut().insert(Principal::EndUser(claims));
        }
    }

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(ApiError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::InvalidToken(InvalidTokenError::new(
            "Bearer token is malformed",
        )));
    }
    Ok(token.to_string())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
