//! HTTP error mapping
//!
//! Every failure a handler or middleware can produce ends up as an
//! [`ApiError`], and this is the only place that turns one into a response.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::infrastructure::crypto::{InvalidTokenError, TokenError};
use crate::shared::{DomainError, FieldError};

/// Seconds a client should wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "5";

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Short summary of the error kind
    pub title: String,
    /// What went wrong with this request
    pub message: String,
    /// HTTP status code
    pub code: u16,
    /// Field-level validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Full authentication is required to access this resource")]
    MissingToken,

    #[error(transparent)]
    InvalidToken(InvalidTokenError),

    #[error("{0}")]
    Forbidden(String),

    #[error("Signing keys are temporarily unavailable")]
    KeysUnavailable,

    #[error("No resource at {0}")]
    RouteNotFound(String),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(e) => ApiError::InvalidToken(e),
            TokenError::KeysUnavailable(e) => {
                warn!(error = %e, "Cannot validate token, key set unavailable");
                ApiError::KeysUnavailable
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Malformed JSON request: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain(e) => match e {
                DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
                DomainError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DomainError::IdentityResolution(_) => StatusCode::UNAUTHORIZED,
                DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingToken | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::KeysUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn title(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::SERVICE_UNAVAILABLE => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }

    /// Client-facing message; internal details stay in the logs.
    fn message(&self) -> String {
        match self {
            ApiError::Domain(DomainError::Internal(_)) => "An unexpected error occurred".to_string(),
            ApiError::Domain(DomainError::Unavailable(_)) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            other => other.to_string(),
        }
    }

    /// RFC 6750 challenge for 401 responses.
    fn challenge(&self) -> Option<HeaderValue> {
        let challenge = match self {
            ApiError::MissingToken => "Bearer".to_string(),
            ApiError::InvalidToken(e) => format!(
                "Bearer error=\"{}\", error_description=\"{}\"",
                e.code,
                e.description.replace('"', "'")
            ),
            ApiError::Domain(DomainError::IdentityResolution(_)) => {
                "Bearer error=\"invalid_token\"".to_string()
            }
            _ => return None,
        };
        HeaderValue::from_str(&challenge)
            .ok()
            .or_else(|| Some(HeaderValue::from_static("Bearer error=\"invalid_token\"")))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if matches!(&self, ApiError::Domain(e) if e.is_transient()) {
            warn!(status = status.as_u16(), error = %self, "Request failed, retryable");
        } else if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let fields = match &self {
            ApiError::Domain(DomainError::Validation(fields)) => Some(fields.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            title: self.title().to_string(),
            message: self.message(),
            code: status.as_u16(),
            fields,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(challenge) = self.challenge() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_list_fields() {
        let response = ApiError::from(DomainError::email_taken()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["code"], 422);
        assert_eq!(body["fields"][0]["field"], "email");
        assert_eq!(body["fields"][0]["message"], "Email already exists");
    }

    #[tokio::test]
    async fn not_found_omits_fields() {
        let response = ApiError::from(DomainError::user_not_found("id", 9)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["message"], "User not found with id: 9");
        assert!(body.get("fields").is_none());
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let err = DomainError::Internal("connection reset by peer".into());
        let body = body_json(ApiError::from(err).into_response()).await;

        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "An unexpected error occurred");
    }

    #[test]
    fn invalid_token_sets_bearer_challenge() {
        let err = ApiError::InvalidToken(InvalidTokenError::new("Invalid audience"));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Bearer error=\"invalid_token\", error_description=\"Invalid audience\""
        );
    }

    #[test]
    fn unavailable_is_retryable() {
        let response = ApiError::from(DomainError::Unavailable("timeout".into())).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], RETRY_AFTER_SECS);
    }
}
