//! `Path` and `Query` extractors whose rejections use the API error body

use axum::extract::{FromRequestParts, Path, Query};

use crate::interfaces::http::error::ApiError;

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
