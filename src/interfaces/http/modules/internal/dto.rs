//! Internal DTOs

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Role, User};

/// Credentials record the auth service verifies a login against
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginLookupResponse {
    pub id: i64,
    pub email: String,
    /// bcrypt hash of the user's password
    pub password_hash: String,
    pub role: Role,
    /// Tokens minted with an older version are stale
    pub token_version: i32,
}

impl From<User> for LoginLookupResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            password_hash: u.password_hash,
            role: u.role,
            token_version: u.token_version,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ByEmailParams {
    /// Login email, matched case-insensitively
    pub email: String,
}
