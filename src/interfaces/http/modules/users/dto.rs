//! User DTOs

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::domain::{CreateUserDto, Role, UpdateUserDto, User};
use crate::shared::{
    DomainError, FieldError, PaginatedResult, DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE,
};

/// Public projection of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name,
            email: u.email,
            role: u.role,
        }
    }
}

/// Create / update payload. Every field is required on create; on update
/// only the fields present are changed.
#[derive(Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
    #[validate(email(message = "Email should be valid"))]
    #[schema(example = "jane@example.com")]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 100, message = "Password must be 8-100 characters"))]
    #[schema(example = "s3cure-passw0rd")]
    pub password: Option<String>,
    /// SUPER_ADMIN, ADMIN or EMPLOYEE
    #[schema(example = "EMPLOYEE")]
    pub role: Option<String>,
}

impl fmt::Debug for UserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}

impl UserRequest {
    pub fn into_create(self) -> Result<CreateUserDto, DomainError> {
        let mut errors = Vec::new();

        let full_name = required(self.full_name, "fullName", "Full name is mandatory", &mut errors);
        let email = required(self.email, "email", "Email is mandatory", &mut errors);
        let password = required(self.password, "password", "Password is mandatory", &mut errors);
        let role = match self.role {
            Some(role) => parse_role(&role, &mut errors),
            None => {
                errors.push(FieldError::new("role", "Role is mandatory"));
                None
            }
        };

        match (full_name, email, password, role) {
            (Some(full_name), Some(email), Some(password), Some(role)) if errors.is_empty() => {
                Ok(CreateUserDto {
                    full_name,
                    email,
                    password,
                    role,
                })
            }
            _ => Err(DomainError::Validation(errors)),
        }
    }

    pub fn into_update(self) -> Result<UpdateUserDto, DomainError> {
        let mut errors = Vec::new();

        let full_name = not_blank(self.full_name, "fullName", "Full name is mandatory", &mut errors);
        let email = not_blank(self.email, "email", "Email is mandatory", &mut errors);
        let password = not_blank(self.password, "password", "Password is mandatory", &mut errors);
        let role = self.role.and_then(|role| parse_role(&role, &mut errors));

        if !errors.is_empty() {
            return Err(DomainError::Validation(errors));
        }
        Ok(UpdateUserDto {
            full_name,
            email,
            password,
            role,
        })
    }
}

fn required(
    value: Option<String>,
    field: &str,
    message: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(FieldError::new(field, message));
            None
        }
    }
}

/// Absent is fine, present-but-blank is not.
fn not_blank(
    value: Option<String>,
    field: &str,
    message: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(v) if v.trim().is_empty() => {
            errors.push(FieldError::new(field, message));
            None
        }
        other => other,
    }
}

fn parse_role(value: &str, errors: &mut Vec<FieldError>) -> Option<Role> {
    match value.parse() {
        Ok(role) => Some(role),
        Err(_) => {
            errors.push(FieldError::new(
                "role",
                "Role must be one of SUPER_ADMIN, ADMIN, EMPLOYEE",
            ));
            None
        }
    }
}

/// List users query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListUsersParams {
    /// Zero-based page index
    #[serde(default = "default_page")]
    pub page: i64,
    /// Page size, 1 to 100
    #[serde(default = "default_size")]
    pub size: i64,
    /// Sort field: id, fullName, email, role, tokenVersion, createdAt, updatedAt
    #[serde(default = "default_sort")]
    pub sort: String,
    /// asc or desc
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
}

fn default_page() -> i64 {
    DEFAULT_PAGE_NUMBER as i64
}
fn default_size() -> i64 {
    DEFAULT_PAGE_SIZE as i64
}
fn default_sort() -> String {
    "id".to_string()
}
fn default_sort_dir() -> String {
    "asc".to_string()
}

/// One page of results
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub content: Vec<T>,
    pub page_number: u64,
    pub page_size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> PagedResponse<T> {
    pub fn from_result<U>(result: PaginatedResult<U>) -> Self
    where
        T: From<U>,
    {
        let result = result.map(T::from);
        Self {
            content: result.items,
            page_number: result.page,
            page_size: result.size,
            total_elements: result.total,
            total_pages: result.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> UserRequest {
        UserRequest {
            full_name: Some("Jane Doe".into()),
            email: Some("jane@example.com".into()),
            password: Some("Password123".into()),
            role: Some("ADMIN".into()),
        }
    }

    #[test]
    fn create_requires_every_field() {
        let err = UserRequest::default().into_create().unwrap_err();
        let mut fields = err.fields();
        fields.sort();
        assert_eq!(fields, vec!["email", "fullName", "password", "role"]);
    }

    #[test]
    fn create_rejects_blank_and_unknown_role() {
        let request = UserRequest {
            full_name: Some("   ".into()),
            role: Some("ROOT".into()),
            ..full_request()
        };
        let err = request.into_create().unwrap_err();
        assert_eq!(err.fields(), vec!["fullName", "role"]);
    }

    #[test]
    fn create_accepts_complete_request() {
        let dto = full_request().into_create().unwrap();
        assert_eq!(dto.role, Role::Admin);
        assert_eq!(dto.email, "jane@example.com");
    }

    #[test]
    fn update_allows_partial_payload() {
        let dto = UserRequest {
            full_name: Some("Jane Smith".into()),
            ..Default::default()
        }
        .into_update()
        .unwrap();

        assert_eq!(dto.full_name.as_deref(), Some("Jane Smith"));
        assert!(dto.email.is_none() && dto.password.is_none() && dto.role.is_none());
    }

    #[test]
    fn format_rules_apply_to_present_fields() {
        let request = UserRequest {
            email: Some("not-an-email".into()),
            password: Some("short".into()),
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        let mut fields: Vec<_> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        assert_eq!(fields, vec!["email", "password"]);
    }

    #[test]
    fn response_never_contains_password() {
        let json = serde_json::to_value(UserResponse {
            id: 1,
            full_name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            role: Role::Employee,
        })
        .unwrap();

        assert_eq!(json["fullName"], "Jane Doe");
        assert_eq!(json["role"], "EMPLOYEE");
        assert!(json.get("password").is_none() && json.get("passwordHash").is_none());
    }

    #[test]
    fn list_params_default_like_the_api_contract() {
        let params: ListUsersParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.page, 0);
        assert_eq!(params.size, 15);
        assert_eq!(params.sort, "id");
        assert_eq!(params.sort_dir, "asc");
    }
}
