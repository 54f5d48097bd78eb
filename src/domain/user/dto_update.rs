use std::fmt;

use super::Role;

/// Partial update; `None` leaves the stored value untouched.
#[derive(Clone, Default)]
pub struct UpdateUserDto {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl fmt::Debug for UpdateUserDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateUserDto")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}
