use std::fmt;

use super::Role;

/// Everything needed to create a user. The password is still plain text here.
#[derive(Clone)]
pub struct CreateUserDto {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for CreateUserDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserDto")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
