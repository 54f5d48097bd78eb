//! User entity for database

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

use crate::domain::Role;

/// Role as stored in the `role` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum UserRole {
    #[sea_orm(string_value = "SUPER_ADMIN")]
    SuperAdmin,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "EMPLOYEE")]
    Employee,
}

impl From<Role> for UserRole {
    fn from(role: Role) -> Self {
        match role {
            Role::SuperAdmin => UserRole::SuperAdmin,
            Role::Admin => UserRole::Admin,
            Role::Employee => UserRole::Employee,
        }
    }
}

impl From<UserRole> for Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::SuperAdmin => Role::SuperAdmin,
            UserRole::Admin => Role::Admin,
            UserRole::Employee => Role::Employee,
        }
    }
}

/// User model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub full_name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub token_version: i32,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::domain::User {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            email: model.email,
            password_hash: model.password_hash,
            token_version: model.token_version,
            role: model.role.into(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
