//! User management service: application-layer orchestration
//!
//! All user-related business logic lives here.
//! HTTP handlers should be thin wrappers that delegate to this service.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::resolver::{resolve_identity, ResolvedIdentity};
use crate::domain::{
    normalize_email, CreateUserDto, DomainError, DomainResult, NewUser, StoreError,
    UpdateUserDto, User, UserSortField, UserStore,
};
use crate::infrastructure::crypto::{PasswordHasher, TokenClaims};
use crate::shared::{PageRequest, PaginatedResult, SortDirection};

/// Orchestrates every user-management use-case.
///
/// Holds the store behind a trait object so tests and the server can
/// plug in different backends.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    // ── Queries ─────────────────────────────────────────────────

    pub async fn get(&self, id: i64) -> DomainResult<User> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::user_not_found("id", id))
    }

    pub async fn get_by_email(&self, email: &str) -> DomainResult<User> {
        let email = normalize_email(email);
        self.store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| DomainError::user_not_found("email", email))
    }

    /// One page of users. Unknown sort directions sort ascending; unknown
    /// sort fields are rejected.
    pub async fn list(
        &self,
        page: i64,
        size: i64,
        sort: &str,
        sort_dir: &str,
    ) -> DomainResult<PaginatedResult<User>> {
        let field = UserSortField::parse(sort).ok_or_else(|| {
            DomainError::invalid_field("sort", format!("Cannot sort by '{sort}'"))
        })?;
        let request = PageRequest::new(page, size, field, SortDirection::parse_lenient(sort_dir));

        let result = self.store.find_page(&request).await?;
        debug!(
            page = result.page,
            size = result.size,
            total = result.total,
            "Listed users"
        );
        Ok(result)
    }

    /// Credentials lookup for the auth service.
    pub async fn find_for_login(&self, email: &str) -> DomainResult<User> {
        self.get_by_email(email).await
    }

    /// The user a validated access token speaks for.
    pub async fn get_current(&self, claims: &TokenClaims) -> DomainResult<User> {
        let identity = resolve_identity(claims).map_err(|e| {
            warn!(sub = ?claims.sub, "Cannot resolve current user from token");
            DomainError::IdentityResolution(e.to_string())
        })?;

        match identity {
            ResolvedIdentity::UserId(id) => self.get(id).await,
            ResolvedIdentity::Email(email) => self.get_by_email(&email).await,
        }
    }

    // ── Commands ────────────────────────────────────────────────

    pub async fn create(&self, dto: CreateUserDto) -> DomainResult<User> {
        let email = normalize_email(&dto.email);

        if self.store.exists_by_email(&email).await? {
            warn!(email = %email, "Rejected user creation, email already exists");
            return Err(DomainError::email_taken());
        }

        let password_hash = self.hasher.hash(dto.password).await?;

        let user = self
            .store
            .insert(NewUser {
                full_name: dto.full_name,
                email,
                password_hash,
                token_version: 0,
                role: dto.role,
            })
            .await
            .map_err(|e| email_conflict("create", e))?;

        info!(user_id = user.id, authority = %user.role.authority(), "User created");
        Ok(user)
    }

    /// Overlay the fields present in `dto` onto the stored user.
    pub async fn update(&self, id: i64, dto: UpdateUserDto) -> DomainResult<User> {
        let mut user = self.get(id).await?;

        if let Some(email) = dto.email {
            let email = normalize_email(&email);
            if email != user.email {
                if self.store.exists_by_email(&email).await? {
                    warn!(user_id = id, email = %email, "Rejected email change, already taken");
                    return Err(DomainError::email_taken());
                }
                user.email = email;
            }
        }
        if let Some(full_name) = dto.full_name {
            user.full_name = full_name;
        }
        if let Some(password) = dto.password {
            user.password_hash = self.hasher.hash(password).await?;
        }
        if let Some(role) = dto.role {
            user.role = role;
        }

        let updated = self
            .store
            .update(user)
            .await
            .map_err(|e| email_conflict("update", e))?
            .ok_or_else(|| DomainError::user_not_found("id", id))?;

        info!(user_id = id, "User updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> DomainResult<()> {
        if !self.store.delete_by_id(id).await? {
            return Err(DomainError::user_not_found("id", id));
        }
        info!(user_id = id, "User deleted");
        Ok(())
    }

    /// Invalidate every token issued for the user so far.
    pub async fn increment_token_version(&self, id: i64) -> DomainResult<i32> {
        let version = self
            .store
            .increment_token_version(id)
            .await?
            .ok_or_else(|| DomainError::user_not_found("id", id))?;

        info!(user_id = id, token_version = version, "Token version incremented");
        Ok(version)
    }
}

/// A concurrent writer can claim the email between the existence check and
/// the write; the unique index catches it.
fn email_conflict(op: &'static str, e: StoreError) -> DomainError {
    if let StoreError::UniqueViolation(field) = &e {
        warn!(op, field = *field, "Unique constraint rejected user write");
    }
    e.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::{Role, StoreResult};
    use crate::infrastructure::crypto::verify_password;
    use crate::test_support::memory_store;

    async fn service() -> UserService {
        UserService::new(memory_store().await, PasswordHasher::new(4))
    }

    fn create_dto(full_name: &str, email: &str) -> CreateUserDto {
        CreateUserDto {
            full_name: full_name.to_string(),
            email: email.to_string(),
            password: "Password123".to_string(),
            role: Role::Employee,
        }
    }

    fn assert_not_found(err: DomainError, id: i64) {
        assert!(matches!(err, DomainError::NotFound { .. }), "got {err:?}");
        assert!(err.to_string().contains(&id.to_string()));
    }

    /// Store that never sees an existing email, as if a concurrent request
    /// inserted it after the check.
    struct BlindStore(Arc<dyn UserStore>);

    #[async_trait]
    impl UserStore for BlindStore {
        async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.0.find_by_email(email).await
        }
        async fn exists_by_email(&self, _email: &str) -> StoreResult<bool> {
            Ok(false)
        }
        async fn insert(&self, user: NewUser) -> StoreResult<User> {
            self.0.insert(user).await
        }
        async fn update(&self, user: User) -> StoreResult<Option<User>> {
            self.0.update(user).await
        }
        async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
            self.0.delete_by_id(id).await
        }
        async fn increment_token_version(&self, id: i64) -> StoreResult<Option<i32>> {
            self.0.increment_token_version(id).await
        }
        async fn find_page(
            &self,
            request: &PageRequest<UserSortField>,
        ) -> StoreResult<PaginatedResult<User>> {
            self.0.find_page(request).await
        }
    }

    #[tokio::test]
    async fn create_hashes_password_and_normalizes_email() {
        let service = service().await;

        let user = service
            .create(create_dto("Jane Doe", "  Jane@Example.COM "))
            .await
            .unwrap();

        assert_eq!(user.email, "jane@example.com");
        assert_eq!(user.token_version, 0);
        assert_ne!(user.password_hash, "Password123");
        assert!(verify_password("Password123", &user.password_hash).unwrap());

        let fetched = service.get(user.id).await.unwrap();
        assert_eq!(fetched.full_name, "Jane Doe");
        assert_eq!(fetched.role, Role::Employee);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let service = service().await;
        service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let err = service
            .create(create_dto("Jane Again", "JANE@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.fields(), vec!["email"]);
        let page = service.list(0, 15, "id", "asc").await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn racing_insert_is_reported_as_taken_email() {
        let service = UserService::new(
            Arc::new(BlindStore(memory_store().await)),
            PasswordHasher::new(4),
        );
        service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let err = service
            .create(create_dto("Jane Again", "jane@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err.fields(), vec!["email"]);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let service = service().await;

        assert_not_found(service.get(404).await.unwrap_err(), 404);
        assert_not_found(
            service.update(405, UpdateUserDto::default()).await.unwrap_err(),
            405,
        );
        assert_not_found(service.delete(406).await.unwrap_err(), 406);
        assert_not_found(service.increment_token_version(407).await.unwrap_err(), 407);
    }

    #[tokio::test]
    async fn update_overlays_present_fields_only() {
        let service = service().await;
        let user = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let updated = service
            .update(
                user.id,
                UpdateUserDto {
                    full_name: Some("Jane Smith".into()),
                    password: Some("NewPassword456".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Jane Smith");
        assert_eq!(updated.email, "jane@example.com");
        assert_eq!(updated.role, Role::Employee);
        assert!(verify_password("NewPassword456", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn update_to_taken_email_leaves_record_untouched() {
        let service = service().await;
        service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();
        let john = service.create(create_dto("John Doe", "john@example.com")).await.unwrap();

        let err = service
            .update(
                john.id,
                UpdateUserDto {
                    full_name: Some("Johnny".into()),
                    email: Some("Jane@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.fields(), vec!["email"]);
        let stored = service.get(john.id).await.unwrap();
        assert_eq!(stored.full_name, "John Doe");
        assert_eq!(stored.email, "john@example.com");
    }

    #[tokio::test]
    async fn update_keeping_own_email_is_allowed() {
        let service = service().await;
        let jane = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let updated = service
            .update(
                jane.id,
                UpdateUserDto {
                    email: Some("JANE@example.com".into()),
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Admin);
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let service = service().await;
        let user = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        service.delete(user.id).await.unwrap();

        assert_not_found(service.get(user.id).await.unwrap_err(), user.id);
    }

    #[tokio::test]
    async fn list_pages_and_sorts() {
        let service = service().await;
        for i in 0..7 {
            service
                .create(create_dto(&format!("User {i}"), &format!("user{i}@example.com")))
                .await
                .unwrap();
        }

        let page = service.list(0, 3, "id", "asc").await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);

        let desc = service.list(0, 7, "fullName", "DESC").await.unwrap();
        let names: Vec<_> = desc.items.iter().map(|u| u.full_name.clone()).collect();
        assert!(names.windows(2).all(|w| w[0] >= w[1]));

        let odd = service.list(0, 7, "email", "sideways").await.unwrap();
        let emails: Vec<_> = odd.items.iter().map(|u| u.email.clone()).collect();
        assert!(emails.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn list_far_past_the_end_is_empty() {
        let service = service().await;
        service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let page = service.list(i64::MAX, 100, "id", "asc").await.unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.page, i64::MAX as u64);
    }

    #[tokio::test]
    async fn list_rejects_unknown_sort_field() {
        let service = service().await;

        let err = service.list(0, 15, "passwordHash", "asc").await.unwrap_err();

        assert_eq!(err.fields(), vec!["sort"]);
    }

    #[tokio::test]
    async fn token_version_counts_increments() {
        let service = service().await;
        let user = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        for _ in 0..4 {
            service.increment_token_version(user.id).await.unwrap();
        }

        assert_eq!(service.get(user.id).await.unwrap().token_version, 4);
    }

    #[tokio::test]
    async fn find_for_login_normalizes_email() {
        let service = service().await;
        let user = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let found = service.find_for_login(" JANE@EXAMPLE.com").await.unwrap();
        assert_eq!(found.id, user.id);

        let err = service.find_for_login("nobody@example.com").await.unwrap_err();
        assert!(err.to_string().contains("nobody@example.com"));
    }

    #[tokio::test]
    async fn current_user_resolves_by_uid_or_email() {
        let service = service().await;
        let user = service.create(create_dto("Jane Doe", "jane@example.com")).await.unwrap();

        let by_uid = TokenClaims {
            uid: Some(user.id),
            ..Default::default()
        };
        assert_eq!(service.get_current(&by_uid).await.unwrap().id, user.id);

        let by_email = TokenClaims {
            email: Some("Jane@Example.com".into()),
            ..Default::default()
        };
        assert_eq!(service.get_current(&by_email).await.unwrap().id, user.id);

        let anonymous = TokenClaims {
            sub: Some("service-account".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.get_current(&anonymous).await.unwrap_err(),
            DomainError::IdentityResolution(_)
        ));
    }
}
