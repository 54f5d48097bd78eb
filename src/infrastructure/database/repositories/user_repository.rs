//! SeaORM implementation of UserStore

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Unchanged},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
};
use tracing::{debug, warn};

use crate::domain::{NewUser, StoreError, StoreResult, User, UserSortField, UserStore};
use crate::infrastructure::database::entities::user;
use crate::shared::{PageRequest, PaginatedResult, SortDirection};

pub struct SeaOrmUserStore {
    db: DatabaseConnection,
    query_timeout: Duration,
}

impl SeaOrmUserStore {
    pub fn new(db: DatabaseConnection, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    /// Run a store call under the query timeout.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(|e| db_err(op, e)),
            Err(_) => {
                warn!(op, timeout = ?self.query_timeout, "User store call timed out");
                Err(StoreError::Timeout(self.query_timeout))
            }
        }
    }
}

fn db_err(op: &'static str, e: DbErr) -> StoreError {
    match e.sql_err() {
        // email is the only unique column besides the key
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::UniqueViolation("email"),
        _ => {
            warn!(op, error = %e, "User store call failed");
            StoreError::Database(e.to_string())
        }
    }
}

fn sort_column(field: UserSortField) -> user::Column {
    match field {
        UserSortField::Id => user::Column::Id,
        UserSortField::FullName => user::Column::FullName,
        UserSortField::Email => user::Column::Email,
        UserSortField::Role => user::Column::Role,
        UserSortField::TokenVersion => user::Column::TokenVersion,
        UserSortField::CreatedAt => user::Column::CreatedAt,
        UserSortField::UpdatedAt => user::Column::UpdatedAt,
    }
}

fn sort_order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

#[async_trait]
impl UserStore for SeaOrmUserStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let model = self
            .bounded("find_by_id", user::Entity::find_by_id(id).one(&self.db))
            .await?;
        Ok(model.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db);
        let model = self.bounded("find_by_email", query).await?;
        Ok(model.map(User::from))
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        let query = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .count(&self.db);
        Ok(self.bounded("exists_by_email", query).await? > 0)
    }

    async fn insert(&self, new_user: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let model = user::ActiveModel {
            id: NotSet,
            full_name: Set(new_user.full_name),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            token_version: Set(new_user.token_version),
            role: Set(new_user.role.into()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = self.bounded("insert", model.insert(&self.db)).await?;
        debug!(user_id = inserted.id, "User row inserted");
        Ok(inserted.into())
    }

    async fn update(&self, user: User) -> StoreResult<Option<User>> {
        // token_version is only ever changed by increment_token_version
        let model = user::ActiveModel {
            id: Unchanged(user.id),
            full_name: Set(user.full_name),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            token_version: NotSet,
            role: Set(user.role.into()),
            created_at: NotSet,
            updated_at: Set(Utc::now()),
        };

        let updated = self
            .bounded("update", async {
                match model.update(&self.db).await {
                    Ok(updated) => Ok(Some(updated)),
                    Err(DbErr::RecordNotUpdated) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(updated.map(User::from))
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
        let result = self
            .bounded("delete_by_id", user::Entity::delete_by_id(id).exec(&self.db))
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn increment_token_version(&self, id: i64) -> StoreResult<Option<i32>> {
        let query = user::Entity::update_many()
            .col_expr(
                user::Column::TokenVersion,
                Expr::col(user::Column::TokenVersion).add(1),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(id))
            .exec(&self.db);

        let result = self.bounded("increment_token_version", query).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        Ok(self.find_by_id(id).await?.map(|user| user.token_version))
    }

    async fn find_page(
        &self,
        request: &PageRequest<UserSortField>,
    ) -> StoreResult<PaginatedResult<User>> {
        let order = sort_order(request.direction);
        let mut query = user::Entity::find().order_by(sort_column(request.sort), order.clone());
        if request.sort != UserSortField::Id {
            // stable order between equal sort keys
            query = query.order_by(user::Column::Id, order);
        }

        let total = self
            .bounded("count", query.clone().count(&self.db))
            .await?;

        let models = self
            .bounded(
                "find_page",
                query
                    .offset(request.offset())
                    .limit(request.size)
                    .all(&self.db),
            )
            .await?;

        let items = models.into_iter().map(User::from).collect();
        Ok(PaginatedResult::new(items, total, request.page, request.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    use crate::domain::Role;
    use crate::infrastructure::{init_database, DatabaseConfig};
    use crate::interfaces::http::ApiError;
    use crate::shared::DomainError;
    use crate::test_support::{memory_store, new_user};

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let store = memory_store().await;

        let user = store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();

        assert!(user.id > 0);
        assert_eq!(user.token_version, 0);
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(store.find_by_id(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            store.find_by_email("jane@example.com").await.unwrap(),
            Some(user)
        );
        assert!(store.exists_by_email("jane@example.com").await.unwrap());
        assert!(!store.exists_by_email("john@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = memory_store().await;
        store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();

        let err = store
            .insert(new_user("Jane Again", "jane@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation("email")));
    }

    #[tokio::test]
    async fn update_persists_fields_and_keeps_token_version() {
        let store = memory_store().await;
        let user = store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();
        store.increment_token_version(user.id).await.unwrap();

        let mut changed = user.clone();
        changed.full_name = "Jane Smith".into();
        changed.role = Role::Admin;
        let updated = store.update(changed).await.unwrap().unwrap();

        assert_eq!(updated.full_name, "Jane Smith");
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.token_version, 1);
        assert_eq!(updated.created_at, user.created_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_returns_none() {
        let store = memory_store().await;
        let mut ghost = store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();
        ghost.id = 999;

        assert!(store.update(ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_onto_taken_email_is_a_unique_violation() {
        let store = memory_store().await;
        store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();
        let mut john = store.insert(new_user("John Doe", "john@example.com")).await.unwrap();

        john.email = "jane@example.com".into();
        let err = store.update(john).await.unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation("email")));
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let store = memory_store().await;
        let user = store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();

        assert!(store.delete_by_id(user.id).await.unwrap());
        assert!(!store.delete_by_id(user.id).await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_counts_every_call() {
        let store = memory_store().await;
        let user = store.insert(new_user("Jane Doe", "jane@example.com")).await.unwrap();

        for expected in 1..=5 {
            assert_eq!(
                store.increment_token_version(user.id).await.unwrap(),
                Some(expected)
            );
        }
        assert_eq!(store.increment_token_version(404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stalled_call_times_out_as_service_unavailable() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let timeout = Duration::from_millis(20);
        let store = SeaOrmUserStore::new(db, timeout);

        let err = store
            .bounded("stall", std::future::pending::<Result<(), DbErr>>())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == timeout), "got {err:?}");

        let response = ApiError::from(DomainError::from(err)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn find_page_slices_and_sorts() {
        let store = memory_store().await;
        for name in ["Carol", "Alice", "Eve", "Bob", "Dave"] {
            let email = format!("{}@example.com", name.to_lowercase());
            store.insert(new_user(name, &email)).await.unwrap();
        }

        let request = PageRequest::new(0, 2, UserSortField::FullName, SortDirection::Asc);
        let page = store.find_page(&request).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);

        let request = PageRequest::new(2, 2, UserSortField::FullName, SortDirection::Asc);
        let last = store.find_page(&request).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].full_name, "Eve");

        let request = PageRequest::new(0, 10, UserSortField::Email, SortDirection::Desc);
        let desc = store.find_page(&request).await.unwrap();
        let emails: Vec<_> = desc.items.iter().map(|u| u.email.clone()).collect();
        let mut sorted = emails.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(emails, sorted);
    }
}
