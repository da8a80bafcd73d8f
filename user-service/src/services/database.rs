//! User store: the persistence seam and its implementations.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::User;
use crate::services::ServiceError;

/// Columns a listing may be ordered by. Anything else falls back to the
/// default so user input never reaches the ORDER BY clause raw.
const ORDERABLE_COLUMNS: &[&str] = &[
    "created_at",
    "updated_at",
    "email",
    "username",
    "fullname",
    "role",
    "last_login",
];

const DEFAULT_ORDER_COLUMN: &str = "created_at";

/// Text columns a filter may contains-match against.
const FILTERABLE_TEXT_COLUMNS: &[&str] = &["email", "username", "fullname"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// One listing filter: contains-match for text fields, equality for role.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserFilter {
    pub field: String,
    pub value: String,
}

/// Listing parameters: search, pagination, ordering, filters. Search and
/// filters combine into one any-of predicate set.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: u64,
    pub limit: u64,
    pub order_by: Option<String>,
    pub order_direction: OrderDirection,
    pub filters: Vec<UserFilter>,
}

impl ListQuery {
    fn order_column(&self) -> &str {
        match &self.order_by {
            Some(col) if ORDERABLE_COLUMNS.contains(&col.as_str()) => col.as_str(),
            _ => DEFAULT_ORDER_COLUMN,
        }
    }

    fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.limit
    }
}

/// Fields an update may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<String>,
    pub fullname: Option<String>,
    pub avatar: Option<String>,
}

impl UserPatch {
    fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.fullname.is_none()
            && self.avatar.is_none()
    }
}

/// Persistence interface for user records. Uniqueness of email and username
/// is ultimately the store's job; the pre-insert count checks only produce
/// friendlier errors for the common case.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<i64, ServiceError>;

    async fn create_user(&self, user: User) -> Result<User, ServiceError>;

    /// Look up by email (case-insensitive) or exact username.
    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, ServiceError>;

    async fn update_last_login(&self, id: Uuid) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn count_by_id(&self, id: Uuid) -> Result<i64, ServiceError>;

    /// Count users other than `exclude` holding this email.
    async fn count_by_email(&self, exclude: Uuid, email: &str) -> Result<i64, ServiceError>;

    /// Count users other than `exclude` holding this username.
    async fn count_by_username(&self, exclude: Uuid, username: &str)
        -> Result<i64, ServiceError>;

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> Result<User, ServiceError>;

    async fn find_all_with_pagination(&self, query: &ListQuery)
        -> Result<Vec<User>, ServiceError>;

    async fn count_search(&self, search: Option<&str>) -> Result<i64, ServiceError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append the any-of predicate list shared by listing and counting:
    /// search matches email/username/fullname, filters contains-match text
    /// fields and equality-match role.
    fn push_predicates<'a>(
        builder: &mut QueryBuilder<'a, Postgres>,
        search: Option<&'a str>,
        filters: &'a [UserFilter],
    ) -> bool {
        let usable_filters: Vec<&UserFilter> = filters
            .iter()
            .filter(|f| {
                FILTERABLE_TEXT_COLUMNS.contains(&f.field.as_str()) || f.field == "role"
            })
            .collect();

        if search.is_none() && usable_filters.is_empty() {
            return false;
        }

        builder.push(" WHERE (");
        let mut first = true;

        if let Some(term) = search {
            let pattern = format!("%{}%", term);
            for column in FILTERABLE_TEXT_COLUMNS {
                if !first {
                    builder.push(" OR ");
                }
                first = false;
                builder.push(*column);
                builder.push(" ILIKE ");
                builder.push_bind(pattern.clone());
            }
        }

        for filter in usable_filters {
            if !first {
                builder.push(" OR ");
            }
            first = false;
            if filter.field == "role" {
                builder.push("role = ");
                builder.push_bind(filter.value.clone());
            } else {
                builder.push(filter.field.as_str());
                builder.push(" ILIKE ");
                builder.push_bind(format!("%{}%", filter.value));
            }
        }

        builder.push(")");
        true
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn count_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE LOWER(email) = LOWER($1) OR username = $2",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_user(&self, user: User) -> Result<User, ServiceError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users
                (id, email, username, password_hash, role, fullname, avatar,
                 created_at, updated_at, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.fullname)
        .bind(&user.avatar)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) OR username = $1 LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET last_login = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn count_by_id(&self, id: Uuid) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_email(&self, exclude: Uuid, email: &str) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE id <> $1 AND LOWER(email) = LOWER($2)",
        )
        .bind(exclude)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_by_username(
        &self,
        exclude: Uuid,
        username: &str,
    ) -> Result<i64, ServiceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id <> $1 AND username = $2")
                .bind(exclude)
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> Result<User, ServiceError> {
        if patch.is_empty() {
            return self.find_by_id(id).await?.ok_or(ServiceError::UserNotFound);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE users SET updated_at = ");
        builder.push_bind(Utc::now());

        if let Some(email) = &patch.email {
            builder.push(", email = ");
            builder.push_bind(email.clone());
        }
        if let Some(username) = &patch.username {
            builder.push(", username = ");
            builder.push_bind(username.clone());
        }
        if let Some(password_hash) = &patch.password_hash {
            builder.push(", password_hash = ");
            builder.push_bind(password_hash.clone());
        }
        if let Some(role) = &patch.role {
            builder.push(", role = ");
            builder.push_bind(role.clone());
        }
        if let Some(fullname) = &patch.fullname {
            builder.push(", fullname = ");
            builder.push_bind(fullname.clone());
        }
        if let Some(avatar) = &patch.avatar {
            builder.push(", avatar = ");
            builder.push_bind(avatar.clone());
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING *");

        let updated = builder
            .build_query_as::<User>()
            .fetch_one(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn find_all_with_pagination(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<User>, ServiceError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM users");
        Self::push_predicates(&mut builder, query.search.as_deref(), &query.filters);

        builder.push(" ORDER BY ");
        builder.push(query.order_column());
        builder.push(match query.order_direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });

        builder.push(" LIMIT ");
        builder.push_bind(query.limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset() as i64);

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn count_search(&self, search: Option<&str>) -> Result<i64, ServiceError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::push_predicates(&mut builder, search, &[]);

        let row: PgRow = builder.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0).map_err(ServiceError::from)?;
        Ok(count)
    }
}

/// In-memory store for tests. Mirrors the Postgres behavior closely enough
/// to exercise the services without a database, including the unique
/// email/username constraint.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(user: &User, search: Option<&str>, filters: &[UserFilter]) -> bool {
        let mut any_predicate = false;

        if let Some(term) = search {
            any_predicate = true;
            let term = term.to_lowercase();
            if user.email.to_lowercase().contains(&term)
                || user.username.to_lowercase().contains(&term)
                || user
                    .fullname
                    .as_deref()
                    .map(|f| f.to_lowercase().contains(&term))
                    .unwrap_or(false)
            {
                return true;
            }
        }

        for filter in filters {
            let hit = match filter.field.as_str() {
                "email" => user
                    .email
                    .to_lowercase()
                    .contains(&filter.value.to_lowercase()),
                "username" => user
                    .username
                    .to_lowercase()
                    .contains(&filter.value.to_lowercase()),
                "fullname" => user
                    .fullname
                    .as_deref()
                    .map(|f| f.to_lowercase().contains(&filter.value.to_lowercase()))
                    .unwrap_or(false),
                "role" => user.role == filter.value,
                _ => continue,
            };
            any_predicate = true;
            if hit {
                return true;
            }
        }

        !any_predicate
    }

    fn order_key(user: &User, column: &str) -> String {
        match column {
            "email" => user.email.clone(),
            "username" => user.username.clone(),
            "fullname" => user.fullname.clone().unwrap_or_default(),
            "role" => user.role.clone(),
            "updated_at" => user.updated_at.to_rfc3339(),
            "last_login" => user
                .last_login
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            _ => user.created_at.to_rfc3339(),
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn count_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<i64, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .filter(|u| u.email.eq_ignore_ascii_case(email) || u.username == username)
            .count() as i64)
    }

    async fn create_user(&self, user: User) -> Result<User, ServiceError> {
        let mut users = self.users.write().expect("user store lock poisoned");
        if users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email) || u.username == user.username)
        {
            return Err(ServiceError::UserAlreadyExists);
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(identifier) || u.username == identifier)
            .cloned())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut users = self.users.write().expect("user store lock poisoned");
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            let now = Utc::now();
            user.last_login = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn count_by_id(&self, id: Uuid) -> Result<i64, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users.iter().filter(|u| u.id == id).count() as i64)
    }

    async fn count_by_email(&self, exclude: Uuid, email: &str) -> Result<i64, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .filter(|u| u.id != exclude && u.email.eq_ignore_ascii_case(email))
            .count() as i64)
    }

    async fn count_by_username(
        &self,
        exclude: Uuid,
        username: &str,
    ) -> Result<i64, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .filter(|u| u.id != exclude && u.username == username)
            .count() as i64)
    }

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> Result<User, ServiceError> {
        let mut users = self.users.write().expect("user store lock poisoned");
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(ServiceError::UserNotFound)?;

        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(fullname) = patch.fullname {
            user.fullname = Some(fullname);
        }
        if let Some(avatar) = patch.avatar {
            user.avatar = Some(avatar);
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn find_all_with_pagination(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<User>, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        let mut selected: Vec<User> = users
            .iter()
            .filter(|u| Self::matches(u, query.search.as_deref(), &query.filters))
            .cloned()
            .collect();

        let column = query.order_column().to_string();
        selected.sort_by(|a, b| {
            let ordering = Self::order_key(a, &column).cmp(&Self::order_key(b, &column));
            match query.order_direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        });

        Ok(selected
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn count_search(&self, search: Option<&str>) -> Result<i64, ServiceError> {
        let users = self.users.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .filter(|u| Self::matches(u, search, &[]))
            .count() as i64)
    }
}
