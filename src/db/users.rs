use sqlx::{Pool, QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::db::models::{now_millis, NewUser, User, UserChanges};
use crate::error::AppError;

pub struct UserRepository;

impl UserRepository {
    pub async fn create(pool: &Pool<Sqlite>, new_user: NewUser) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = now_millis();

        let user = sqlx::query_as::<_, User>(
            r#"
INSERT INTO users (id, username, email, password_hash, name, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// One `id IN (...)` round trip; rows come back in store order.
    pub async fn get_many(pool: &Pool<Sqlite>, ids: &[String]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let users = query.build_query_as::<User>().fetch_all(pool).await?;
        Ok(users)
    }

    pub async fn get_by_username(
        pool: &Pool<Sqlite>,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn get_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn find_by_email_or_username(
        pool: &Pool<Sqlite>,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = ? OR username = ? LIMIT 1",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Case-insensitive substring match on username or display name.
    pub async fn search(
        pool: &Pool<Sqlite>,
        term: &str,
        limit: i64,
    ) -> Result<Vec<User>, AppError> {
        let pattern = format!("%{}%", escape_like(term));

        let users = sqlx::query_as::<_, User>(
            r#"
SELECT * FROM users
WHERE username LIKE ?1 ESCAPE '\' OR name LIKE ?1 ESCAPE '\'
ORDER BY username ASC
LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
UPDATE users
SET name = COALESCE(?, name),
    bio = COALESCE(?, bio),
    profile_picture = COALESCE(?, profile_picture),
    updated_at = ?
WHERE id = ?
RETURNING *
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.bio)
        .bind(&changes.profile_picture)
        .bind(now_millis())
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
