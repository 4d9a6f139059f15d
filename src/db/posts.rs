use sqlx::{Pool, QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::db::models::{now_millis, Post};
use crate::error::AppError;

pub struct PostRepository;

impl PostRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        author_id: &str,
        content: &str,
        image: Option<String>,
    ) -> Result<Post, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = now_millis();

        let post = sqlx::query_as::<_, Post>(
            r#"
INSERT INTO posts (id, content, author_id, image, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&id)
        .bind(content)
        .bind(author_id)
        .bind(image)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(post)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(post)
    }

    pub async fn get_many(pool: &Pool<Sqlite>, ids: &[String]) -> Result<Vec<Post>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM posts WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let posts = query.build_query_as::<Post>().fetch_all(pool).await?;
        Ok(posts)
    }

    /// Newest first. Ties on `created_at` fall back to insertion order.
    pub async fn get_by_author(
        pool: &Pool<Sqlite>,
        author_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
SELECT * FROM posts
WHERE author_id = ?
ORDER BY created_at DESC, rowid DESC
LIMIT ? OFFSET ?
            "#,
        )
        .bind(author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(posts)
    }

    pub async fn get_by_authors(
        pool: &Pool<Sqlite>,
        author_ids: &[String],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM posts WHERE author_id IN (");
        let mut separated = query.separated(", ");
        for id in author_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        query.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let posts = query.build_query_as::<Post>().fetch_all(pool).await?;
        Ok(posts)
    }

    /// Posts created at or after `since`, most liked first.
    pub async fn get_popular_since(
        pool: &Pool<Sqlite>,
        since: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
SELECT * FROM posts
WHERE created_at >= ?
ORDER BY likes_count DESC, created_at DESC, rowid DESC
LIMIT ? OFFSET ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(posts)
    }

    pub async fn count_by_author(pool: &Pool<Sqlite>, author_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Deletes the post together with its likes and comments in one transaction.
    pub async fn delete_cascade(pool: &Pool<Sqlite>, id: &str) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let likes = sqlx::query("DELETE FROM likes WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let comments = sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            post_id = id,
            likes = likes.rows_affected(),
            comments = comments.rows_affected(),
            "post deleted"
        );
        Ok(())
    }
}
