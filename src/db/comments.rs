use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::models::{now_millis, Comment};
use crate::error::AppError;

pub struct CommentRepository;

impl CommentRepository {
    /// Inserts the comment and bumps `posts.comments_count` atomically.
    pub async fn create(
        pool: &Pool<Sqlite>,
        author_id: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment, AppError> {
        let mut tx = pool.begin().await?;
        let now = now_millis();

        let comment = sqlx::query_as::<_, Comment>(
            r#"
INSERT INTO comments (id, content, author_id, post_id, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(content)
        .bind(author_id)
        .bind(post_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(comment)
    }

    pub async fn get_by_post(pool: &Pool<Sqlite>, post_id: &str) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE post_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(post_id)
        .fetch_all(pool)
        .await?;

        Ok(comments)
    }

    pub async fn delete(pool: &Pool<Sqlite>, comment: &Comment) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(&comment.id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            sqlx::query("UPDATE posts SET comments_count = comments_count - 1 WHERE id = ?")
                .bind(&comment.post_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
