use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::models::{now_millis, Like};
use crate::error::{conflict_as, AppError};

pub struct LikeRepository;

impl LikeRepository {
    pub async fn find(
        pool: &Pool<Sqlite>,
        user_id: &str,
        post_id: &str,
    ) -> Result<Option<Like>, AppError> {
        let like = sqlx::query_as::<_, Like>(
            "SELECT * FROM likes WHERE user_id = ? AND post_id = ?",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await?;

        Ok(like)
    }

    pub async fn count_for_post(pool: &Pool<Sqlite>, post_id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Inserts the like and bumps `posts.likes_count` atomically.
    pub async fn create(
        pool: &Pool<Sqlite>,
        user_id: &str,
        post_id: &str,
    ) -> Result<Like, AppError> {
        let mut tx = pool.begin().await?;

        // The insert opens the write; a duplicate surfaces as a unique violation.
        let like = sqlx::query_as::<_, Like>(
            r#"
INSERT INTO likes (id, user_id, post_id, created_at)
VALUES (?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(post_id)
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_as(e, "Already liked this post"))?;

        sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(like)
    }

    /// Returns whether a like was removed; the counter only moves if it was.
    pub async fn delete(pool: &Pool<Sqlite>, user_id: &str, post_id: &str) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            sqlx::query("UPDATE posts SET likes_count = likes_count - 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed)
    }
}
