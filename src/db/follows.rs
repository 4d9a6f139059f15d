use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::models::{now_millis, Follow};
use crate::error::{conflict_as, AppError};

pub struct FollowRepository;

impl FollowRepository {
    pub async fn find(
        pool: &Pool<Sqlite>,
        follower_id: &str,
        following_id: &str,
    ) -> Result<Option<Follow>, AppError> {
        let follow = sqlx::query_as::<_, Follow>(
            "SELECT * FROM follows WHERE follower_id = ? AND following_id = ?",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(pool)
        .await?;

        Ok(follow)
    }

    /// Ids of every account `follower_id` follows.
    pub async fn following_ids(pool: &Pool<Sqlite>, follower_id: &str) -> Result<Vec<String>, AppError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT following_id FROM follows WHERE follower_id = ? ORDER BY created_at ASC",
        )
        .bind(follower_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }

    /// Inserts the edge and adjusts both users' counters in one transaction.
    pub async fn create(
        pool: &Pool<Sqlite>,
        follower_id: &str,
        following_id: &str,
    ) -> Result<Follow, AppError> {
        let mut tx = pool.begin().await?;

        let follow = sqlx::query_as::<_, Follow>(
            r#"
INSERT INTO follows (id, follower_id, following_id, created_at)
VALUES (?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(follower_id)
        .bind(following_id)
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_as(e, "Already following this user"))?;

        sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
            .bind(follower_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET followers_count = followers_count + 1 WHERE id = ?")
            .bind(following_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(follow)
    }

    pub async fn delete(
        pool: &Pool<Sqlite>,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            sqlx::query("UPDATE users SET following_count = following_count - 1 WHERE id = ?")
                .bind(follower_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE users SET followers_count = followers_count - 1 WHERE id = ?")
                .bind(following_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed)
    }
}
