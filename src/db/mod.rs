pub mod models;
pub mod users;
pub mod posts;
pub mod comments;
pub mod likes;
pub mod follows;

pub use models::{Comment, Follow, Like, NewUser, Post, User, UserChanges};
pub use users::UserRepository;
pub use posts::PostRepository;
pub use comments::CommentRepository;
pub use likes::LikeRepository;
pub use follows::FollowRepository;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::error::AppError;

/// Opens the pool described by `config` and applies pending migrations.
pub async fn connect(config: &Config) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// The connection is never recycled, since dropping it would drop the data.
pub async fn connect_in_memory() -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
