use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::db::{Post, PostRepository, User, UserRepository};
use crate::error::AppError;
use crate::loader::{BatchFn, BatchLoader};

pub struct UserBatch {
    pool: Pool<Sqlite>,
}

#[async_trait]
impl BatchFn for UserBatch {
    type Key = String;
    type Value = User;
    const NAME: &'static str = "users";

    async fn fetch(&self, keys: &[String]) -> Result<HashMap<String, User>, AppError> {
        let users = UserRepository::get_many(&self.pool, keys).await?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }
}

pub struct PostBatch {
    pool: Pool<Sqlite>,
}

#[async_trait]
impl BatchFn for PostBatch {
    type Key = String;
    type Value = Post;
    const NAME: &'static str = "posts";

    async fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Post>, AppError> {
        let posts = PostRepository::get_many(&self.pool, keys).await?;
        Ok(posts.into_iter().map(|p| (p.id.clone(), p)).collect())
    }
}

/// Every loader one request needs. Built per request, never shared.
pub struct Loaders {
    pub users: BatchLoader<UserBatch>,
    pub posts: BatchLoader<PostBatch>,
}

impl Loaders {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            users: BatchLoader::new(UserBatch { pool: pool.clone() }),
            posts: BatchLoader::new(PostBatch { pool }),
        }
    }
}
