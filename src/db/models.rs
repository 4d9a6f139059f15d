use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub image: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub post_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub created_at: i64,
}

/// Fields of a new account, already validated and hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.profile_picture.is_none()
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
