//! Feed assembly: the viewer's following feed and the public explore feed.

use chrono::{Duration, Utc};
use sqlx::{Pool, Sqlite};

use crate::db::{FollowRepository, Post, PostRepository, User};
use crate::error::AppError;

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_OFFSET: i64 = 0;
pub const EXPLORE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub has_more: bool,
}

impl FeedPage {
    pub fn empty() -> Self {
        Self {
            posts: Vec::new(),
            has_more: false,
        }
    }

    /// Builds a page from a query that asked for `limit + 1` rows: the extra
    /// row only signals that another page exists and is dropped.
    pub fn from_overfetch(mut rows: Vec<Post>, limit: i64) -> Self {
        let has_more = rows.len() as i64 > limit;
        if has_more {
            rows.pop();
        }
        Self {
            posts: rows,
            has_more,
        }
    }
}

/// Posts from accounts the viewer follows, newest first.
pub async fn following_feed(
    pool: &Pool<Sqlite>,
    viewer: Option<&User>,
    limit: i64,
    offset: i64,
) -> Result<FeedPage, AppError> {
    let viewer = viewer.ok_or_else(AppError::unauthenticated)?;

    let following = FollowRepository::following_ids(pool, &viewer.id).await?;
    if following.is_empty() {
        return Ok(FeedPage::empty());
    }

    let rows =
        PostRepository::get_by_authors(pool, &following, limit.saturating_add(1), offset).await?;
    let page = FeedPage::from_overfetch(rows, limit);

    tracing::debug!(
        viewer = %viewer.id,
        following = following.len(),
        returned = page.posts.len(),
        has_more = page.has_more,
        "following feed assembled"
    );
    Ok(page)
}

/// Most liked posts of the trailing window, newest first among equals.
pub async fn explore_feed(
    pool: &Pool<Sqlite>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>, AppError> {
    let since = (Utc::now() - Duration::days(EXPLORE_WINDOW_DAYS)).timestamp_millis();
    let posts = PostRepository::get_popular_since(pool, since, limit, offset).await?;

    tracing::debug!(returned = posts.len(), since, "explore feed assembled");
    Ok(posts)
}
