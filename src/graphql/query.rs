use async_graphql::{Context, Object, ID};

use crate::db::{PostRepository, UserRepository};
use crate::feed::{self, DEFAULT_LIMIT, DEFAULT_OFFSET};
use crate::graphql::context::{scope, Extended};
use crate::graphql::types::{Feed, PostNode, UserNode};

pub const SEARCH_LIMIT: i64 = 10;

fn page(limit: Option<i32>, offset: Option<i32>) -> (i64, i64) {
    (
        limit.map(i64::from).unwrap_or(DEFAULT_LIMIT),
        offset.map(i64::from).unwrap_or(DEFAULT_OFFSET),
    )
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The authenticated viewer.
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<UserNode>> {
        let (_, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        let user = request.loaders.users.load(viewer.id.clone()).await.extended()?;
        Ok(user.map(UserNode))
    }

    async fn get_user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<UserNode>> {
        let (_, request) = scope(ctx)?;
        let user = request.loaders.users.load(id.0).await.extended()?;
        Ok(user.map(UserNode))
    }

    async fn get_user_by_username(
        &self,
        ctx: &Context<'_>,
        username: String,
    ) -> async_graphql::Result<Option<UserNode>> {
        let (state, _) = scope(ctx)?;
        let user = UserRepository::get_by_username(&state.db, &username)
            .await
            .extended()?;
        Ok(user.map(UserNode))
    }

    /// Up to ten users whose username or name contains `query`, ignoring case.
    async fn search_users(
        &self,
        ctx: &Context<'_>,
        query: String,
    ) -> async_graphql::Result<Vec<UserNode>> {
        let (state, _) = scope(ctx)?;
        let users = UserRepository::search(&state.db, &query, SEARCH_LIMIT)
            .await
            .extended()?;
        Ok(users.into_iter().map(UserNode).collect())
    }

    async fn get_post(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<PostNode>> {
        let (_, request) = scope(ctx)?;
        let post = request.loaders.posts.load(id.0).await.extended()?;
        Ok(post.map(PostNode))
    }

    async fn get_user_posts(
        &self,
        ctx: &Context<'_>,
        user_id: ID,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<PostNode>> {
        let (state, _) = scope(ctx)?;
        let (limit, offset) = page(limit, offset);
        let posts = PostRepository::get_by_author(&state.db, &user_id, limit, offset)
            .await
            .extended()?;
        Ok(posts.into_iter().map(PostNode).collect())
    }

    /// Posts from followed accounts, newest first.
    async fn get_feed(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Option<Feed>> {
        let (state, request) = scope(ctx)?;
        let (limit, offset) = page(limit, offset);
        let page = feed::following_feed(&state.db, request.viewer.as_ref(), limit, offset)
            .await
            .extended()?;

        Ok(Some(Feed {
            posts: page.posts.into_iter().map(PostNode).collect(),
            has_more: page.has_more,
        }))
    }

    /// Most liked posts of the last seven days.
    async fn get_explore_feed(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<PostNode>> {
        let (state, _) = scope(ctx)?;
        let (limit, offset) = page(limit, offset);
        let posts = feed::explore_feed(&state.db, limit, offset).await.extended()?;
        Ok(posts.into_iter().map(PostNode).collect())
    }
}
