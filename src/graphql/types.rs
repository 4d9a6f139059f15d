use async_graphql::{Context, InputObject, Object, SimpleObject, Upload, ID};

use crate::db::{Comment, CommentRepository, FollowRepository, LikeRepository, Post, PostRepository, User};
use crate::error::AppError;
use crate::graphql::context::{scope, Extended};

fn rfc3339(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

pub struct UserNode(pub User);

#[Object(name = "User")]
impl UserNode {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn username(&self) -> &str {
        &self.0.username
    }

    async fn email(&self) -> &str {
        &self.0.email
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn bio(&self) -> Option<&str> {
        self.0.bio.as_deref()
    }

    async fn profile_picture(&self) -> Option<&str> {
        self.0.profile_picture.as_deref()
    }

    async fn followers_count(&self) -> i64 {
        self.0.followers_count
    }

    async fn following_count(&self) -> i64 {
        self.0.following_count
    }

    async fn posts_count(&self, ctx: &Context<'_>) -> async_graphql::Result<i64> {
        let (state, _) = scope(ctx)?;
        PostRepository::count_by_author(&state.db, &self.0.id)
            .await
            .extended()
    }

    /// False for anonymous viewers and for the viewer's own profile.
    async fn is_following(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let Some(viewer_id) = request.viewer_id() else {
            return Ok(false);
        };
        if viewer_id == self.0.id {
            return Ok(false);
        }

        let follow = FollowRepository::find(&state.db, viewer_id, &self.0.id)
            .await
            .extended()?;
        Ok(follow.is_some())
    }

    async fn created_at(&self) -> String {
        rfc3339(self.0.created_at)
    }

    async fn updated_at(&self) -> String {
        rfc3339(self.0.updated_at)
    }
}

pub struct PostNode(pub Post);

#[Object(name = "Post")]
impl PostNode {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn content(&self) -> &str {
        &self.0.content
    }

    async fn author(&self, ctx: &Context<'_>) -> async_graphql::Result<UserNode> {
        let (_, request) = scope(ctx)?;
        request
            .loaders
            .users
            .load(self.0.author_id.clone())
            .await
            .and_then(|user| user.ok_or_else(|| AppError::NotFound("Author".to_string())))
            .map(UserNode)
            .extended()
    }

    async fn likes_count(&self) -> i64 {
        self.0.likes_count
    }

    async fn comments_count(&self) -> i64 {
        self.0.comments_count
    }

    async fn is_liked(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let Some(viewer_id) = request.viewer_id() else {
            return Ok(false);
        };

        let like = LikeRepository::find(&state.db, viewer_id, &self.0.id)
            .await
            .extended()?;
        Ok(like.is_some())
    }

    async fn image(&self) -> Option<&str> {
        self.0.image.as_deref()
    }

    /// Oldest first.
    async fn comments(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<CommentNode>> {
        let (state, _) = scope(ctx)?;
        let comments = CommentRepository::get_by_post(&state.db, &self.0.id)
            .await
            .extended()?;
        Ok(comments.into_iter().map(CommentNode).collect())
    }

    async fn created_at(&self) -> String {
        rfc3339(self.0.created_at)
    }

    async fn updated_at(&self) -> String {
        rfc3339(self.0.updated_at)
    }
}

pub struct CommentNode(pub Comment);

#[Object(name = "Comment")]
impl CommentNode {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn content(&self) -> &str {
        &self.0.content
    }

    async fn author(&self, ctx: &Context<'_>) -> async_graphql::Result<UserNode> {
        let (_, request) = scope(ctx)?;
        request
            .loaders
            .users
            .load(self.0.author_id.clone())
            .await
            .and_then(|user| user.ok_or_else(|| AppError::NotFound("Author".to_string())))
            .map(UserNode)
            .extended()
    }

    async fn post(&self, ctx: &Context<'_>) -> async_graphql::Result<PostNode> {
        let (_, request) = scope(ctx)?;
        request
            .loaders
            .posts
            .load(self.0.post_id.clone())
            .await
            .and_then(|post| post.ok_or_else(|| AppError::NotFound("Post".to_string())))
            .map(PostNode)
            .extended()
    }

    async fn created_at(&self) -> String {
        rfc3339(self.0.created_at)
    }

    async fn updated_at(&self) -> String {
        rfc3339(self.0.updated_at)
    }
}

#[derive(SimpleObject)]
pub struct AuthPayload {
    pub token: String,
    pub user: UserNode,
}

#[derive(SimpleObject)]
pub struct Feed {
    pub posts: Vec<PostNode>,
    pub has_more: bool,
}

#[derive(InputObject)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(InputObject)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(InputObject)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<Upload>,
}

#[derive(InputObject)]
pub struct CreatePostInput {
    pub content: String,
    pub image: Option<Upload>,
}
