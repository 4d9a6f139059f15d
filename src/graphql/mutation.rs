use std::io::Read;

use async_graphql::{Context, Object, Upload, ID};

use crate::api::AppState;
use crate::crypto::{hash_password, verify_password};
use crate::db::{
    CommentRepository, FollowRepository, LikeRepository, NewUser, PostRepository, UserChanges,
    UserRepository,
};
use crate::error::AppError;
use crate::graphql::context::{scope, Extended};
use crate::graphql::types::{
    AuthPayload, CommentNode, CreatePostInput, CreateUserInput, LoginInput, PostNode,
    UpdateUserInput, UserNode,
};
use crate::media::MediaUpload;
use crate::validation;

/// Reads an upload off disk, checks it is an acceptable image and hands it
/// to the media store.
async fn store_image(
    ctx: &Context<'_>,
    state: &AppState,
    upload: &Upload,
    field: &str,
    folder: &str,
) -> Result<String, AppError> {
    let value = upload.value(ctx)?;
    if value.size()? > state.config.max_upload_bytes as u64 {
        return Err(AppError::invalid(
            field,
            format!("File exceeds the {} byte limit", state.config.max_upload_bytes),
        ));
    }

    let filename = value.filename.clone();
    let content_type = value.content_type.clone();

    let bytes = tokio::task::spawn_blocking(move || {
        let mut content = value.content;
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes).map(|_| bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Upload read task failed: {}", e)))??;

    let media = MediaUpload {
        filename,
        content_type,
        bytes,
    };
    media.check_image(field, state.config.max_upload_bytes)?;
    state.media.save(folder, &media).await
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn signup(
        &self,
        ctx: &Context<'_>,
        input: CreateUserInput,
    ) -> async_graphql::Result<AuthPayload> {
        let (state, _) = scope(ctx)?;
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        validation::validate_signup(&username, &email, &input.password, &input.name).extended()?;

        if UserRepository::find_by_email_or_username(&state.db, &email, &username)
            .await
            .extended()?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ))
            .extended();
        }

        let user = UserRepository::create(
            &state.db,
            NewUser {
                username,
                email,
                password_hash: hash_password(&input.password).extended()?,
                name: input.name.trim().to_string(),
            },
        )
        .await
        .extended()?;

        tracing::info!(user_id = %user.id, "👤 New user signed up");
        let token = state.tokens.issue(&user.id).extended()?;
        Ok(AuthPayload {
            token,
            user: UserNode(user),
        })
    }

    async fn login(&self, ctx: &Context<'_>, input: LoginInput) -> async_graphql::Result<AuthPayload> {
        let (state, _) = scope(ctx)?;
        let email = input.email.trim().to_lowercase();
        validation::validate_login(&email, &input.password).extended()?;

        let user = UserRepository::get_by_email(&state.db, &email)
            .await
            .extended()?
            .filter(|u| verify_password(&input.password, &u.password_hash))
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))
            .extended()?;

        let token = state.tokens.issue(&user.id).extended()?;
        Ok(AuthPayload {
            token,
            user: UserNode(user),
        })
    }

    /// Applies the non-empty fields of `input` to the viewer's profile.
    async fn update_user(
        &self,
        ctx: &Context<'_>,
        input: UpdateUserInput,
    ) -> async_graphql::Result<UserNode> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        validation::validate_user_update(input.name.as_deref(), input.bio.as_deref()).extended()?;

        let mut changes = UserChanges {
            name: non_empty(input.name).map(|n| n.trim().to_string()),
            bio: non_empty(input.bio),
            profile_picture: None,
        };
        if let Some(upload) = &input.profile_picture {
            changes.profile_picture = Some(
                store_image(ctx, state, upload, "profilePicture", "profile_pictures")
                    .await
                    .extended()?,
            );
        }

        let user = if changes.is_empty() {
            UserRepository::get_by_id(&state.db, &viewer.id).await
        } else {
            UserRepository::update(&state.db, &viewer.id, &changes).await
        }
        .extended()?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
        .extended()?;

        Ok(UserNode(user))
    }

    async fn follow_user(&self, ctx: &Context<'_>, user_id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        if viewer.id == user_id.0 {
            return Err(AppError::invalid("userId", "You cannot follow yourself")).extended();
        }

        if UserRepository::get_by_id(&state.db, &user_id).await.extended()?.is_none() {
            return Err(AppError::NotFound("User".to_string())).extended();
        }

        FollowRepository::create(&state.db, &viewer.id, &user_id)
            .await
            .extended()?;
        Ok(true)
    }

    async fn unfollow_user(&self, ctx: &Context<'_>, user_id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        FollowRepository::delete(&state.db, &viewer.id, &user_id)
            .await
            .extended()?;
        Ok(true)
    }

    async fn create_post(
        &self,
        ctx: &Context<'_>,
        input: CreatePostInput,
    ) -> async_graphql::Result<PostNode> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        validation::validate_post_content(&input.content).extended()?;

        let image = match &input.image {
            Some(upload) => Some(
                store_image(ctx, state, upload, "image", "posts")
                    .await
                    .extended()?,
            ),
            None => None,
        };

        let post = PostRepository::create(&state.db, &viewer.id, &input.content, image)
            .await
            .extended()?;
        Ok(PostNode(post))
    }

    /// Only the author may delete; likes and comments go with the post.
    async fn delete_post(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;

        let post = PostRepository::get_by_id(&state.db, &id)
            .await
            .extended()?
            .ok_or_else(|| AppError::NotFound("Post".to_string()))
            .extended()?;
        if post.author_id != viewer.id {
            return Err(AppError::Authorization("Not authorized".to_string())).extended();
        }

        PostRepository::delete_cascade(&state.db, &post.id)
            .await
            .extended()?;
        Ok(true)
    }

    async fn like_post(&self, ctx: &Context<'_>, post_id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;

        if PostRepository::get_by_id(&state.db, &post_id).await.extended()?.is_none() {
            return Err(AppError::NotFound("Post".to_string())).extended();
        }

        LikeRepository::create(&state.db, &viewer.id, &post_id)
            .await
            .extended()?;
        Ok(true)
    }

    async fn unlike_post(&self, ctx: &Context<'_>, post_id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        LikeRepository::delete(&state.db, &viewer.id, &post_id)
            .await
            .extended()?;
        Ok(true)
    }

    async fn add_comment(
        &self,
        ctx: &Context<'_>,
        post_id: ID,
        content: String,
    ) -> async_graphql::Result<CommentNode> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;
        validation::validate_comment_content(&content).extended()?;

        if PostRepository::get_by_id(&state.db, &post_id).await.extended()?.is_none() {
            return Err(AppError::NotFound("Post".to_string())).extended();
        }

        let comment = CommentRepository::create(&state.db, &viewer.id, &post_id, &content)
            .await
            .extended()?;
        Ok(CommentNode(comment))
    }

    async fn delete_comment(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let (state, request) = scope(ctx)?;
        let viewer = request.require_viewer().extended()?;

        let comment = CommentRepository::get_by_id(&state.db, &id)
            .await
            .extended()?
            .ok_or_else(|| AppError::NotFound("Comment".to_string()))
            .extended()?;
        if comment.author_id != viewer.id {
            return Err(AppError::Authorization("Not authorized".to_string())).extended();
        }

        CommentRepository::delete(&state.db, &comment).await.extended()?;
        Ok(true)
    }
}
