use std::sync::Arc;

use async_graphql::{UploadValue, Variables};
use serde_json::{json, Value};
use tempfile::TempDir;

use pulse_graph::{
    api::{resolve_viewer, AppState},
    config::Config,
    db::{self, CommentRepository, LikeRepository, User, UserRepository},
    graphql::{build_schema, AppSchema, RequestContext},
    loader::Loaders,
    media::LocalMediaStore,
};

struct TestApp {
    state: AppState,
    schema: AppSchema,
    media_dir: TempDir,
}

fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "integration-secret".to_string(),
        token_expiry_hours: 1,
        db_max_connections: 1,
        db_min_connections: 1,
        request_timeout_secs: 5,
        media_dir: "./media".to_string(),
        public_base_url: "http://localhost:4000".to_string(),
        max_upload_bytes: 1024 * 1024,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

async fn spawn_app_with(config: Config) -> TestApp {
    let pool = db::connect_in_memory().await.unwrap();
    let media_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(config);
    let media = Arc::new(LocalMediaStore::new(media_dir.path(), &config.public_base_url));
    let state = AppState::new(pool, media, config);
    let schema = build_schema(state.clone());
    TestApp {
        state,
        schema,
        media_dir,
    }
}

/// Writes `bytes` to a scratch file and wraps it as a multipart upload.
fn image_upload(dir: &TempDir, filename: &str, bytes: &[u8]) -> UploadValue {
    let path = dir.path().join(filename);
    std::fs::write(&path, bytes).unwrap();
    UploadValue {
        filename: filename.to_string(),
        content_type: Some("image/png".to_string()),
        content: std::fs::File::open(&path).unwrap(),
    }
}

impl TestApp {
    async fn viewer(&self, token: Option<&str>) -> Option<User> {
        match token {
            Some(token) => resolve_viewer(&self.state, Some(&format!("Bearer {token}"))).await,
            None => None,
        }
    }

    async fn execute(&self, query: &str, token: Option<&str>) -> Value {
        self.send(async_graphql::Request::new(query), token).await
    }

    async fn send(&self, request: async_graphql::Request, token: Option<&str>) -> Value {
        let viewer = self.viewer(token).await;
        let request = request.data(RequestContext::new(self.state.db.clone(), viewer));
        serde_json::to_value(self.schema.execute(request).await).unwrap()
    }

    /// Runs `query` with an image bound to the `$image` variable.
    async fn send_image(&self, query: &str, upload: UploadValue, token: &str) -> Value {
        let mut request = async_graphql::Request::new(query)
            .variables(Variables::from_json(json!({ "image": null })));
        request.set_upload("variables.image", upload);
        self.send(request, Some(token)).await
    }

    /// Reads back a stored file from its public URL.
    fn stored_file(&self, url: &str) -> Vec<u8> {
        let relative = url
            .strip_prefix("http://localhost:4000/media/")
            .unwrap_or_else(|| panic!("unexpected media url {url}"));
        std::fs::read(self.media_dir.path().join(relative)).unwrap()
    }

    /// Signs up `username` and returns `(token, user id)`.
    async fn signup(&self, username: &str) -> (String, String) {
        let body = self
            .execute(
                &format!(
                    r#"mutation {{ signup(input: {{ username: "{username}", email: "{username}@example.com", password: "secret123", name: "{username}" }}) {{ token user {{ id }} }} }}"#
                ),
                None,
            )
            .await;
        assert_no_errors(&body);
        let payload = &body["data"]["signup"];
        (
            payload["token"].as_str().unwrap().to_string(),
            payload["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn create_post(&self, token: &str, content: &str) -> String {
        let body = self
            .execute(
                &format!(r#"mutation {{ createPost(input: {{ content: "{content}" }}) {{ id }} }}"#),
                Some(token),
            )
            .await;
        assert_no_errors(&body);
        body["data"]["createPost"]["id"].as_str().unwrap().to_string()
    }
}

fn assert_no_errors(body: &Value) {
    assert!(body.get("errors").is_none(), "unexpected errors: {body}");
}

fn error_code(body: &Value) -> &str {
    body["errors"][0]["extensions"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn signup_then_login_yields_token_for_same_user() {
    let app = spawn_app().await;
    let (_, user_id) = app.signup("alice").await;

    let body = app
        .execute(
            r#"mutation { login(input: { email: "ALICE@example.com", password: "secret123" }) { token user { id } } }"#,
            None,
        )
        .await;
    assert_no_errors(&body);
    assert_eq!(body["data"]["login"]["user"]["id"], user_id.as_str());

    let token = body["data"]["login"]["token"].as_str().unwrap();
    let me = app.execute("{ me { id username } }", Some(token)).await;
    assert_eq!(me["data"]["me"]["id"], user_id.as_str());
    assert_eq!(me["data"]["me"]["username"], "alice");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let app = spawn_app().await;
    app.signup("alice").await;

    let body = app
        .execute(
            r#"mutation { login(input: { email: "alice@example.com", password: "wrong-pass" }) { token } }"#,
            None,
        )
        .await;
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
    assert_eq!(body["errors"][0]["message"], "Authentication error: Invalid credentials");
}

#[tokio::test]
async fn duplicate_signup_conflicts_without_creating_a_user() {
    let app = spawn_app().await;
    app.signup("alice").await;

    let body = app
        .execute(
            r#"mutation { signup(input: { username: "alice", email: "other@example.com", password: "secret123", name: "Other" }) { token } }"#,
            None,
        )
        .await;
    assert_eq!(error_code(&body), "CONFLICT");
    assert!(UserRepository::get_by_email(&app.state.db, "other@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn invalid_signup_reports_fields() {
    let app = spawn_app().await;

    let body = app
        .execute(
            r#"mutation { signup(input: { username: "a!", email: "nope", password: "123", name: "" }) { token } }"#,
            None,
        )
        .await;
    assert_eq!(error_code(&body), "BAD_USER_INPUT");
    let fields = body["errors"][0]["extensions"]["fields"].as_array().unwrap();
    assert!(fields.len() >= 3);
}

#[tokio::test]
async fn mutations_require_authentication() {
    let app = spawn_app().await;

    let body = app
        .execute(r#"mutation { createPost(input: { content: "hi" }) { id } }"#, None)
        .await;
    assert_eq!(error_code(&body), "UNAUTHENTICATED");

    let body = app.execute("{ me { id } }", Some("garbage")).await;
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
}

#[tokio::test]
async fn double_like_conflicts_and_counts_once() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;
    let post_id = app.create_post(&alice, "hello").await;

    let like = format!(r#"mutation {{ likePost(postId: "{post_id}") }}"#);
    assert_no_errors(&app.execute(&like, Some(&bob)).await);
    let second = app.execute(&like, Some(&bob)).await;
    assert_eq!(error_code(&second), "CONFLICT");

    let body = app
        .execute(
            &format!(r#"{{ getPost(id: "{post_id}") {{ likesCount isLiked }} }}"#),
            Some(&bob),
        )
        .await;
    assert_eq!(body["data"]["getPost"]["likesCount"], 1);
    assert_eq!(body["data"]["getPost"]["isLiked"], true);

    let unlike = format!(r#"mutation {{ unlikePost(postId: "{post_id}") }}"#);
    assert_no_errors(&app.execute(&unlike, Some(&bob)).await);
    assert_no_errors(&app.execute(&unlike, Some(&bob)).await);
    assert_eq!(LikeRepository::count_for_post(&app.state.db, &post_id).await.unwrap(), 0);

    let body = app
        .execute(&format!(r#"{{ getPost(id: "{post_id}") {{ likesCount }} }}"#), None)
        .await;
    assert_eq!(body["data"]["getPost"]["likesCount"], 0);
}

#[tokio::test]
async fn follow_updates_both_counters() {
    let app = spawn_app().await;
    let (alice, alice_id) = app.signup("alice").await;
    let (_, bob_id) = app.signup("bob").await;

    let follow = format!(r#"mutation {{ followUser(userId: "{bob_id}") }}"#);
    assert_no_errors(&app.execute(&follow, Some(&alice)).await);
    assert_eq!(error_code(&app.execute(&follow, Some(&alice)).await), "CONFLICT");

    let body = app
        .execute(
            &format!(r#"{{ getUser(id: "{bob_id}") {{ followersCount isFollowing }} }}"#),
            Some(&alice),
        )
        .await;
    assert_eq!(body["data"]["getUser"]["followersCount"], 1);
    assert_eq!(body["data"]["getUser"]["isFollowing"], true);

    let body = app
        .execute(&format!(r#"{{ getUser(id: "{alice_id}") {{ followingCount }} }}"#), None)
        .await;
    assert_eq!(body["data"]["getUser"]["followingCount"], 1);

    let self_follow = format!(r#"mutation {{ followUser(userId: "{alice_id}") }}"#);
    assert_eq!(error_code(&app.execute(&self_follow, Some(&alice)).await), "BAD_USER_INPUT");

    let unfollow = format!(r#"mutation {{ unfollowUser(userId: "{bob_id}") }}"#);
    assert_no_errors(&app.execute(&unfollow, Some(&alice)).await);
    let body = app
        .execute(&format!(r#"{{ getUser(id: "{bob_id}") {{ followersCount }} }}"#), None)
        .await;
    assert_eq!(body["data"]["getUser"]["followersCount"], 0);
}

#[tokio::test]
async fn delete_post_removes_likes_and_comments() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, bob_id) = app.signup("bob").await;
    let post_id = app.create_post(&alice, "doomed").await;

    assert_no_errors(
        &app.execute(&format!(r#"mutation {{ likePost(postId: "{post_id}") }}"#), Some(&bob))
            .await,
    );
    assert_no_errors(
        &app.execute(
            &format!(r#"mutation {{ addComment(postId: "{post_id}", content: "nice") {{ id }} }}"#),
            Some(&bob),
        )
        .await,
    );

    let delete = format!(r#"mutation {{ deletePost(id: "{post_id}") }}"#);
    assert_eq!(error_code(&app.execute(&delete, Some(&bob)).await), "FORBIDDEN");
    assert_no_errors(&app.execute(&delete, Some(&alice)).await);

    let body = app
        .execute(&format!(r#"{{ getPost(id: "{post_id}") {{ id }} }}"#), None)
        .await;
    assert!(body["data"]["getPost"].is_null());
    assert!(LikeRepository::find(&app.state.db, &bob_id, &post_id)
        .await
        .unwrap()
        .is_none());
    assert!(CommentRepository::get_by_post(&app.state.db, &post_id)
        .await
        .unwrap()
        .is_empty());

    assert_eq!(error_code(&app.execute(&delete, Some(&alice)).await), "NOT_FOUND");
}

#[tokio::test]
async fn only_the_author_deletes_a_comment() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;
    let post_id = app.create_post(&alice, "post").await;

    let body = app
        .execute(
            &format!(r#"mutation {{ addComment(postId: "{post_id}", content: "first") {{ id author {{ username }} post {{ id }} }} }}"#),
            Some(&bob),
        )
        .await;
    assert_no_errors(&body);
    assert_eq!(body["data"]["addComment"]["author"]["username"], "bob");
    assert_eq!(body["data"]["addComment"]["post"]["id"], post_id.as_str());
    let comment_id = body["data"]["addComment"]["id"].as_str().unwrap().to_string();

    let delete = format!(r#"mutation {{ deleteComment(id: "{comment_id}") }}"#);
    assert_eq!(error_code(&app.execute(&delete, Some(&alice)).await), "FORBIDDEN");
    assert_no_errors(&app.execute(&delete, Some(&bob)).await);

    let body = app
        .execute(
            &format!(r#"{{ getPost(id: "{post_id}") {{ commentsCount comments {{ id }} }} }}"#),
            None,
        )
        .await;
    assert_eq!(body["data"]["getPost"]["commentsCount"], 0);
    assert_eq!(body["data"]["getPost"]["comments"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn following_feed_is_empty_without_follows() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;
    app.create_post(&bob, "unseen").await;

    let body = app
        .execute("{ getFeed { hasMore posts { id } } }", Some(&alice))
        .await;
    assert_no_errors(&body);
    assert_eq!(body["data"]["getFeed"]["posts"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["getFeed"]["hasMore"], false);

    let anonymous = app.execute("{ getFeed { hasMore } }", None).await;
    assert_eq!(error_code(&anonymous), "UNAUTHENTICATED");
}

#[tokio::test]
async fn following_feed_pages_newest_first() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, bob_id) = app.signup("bob").await;
    for i in 0..5 {
        app.create_post(&bob, &format!("post {i}")).await;
    }
    assert_no_errors(
        &app.execute(&format!(r#"mutation {{ followUser(userId: "{bob_id}") }}"#), Some(&alice))
            .await,
    );

    let body = app
        .execute("{ getFeed(limit: 2) { hasMore posts { content author { username } } } }", Some(&alice))
        .await;
    assert_no_errors(&body);
    let posts = body["data"]["getFeed"]["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["content"], "post 4");
    assert_eq!(posts[1]["content"], "post 3");
    assert_eq!(posts[0]["author"]["username"], "bob");
    assert_eq!(body["data"]["getFeed"]["hasMore"], true);

    let body = app
        .execute("{ getFeed(limit: 2, offset: 4) { hasMore posts { content } } }", Some(&alice))
        .await;
    assert_eq!(body["data"]["getFeed"]["posts"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["getFeed"]["hasMore"], false);

    let body = app
        .execute("{ getFeed(limit: 10) { hasMore posts { id } } }", Some(&alice))
        .await;
    assert_eq!(body["data"]["getFeed"]["posts"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"]["getFeed"]["hasMore"], false);
}

#[tokio::test]
async fn explore_ranks_recent_posts_by_likes() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;
    let quiet = app.create_post(&alice, "quiet").await;
    let popular = app.create_post(&alice, "popular").await;
    let stale = app.create_post(&alice, "stale").await;

    for token in [&alice, &bob] {
        assert_no_errors(
            &app.execute(&format!(r#"mutation {{ likePost(postId: "{popular}") }}"#), Some(token))
                .await,
        );
        assert_no_errors(
            &app.execute(&format!(r#"mutation {{ likePost(postId: "{stale}") }}"#), Some(token))
                .await,
        );
    }

    let eight_days_ago = chrono::Utc::now().timestamp_millis() - 8 * 24 * 60 * 60 * 1000;
    sqlx::query("UPDATE posts SET created_at = ? WHERE id = ?")
        .bind(eight_days_ago)
        .bind(&stale)
        .execute(&app.state.db)
        .await
        .unwrap();

    let body = app.execute("{ getExploreFeed { id likesCount } }", None).await;
    assert_no_errors(&body);
    let ids: Vec<&str> = body["data"]["getExploreFeed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![popular.as_str(), quiet.as_str()]);
}

#[tokio::test]
async fn user_lookup_and_search() {
    let app = spawn_app().await;
    let (alice, alice_id) = app.signup("alice").await;
    app.signup("alicia").await;
    app.signup("bob").await;
    app.create_post(&alice, "one").await;

    let body = app
        .execute(r#"{ getUserByUsername(username: "alice") { id postsCount } }"#, None)
        .await;
    assert_eq!(body["data"]["getUserByUsername"]["id"], alice_id.as_str());
    assert_eq!(body["data"]["getUserByUsername"]["postsCount"], 1);

    let body = app.execute(r#"{ searchUsers(query: "ALI") { username } }"#, None).await;
    let names: Vec<&str> = body["data"]["searchUsers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "alicia"]);

    let body = app
        .execute(&format!(r#"{{ getUserPosts(userId: "{alice_id}") {{ content }} }}"#), None)
        .await;
    assert_eq!(body["data"]["getUserPosts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn update_user_applies_only_given_fields() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;

    let body = app
        .execute(
            r#"mutation { updateUser(input: { bio: "hello there" }) { name bio } }"#,
            Some(&alice),
        )
        .await;
    assert_no_errors(&body);
    assert_eq!(body["data"]["updateUser"]["name"], "alice");
    assert_eq!(body["data"]["updateUser"]["bio"], "hello there");

    let long_bio = "x".repeat(161);
    let body = app
        .execute(
            &format!(r#"mutation {{ updateUser(input: {{ bio: "{long_bio}" }}) {{ bio }} }}"#),
            Some(&alice),
        )
        .await;
    assert_eq!(error_code(&body), "BAD_USER_INPUT");
}

#[tokio::test]
async fn explore_breaks_like_ties_by_recency() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;
    let top = app.create_post(&alice, "top").await;
    let older = app.create_post(&alice, "older").await;
    let newer = app.create_post(&alice, "newer").await;

    for (post, tokens) in [
        (&top, vec![&alice, &bob]),
        (&older, vec![&alice]),
        (&newer, vec![&bob]),
    ] {
        for token in tokens {
            assert_no_errors(
                &app.execute(&format!(r#"mutation {{ likePost(postId: "{post}") }}"#), Some(token))
                    .await,
            );
        }
    }

    let now = chrono::Utc::now().timestamp_millis();
    for (post, hours) in [(&top, 3), (&older, 2), (&newer, 1)] {
        sqlx::query("UPDATE posts SET created_at = ? WHERE id = ?")
            .bind(now - hours * 60 * 60 * 1000)
            .bind(post)
            .execute(&app.state.db)
            .await
            .unwrap();
    }

    let body = app.execute("{ getExploreFeed { id likesCount } }", None).await;
    assert_no_errors(&body);
    let ids: Vec<&str> = body["data"]["getExploreFeed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![top.as_str(), newer.as_str(), older.as_str()]);
}

#[tokio::test]
async fn feed_authors_resolve_in_one_batch() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let (bob, bob_id) = app.signup("bob").await;
    let (carol, carol_id) = app.signup("carol").await;
    for i in 0..3 {
        app.create_post(&bob, &format!("bob {i}")).await;
    }
    for i in 0..2 {
        app.create_post(&carol, &format!("carol {i}")).await;
    }
    for id in [&bob_id, &carol_id] {
        assert_no_errors(
            &app.execute(&format!(r#"mutation {{ followUser(userId: "{id}") }}"#), Some(&alice))
                .await,
        );
    }

    let loaders = Arc::new(Loaders::new(app.state.db.clone()));
    let viewer = app.viewer(Some(&alice)).await;
    let request = async_graphql::Request::new("{ getFeed { posts { author { username } } } }")
        .data(RequestContext::with_loaders(viewer, loaders.clone()));
    let body = serde_json::to_value(app.schema.execute(request).await).unwrap();
    assert_no_errors(&body);

    assert_eq!(body["data"]["getFeed"]["posts"].as_array().unwrap().len(), 5);
    assert_eq!(loaders.users.dispatched(), 1);
    assert_eq!(loaders.users.cached().await, 2);
}

#[tokio::test]
async fn create_post_stores_uploaded_image() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let scratch = tempfile::tempdir().unwrap();

    let body = app
        .send_image(
            r#"mutation($image: Upload) { createPost(input: { content: "pic", image: $image }) { image } }"#,
            image_upload(&scratch, "cat.png", b"\x89PNG fake"),
            &alice,
        )
        .await;
    assert_no_errors(&body);

    let url = body["data"]["createPost"]["image"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:4000/media/posts/"));
    assert!(url.ends_with(".png"));
    assert_eq!(app.stored_file(url), b"\x89PNG fake");
}

#[tokio::test]
async fn update_user_stores_profile_picture() {
    let app = spawn_app().await;
    let (alice, _) = app.signup("alice").await;
    let scratch = tempfile::tempdir().unwrap();

    let body = app
        .send_image(
            r#"mutation($image: Upload) { updateUser(input: { profilePicture: $image }) { name profilePicture } }"#,
            image_upload(&scratch, "me.png", b"avatar"),
            &alice,
        )
        .await;
    assert_no_errors(&body);

    assert_eq!(body["data"]["updateUser"]["name"], "alice");
    let url = body["data"]["updateUser"]["profilePicture"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:4000/media/profile_pictures/"));
    assert_eq!(app.stored_file(url), b"avatar");
}

#[tokio::test]
async fn oversized_image_is_rejected_without_creating_a_post() {
    let mut config = test_config();
    config.max_upload_bytes = 16;
    let app = spawn_app_with(config).await;
    let (alice, alice_id) = app.signup("alice").await;
    let scratch = tempfile::tempdir().unwrap();

    let body = app
        .send_image(
            r#"mutation($image: Upload) { createPost(input: { content: "big", image: $image }) { id } }"#,
            image_upload(&scratch, "big.png", &[7u8; 64]),
            &alice,
        )
        .await;
    assert_eq!(error_code(&body), "BAD_USER_INPUT");
    assert_eq!(body["errors"][0]["extensions"]["fields"][0]["field"], "image");

    let body = app
        .execute(&format!(r#"{{ getUserPosts(userId: "{alice_id}") {{ id }} }}"#), None)
        .await;
    assert_eq!(body["data"]["getUserPosts"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn query_depth_is_limited_below_the_root_field() {
    let app = spawn_app().await;

    let five_below_root = app
        .execute(
            r#"{ getPost(id: "x") { comments { post { comments { author { id } } } } } }"#,
            None,
        )
        .await;
    assert_no_errors(&five_below_root);

    let six_below_root = app
        .execute(
            r#"{ getPost(id: "x") { comments { post { comments { post { comments { id } } } } } } }"#,
            None,
        )
        .await;
    assert!(six_below_root["errors"]
        .as_array()
        .is_some_and(|e| !e.is_empty()));
}
