use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;
use crate::db::{User, UserRepository};

/// The acting user for one request, `None` for anonymous callers.
#[derive(Clone, Debug, Default)]
pub struct Viewer(pub Option<User>);

/// Resolves the bearer token into a [`Viewer`] request extension.
///
/// Missing or invalid tokens do not reject the request; resolvers that need
/// a user fail on their own.
pub async fn viewer_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let viewer = resolve_viewer(&state, header.as_deref()).await;
    request.extensions_mut().insert(Viewer(viewer));

    next.run(request).await
}

/// Maps an `Authorization` header value to the user it authenticates.
pub async fn resolve_viewer(state: &AppState, header: Option<&str>) -> Option<User> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }

    let user_id = match state.tokens.verify(token) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!("Ignoring bearer token: {}", e);
            return None;
        }
    };

    match UserRepository::get_by_id(&state.db, &user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Viewer lookup failed: {}", e);
            None
        }
    }
}
