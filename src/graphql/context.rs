use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions};
use sqlx::{Pool, Sqlite};

use crate::api::AppState;
use crate::db::User;
use crate::error::AppError;
use crate::loader::Loaders;

/// Everything scoped to a single GraphQL request: who is asking and the
/// loader caches. Attached as request data and dropped with the request.
pub struct RequestContext {
    pub viewer: Option<User>,
    pub loaders: Arc<Loaders>,
}

impl RequestContext {
    pub fn new(pool: Pool<Sqlite>, viewer: Option<User>) -> Self {
        Self::with_loaders(viewer, Arc::new(Loaders::new(pool)))
    }

    /// Lets the caller keep a handle on the loaders after execution.
    pub fn with_loaders(viewer: Option<User>, loaders: Arc<Loaders>) -> Self {
        Self { viewer, loaders }
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer.as_ref().map(|u| u.id.as_str())
    }

    pub fn require_viewer(&self) -> Result<&User, AppError> {
        self.viewer.as_ref().ok_or_else(AppError::unauthenticated)
    }
}

/// Shared state plus the per-request context.
pub(crate) fn scope<'a>(
    ctx: &Context<'a>,
) -> async_graphql::Result<(&'a AppState, &'a RequestContext)> {
    Ok((ctx.data::<AppState>()?, ctx.data::<RequestContext>()?))
}

/// Converts domain errors into GraphQL errors with extension codes.
pub(crate) trait Extended<T> {
    fn extended(self) -> async_graphql::Result<T>;
}

impl<T> Extended<T> for Result<T, AppError> {
    fn extended(self) -> async_graphql::Result<T> {
        self.map_err(|e| e.extend())
    }
}
