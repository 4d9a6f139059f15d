pub mod middleware;
pub mod state;

pub use middleware::{resolve_viewer, Viewer};
pub use state::AppState;

use std::path::Path;
use std::time::Duration;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::{Extension, State},
    middleware as axum_middleware,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::graphql::{AppSchema, RequestContext};

pub const GRAPHQL_PATH: &str = "/graphql";

/// Room for the operation and multipart framing on top of one upload.
const REQUEST_BODY_OVERHEAD: usize = 64 * 1024;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Clone)]
struct GraphqlState {
    app: AppState,
    schema: AppSchema,
}

pub fn create_router(state: AppState, schema: AppSchema, media_dir: &Path) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let body_limit = state.config.max_upload_bytes.saturating_add(REQUEST_BODY_OVERHEAD);
    let graphql_state = GraphqlState {
        app: state.clone(),
        schema,
    };

    Router::new()
        // Health check
        .route("/api/health", get(health))

        // GraphQL endpoint, GraphiQL on GET
        .route(
            GRAPHQL_PATH,
            get(graphiql)
                .post(graphql_handler)
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(graphql_state)

        // Uploaded media
        .nest_service("/media", ServeDir::new(media_dir))

        .layer(axum_middleware::from_fn_with_state(state, middleware::viewer_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Executes one GraphQL request with a fresh request context.
#[tracing::instrument(name = "graphql", skip_all)]
async fn graphql_handler(
    State(state): State<GraphqlState>,
    Extension(viewer): Extension<Viewer>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let context = RequestContext::new(state.app.db.clone(), viewer.0);
    state
        .schema
        .execute(request.into_inner().data(context))
        .await
        .into()
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
