pub mod context;
pub mod mutation;
pub mod query;
pub mod types;

pub use context::RequestContext;
pub use mutation::MutationRoot;
pub use query::QueryRoot;

use async_graphql::{EmptySubscription, Schema};

use crate::api::AppState;

/// Deepest selection nesting accepted below a root field.
pub const MAX_QUERY_DEPTH: usize = 5;

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(state)
        // async-graphql counts the root field itself as level one.
        .limit_depth(MAX_QUERY_DEPTH + 1)
        .finish()
}
