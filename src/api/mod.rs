//! HTTP surface (§6): the pipeline API and the transcribe-stage API,
//! composed behind one `AppState`. Router shape grounded on
//! `other_examples/...porua__server-src-server.rs`'s `create_router`.

pub mod error_response;
pub mod pipeline_routes;
pub mod state;
pub mod transcribe_routes;

pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(pipeline_routes::router())
        .merge(transcribe_routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
