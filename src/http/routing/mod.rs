use axum::{Router, routing::get};

pub use super::routes::tasks;

pub fn app(router: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(router)
}
