use axum::{Router, routing::get};

pub mod audits;
pub mod common;
pub mod reports;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/audits", audits::router())
        .nest("/reports", reports::router())
}
