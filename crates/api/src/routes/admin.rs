use axum::routing::{get, post};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin/notifications`. Admin only.
///
/// ```text
/// POST /triggers/{job}/run   -> run_trigger
/// GET  /digest-stats         -> digest_stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/triggers/{job}/run", post(admin::run_trigger))
        .route("/digest-stats", get(admin::digest_stats))
}
