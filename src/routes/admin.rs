use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/admin`. Authentication happens in the `AuthUser` extractor;
/// each handler then rejects anyone who is not internal staff with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Platform-wide counts of properties, units, active leases and open tickets.
        .route("/stats", get(handlers::get_admin_stats))
}
