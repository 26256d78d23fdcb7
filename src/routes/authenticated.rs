use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` layer, so a handler only runs
/// for a verified, fresh (or degraded) session. What each caller may see or
/// change is decided per request from the access predicate for their role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        // GET /auth/session
        // Strict check: deactivated accounts and changed roles are told to sign in again.
        .route("/auth/session", get(handlers::get_session))
        .route("/me", get(handlers::get_me))
        // --- Property Tree ---
        .route("/properties", get(handlers::list_properties))
        .route(
            "/properties/{id}",
            get(handlers::get_property).put(handlers::update_property),
        )
        // GET /units?property_id=...
        .route("/units", get(handlers::list_units))
        .route("/units/{id}", put(handlers::update_unit))
        .route("/leases", get(handlers::list_leases))
        .route("/leases/{id}", put(handlers::update_lease))
        .route("/documents", get(handlers::list_documents))
        // GET /payments
        // Managers need `can_view_financials` on the property's assignment.
        .route("/payments", get(handlers::list_payments))
        .route("/keys", get(handlers::list_keys))
        // --- Maintenance ---
        .route(
            "/maintenance",
            get(handlers::list_maintenance).post(handlers::create_maintenance),
        )
        .route("/maintenance/{id}/assign", put(handlers::assign_maintenance))
        // --- Managers & Assignments ---
        // POST /managers
        // Owners create manager accounts inside their own customer.
        .route("/managers", post(handlers::create_manager))
        .route("/properties/{id}/managers", post(handlers::assign_manager))
        // PUT /assignments/{id}/active
        // Deactivation takes effect on the manager's next request.
        .route("/assignments/{id}/active", put(handlers::set_assignment_active))
        .route(
            "/assignments/{id}/permissions",
            put(handlers::update_assignment_permissions),
        )
}
