use crate::{AppState, handlers, realtime::socket};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that run without the `AuthUser` layer. Each one authenticates
/// the caller its own way or not at all.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Email + password in, signed session token out.
        .route("/auth/login", post(handlers::login))
        // POST /webhooks/payments
        // Payment provider callback, authenticated by the `x-payment-signature` MAC.
        .route("/webhooks/payments", post(handlers::payment_webhook))
        // GET /ws?token=...
        // Real-time socket. The handshake verifies the token and answers 401
        // before upgrading when it is missing, invalid or stale.
        .route("/ws", get(socket::socket_handler))
}
