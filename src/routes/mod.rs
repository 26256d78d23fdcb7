/// Router Module Index
///
/// Splits the HTTP surface by who may reach it. Authentication is applied as a
/// layer on the authenticated router in `create_router`; row-level scoping is
/// applied per request inside each handler.

/// Routes reachable without a session: health, login, provider callbacks and
/// the socket handshake (which authenticates itself).
pub mod public;

/// Routes behind the `AuthUser` layer.
pub mod authenticated;

/// Routes for internal staff, nested under `/admin`.
pub mod admin;
