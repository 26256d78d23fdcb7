use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod access;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod realtime;
pub mod repository;
pub mod roles;

// Routers split by who may reach them (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use realtime::RealtimeHub;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document assembled from the `#[utoipa::path]` handlers and the
/// `ToSchema` models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_session, handlers::get_me,
        handlers::list_properties, handlers::get_property, handlers::update_property,
        handlers::list_units, handlers::update_unit, handlers::list_leases, handlers::update_lease,
        handlers::list_documents, handlers::list_payments, handlers::list_keys,
        handlers::list_maintenance, handlers::create_maintenance, handlers::assign_maintenance,
        handlers::create_manager, handlers::assign_manager, handlers::set_assignment_active,
        handlers::update_assignment_permissions, handlers::payment_webhook,
        handlers::get_admin_stats
    ),
    components(
        schemas(
            models::Property, models::Unit, models::Lease, models::Document,
            models::MaintenanceTicket, models::Payment, models::PropertyKey,
            models::ManagerAssignment, models::LoginRequest, models::LoginResponse,
            models::SessionStatus, models::UserProfile, models::UpdatePropertyRequest,
            models::UpdateUnitRequest, models::UpdateLeaseRequest, models::CreateTicketRequest,
            models::AssignTicketRequest, models::CreateManagerRequest, models::AssignManagerRequest,
            models::SetAssignmentActiveRequest, models::AssignmentPermissionsRequest,
            models::PaymentWebhookRequest, models::AdminDashboardStats, roles::Role,
        )
    ),
    tags(
        (name = "property-portal", description = "Property management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container handed to every handler. Cloning it clones
/// handles, not data.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Real-time fan-out. Initialized by the caller before serving.
    pub hub: RealtimeHub,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for RealtimeHub {
    fn from_ref(app_state: &AppState) -> RealtimeHub {
        app_state.hub.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request before it reaches a handler unless `AuthUser`
/// resolves. The rejection body is the extractor's `AppError`.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the auth layer and the observability stack around
/// the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Staff check happens inside the admin handlers.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span carrying method, URI and `x-request-id`, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = %request.uri().path(),
        req_id = %request_id,
    )
}
