use property_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    realtime::{PubSubBridge, RealtimeHub, RedisBridge},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Boot order: configuration, logging, database (with migrations), the
/// real-time hub, then the HTTP server. Shutdown on Ctrl-C or SIGTERM drains
/// in-flight requests and then stops the hub.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // Fail-fast on missing production secrets.
    let config = AppConfig::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "property_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // --- Database ---
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // --- Real-time ---
    // A missing or unreachable Redis degrades to local-only delivery; it never blocks startup
    // for longer than the connect timeout.
    let hub = RealtimeHub::new();
    let bridge = config
        .realtime
        .redis_url
        .as_ref()
        .map(|url| RedisBridge::new(url.clone(), config.realtime.channel.clone()));
    let mode = hub
        .init(
            bridge.as_ref().map(|b| b as &dyn PubSubBridge),
            config.realtime.connect_timeout,
        )
        .await;
    tracing::info!(?mode, node_id = %hub.node_id(), "realtime hub ready");

    // --- HTTP ---
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        hub: hub.clone(),
        config,
    };
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {bind_addr}: {e}"));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {}", e);
    }

    hub.shutdown();
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
