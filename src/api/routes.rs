//! HTTP server wiring.

use std::sync::Arc;

use axum::middleware;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::scanner;

use super::auth;
use super::manager;
use super::payments;
use super::tasks;
use super::types::HealthResponse;
use super::users;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(Store::open(&config.database_path)?);

    // Background overdue scan feeds the manager queue.
    {
        let store = Arc::clone(&store);
        let scanner_config = config.clone();
        tokio::spawn(async move {
            scanner::run(store, scanner_config).await;
        });
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
    });

    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/users/register", post(users::register));

    let protected_routes = Router::new()
        .route("/api/users/me", get(users::me))
        .route("/api/users/me/wallet", get(users::wallet))
        .route("/api/users/me/notifications", get(users::notifications))
        .route(
            "/api/users/me/notifications/:id/read",
            post(users::mark_notification_read),
        )
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route("/api/tasks/:id", get(tasks::detail))
        .route("/api/tasks/:id/reserve", post(tasks::reserve))
        .route("/api/tasks/:id/apply", post(tasks::apply))
        .route("/api/tasks/:id/select", post(tasks::select_applicant))
        .route("/api/tasks/:id/proof", post(tasks::submit_proof))
        .route("/api/tasks/:id/confirm", post(tasks::confirm))
        .route("/api/tasks/:id/dispute", post(tasks::dispute))
        .route("/api/tasks/:id/cancel", post(tasks::cancel))
        .route("/api/tasks/:id/applicants", get(tasks::applicants))
        .route(
            "/api/payments/escrow",
            get(payments::list_escrows).post(payments::create_escrow),
        )
        .route(
            "/api/payments/escrow/:id/release",
            post(payments::release_escrow),
        )
        .route("/api/manager/disputes", get(manager::disputes))
        .route(
            "/api/manager/disputes/:task_id/resolve",
            post(manager::resolve),
        )
        .route("/api/manager/overdue", get(manager::overdue))
        .route("/api/manager/stats", get(manager::stats))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGTERM/SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        confirm_sla_hours: state.config.confirm_sla_hours,
    })
}
