mod config;
mod routes;
mod seed;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Request},
    middleware::{Next, from_fn},
    routing::{get, post},
};
use fnol_flow::{
    FnolMachine, InMemoryEvidenceStore, InMemoryPolicyLedger, InMemorySessionStore,
    PostgresSessionStore, SessionStore,
};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::routes::AppState;

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fnol_service=debug,fnol_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-correlation-id",
        HeaderValue::from_str(&correlation_id).unwrap(),
    );

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Check for DATABASE_URL and use PostgreSQL if available, otherwise use
    // in-memory session storage.
    let session_store: Arc<dyn SessionStore> =
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            info!("Using PostgreSQL session storage");
            match PostgresSessionStore::connect(&database_url).await {
                Ok(postgres_store) => Arc::new(postgres_store),
                Err(e) => {
                    error!(
                        "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                        e
                    );
                    Arc::new(InMemorySessionStore::new())
                }
            }
        } else {
            info!("Using in-memory session storage (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemorySessionStore::new())
        };

    let ledger = Arc::new(InMemoryPolicyLedger::new());
    seed::seed_demo_policies(&ledger);

    let evidence = Arc::new(InMemoryEvidenceStore::new());
    let reconcile_config = config::load_reconcile_config();
    info!(
        confidence_threshold = reconcile_config.confidence_threshold,
        auto_approval_limit = %reconcile_config.auto_approval_limit,
        "supervisor thresholds loaded"
    );

    let machine = Arc::new(FnolMachine::new(
        session_store,
        ledger,
        evidence.clone(),
        reconcile_config,
    ));

    let app_state = AppState { machine, evidence };

    let app = Router::new()
        .route("/health", get(routes::health_check))
        .route("/fnol/session", post(routes::create_session))
        .route("/fnol/message", post(routes::post_message))
        .route("/fnol/session/{thread_id}", get(routes::get_session))
        .route("/fnol/session/{thread_id}/summary", get(routes::get_summary))
        .route(
            "/fnol/session/{thread_id}/evidence",
            post(routes::attach_evidence),
        )
        .route(
            "/fnol/session/{thread_id}/abandon",
            post(routes::abandon_session),
        )
        .route("/fnol/evidence/extracted", post(routes::register_extraction))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server running on http://0.0.0.0:3000");
    axum::serve(listener, app).await?;
    Ok(())
}
