//! Slate Entitlement API
//!
//! Tier entitlements, promo codes, payment confirmation and account deletion.
//!
//! ## REST Endpoints
//!
//! - `GET /api/v1/entitlement/{userId}` - Entitlement snapshot
//! - `POST /api/v1/entitlement/{userId}/usage` - Consume pages
//! - `POST /api/v1/entitlement/{userId}/shots` - Clamp a shot count
//! - `POST /api/v1/promo/redeem` - Redeem a promo code
//! - `POST /api/v1/payment/confirm` - Gateway callback (signed)
//! - `POST /api/v1/auth/login` - Exchange an ID token for a credential
//! - `POST /api/v1/account/deletion` - Schedule account deletion
//! - `DELETE /api/v1/account/deletion` - Cancel a scheduled deletion
//!
//! Entitlement and account routes take the caller's credential as a Bearer
//! token; entitlement routes only serve the credential's own user.
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Process liveness
//! - `GET /ready` - Database and deletion sweeper status
//! - `GET /metrics` - Prometheus metrics
//!
//! The deletion sweeper runs in the background on `SWEEP_INTERVAL_SECS`.

mod config;
mod error;
mod extractors;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use slate_core::identity::StaticToken;
use slate_core::{
    AccountService, DeletionSweeper, FirebaseAdminClient, FirebaseIdTokenVerifier,
    EntitlementResolver, GatewaySignatureVerifier, IdentityProvider, PaymentHandler,
    PromoService, Stores, TokenIssuer, UserLocks,
};
use slate_db::Repositories;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::handlers::{health, ready};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("entitlement_api=debug".parse()?)
                .add_directive("slate_core=info".parse()?),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting Slate Entitlement API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        emulator = config.emulator_host.is_some(),
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Create database pool
    let pool = slate_db::create_pool(&config.database_url).await?;
    slate_db::run_migrations(&pool).await?;
    tracing::info!("Database pool created, migrations applied");

    // External clients are built up front; a bad credential aborts startup
    let identity: Arc<dyn IdentityProvider> = if config.emulator_host.is_some() {
        Arc::new(FirebaseAdminClient::with_token_source(
            config.firebase.clone(),
            Arc::new(StaticToken("owner".to_string())),
        )?)
    } else {
        Arc::new(FirebaseAdminClient::new(config.firebase.clone())?)
    };
    let verifier = Arc::new(FirebaseIdTokenVerifier::new(config.firebase.clone()));

    // Engine services
    let stores = Stores::from(Repositories::new(pool.clone()));
    let locks = UserLocks::new();
    let tokens = Arc::new(TokenIssuer::new(&config.jwt_secret, config.engine.token_ttl)?);
    let resolver = EntitlementResolver::new(Arc::clone(&stores.entitlements), locks.clone())
        .with_deletion_grace(config.engine.grace_period());
    let promo = PromoService::new(
        Arc::clone(&stores.promos),
        resolver.clone(),
        Arc::clone(&tokens),
        config.engine.clone(),
    );
    let payment = PaymentHandler::new(
        Arc::clone(&stores.payments),
        resolver.clone(),
        Arc::clone(&tokens),
        config.engine.payment_gateway.clone(),
    );
    let signatures = GatewaySignatureVerifier::new(
        &config.payment_webhook_secret,
        config.engine.signature_tolerance,
    )?;
    let sweeper = DeletionSweeper::new(stores.clone(), identity, locks, config.engine.clone());
    let account = AccountService::new(stores, resolver.clone(), promo.clone(), tokens, verifier);

    // Deletion sweeper
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let sweep_interval = config.sweep_interval;
    let sweeper_status = sweeper.status();
    let sweeper_task = tokio::spawn(sweeper.run_periodic(sweep_interval, async move {
        let _ = stop_rx.changed().await;
    }));

    // Create application state
    let state = AppState {
        resolver,
        promo,
        payment,
        account,
        signatures: Arc::new(signatures),
        pool,
        sweeper: sweeper_status,
        config: Arc::new(config),
    };

    // Build HTTP router
    let http_addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let app = build_router(state, metrics_handle);

    if let Err(e) = run_http_server(app, http_addr).await {
        tracing::error!(error = ?e, "HTTP server error");
    }

    let _ = stop_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = ?e, "Deletion sweeper task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let api_v1 = Router::new()
        // Entitlements
        .route("/entitlement/{user_id}", get(handlers::get_entitlement))
        .route("/entitlement/{user_id}/usage", post(handlers::record_usage))
        .route("/entitlement/{user_id}/shots", post(handlers::enforce_shots))
        // Promo codes
        .route("/promo/redeem", post(handlers::redeem_promo))
        // Gateway callback (raw body, signature checked in the handler)
        .route("/payment/confirm", post(handlers::confirm_payment))
        // Accounts
        .route("/auth/login", post(handlers::login))
        .route(
            "/account/deletion",
            post(handlers::request_deletion).delete(handlers::cancel_deletion),
        );

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> =
        app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    let latency_buckets = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("entitlement_operation_duration_seconds".to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!(
        "entitlement_tier_changes_total",
        "Tier changes by target tier and reason"
    );
    metrics::describe_counter!(
        "promo_redemptions_total",
        "Promo redemption attempts by outcome"
    );
    metrics::describe_counter!(
        "payment_confirmations_total",
        "Payment confirmations by outcome"
    );
    metrics::describe_counter!(
        "deletion_sweep_accounts_total",
        "Accounts processed by the deletion sweeper"
    );
    metrics::describe_counter!(
        "deletion_sweep_step_failures_total",
        "Failed or skipped cascade steps by step"
    );
    metrics::describe_histogram!(
        "entitlement_operation_duration_seconds",
        "Handler latency in seconds by operation"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
