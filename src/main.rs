//! space-billing server.
//!
//! Startup order: configuration, tracing, Postgres pool and migrations,
//! ledger pruning, adapter wiring, then the axum server.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Json, Router};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use space_billing::adapters::http::billing::{
    billing_router, BillingAppState, BillingPorts, BillingSettings,
};
use space_billing::adapters::postgres::{
    PostgresListingDirectory, PostgresSeatReservations, PostgresSubscriptionRepository,
    PostgresUserAccounts, PostgresWebhookEventRepository,
};
use space_billing::adapters::stripe::StripePaymentAdapter;
use space_billing::config::{AppConfig, BillingConfig, ServerConfig};
use space_billing::domain::foundation::Timestamp;
use space_billing::ports::WebhookEventRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let ledger = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    prune_ledger(ledger.as_ref(), &config.billing).await;

    let state = build_state(&config, pool, ledger);
    let app = router(state, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        stripe_test_mode = config.payment.is_test_mode(),
        "space-billing listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Drops ledger entries past the retention window. Failure only delays pruning.
async fn prune_ledger(ledger: &dyn WebhookEventRepository, billing: &BillingConfig) {
    let cutoff = Timestamp::now().minus_days(billing.webhook_retention_days);
    match ledger.delete_before(*cutoff.as_datetime()).await {
        Ok(removed) => tracing::info!(
            removed,
            retention_days = billing.webhook_retention_days,
            "Pruned webhook ledger"
        ),
        Err(e) => tracing::warn!(error = %e, "Webhook ledger pruning failed"),
    }
}

fn build_state(
    config: &AppConfig,
    pool: PgPool,
    ledger: Arc<PostgresWebhookEventRepository>,
) -> BillingAppState {
    let ports = BillingPorts {
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        listings: Arc::new(PostgresListingDirectory::new(pool.clone())),
        users: Arc::new(PostgresUserAccounts::new(pool.clone())),
        seats: Arc::new(PostgresSeatReservations::new(pool)),
        ledger,
        payment_provider: Arc::new(StripePaymentAdapter::new(config.payment.stripe_config())),
    };

    let settings = BillingSettings {
        catalog: config.billing.plan_catalog(),
        urls: config.billing.checkout_urls(),
        trial_days: config.billing.trial_days,
        webhook_deadline: config.billing.webhook_deadline(),
    };

    BillingAppState::new(ports, config.payment.webhook_verifier(), settings)
}

fn router(state: BillingAppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", billing_router())
        .with_state(state)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors(server))
        .layer(TraceLayer::new_for_http())
}

fn cors(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
