use anyhow::Context;
use kiln_api::{
    app,
    middleware::{CircuitBreaker, ADMIN_ROLE},
    state::{AppState, AuthConfig, ResiliencyState},
};
use kiln_catalog::{InMemoryProductRepository, ProductRepository, ShippingPolicy};
use kiln_core::payment::PaymentGateway;
use kiln_order::{InMemoryOrderRepository, LifecycleConfig, MockPaymentGateway, OrderLifecycleManager, OrderRepository};
use kiln_shared::{Masked, Money};
use kiln_store::app_config::{Config, GatewayProvider, StorageBackend};
use kiln_store::{DbClient, PgOrderRepository, PgProductRepository, RazorpayGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_api=debug,kiln_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Kiln API on port {}", config.server.port);

    let (orders, products): (Arc<dyn OrderRepository>, Arc<dyn ProductRepository>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                let db = DbClient::new(&config.database.url, config.database.max_connections)
                    .await
                    .context("Failed to connect to Postgres")?;
                db.migrate().await.context("Failed to run migrations")?;
                let orders: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(db.pool.clone()));
                let products: Arc<dyn ProductRepository> = Arc::new(PgProductRepository::new(db.pool));
                (orders, products)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let orders: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
                let products: Arc<dyn ProductRepository> = Arc::new(InMemoryProductRepository::new());
                (orders, products)
            }
        };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.provider {
        GatewayProvider::Razorpay => Arc::new(
            RazorpayGateway::new(&config.gateway).context("Failed to build payment gateway client")?,
        ),
        GatewayProvider::Mock => {
            tracing::warn!("Using the mock payment gateway; no real payments are taken");
            Arc::new(MockPaymentGateway::new())
        }
    };

    let lifecycle = LifecycleConfig {
        currency: config.gateway.currency.clone(),
        signing_secret: Masked::new(config.gateway.key_secret.clone()),
        shipping: ShippingPolicy {
            free_shipping_threshold: Money::from_major(config.shipping.free_shipping_threshold),
            flat_rate: Money::from_major(config.shipping.flat_rate),
        },
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };
    if config.auth.log_dev_admin_token {
        let token = auth.issue_token("dev-admin", ADMIN_ROLE)?;
        tracing::warn!("auth.log_dev_admin_token is set; development admin token: {}", token);
    }

    let app_state = AppState {
        orders: Arc::new(OrderLifecycleManager::new(orders, products.clone(), gateway, lifecycle)),
        products,
        auth,
        resiliency: Arc::new(ResiliencyState {
            gateway_cb: CircuitBreaker::new(
                "payment-gateway",
                config.resiliency.failure_threshold,
                Duration::from_secs(config.resiliency.reset_timeout_seconds),
            ),
        }),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
