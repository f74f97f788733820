//! Print-shop commerce service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use printshop_commerce::api::{self, AppState, Dependencies};
use printshop_commerce::bus::EventBus;
use printshop_commerce::config::Config;
use printshop_commerce::notify::{DiscordNotifier, LogNotifier, Notifier};
use printshop_commerce::payments::{PaymentGateway, StripeClient};
use printshop_commerce::pricing::PriceTable;
use printshop_commerce::shipping::{EasyPostClient, ShippingGateway};
use printshop_commerce::store::Stores;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env();

    let stores = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Stores::postgres(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Stores::memory()
        }
    };

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url.as_str()).await
            .inspect_err(|e| tracing::warn!(error = %e, "NATS unavailable, events will not be published"))
            .ok(),
        None => None,
    };
    let bus = EventBus::new(nats);

    let notifier: Arc<dyn Notifier> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    };
    let payments = match &config.stripe_secret_key {
        Some(key) => Some(Arc::new(StripeClient::new(key)?) as Arc<dyn PaymentGateway>),
        None => { tracing::warn!("STRIPE_SECRET_KEY not set, checkout cannot create payment sessions"); None }
    };
    let shipping = match &config.easypost_api_key {
        Some(key) => Some(Arc::new(EasyPostClient::new(key)?) as Arc<dyn ShippingGateway>),
        None => { tracing::warn!("EASYPOST_API_KEY not set, shipping endpoints are disabled"); None }
    };
    let price_table = match &config.price_table_path {
        Some(path) => PriceTable::from_path(path)?,
        None => PriceTable::default(),
    };

    tracing::info!(
        database = config.database_url.is_some(), events = bus.is_enabled(), stripe = payments.is_some(),
        easypost = shipping.is_some(), easypost_test_mode = config.easypost_test_mode, "services configured"
    );

    let state = AppState::new(Dependencies {
        stores,
        bus,
        notifier,
        payments,
        shipping,
        price_table,
        stripe_webhook_secret: config.stripe_webhook_secret.clone(),
        frontend_url: config.frontend_url.clone(),
        ship_from: config.ship_from.clone(),
        easypost_test_mode: config.easypost_test_mode,
    });
    let app = api::router(state);

    tracing::info!("🚀 Print-shop commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
