mod api;
mod handlers;
mod models;
mod schema;
mod store;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use shared::config::{ConsumerArgs, DatabaseArgs, HttpArgs, KafkaArgs, UpstreamArgs};
use shared::gateway::{self, BillingClient, DeliveryClient, InventoryClient};
use shared::{
    db, http, shutdown_channel, spawn_consumer, telemetry, Checkout, CheckoutMode,
    EventBus, EventDrivenCheckout, KafkaEventPublisher, KafkaMessageSource, OrderSaga,
    OrderStore,
};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "order-service")]
struct Args {
    #[command(flatten)]
    http: HttpArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    kafka: KafkaArgs,

    #[command(flatten)]
    consumer: ConsumerArgs,

    #[command(flatten)]
    upstream: UpstreamArgs,

    #[arg(long, env = "CHECKOUT_MODE", value_enum, default_value_t = CheckoutMode::Saga)]
    checkout_mode: CheckoutMode,

    #[arg(long, env = "BILLING_URL", default_value = "http://billing-service:8000")]
    billing_url: String,

    #[arg(long, env = "INVENTORY_URL", default_value = "http://inventory-service:8000")]
    inventory_url: String,

    #[arg(long, env = "DELIVERY_URL", default_value = "http://delivery-service:8000")]
    delivery_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    db::run_migrations(&args.database.database_url, MIGRATIONS)?;
    let pool = db::connect(&args.database).await?;
    let orders: Arc<dyn OrderStore> = Arc::new(store::PgOrderStore::new(pool));

    let topics = args.kafka.topics();
    let publisher = KafkaEventPublisher::new(&args.kafka.kafka_brokers)?;
    let events = EventBus::new(Arc::new(publisher), topics.clone());

    let checkout: Arc<dyn Checkout> = match args.checkout_mode {
        CheckoutMode::Saga => {
            let client = gateway::http_client(args.upstream.timeout())?;
            Arc::new(OrderSaga::new(
                orders.clone(),
                Arc::new(BillingClient::new(&args.billing_url, client.clone())),
                Arc::new(InventoryClient::new(&args.inventory_url, client.clone())),
                Arc::new(DeliveryClient::new(&args.delivery_url, client)),
                events.clone(),
            ))
        }
        CheckoutMode::Async => Arc::new(EventDrivenCheckout::new(orders.clone(), events.clone())),
    };
    info!(mode = ?args.checkout_mode, "checkout configured");

    let (trigger, shutdown) = shutdown_channel();

    let paid_source = KafkaMessageSource::subscribe(
        &args.kafka.kafka_brokers,
        args.consumer.group_or("order-service"),
        &topics.order_is_paid,
    )?;
    let paid_consumer = spawn_consumer(
        "order-is-paid",
        Arc::new(paid_source),
        Arc::new(handlers::OrderIsPaidHandler::new(orders.clone())),
        args.consumer.options(),
        shutdown,
    );

    let app = api::create_router(api::AppState { checkout, orders });
    let listener = tokio::net::TcpListener::bind(args.http.bind_addr()).await?;
    info!("Order service web server started on {}", args.http.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    trigger.trigger();
    paid_consumer.await?;
    info!("Order service stopped");

    Ok(())
}
