mod accounts;
mod api;
mod handlers;
mod models;
mod schema;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use shared::config::{ConsumerArgs, DatabaseArgs, HttpArgs, KafkaArgs, UpstreamArgs};
use shared::gateway::{self, OrderClient};
use shared::{
    db, http, shutdown_channel, spawn_consumer, telemetry, CheckoutMode, EventBus,
    KafkaEventPublisher, KafkaMessageSource,
};
use tracing::info;

use crate::accounts::{AccountRepo, PgAccountRepo};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "billing-service")]
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

    /// In `async` mode billing charges orders from the new-order topic.
    #[arg(long, env = "CHECKOUT_MODE", value_enum, default_value_t = CheckoutMode::Saga)]
    checkout_mode: CheckoutMode,

    #[arg(long, env = "ORDER_URL", default_value = "http://order-service:8000")]
    order_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    db::run_migrations(&args.database.database_url, MIGRATIONS)?;
    let pool = db::connect(&args.database).await?;
    let accounts: Arc<dyn AccountRepo> = Arc::new(PgAccountRepo::new(pool));

    let topics = args.kafka.topics();
    let brokers = &args.kafka.kafka_brokers;
    let group = args.consumer.group_or("billing-service");
    let (trigger, shutdown) = shutdown_channel();
    let mut consumers = Vec::new();

    consumers.push(spawn_consumer(
        "new-user",
        Arc::new(KafkaMessageSource::subscribe(brokers, group, &topics.new_users)?),
        Arc::new(handlers::NewUserHandler::new(accounts.clone())),
        args.consumer.options(),
        shutdown.clone(),
    ));

    if args.checkout_mode == CheckoutMode::Async {
        let events = EventBus::new(Arc::new(KafkaEventPublisher::new(brokers)?), topics.clone());
        let orders = Arc::new(OrderClient::new(
            &args.order_url,
            gateway::http_client(args.upstream.timeout())?,
        ));
        consumers.push(spawn_consumer(
            "new-order",
            Arc::new(KafkaMessageSource::subscribe(brokers, group, &topics.new_orders)?),
            Arc::new(handlers::NewOrderHandler::new(accounts.clone(), orders, events)),
            args.consumer.options(),
            shutdown.clone(),
        ));
    }
    info!(mode = ?args.checkout_mode, consumers = consumers.len(), "consumers started");

    let app = api::create_router(api::AppState { accounts });
    let listener = tokio::net::TcpListener::bind(args.http.bind_addr()).await?;
    info!("Billing service web server started on {}", args.http.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    trigger.trigger();
    for consumer in consumers {
        consumer.await?;
    }
    info!("Billing service stopped");

    Ok(())
}
