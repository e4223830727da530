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
use shared::gateway::{self, OrderClient, UserClient};
use shared::{db, http, shutdown_channel, spawn_consumer, telemetry, KafkaMessageSource, OrderGateway, UserDirectory};
use tracing::info;

use crate::handlers::{PaymentOutcome, PaymentOutcomeHandler};
use crate::store::{NotificationStore, PgNotificationStore};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "notification-service")]
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

    #[arg(long, env = "ORDER_URL", default_value = "http://order-service:8000")]
    order_url: String,

    #[arg(long, env = "USER_URL", default_value = "http://user-service:8000")]
    user_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    db::run_migrations(&args.database.database_url, MIGRATIONS)?;
    let pool = db::connect(&args.database).await?;
    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool));

    let client = gateway::http_client(args.upstream.timeout())?;
    let orders: Arc<dyn OrderGateway> = Arc::new(OrderClient::new(&args.order_url, client.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(UserClient::new(&args.user_url, client));

    let topics = args.kafka.topics();
    let brokers = &args.kafka.kafka_brokers;
    let group = args.consumer.group_or("notification-service");
    let (trigger, shutdown) = shutdown_channel();

    let consumers = vec![
        spawn_consumer(
            "order-is-paid",
            Arc::new(KafkaMessageSource::subscribe(brokers, group, &topics.order_is_paid)?),
            Arc::new(PaymentOutcomeHandler::new(
                PaymentOutcome::Paid,
                orders.clone(),
                users.clone(),
                store.clone(),
            )),
            args.consumer.options(),
            shutdown.clone(),
        ),
        spawn_consumer(
            "order-payment-failed",
            Arc::new(KafkaMessageSource::subscribe(brokers, group, &topics.order_payment_failed)?),
            Arc::new(PaymentOutcomeHandler::new(
                PaymentOutcome::PaymentFailed,
                orders,
                users.clone(),
                store.clone(),
            )),
            args.consumer.options(),
            shutdown,
        ),
    ];

    let app = api::create_router(api::AppState { store, users });
    let listener = tokio::net::TcpListener::bind(args.http.bind_addr()).await?;
    info!("Notification service web server started on {}", args.http.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    trigger.trigger();
    for consumer in consumers {
        consumer.await?;
    }
    info!("Notification service stopped");

    Ok(())
}
