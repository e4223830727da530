mod api;
mod models;
mod repo;
mod schema;
mod service;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use shared::config::{DatabaseArgs, HttpArgs};
use shared::{db, http, telemetry};
use tracing::info;

use crate::service::{DeliveryService, SelectionStrategy};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "delivery-service")]
struct Args {
    #[command(flatten)]
    http: HttpArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    #[arg(long, env = "COURIER_SELECTION", value_enum, default_value_t = SelectionStrategy::Random)]
    courier_selection: SelectionStrategy,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    db::run_migrations(&args.database.database_url, MIGRATIONS)?;
    let pool = db::connect(&args.database).await?;

    let service = DeliveryService::new(
        Arc::new(repo::PgDeliveryRepo::new(pool)),
        args.courier_selection.selector(),
    );
    info!(selection = ?args.courier_selection, "courier selection configured");

    let app = api::create_router(api::AppState {
        deliveries: Arc::new(service),
    });
    let listener = tokio::net::TcpListener::bind(args.http.bind_addr()).await?;
    info!("Delivery service web server started on {}", args.http.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    info!("Delivery service stopped");
    Ok(())
}
