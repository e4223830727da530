mod api;
mod inventory;
mod models;
mod schema;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use shared::config::{DatabaseArgs, HttpArgs};
use shared::{db, http, telemetry};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "inventory-service")]
struct Args {
    #[command(flatten)]
    http: HttpArgs,

    #[command(flatten)]
    database: DatabaseArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let args = Args::parse();

    db::run_migrations(&args.database.database_url, MIGRATIONS)?;
    let pool = db::connect(&args.database).await?;

    let app = api::create_router(api::AppState {
        stock: Arc::new(inventory::PgStockRepo::new(pool)),
    });
    let listener = tokio::net::TcpListener::bind(args.http.bind_addr()).await?;
    info!("Inventory service web server started on {}", args.http.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    info!("Inventory service stopped");
    Ok(())
}
