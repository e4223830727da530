use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::config::DatabaseArgs;

pub type DbPool = Pool<AsyncPgConnection>;

/// Applies pending migrations over a blocking connection, before the pool is
/// built.
pub fn run_migrations(database_url: &str, migrations: EmbeddedMigrations) -> anyhow::Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(migrations)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!(applied = applied.len(), "Migrations completed successfully");
    Ok(())
}

pub async fn connect(args: &DatabaseArgs) -> anyhow::Result<DbPool> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&args.database_url);
    let pool = Pool::builder()
        .max_size(args.database_pool_size)
        .build(config)
        .await?;
    Ok(pool)
}
