//! Connection pool setup and embedded migration runner.

use anyhow::{Context, Result};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Build the r2d2 connection pool. Pool size should be at least
/// `workers + 2`: each scheduler ticker and the write batcher need their
/// own connection without contending.
pub fn build_pool(database_url: &str, pool_size: u32) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .context("Failed to build database connection pool")
}

/// Run any pending embedded migrations. Safe to call on every startup:
/// Diesel tracks applied migrations in `__diesel_schema_migrations` and
/// skips ones already recorded.
pub fn run_pending_migrations(pool: &PgPool) -> Result<()> {
    let mut conn = pool.get().context("Failed to get connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    for name in &applied {
        info!("Applied migration: {}", name);
    }
    if applied.is_empty() {
        info!("No pending migrations");
    }
    Ok(())
}
