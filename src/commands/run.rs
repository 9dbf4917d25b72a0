//! `vatpac-tracker run`: bootstrap every component and hand off to the
//! [`Scheduler`]. Grounded on the teacher's `commands/run/mod.rs` startup
//! sequence (lock, pool, migrations, then spawn workers), trimmed to this
//! crate's single-process shape.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::airports::read_airports_csv_file;
use crate::airports_repo::AirportsRepository;
use crate::airspace::{AirspaceSources, AirspaceStore};
use crate::batcher::WriteBatcher;
use crate::coalescer::Coalescer;
use crate::config::Config;
use crate::controllers_repo::ControllersRepository;
use crate::db;
use crate::feed_client::FeedClient;
use crate::flights_repo::FlightsRepository;
use crate::instance_lock::InstanceLock;
use crate::metrics;
use crate::occupancy_repo::OccupancyRepository;
use crate::scheduler::Scheduler;
use crate::summaries_repo::SummariesRepository;
use crate::transceivers_repo::TransceiversRepository;

const INSTANCE_LOCK_NAME: &str = "vatpac-tracker";

pub async fn handle_run(config: Config) -> Result<()> {
    let _lock = InstanceLock::new(INSTANCE_LOCK_NAME)
        .context("another vatpac-tracker instance is already running")?;

    let pool = db::build_pool(&config.database_url, config.pool_size)?;
    db::run_pending_migrations(&pool)?;

    let airports_repo = AirportsRepository::new(pool.clone());
    bootstrap_airports(&config, &airports_repo).await?;

    let airspace_sources = AirspaceSources {
        region_boundary_path: config.region_boundary_path.clone(),
        sectors_path: config.sectors_path.clone(),
        valid_controllers_path: config.valid_controllers_path.clone(),
        region_letter: config.region_letter,
    };
    let airspace = Arc::new(AirspaceStore::load(airspace_sources, airports_repo).await?);
    info!(
        "airspace reference loaded: {} airports, {} sectors",
        airspace.current().airport_count(),
        airspace.current().sector_count()
    );

    let feed_client = FeedClient::new(&config)?;
    let coalescer = Arc::new(Coalescer::new());

    let flights_repo = FlightsRepository::new(pool.clone());
    let controllers_repo = ControllersRepository::new(pool.clone());
    let occupancy_repo = OccupancyRepository::new(pool.clone());
    let transceivers_repo = TransceiversRepository::new(pool.clone());
    let summaries_repo = SummariesRepository::new(pool.clone());

    let batcher = Arc::new(WriteBatcher::new(
        flights_repo.clone(),
        controllers_repo.clone(),
        occupancy_repo.clone(),
        transceivers_repo.clone(),
        &config,
    ));

    metrics::initialize_tracker_metrics();
    tokio::spawn(metrics::process_metrics_task());

    let scheduler = Arc::new(Scheduler::new(
        config,
        coalescer,
        airspace,
        feed_client,
        batcher,
        flights_repo,
        controllers_repo,
        occupancy_repo,
        transceivers_repo,
        summaries_repo,
    ));

    let shutdown = CancellationToken::new();
    scheduler.run(shutdown).await
}

/// Load the configured airport CSV and upsert it into the database so
/// `AirspaceStore::load` (which reads airports back from the DB) always
/// sees an up-to-date table, even on a freshly migrated database.
async fn bootstrap_airports(config: &Config, airports_repo: &AirportsRepository) -> Result<()> {
    let path = config.airports_csv_path.clone();
    let airports = tokio::task::spawn_blocking(move || read_airports_csv_file(&path)).await??;

    let count = airports.len();
    let upserted = airports_repo.upsert_airports(airports).await?;
    info!("bootstrapped {upserted}/{count} airports from {}", config.airports_csv_path.display());
    Ok(())
}
