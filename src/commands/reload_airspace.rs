//! `vatpac-tracker reload-airspace`: validate the configured airspace
//! reference files and exit, without touching a running instance.
//! Forcing a live reload against a running process would need an admin
//! endpoint, which is out of scope; this is a startup smoke test instead.

use anyhow::Result;
use tracing::info;

use crate::airports::read_airports_csv_file;
use crate::airports_repo::AirportsRepository;
use crate::airspace::{AirspaceSources, AirspaceStore};
use crate::config::Config;
use crate::db;

pub async fn handle_reload_airspace(config: Config) -> Result<()> {
    let pool = db::build_pool(&config.database_url, 1)?;

    let airports_repo = AirportsRepository::new(pool);
    let airports = read_airports_csv_file(&config.airports_csv_path)?;
    let airport_count = airports.len();
    airports_repo.upsert_airports(airports).await?;

    let sources = AirspaceSources {
        region_boundary_path: config.region_boundary_path.clone(),
        sectors_path: config.sectors_path.clone(),
        valid_controllers_path: config.valid_controllers_path.clone(),
        region_letter: config.region_letter,
    };
    let store = AirspaceStore::load(sources, airports_repo).await?;
    let reference = store.current();

    info!(
        "reference OK: {} airports ({} in {}), {} sectors",
        airport_count,
        reference.airport_count(),
        config.region_letter,
        reference.sector_count()
    );
    println!(
        "airspace reference valid: {} airports, {} sectors",
        reference.airport_count(),
        reference.sector_count()
    );
    Ok(())
}
