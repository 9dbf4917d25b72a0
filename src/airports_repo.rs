//! Diesel repository for the read-only `airports` reference table.
//! Grounded on `airports_repo.rs`'s batched `on_conflict` upsert idiom.

use anyhow::Result;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::info;

use crate::airports::{AirportModel, AirportRef, NewAirportModel};
use crate::db::PgPool;

const UPSERT_BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct AirportsRepository {
    pool: PgPool,
}

impl AirportsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the given airports into the database in batches, keyed on
    /// `icao`. Returns the number of rows affected.
    pub async fn upsert_airports(&self, airports: Vec<AirportRef>) -> Result<usize> {
        use crate::schema::airports::dsl::*;

        let new_rows: Vec<NewAirportModel> = airports.iter().map(NewAirportModel::from).collect();
        let total = new_rows.len();
        let mut upserted = 0;

        for (batch_num, batch) in new_rows.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let pool = self.pool.clone();
            let batch_vec = batch.to_vec();

            let count = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;

                let rows = diesel::insert_into(airports)
                    .values(&batch_vec)
                    .on_conflict(icao)
                    .do_update()
                    .set((
                        name.eq(excluded(name)),
                        latitude.eq(excluded(latitude)),
                        longitude.eq(excluded(longitude)),
                        elevation_ft.eq(excluded(elevation_ft)),
                        country.eq(excluded(country)),
                        region.eq(excluded(region)),
                        active.eq(excluded(active)),
                    ))
                    .execute(&mut conn)?;

                Ok::<usize, anyhow::Error>(rows)
            })
            .await??;

            upserted += count;
            if total > UPSERT_BATCH_SIZE {
                info!(
                    "airports upsert batch {}/{}: {} rows",
                    batch_num + 1,
                    total.div_ceil(UPSERT_BATCH_SIZE),
                    count
                );
            }
        }

        Ok(upserted)
    }

    /// Load the full airport table for building the [`crate::airspace::AirspaceReference`].
    pub async fn load_all(&self) -> Result<Vec<AirportRef>> {
        use crate::schema::airports::dsl::*;

        let pool = self.pool.clone();

        let models = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let models = airports
                .select(AirportModel::as_select())
                .load(&mut conn)?;
            Ok::<Vec<AirportModel>, anyhow::Error>(models)
        })
        .await??;

        Ok(models.into_iter().map(AirportRef::from).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        use crate::schema::airports::dsl::*;

        let pool = self.pool.clone();

        let count = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<i64, anyhow::Error>(airports.count().get_result(&mut conn)?)
        })
        .await??;

        Ok(count)
    }
}
