//! Diesel repository for `flight_sector_occupancy`. Append/close only —
//! rows are never upserted by key the way flights/controllers are; the
//! Write Batcher treats new occupancy rows as appends and routes the
//! close-out of an existing row through a dedicated UPDATE, grounded on
//! the append-table split described in §4.F/§4.G.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::db::PgPool;
use crate::occupancy::{NewOccupancyModel, OccupancyModel};

#[derive(Clone)]
pub struct OccupancyRepository {
    pool: PgPool,
}

impl OccupancyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk-insert newly opened occupancy rows. Never coalesced, even if
    /// two rows in the batch share a callsign: each is a distinct
    /// traversal.
    pub async fn insert_open_rows(&self, rows: Vec<NewOccupancyModel>) -> Result<usize> {
        use crate::schema::flight_sector_occupancy::dsl::*;

        if rows.is_empty() {
            return Ok(0);
        }
        let total = rows.len();
        let pool = self.pool.clone();

        let inserted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<usize, anyhow::Error>(
                diesel::insert_into(flight_sector_occupancy)
                    .values(&rows)
                    .execute(&mut conn)?,
            )
        })
        .await??;

        debug!("inserted {inserted} open occupancy rows ({total} requested)");
        Ok(inserted)
    }

    /// Find the currently open occupancy rows for a callsign. Normally
    /// zero or one: a flight occupies at most one sector at a time, but
    /// the uniqueness invariant (P2) is enforced per-sector, so this
    /// returns a `Vec` rather than assuming a singleton.
    pub async fn open_rows_for_callsign(&self, cs: &str) -> Result<Vec<OccupancyModel>> {
        use crate::schema::flight_sector_occupancy::dsl::*;

        let pool = self.pool.clone();
        let cs = cs.to_string();

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<Vec<OccupancyModel>, anyhow::Error>(
                flight_sector_occupancy
                    .filter(callsign.eq(&cs))
                    .filter(exit_timestamp.is_null())
                    .select(OccupancyModel::as_select())
                    .load(&mut conn)?,
            )
        })
        .await??;

        Ok(rows)
    }

    /// Close one open row by id with the given exit position/altitude,
    /// computing `duration_seconds` from its `entry_timestamp`.
    pub async fn close_row(
        &self,
        row_id: i64,
        exit_ts: DateTime<Utc>,
        exit_lat: f64,
        exit_lon: f64,
        exit_alt: i32,
    ) -> Result<()> {
        use crate::schema::flight_sector_occupancy::dsl::*;

        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let entry_ts: DateTime<Utc> = flight_sector_occupancy
                .filter(id.eq(row_id))
                .select(entry_timestamp)
                .first(&mut conn)?;
            let duration = (exit_ts - entry_ts).num_seconds().max(0) as i32;

            diesel::update(flight_sector_occupancy.filter(id.eq(row_id)))
                .set((
                    exit_timestamp.eq(exit_ts),
                    exit_latitude.eq(exit_lat),
                    exit_longitude.eq(exit_lon),
                    exit_altitude.eq(exit_alt),
                    duration_seconds.eq(duration),
                ))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    /// Close the open row for one `(callsign, sector_name)` pair, looked
    /// up by key rather than by row id — the per-tick sector-transition
    /// path never has a DB-assigned id handy, since the open happened
    /// through the Write Batcher's deferred append queue. The partial
    /// unique index guarantees at most one row matches.
    pub async fn close_open_for_sector(
        &self,
        cs: &str,
        sector: &str,
        exit_ts: DateTime<Utc>,
        exit_lat: f64,
        exit_lon: f64,
        exit_alt: i32,
    ) -> Result<bool> {
        use crate::schema::flight_sector_occupancy::dsl::*;

        let pool = self.pool.clone();
        let cs = cs.to_string();
        let sector = sector.to_string();

        let updated = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let entry_ts: Option<DateTime<Utc>> = flight_sector_occupancy
                .filter(callsign.eq(&cs))
                .filter(sector_name.eq(&sector))
                .filter(exit_timestamp.is_null())
                .select(entry_timestamp)
                .first(&mut conn)
                .optional()?;

            let Some(entry_ts) = entry_ts else {
                return Ok::<bool, anyhow::Error>(false);
            };
            let duration = (exit_ts - entry_ts).num_seconds().max(0) as i32;

            diesel::update(
                flight_sector_occupancy
                    .filter(callsign.eq(&cs))
                    .filter(sector_name.eq(&sector))
                    .filter(exit_timestamp.is_null()),
            )
            .set((
                exit_timestamp.eq(exit_ts),
                exit_latitude.eq(exit_lat),
                exit_longitude.eq(exit_lon),
                exit_altitude.eq(exit_alt),
                duration_seconds.eq(duration),
            ))
            .execute(&mut conn)?;

            Ok(true)
        })
        .await??;

        Ok(updated)
    }

    /// Close every still-open row for a callsign, used on completion
    /// (step 1 of the completion event handling sequence).
    pub async fn close_all_open_for_callsign(
        &self,
        cs: &str,
        exit_ts: DateTime<Utc>,
        exit_lat: f64,
        exit_lon: f64,
        exit_alt: i32,
    ) -> Result<usize> {
        let open = self.open_rows_for_callsign(cs).await?;
        for row in &open {
            self.close_row(row.id, exit_ts, exit_lat, exit_lon, exit_alt).await?;
        }
        Ok(open.len())
    }

    /// All closed occupancy rows for a flight, used to build the
    /// `flight_summaries.sector_breakdown`.
    pub async fn closed_rows_for_flight(&self, fid: Uuid) -> Result<Vec<OccupancyModel>> {
        use crate::schema::flight_sector_occupancy::dsl::*;

        let pool = self.pool.clone();

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<Vec<OccupancyModel>, anyhow::Error>(
                flight_sector_occupancy
                    .filter(flight_id.eq(fid))
                    .filter(exit_timestamp.is_not_null())
                    .select(OccupancyModel::as_select())
                    .load(&mut conn)?,
            )
        })
        .await??;

        Ok(rows)
    }
}
