//! Diesel repository for `controllers` / `controllers_archive`. Grounded
//! on `airports_repo.rs`'s batched `on_conflict` upsert idiom, extended
//! with the archive-on-absence sweep the Write Batcher's graceful
//! shutdown and cleanup worker rely on.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::info;

use crate::controllers::ControllerModel;
use crate::db::PgPool;

const UPSERT_BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct ControllersRepository {
    pool: PgPool,
}

impl ControllersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk upsert keyed on `callsign`. Coalescing across a flush window
    /// happens upstream in the Write Batcher; this is the single
    /// multi-row `INSERT ... ON CONFLICT DO UPDATE` per batch.
    pub async fn upsert_controllers(&self, rows: Vec<ControllerModel>) -> Result<usize> {
        use crate::schema::controllers::dsl::*;

        let total = rows.len();
        let mut affected = 0;

        for batch in rows.chunks(UPSERT_BATCH_SIZE) {
            let pool = self.pool.clone();
            let batch_vec = batch.to_vec();

            let count = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                let rows = diesel::insert_into(controllers)
                    .values(&batch_vec)
                    .on_conflict(callsign)
                    .do_update()
                    .set((
                        controller_id.eq(excluded(controller_id)),
                        name.eq(excluded(name)),
                        rating.eq(excluded(rating)),
                        facility.eq(excluded(facility)),
                        visual_range.eq(excluded(visual_range)),
                        atis.eq(excluded(atis)),
                        frequency.eq(excluded(frequency)),
                        network_server.eq(excluded(network_server)),
                        logon_time.eq(excluded(logon_time)),
                        last_updated.eq(excluded(last_updated)),
                        last_seen.eq(excluded(last_seen)),
                    ))
                    .execute(&mut conn)?;
                Ok::<usize, anyhow::Error>(rows)
            })
            .await??;

            affected += count;
        }

        if total > 0 {
            info!("upserted {affected} controller rows ({total} in batch)");
        }
        Ok(affected)
    }

    /// Move controller rows absent from the live callsign set for longer
    /// than the archival threshold into `controllers_archive`, deleting
    /// them from `controllers`. One statement pair, run by the cleanup
    /// worker, not the per-tick hot path.
    pub async fn archive_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        use crate::schema::controllers::dsl as c;
        use crate::schema::controllers_archive::dsl as a;

        let pool = self.pool.clone();

        let archived = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let stale: Vec<ControllerModel> = c::controllers
                    .filter(c::last_seen.lt(cutoff))
                    .select(ControllerModel::as_select())
                    .load(conn)?;

                if stale.is_empty() {
                    return Ok::<usize, diesel::result::Error>(0);
                }

                let archive_rows: Vec<_> = stale
                    .iter()
                    .map(|row| {
                        (
                            a::callsign.eq(row.callsign.clone()),
                            a::controller_id.eq(row.controller_id),
                            a::name.eq(row.name.clone()),
                            a::rating.eq(row.rating),
                            a::facility.eq(row.facility),
                            a::visual_range.eq(row.visual_range),
                            a::atis.eq(row.atis.clone()),
                            a::frequency.eq(row.frequency.clone()),
                            a::network_server.eq(row.network_server.clone()),
                            a::logon_time.eq(row.logon_time),
                            a::last_updated.eq(row.last_updated),
                            a::first_seen.eq(row.first_seen),
                            a::last_seen.eq(row.last_seen),
                        )
                    })
                    .collect();

                diesel::insert_into(a::controllers_archive)
                    .values(&archive_rows)
                    .execute(conn)?;

                let callsigns: Vec<String> = stale.into_iter().map(|row| row.callsign).collect();
                diesel::delete(c::controllers.filter(c::callsign.eq_any(&callsigns))).execute(conn)?;

                Ok(callsigns.len())
            })
            .map_err(|e: diesel::result::Error| anyhow::anyhow!(e))
        })
        .await??;

        if archived > 0 {
            info!("archived {archived} stale controller rows");
        }
        Ok(archived)
    }
}
