//! Diesel repository for `flights` / `flights_archive`. Bulk-upsert is
//! keyed on the table's actual primary key, `id` (a `Uuid::now_v7()`
//! assigned once when the flight first appears, per the surrogate-key
//! note in `DESIGN.md`/`SPEC_FULL.md` §3) rather than `callsign` — this
//! sidesteps Diesel's lack of a convenient conflict target for the
//! partial-unique-index-on-callsign and still gives the Write Batcher
//! exactly the coalescing guarantee of P6, since every `FlightState` for
//! a given callsign keeps the same `id` for its whole lifetime.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::info;
use uuid::Uuid;

use crate::flights::{FlightModel, FlightStatus};
use crate::db::PgPool;

const UPSERT_BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct FlightsRepository {
    pool: PgPool,
}

impl FlightsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_flights(&self, rows: Vec<FlightModel>) -> Result<usize> {
        use crate::schema::flights::dsl::*;

        let total = rows.len();
        let mut affected = 0;

        for batch in rows.chunks(UPSERT_BATCH_SIZE) {
            let pool = self.pool.clone();
            let batch_vec = batch.to_vec();

            let count = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                let rows = diesel::insert_into(flights)
                    .values(&batch_vec)
                    .on_conflict(id)
                    .do_update()
                    .set((
                        callsign.eq(excluded(callsign)),
                        pilot_id.eq(excluded(pilot_id)),
                        pilot_name.eq(excluded(pilot_name)),
                        aircraft_type.eq(excluded(aircraft_type)),
                        aircraft_short.eq(excluded(aircraft_short)),
                        aircraft_faa.eq(excluded(aircraft_faa)),
                        latitude.eq(excluded(latitude)),
                        longitude.eq(excluded(longitude)),
                        altitude.eq(excluded(altitude)),
                        heading.eq(excluded(heading)),
                        groundspeed.eq(excluded(groundspeed)),
                        departure.eq(excluded(departure)),
                        arrival.eq(excluded(arrival)),
                        alternate.eq(excluded(alternate)),
                        route.eq(excluded(route)),
                        planned_altitude.eq(excluded(planned_altitude)),
                        flight_rules.eq(excluded(flight_rules)),
                        cruise_tas.eq(excluded(cruise_tas)),
                        deptime.eq(excluded(deptime)),
                        enroute_time.eq(excluded(enroute_time)),
                        fuel_time.eq(excluded(fuel_time)),
                        remarks.eq(excluded(remarks)),
                        revision_id.eq(excluded(revision_id)),
                        assigned_transponder.eq(excluded(assigned_transponder)),
                        transponder.eq(excluded(transponder)),
                        qnh_i_hg.eq(excluded(qnh_i_hg)),
                        qnh_mb.eq(excluded(qnh_mb)),
                        logon_time.eq(excluded(logon_time)),
                        last_updated.eq(excluded(last_updated)),
                        last_updated_local.eq(excluded(last_updated_local)),
                        status.eq(excluded(status)),
                        landed_at.eq(excluded(landed_at)),
                        disconnected_at.eq(excluded(disconnected_at)),
                        disconnect_method.eq(excluded(disconnect_method)),
                        updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(&mut conn)?;
                Ok::<usize, anyhow::Error>(rows)
            })
            .await??;

            affected += count;
        }

        if total > 0 {
            info!("upserted {affected} flight rows ({total} in batch)");
        }
        Ok(affected)
    }

    /// True if a non-terminal row already exists for this callsign —
    /// used on startup to decide whether a freshly-seen callsign should
    /// resume an existing flight id instead of minting a new one.
    pub async fn find_open_by_callsign(&self, cs: &str) -> Result<Option<FlightModel>> {
        use crate::schema::flights::dsl::*;

        let pool = self.pool.clone();
        let cs = cs.to_string();

        let row = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = flights
                .filter(callsign.eq(&cs))
                .filter(status.eq_any([FlightStatus::Active, FlightStatus::Stale, FlightStatus::Landed]))
                .select(FlightModel::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<FlightModel>, anyhow::Error>(row)
        })
        .await??;

        Ok(row)
    }

    /// Move terminal (completed/cancelled) rows older than `cutoff` into
    /// `flights_archive`, per the optional archival step of completion
    /// handling and the cleanup worker's 7-day sweep.
    pub async fn archive_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        use crate::schema::flights::dsl as f;
        use crate::schema::flights_archive::dsl as a;

        let pool = self.pool.clone();

        let archived = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let terminal: Vec<FlightModel> = f::flights
                    .filter(f::status.eq_any([FlightStatus::Completed, FlightStatus::Cancelled]))
                    .filter(f::updated_at.lt(cutoff))
                    .select(FlightModel::as_select())
                    .load(conn)?;

                if terminal.is_empty() {
                    return Ok::<usize, diesel::result::Error>(0);
                }

                let archive_rows: Vec<_> = terminal
                    .iter()
                    .map(|row| {
                        (
                            a::id.eq(row.id),
                            a::callsign.eq(row.callsign.clone()),
                            a::pilot_id.eq(row.pilot_id),
                            a::pilot_name.eq(row.pilot_name.clone()),
                            a::aircraft_type.eq(row.aircraft_type.clone()),
                            a::departure.eq(row.departure.clone()),
                            a::arrival.eq(row.arrival.clone()),
                            a::route.eq(row.route.clone()),
                            a::status.eq(row.status),
                            a::landed_at.eq(row.landed_at),
                            a::disconnected_at.eq(row.disconnected_at),
                            a::disconnect_method.eq(row.disconnect_method.clone()),
                            a::first_seen.eq(row.first_seen),
                            a::last_updated.eq(row.last_updated),
                        )
                    })
                    .collect();

                diesel::insert_into(a::flights_archive)
                    .values(&archive_rows)
                    .execute(conn)?;

                let ids: Vec<Uuid> = terminal.iter().map(|row| row.id).collect();
                diesel::delete(f::flights.filter(f::id.eq_any(&ids))).execute(conn)?;

                Ok(ids.len())
            })
            .map_err(|e: diesel::result::Error| anyhow::anyhow!(e))
        })
        .await??;

        if archived > 0 {
            info!("archived {archived} terminal flight rows");
        }
        Ok(archived)
    }

    pub async fn count_by_status(&self, wanted: FlightStatus) -> Result<i64> {
        use crate::schema::flights::dsl::*;

        let pool = self.pool.clone();
        let count = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<i64, anyhow::Error>(
                flights
                    .filter(status.eq(wanted))
                    .count()
                    .get_result(&mut conn)?,
            )
        })
        .await??;

        Ok(count)
    }
}
