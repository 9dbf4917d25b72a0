//! Diesel repository for the append-only `transceiver_samples` table.
//! Grounded on the same batched-insert idiom as `occupancy_repo.rs`, but
//! idempotent on re-delivery via `ON CONFLICT DO NOTHING` against the
//! `(callsign, transceiver_id, timestamp)` identity index, since the feed
//! can plausibly resend an unchanged sample across adjacent polls.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use crate::db::PgPool;
use crate::transceivers::{NewTransceiverSampleModel, TransceiverSampleModel};

#[derive(Clone)]
pub struct TransceiversRepository {
    pool: PgPool,
}

impl TransceiversRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_samples(&self, rows: Vec<NewTransceiverSampleModel>) -> Result<usize> {
        use crate::schema::transceiver_samples::dsl::*;

        if rows.is_empty() {
            return Ok(0);
        }
        let total = rows.len();
        let pool = self.pool.clone();

        let inserted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<usize, anyhow::Error>(
                diesel::insert_into(transceiver_samples)
                    .values(&rows)
                    .on_conflict((callsign, transceiver_id, timestamp))
                    .do_nothing()
                    .execute(&mut conn)?,
            )
        })
        .await??;

        debug!("inserted {inserted} transceiver samples ({total} requested)");
        Ok(inserted)
    }

    /// Samples for one callsign within `[from, to]`, used by the
    /// Correlator to build the flight side of the coverage computation.
    pub async fn samples_for_callsign_between(
        &self,
        cs: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransceiverSampleModel>> {
        use crate::schema::transceiver_samples::dsl::*;

        let pool = self.pool.clone();
        let cs = cs.to_string();

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<Vec<TransceiverSampleModel>, anyhow::Error>(
                transceiver_samples
                    .filter(callsign.eq(&cs))
                    .filter(timestamp.ge(from))
                    .filter(timestamp.le(to))
                    .order(timestamp.asc())
                    .select(TransceiverSampleModel::as_select())
                    .load(&mut conn)?,
            )
        })
        .await??;

        Ok(rows)
    }

    /// All controller (`atc`) samples within `[from, to]`, widened by
    /// the correlator's own ±180s window before calling. Fetched once
    /// per completed flight and matched in memory rather than per-sample
    /// round trips.
    pub async fn controller_samples_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransceiverSampleModel>> {
        use crate::schema::transceiver_samples::dsl::*;

        let pool = self.pool.clone();

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<Vec<TransceiverSampleModel>, anyhow::Error>(
                transceiver_samples
                    .filter(entity_type.eq("atc"))
                    .filter(timestamp.ge(from))
                    .filter(timestamp.le(to))
                    .select(TransceiverSampleModel::as_select())
                    .load(&mut conn)?,
            )
        })
        .await??;

        Ok(rows)
    }
}
