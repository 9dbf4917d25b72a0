//! Diesel repository for `flight_summaries`. Single-row inserts only —
//! summaries are written once per completed flight from the completion
//! event handler, never batched through the Write Batcher, since a
//! delayed summary write has no coalescing benefit and the completion
//! path already runs off the critical tick path.

use anyhow::Result;
use diesel::prelude::*;
use tracing::info;

use crate::db::PgPool;
use crate::summaries::NewFlightSummary;

#[derive(Clone)]
pub struct SummariesRepository {
    pool: PgPool,
}

impl SummariesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, summary: NewFlightSummary) -> Result<i64> {
        use crate::schema::flight_summaries::dsl::*;

        let pool = self.pool.clone();
        let callsign_for_log = summary.callsign.clone();

        let id_value = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Ok::<i64, anyhow::Error>(
                diesel::insert_into(flight_summaries)
                    .values(&summary)
                    .returning(id)
                    .get_result(&mut conn)?,
            )
        })
        .await??;

        info!("wrote flight summary for {callsign_for_log} (id={id_value})");
        Ok(id_value)
    }
}
