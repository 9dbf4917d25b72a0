//! Flight sector occupancy: one row per continuous traversal of one
//! sector by one flight. `entry_timestamp`/`exit_timestamp` bracket the
//! traversal; at most one row per `(callsign, sector_name)` may have
//! `exit_timestamp = NULL` at a time (enforced by a partial unique index
//! in the schema and mirrored here by the Lifecycle Engine's bookkeeping).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::flight_sector_occupancy;

/// The currently-open occupancy row for a callsign, tracked in memory by
/// the Lifecycle Engine so it can detect sector transitions without a
/// database round trip every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOccupancy {
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_latitude: f64,
    pub entry_longitude: f64,
    pub entry_altitude: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = flight_sector_occupancy)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OccupancyModel {
    pub id: i64,
    pub callsign: String,
    pub flight_id: Option<Uuid>,
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub entry_latitude: f64,
    pub entry_longitude: f64,
    pub exit_latitude: Option<f64>,
    pub exit_longitude: Option<f64>,
    pub entry_altitude: i32,
    pub exit_altitude: Option<i32>,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = flight_sector_occupancy)]
pub struct NewOccupancyModel {
    pub callsign: String,
    pub flight_id: Option<Uuid>,
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_latitude: f64,
    pub entry_longitude: f64,
    pub entry_altitude: i32,
}

/// A closed (or about-to-be-closed) sector traversal, used to build
/// `flight_summaries.sector_breakdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorVisit {
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub duration_seconds: i64,
}
