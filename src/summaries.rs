//! Flight summary: the one row written per completed flight, folding
//! together its identity, ATC coverage (from the Correlator), and its
//! sector-occupancy breakdown. Built entirely from in-memory state plus
//! repository reads at completion time — never upserted, only inserted
//! once, since a flight completes exactly once.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flights::FlightState;
use crate::occupancy::OccupancyModel;
use crate::schema::flight_summaries;

/// One closed sector traversal as recorded in `sector_breakdown`'s JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorBreakdownEntry {
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub duration_seconds: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = flight_summaries)]
pub struct NewFlightSummary {
    pub flight_id: Uuid,
    pub callsign: String,
    pub pilot_id: i32,
    pub pilot_name: String,
    pub aircraft_type: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub route: Option<String>,
    pub planned_altitude: Option<String>,
    pub flight_rules: Option<String>,
    pub controller_callsigns: Vec<String>,
    pub controller_time_percentage: i16,
    pub time_online_minutes: i32,
    pub primary_enroute_sector: Option<String>,
    pub total_enroute_sectors: i32,
    pub total_enroute_time_minutes: i32,
    pub sector_breakdown: serde_json::Value,
    pub completion_time: DateTime<Utc>,
    pub disconnect_method: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = flight_summaries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FlightSummaryModel {
    pub id: i64,
    pub flight_id: Uuid,
    pub callsign: String,
    pub pilot_id: i32,
    pub pilot_name: String,
    pub aircraft_type: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub route: Option<String>,
    pub planned_altitude: Option<String>,
    pub flight_rules: Option<String>,
    pub controller_callsigns: Vec<String>,
    pub controller_time_percentage: i16,
    pub time_online_minutes: i32,
    pub primary_enroute_sector: Option<String>,
    pub total_enroute_sectors: i32,
    pub total_enroute_time_minutes: i32,
    pub sector_breakdown: serde_json::Value,
    pub completion_time: DateTime<Utc>,
    pub disconnect_method: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Build the sector breakdown from a flight's closed occupancy rows,
/// picking the longest-duration sector as `primary_enroute_sector`.
pub fn build_summary(
    flight: &FlightState,
    closed_rows: &[OccupancyModel],
    controller_callsigns: Vec<String>,
    controller_time_percentage: i16,
    completion_time: DateTime<Utc>,
) -> NewFlightSummary {
    let entries: Vec<SectorBreakdownEntry> = closed_rows
        .iter()
        .filter_map(|row| {
            let exit = row.exit_timestamp?;
            Some(SectorBreakdownEntry {
                sector_name: row.sector_name.clone(),
                entry_timestamp: row.entry_timestamp,
                exit_timestamp: exit,
                duration_seconds: row.duration_seconds.unwrap_or(0),
            })
        })
        .collect();

    let primary_enroute_sector = entries
        .iter()
        .max_by_key(|e| e.duration_seconds)
        .map(|e| e.sector_name.clone());

    let total_enroute_time_seconds: i64 = entries.iter().map(|e| e.duration_seconds as i64).sum();
    let time_online_seconds = (completion_time - flight.first_seen).num_seconds().max(0);

    NewFlightSummary {
        flight_id: flight.id,
        callsign: flight.callsign.clone(),
        pilot_id: flight.pilot_id,
        pilot_name: flight.pilot_name.clone(),
        aircraft_type: flight.aircraft_type.clone(),
        departure: flight.departure.clone(),
        arrival: flight.arrival.clone(),
        route: flight.route.clone(),
        planned_altitude: flight.planned_altitude.clone(),
        flight_rules: flight.flight_rules.clone(),
        controller_callsigns,
        controller_time_percentage,
        time_online_minutes: (time_online_seconds / 60) as i32,
        primary_enroute_sector,
        total_enroute_sectors: entries.len() as i32,
        total_enroute_time_minutes: (total_enroute_time_seconds / 60) as i32,
        sector_breakdown: serde_json::to_value(&entries).unwrap_or(serde_json::Value::Null),
        completion_time,
        disconnect_method: flight.disconnect_method.clone(),
    }
}
