//! Flight domain model: the in-memory representation held by the
//! Coalescer plus the Diesel row it upserts into. `status` is split out
//! into a private field with a `pub(crate)` setter so only `lifecycle`
//! can drive the state machine; everything else is freely mutable by
//! whatever normalizes the feed into the Coalescer.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::flights;

/// Lifecycle state of a tracked flight. Enumerated as a Postgres enum type
/// so the schema itself enforces the closed set of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[serde(rename_all = "snake_case")]
#[db_enum(existing_type_path = "crate::schema::sql_types::FlightStatus")]
pub enum FlightStatus {
    Active,
    Stale,
    Landed,
    Completed,
    Cancelled,
    Unknown,
}

impl FlightStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FlightStatus::Completed | FlightStatus::Cancelled)
    }

    pub fn is_open_for_occupancy(self) -> bool {
        matches!(
            self,
            FlightStatus::Active | FlightStatus::Stale | FlightStatus::Landed
        )
    }
}

/// In-memory flight entry owned by the Coalescer. `status` is private:
/// call [`FlightState::set_status`] from `lifecycle` only.
#[derive(Debug, Clone)]
pub struct FlightState {
    pub id: Uuid,
    pub callsign: String,
    pub pilot_id: i32,
    pub pilot_name: String,
    pub aircraft_type: Option<String>,
    pub aircraft_short: Option<String>,
    pub aircraft_faa: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    pub heading: i16,
    pub groundspeed: i32,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub alternate: Option<String>,
    pub route: Option<String>,
    pub planned_altitude: Option<String>,
    pub flight_rules: Option<String>,
    pub cruise_tas: Option<String>,
    pub deptime: Option<String>,
    pub enroute_time: Option<String>,
    pub fuel_time: Option<String>,
    pub remarks: Option<String>,
    pub revision_id: Option<i32>,
    pub assigned_transponder: Option<String>,
    pub transponder: Option<String>,
    pub qnh_i_hg: Option<f64>,
    pub qnh_mb: Option<i32>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_updated_local: DateTime<Utc>,
    status: FlightStatus,
    pub landed_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub disconnect_method: Option<String>,
    pub first_seen: DateTime<Utc>,

    /// Tick at which this callsign was last seen in a filtered snapshot.
    /// Never persisted; drives the active→stale transition.
    pub last_seen_in_snapshot: DateTime<Utc>,
    /// Arrival + timestamp of the most recent landing firing, for the
    /// duplicate-suppression window. Never persisted.
    pub last_landing: Option<(String, DateTime<Utc>)>,
    /// Sector the flight currently occupies, per the last sector-transition
    /// sweep. Never persisted; recomputed from position every tick, but
    /// cached here so the sweep can detect a transition without a database
    /// round trip.
    pub current_sector: Option<String>,
}

impl FlightState {
    pub fn status(&self) -> FlightStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FlightStatus) {
        self.status = status;
    }

    pub fn new_active(normalized: NormalizedFlight, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            callsign: normalized.callsign,
            pilot_id: normalized.pilot_id,
            pilot_name: normalized.pilot_name,
            aircraft_type: normalized.aircraft_type,
            aircraft_short: normalized.aircraft_short,
            aircraft_faa: normalized.aircraft_faa,
            latitude: normalized.latitude,
            longitude: normalized.longitude,
            altitude: normalized.altitude,
            heading: normalized.heading,
            groundspeed: normalized.groundspeed,
            departure: normalized.departure,
            arrival: normalized.arrival,
            alternate: normalized.alternate,
            route: normalized.route,
            planned_altitude: normalized.planned_altitude,
            flight_rules: normalized.flight_rules,
            cruise_tas: normalized.cruise_tas,
            deptime: normalized.deptime,
            enroute_time: normalized.enroute_time,
            fuel_time: normalized.fuel_time,
            remarks: normalized.remarks,
            revision_id: normalized.revision_id,
            assigned_transponder: normalized.assigned_transponder,
            transponder: normalized.transponder,
            qnh_i_hg: normalized.qnh_i_hg,
            qnh_mb: normalized.qnh_mb,
            logon_time: normalized.logon_time,
            last_updated: normalized.last_updated,
            last_updated_local: now,
            status: FlightStatus::Active,
            landed_at: None,
            disconnected_at: None,
            disconnect_method: None,
            first_seen: now,
            last_seen_in_snapshot: now,
            last_landing: None,
            current_sector: None,
        }
    }

    /// Apply a fresh snapshot observation in place. Never touches `status`.
    pub fn apply_update(&mut self, normalized: NormalizedFlight, now: DateTime<Utc>) {
        self.pilot_id = normalized.pilot_id;
        self.pilot_name = normalized.pilot_name;
        self.aircraft_type = normalized.aircraft_type;
        self.aircraft_short = normalized.aircraft_short;
        self.aircraft_faa = normalized.aircraft_faa;
        self.latitude = normalized.latitude;
        self.longitude = normalized.longitude;
        self.altitude = normalized.altitude;
        self.heading = normalized.heading;
        self.groundspeed = normalized.groundspeed;
        self.departure = normalized.departure;
        self.arrival = normalized.arrival;
        self.alternate = normalized.alternate;
        self.route = normalized.route;
        self.planned_altitude = normalized.planned_altitude;
        self.flight_rules = normalized.flight_rules;
        self.cruise_tas = normalized.cruise_tas;
        self.deptime = normalized.deptime;
        self.enroute_time = normalized.enroute_time;
        self.fuel_time = normalized.fuel_time;
        self.remarks = normalized.remarks;
        self.revision_id = normalized.revision_id;
        self.assigned_transponder = normalized.assigned_transponder;
        self.transponder = normalized.transponder;
        self.qnh_i_hg = normalized.qnh_i_hg;
        self.qnh_mb = normalized.qnh_mb;
        self.logon_time = normalized.logon_time;
        self.last_updated = normalized.last_updated;
        self.last_updated_local = now;
        self.last_seen_in_snapshot = now;
    }
}

/// Wire-normalized flight record produced by the feed client, prior to
/// becoming a [`FlightState`].
#[derive(Debug, Clone)]
pub struct NormalizedFlight {
    pub callsign: String,
    pub pilot_id: i32,
    pub pilot_name: String,
    pub aircraft_type: Option<String>,
    pub aircraft_short: Option<String>,
    pub aircraft_faa: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    pub heading: i16,
    pub groundspeed: i32,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub alternate: Option<String>,
    pub route: Option<String>,
    pub planned_altitude: Option<String>,
    pub flight_rules: Option<String>,
    pub cruise_tas: Option<String>,
    pub deptime: Option<String>,
    pub enroute_time: Option<String>,
    pub fuel_time: Option<String>,
    pub remarks: Option<String>,
    pub revision_id: Option<i32>,
    pub assigned_transponder: Option<String>,
    pub transponder: Option<String>,
    pub qnh_i_hg: Option<f64>,
    pub qnh_mb: Option<i32>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Diesel row mirroring `flights`. Conversions to/from [`FlightState`]
/// live here rather than on the domain struct, keeping the Diesel
/// derives isolated from the domain type.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = flights)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FlightModel {
    pub id: Uuid,
    pub callsign: String,
    pub pilot_id: i32,
    pub pilot_name: String,
    pub aircraft_type: Option<String>,
    pub aircraft_short: Option<String>,
    pub aircraft_faa: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    pub heading: i16,
    pub groundspeed: i32,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub alternate: Option<String>,
    pub route: Option<String>,
    pub planned_altitude: Option<String>,
    pub flight_rules: Option<String>,
    pub cruise_tas: Option<String>,
    pub deptime: Option<String>,
    pub enroute_time: Option<String>,
    pub fuel_time: Option<String>,
    pub remarks: Option<String>,
    pub revision_id: Option<i32>,
    pub assigned_transponder: Option<String>,
    pub transponder: Option<String>,
    pub qnh_i_hg: Option<f64>,
    pub qnh_mb: Option<i32>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_updated_local: DateTime<Utc>,
    pub status: FlightStatus,
    pub landed_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub disconnect_method: Option<String>,
    pub first_seen: DateTime<Utc>,
}

impl From<&FlightState> for FlightModel {
    fn from(state: &FlightState) -> Self {
        Self {
            id: state.id,
            callsign: state.callsign.clone(),
            pilot_id: state.pilot_id,
            pilot_name: state.pilot_name.clone(),
            aircraft_type: state.aircraft_type.clone(),
            aircraft_short: state.aircraft_short.clone(),
            aircraft_faa: state.aircraft_faa.clone(),
            latitude: state.latitude,
            longitude: state.longitude,
            altitude: state.altitude,
            heading: state.heading,
            groundspeed: state.groundspeed,
            departure: state.departure.clone(),
            arrival: state.arrival.clone(),
            alternate: state.alternate.clone(),
            route: state.route.clone(),
            planned_altitude: state.planned_altitude.clone(),
            flight_rules: state.flight_rules.clone(),
            cruise_tas: state.cruise_tas.clone(),
            deptime: state.deptime.clone(),
            enroute_time: state.enroute_time.clone(),
            fuel_time: state.fuel_time.clone(),
            remarks: state.remarks.clone(),
            revision_id: state.revision_id,
            assigned_transponder: state.assigned_transponder.clone(),
            transponder: state.transponder.clone(),
            qnh_i_hg: state.qnh_i_hg,
            qnh_mb: state.qnh_mb,
            logon_time: state.logon_time,
            last_updated: state.last_updated,
            last_updated_local: state.last_updated_local,
            status: state.status,
            landed_at: state.landed_at,
            disconnected_at: state.disconnected_at,
            disconnect_method: state.disconnect_method.clone(),
            first_seen: state.first_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_normalized() -> NormalizedFlight {
        NormalizedFlight {
            callsign: "QFA123".to_string(),
            pilot_id: 1234567,
            pilot_name: "Test Pilot".to_string(),
            aircraft_type: Some("B738".to_string()),
            aircraft_short: Some("B738".to_string()),
            aircraft_faa: None,
            latitude: -33.868,
            longitude: 151.209,
            altitude: 35000,
            heading: 90,
            groundspeed: 450,
            departure: Some("YSSY".to_string()),
            arrival: Some("YBBN".to_string()),
            alternate: None,
            route: None,
            planned_altitude: None,
            flight_rules: Some("I".to_string()),
            cruise_tas: None,
            deptime: None,
            enroute_time: None,
            fuel_time: None,
            remarks: None,
            revision_id: None,
            assigned_transponder: None,
            transponder: None,
            qnh_i_hg: None,
            qnh_mb: None,
            logon_time: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn new_flight_starts_active() {
        let now = Utc::now();
        let state = FlightState::new_active(sample_normalized(), now);
        assert_eq!(state.status(), FlightStatus::Active);
        assert_eq!(state.first_seen, now);
    }

    #[test]
    fn apply_update_never_changes_status() {
        let now = Utc::now();
        let mut state = FlightState::new_active(sample_normalized(), now);
        state.set_status(FlightStatus::Landed);
        state.apply_update(sample_normalized(), now + chrono::Duration::seconds(30));
        assert_eq!(state.status(), FlightStatus::Landed);
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(FlightStatus::Completed.is_terminal());
        assert!(FlightStatus::Cancelled.is_terminal());
        assert!(!FlightStatus::Active.is_terminal());
        assert!(!FlightStatus::Landed.is_terminal());
    }
}
