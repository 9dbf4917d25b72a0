//! Controller domain model: Coalescer entry plus the Diesel row it
//! upserts into. Controllers have no lifecycle state machine, so unlike
//! [`crate::flights::FlightState`] there is no private-field split here.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::controllers;

/// In-memory controller entry owned by the Coalescer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub callsign: String,
    pub controller_id: i32,
    pub name: String,
    pub rating: i16,
    pub facility: i16,
    pub visual_range: i32,
    pub atis: Option<String>,
    pub frequency: Option<String>,
    pub network_server: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// VATSIM facility taxonomy: observer is 0, delivery through FSS run up to 6.
pub const FACILITY_OBSERVER: i16 = 0;

impl ControllerState {
    pub fn new(normalized: NormalizedController, now: DateTime<Utc>) -> Self {
        Self {
            callsign: normalized.callsign,
            controller_id: normalized.controller_id,
            name: normalized.name,
            rating: normalized.rating,
            facility: normalized.facility,
            visual_range: normalized.visual_range,
            atis: normalized.atis,
            frequency: normalized.frequency,
            network_server: normalized.network_server,
            logon_time: normalized.logon_time,
            last_updated: normalized.last_updated,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn apply_update(&mut self, normalized: NormalizedController, now: DateTime<Utc>) {
        self.controller_id = normalized.controller_id;
        self.name = normalized.name;
        self.rating = normalized.rating;
        self.facility = normalized.facility;
        self.visual_range = normalized.visual_range;
        self.atis = normalized.atis;
        self.frequency = normalized.frequency;
        self.network_server = normalized.network_server;
        self.logon_time = normalized.logon_time;
        self.last_updated = normalized.last_updated;
        self.last_seen = now;
    }

    pub fn is_observer(&self) -> bool {
        self.facility == FACILITY_OBSERVER
    }

    /// Controller position classification by callsign suffix (VATSIM
    /// convention, e.g. `SY_TWR`, `ML_CTR`).
    pub fn class(&self) -> ControllerClass {
        ControllerClass::from_callsign(&self.callsign)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerClass {
    Fss,
    Ctr,
    App,
    Twr,
    Gnd,
    Del,
    Other,
}

impl ControllerClass {
    pub fn from_callsign(callsign: &str) -> Self {
        let suffix = callsign.rsplit('_').next().unwrap_or(callsign);
        match suffix.to_ascii_uppercase().as_str() {
            "FSS" => ControllerClass::Fss,
            "CTR" => ControllerClass::Ctr,
            "APP" | "DEP" => ControllerClass::App,
            "TWR" => ControllerClass::Twr,
            "GND" => ControllerClass::Gnd,
            "DEL" => ControllerClass::Del,
            _ => ControllerClass::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedController {
    pub callsign: String,
    pub controller_id: i32,
    pub name: String,
    pub rating: i16,
    pub facility: i16,
    pub visual_range: i32,
    pub atis: Option<String>,
    pub frequency: Option<String>,
    pub network_server: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = controllers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ControllerModel {
    pub callsign: String,
    pub controller_id: i32,
    pub name: String,
    pub rating: i16,
    pub facility: i16,
    pub visual_range: i32,
    pub atis: Option<String>,
    pub frequency: Option<String>,
    pub network_server: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&ControllerState> for ControllerModel {
    fn from(state: &ControllerState) -> Self {
        Self {
            callsign: state.callsign.clone(),
            controller_id: state.controller_id,
            name: state.name.clone(),
            rating: state.rating,
            facility: state.facility,
            visual_range: state.visual_range,
            atis: state.atis.clone(),
            frequency: state.frequency.clone(),
            network_server: state.network_server.clone(),
            logon_time: state.logon_time,
            last_updated: state.last_updated,
            first_seen: state.first_seen,
            last_seen: state.last_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_suffixes() {
        assert_eq!(ControllerClass::from_callsign("SY_TWR"), ControllerClass::Twr);
        assert_eq!(ControllerClass::from_callsign("ML_CTR"), ControllerClass::Ctr);
        assert_eq!(ControllerClass::from_callsign("BN-W_APP"), ControllerClass::App);
        assert_eq!(ControllerClass::from_callsign("SY_GND"), ControllerClass::Gnd);
        assert_eq!(ControllerClass::from_callsign("SY_DEL"), ControllerClass::Del);
        assert_eq!(ControllerClass::from_callsign("MELBOURNE_FSS"), ControllerClass::Fss);
    }

    #[test]
    fn classifies_unknown_suffix_as_other() {
        assert_eq!(ControllerClass::from_callsign("SY_OBS"), ControllerClass::Other);
        assert_eq!(ControllerClass::from_callsign("NOUNDERSCORE"), ControllerClass::Other);
    }

    #[test]
    fn observer_facility_is_zero() {
        let now = Utc::now();
        let mut controller = ControllerState::new(
            NormalizedController {
                callsign: "SY_OBS".to_string(),
                controller_id: 1,
                name: "Observer".to_string(),
                rating: -1,
                facility: 0,
                visual_range: 50,
                atis: None,
                frequency: None,
                network_server: None,
                logon_time: now,
                last_updated: now,
            },
            now,
        );
        assert!(controller.is_observer());
        controller.facility = 5;
        assert!(!controller.is_observer());
    }
}
