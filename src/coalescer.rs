//! Snapshot Coalescer: the in-memory store of latest-seen entity state,
//! keyed by callsign, held in three sharded maps so flights, controllers,
//! and transceiver samples can be updated concurrently without a single
//! global lock.
//!
//! `status` on a tracked flight is never written here — `lifecycle` is
//! the sole writer, enforced by [`crate::flights::FlightState`]'s
//! private field.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};

use crate::controllers::{ControllerState, NormalizedController};
use crate::flights::{FlightState, NormalizedFlight};
use crate::transceivers::TransceiverSample;

/// How long a callsign's transceiver samples are retained in memory
/// before the cleanup worker reaps them, independent of the flight's own
/// lifecycle state.
const TRANSCEIVER_RETENTION: chrono::Duration = chrono::Duration::hours(2);

pub struct Coalescer {
    flights: DashMap<String, FlightState>,
    controllers: DashMap<String, ControllerState>,
    transceivers: DashMap<String, VecDeque<TransceiverSample>>,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
            controllers: DashMap::new(),
            transceivers: DashMap::new(),
        }
    }

    /// Insert or update a flight from a freshly filtered snapshot
    /// observation. Never touches `status`.
    pub fn upsert_flight(&self, normalized: NormalizedFlight, now: DateTime<Utc>) {
        match self.flights.get_mut(&normalized.callsign) {
            Some(mut existing) => existing.apply_update(normalized, now),
            None => {
                let callsign = normalized.callsign.clone();
                self.flights
                    .insert(callsign, FlightState::new_active(normalized, now));
            }
        }
    }

    pub fn flight(&self, callsign: &str) -> Option<Ref<'_, String, FlightState>> {
        self.flights.get(callsign)
    }

    pub fn flight_mut(&self, callsign: &str) -> Option<RefMut<'_, String, FlightState>> {
        self.flights.get_mut(callsign)
    }

    pub fn remove_flight(&self, callsign: &str) -> Option<FlightState> {
        self.flights.remove(callsign).map(|(_, state)| state)
    }

    /// Callsigns present as of this call — a copy-on-read snapshot of
    /// the keys, taken under the shard locks only long enough to copy,
    /// per the concurrency model's read-lock discipline.
    pub fn flight_callsigns(&self) -> Vec<String> {
        self.flights.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    pub fn upsert_controller(&self, normalized: NormalizedController, now: DateTime<Utc>) {
        match self.controllers.get_mut(&normalized.callsign) {
            Some(mut existing) => existing.apply_update(normalized, now),
            None => {
                let callsign = normalized.callsign.clone();
                self.controllers
                    .insert(callsign, ControllerState::new(normalized, now));
            }
        }
    }

    pub fn controller(&self, callsign: &str) -> Option<Ref<'_, String, ControllerState>> {
        self.controllers.get(callsign)
    }

    pub fn remove_controller(&self, callsign: &str) -> Option<ControllerState> {
        self.controllers.remove(callsign).map(|(_, state)| state)
    }

    pub fn controller_callsigns(&self) -> Vec<String> {
        self.controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Append a transceiver sample to its callsign's bounded deque.
    pub fn push_transceiver_sample(&self, sample: TransceiverSample) {
        let mut deque = self.transceivers.entry(sample.callsign.clone()).or_default();
        deque.push_back(sample);
    }

    /// Drop samples older than the retention window for every tracked
    /// callsign, and drop empty deques entirely. Called by the cleanup
    /// worker, not on the per-tick hot path.
    pub fn reap_stale_transceivers(&self, now: DateTime<Utc>) {
        let cutoff = now - TRANSCEIVER_RETENTION;
        self.transceivers.retain(|_, deque| {
            while deque.front().is_some_and(|sample| sample.timestamp < cutoff) {
                deque.pop_front();
            }
            !deque.is_empty()
        });
    }

    pub fn transceiver_sample_count(&self, callsign: &str) -> usize {
        self.transceivers
            .get(callsign)
            .map(|deque| deque.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transceivers::EntityType;

    fn normalized(callsign: &str) -> NormalizedFlight {
        NormalizedFlight {
            callsign: callsign.to_string(),
            pilot_id: 1,
            pilot_name: "Pilot".to_string(),
            aircraft_type: None,
            aircraft_short: None,
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
            flight_rules: None,
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
    fn upsert_creates_then_updates_in_place() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        coalescer.upsert_flight(normalized("QFA123"), now);
        assert_eq!(coalescer.flight_count(), 1);

        let mut second = normalized("QFA123");
        second.altitude = 10000;
        coalescer.upsert_flight(second, now + chrono::Duration::seconds(30));

        assert_eq!(coalescer.flight_count(), 1);
        let flight = coalescer.flight("QFA123").unwrap();
        assert_eq!(flight.altitude, 10000);
    }

    #[test]
    fn upsert_never_touches_status() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        coalescer.upsert_flight(normalized("QFA123"), now);
        {
            let mut flight = coalescer.flight_mut("QFA123").unwrap();
            flight.set_status(crate::flights::FlightStatus::Landed);
        }
        coalescer.upsert_flight(normalized("QFA123"), now + chrono::Duration::seconds(30));
        assert_eq!(
            coalescer.flight("QFA123").unwrap().status(),
            crate::flights::FlightStatus::Landed
        );
    }

    #[test]
    fn transceiver_samples_accumulate_and_reap() {
        let coalescer = Coalescer::new();
        let old = Utc::now() - chrono::Duration::hours(3);
        let recent = Utc::now();

        coalescer.push_transceiver_sample(TransceiverSample {
            callsign: "QFA123".to_string(),
            transceiver_id: 1,
            timestamp: old,
            frequency: 133_700_000,
            latitude: Some(-33.868),
            longitude: Some(151.209),
            height_msl_m: None,
            height_agl_m: None,
            entity_type: EntityType::Flight,
            entity_id: None,
        });
        coalescer.push_transceiver_sample(TransceiverSample {
            callsign: "QFA123".to_string(),
            transceiver_id: 1,
            timestamp: recent,
            frequency: 133_700_000,
            latitude: Some(-33.868),
            longitude: Some(151.209),
            height_msl_m: None,
            height_agl_m: None,
            entity_type: EntityType::Flight,
            entity_id: None,
        });

        assert_eq!(coalescer.transceiver_sample_count("QFA123"), 2);
        coalescer.reap_stale_transceivers(Utc::now());
        assert_eq!(coalescer.transceiver_sample_count("QFA123"), 1);
    }

    #[test]
    fn callsigns_snapshot_matches_inserted_flights() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        coalescer.upsert_flight(normalized("QFA123"), now);
        coalescer.upsert_flight(normalized("JST456"), now);
        let mut callsigns = coalescer.flight_callsigns();
        callsigns.sort();
        assert_eq!(callsigns, vec!["JST456".to_string(), "QFA123".to_string()]);
    }
}
