//! Lifecycle Engine: the `Flight.status` state machine. Three detectors
//! (landing, pilot-disconnect, timeout) plus the active↔stale transition
//! are pure functions over [`crate::coalescer::Coalescer`] entries,
//! called from the Scheduler's tickers — landing and active/stale run
//! inline on the poll tick, pilot-disconnect and timeout run on their own
//! cadences, mirroring the teacher's split between inline state
//! transitions in `process_state_transition` and out-of-band background
//! work in `towing.rs`.
//!
//! `lifecycle` is the sole writer of [`crate::flights::FlightState`]'s
//! private `status` field — enforced by that field only being mutable
//! through `pub(crate) fn set_status`, which this module (and only this
//! module, by crate visibility) calls.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::airspace::AirspaceReference;
use crate::coalescer::Coalescer;
use crate::config::Config;
use crate::flights::FlightStatus;
use crate::geometry::haversine_nm;
use crate::occupancy::NewOccupancyModel;

/// A landing firing: the flight transitioned active/stale → landed this
/// tick. Carries what the completion/summary path needs without a
/// second lookup into the Coalescer.
#[derive(Debug, Clone)]
pub struct LandingEvent {
    pub callsign: String,
    pub arrival: String,
    pub landed_at: DateTime<Utc>,
}

/// A completed-transition firing, from either the pilot-disconnect or
/// timeout detector.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub callsign: String,
    pub disconnected_at: DateTime<Utc>,
    pub disconnect_method: DisconnectMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMethod {
    Detected,
    Timeout,
}

impl DisconnectMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectMethod::Detected => "detected",
            DisconnectMethod::Timeout => "timeout",
        }
    }
}

/// A sector-occupancy bookkeeping action produced by the per-tick
/// sector-transition sweep. Opens go through the Write Batcher's append
/// queue; closes are applied directly through `OccupancyRepository`
/// keyed on `(callsign, sector_name)` since the Lifecycle Engine never
/// holds a DB-assigned row id for an open row it didn't itself insert
/// synchronously (see `occupancy_repo.rs` module doc).
#[derive(Debug, Clone)]
pub enum OccupancyOp {
    Open(NewOccupancyModel),
    Close {
        callsign: String,
        sector_name: String,
        exit_timestamp: DateTime<Utc>,
        exit_latitude: f64,
        exit_longitude: f64,
        exit_altitude: i32,
    },
}

/// Result of one poll-tick pass over the Coalescer's flights.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub landings: Vec<LandingEvent>,
    pub occupancy_ops: Vec<OccupancyOp>,
    pub stale_count: u32,
    pub reactivated_count: u32,
}

/// Run the active↔stale transition, the landing detector, and sector
/// occupancy tracking for every flight currently held by the Coalescer.
/// `present_callsigns` is the set of callsigns that appeared in this
/// tick's filtered snapshot (i.e. were just upserted), used to decide
/// absence for the stale transition.
pub fn process_poll_tick(
    coalescer: &Coalescer,
    airspace: &AirspaceReference,
    config: &Config,
    present_callsigns: &HashSet<String>,
    now: DateTime<Utc>,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let stale_cutoff = chrono::Duration::seconds(config.stale_cutoff_seconds());

    for callsign in coalescer.flight_callsigns() {
        let Some(mut flight) = coalescer.flight_mut(&callsign) else {
            continue;
        };

        match flight.status() {
            FlightStatus::Active => {
                if !present_callsigns.contains(&callsign)
                    && now - flight.last_seen_in_snapshot > stale_cutoff
                {
                    flight.set_status(FlightStatus::Stale);
                    outcome.stale_count += 1;
                }
            }
            FlightStatus::Stale => {
                if present_callsigns.contains(&callsign) {
                    flight.set_status(FlightStatus::Active);
                    outcome.reactivated_count += 1;
                }
            }
            _ => continue,
        }

        if matches!(flight.status(), FlightStatus::Active | FlightStatus::Stale)
            && let Some(event) = check_landing(&mut flight, airspace, config, now)
        {
            outcome.landings.push(event);
        }

        if matches!(
            flight.status(),
            FlightStatus::Active | FlightStatus::Stale | FlightStatus::Landed
        ) {
            track_sector_occupancy(&mut flight, airspace, &mut outcome.occupancy_ops, now);
        }
    }

    outcome
}

/// §4.E landing detector: distance-to-arrival, altitude-above-field,
/// groundspeed, and duplicate-suppression gates, in that order — the
/// first failing gate skips the flight for this tick without side
/// effects.
fn check_landing(
    flight: &mut crate::flights::FlightState,
    airspace: &AirspaceReference,
    config: &Config,
    now: DateTime<Utc>,
) -> Option<LandingEvent> {
    let arrival_code = flight.arrival.as_deref()?;
    let airport = airspace.airport(arrival_code)?;
    let elevation_ft = airport.elevation_ft.unwrap_or(0);

    let distance_nm = haversine_nm(flight.latitude, flight.longitude, airport.latitude, airport.longitude);
    if distance_nm > config.landing_radius_nm {
        return None;
    }

    let altitude_above_airport = flight.altitude - elevation_ft;
    if altitude_above_airport as f64 > config.landing_alt_ft as f64 {
        return None;
    }

    if flight.groundspeed as f64 > config.landing_speed_kts {
        return None;
    }

    if let Some((last_arrival, last_time)) = &flight.last_landing
        && last_arrival == arrival_code
        && now - *last_time < chrono::Duration::minutes(config.landing_dup_minutes)
    {
        return None;
    }

    flight.set_status(FlightStatus::Landed);
    flight.landed_at = Some(now);
    flight.last_landing = Some((arrival_code.to_string(), now));

    Some(LandingEvent {
        callsign: flight.callsign.clone(),
        arrival: arrival_code.to_string(),
        landed_at: now,
    })
}

/// §4.E sector occupancy tracking: determine the flight's current
/// sector (if any) and emit the open/close ops needed to keep the
/// at-most-one-open-row-per-callsign invariant, without consulting the
/// database — the in-memory `current_sector` on [`crate::flights::FlightState`]
/// would be the natural place to track this, but since sector identity
/// is cheap to recompute every tick from position, the Coalescer does
/// not need to carry it: the Write Batcher/`OccupancyRepository` close
/// path keys on `(callsign, sector_name)`, so emitting a redundant
/// close-then-open for an unchanged sector is a correctness no-op, just
/// a wasted statement the repository tolerates (`close_open_for_sector`
/// returns `false` if nothing matched).
fn track_sector_occupancy(
    flight: &mut crate::flights::FlightState,
    airspace: &AirspaceReference,
    ops: &mut Vec<OccupancyOp>,
    now: DateTime<Utc>,
) {
    if !is_valid_position(flight.latitude, flight.longitude) {
        return;
    }

    let new_sector = airspace
        .sector_containing(flight.latitude, flight.longitude)
        .map(str::to_string);

    if new_sector == flight.current_sector {
        return;
    }

    if let Some(previous) = flight.current_sector.take() {
        ops.push(close_op(flight, &previous, now));
    }
    if let Some(sector) = &new_sector {
        ops.push(OccupancyOp::Open(NewOccupancyModel {
            callsign: flight.callsign.clone(),
            flight_id: Some(flight.id),
            sector_name: sector.clone(),
            entry_timestamp: now,
            entry_latitude: flight.latitude,
            entry_longitude: flight.longitude,
            entry_altitude: flight.altitude,
        }));
    }
    flight.current_sector = new_sector;
}

fn close_op(flight: &crate::flights::FlightState, sector_name: &str, now: DateTime<Utc>) -> OccupancyOp {
    OccupancyOp::Close {
        callsign: flight.callsign.clone(),
        sector_name: sector_name.to_string(),
        exit_timestamp: now,
        exit_latitude: flight.latitude,
        exit_longitude: flight.longitude,
        exit_altitude: flight.altitude,
    }
}

fn is_valid_position(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// §4.E pilot-disconnect detector: every `landed` flight absent from the
/// latest filtered snapshot completes with `disconnect_method = detected`.
/// Runs on its own 30s cadence, independent of the poll ticker.
pub fn run_disconnect_detector(
    coalescer: &Coalescer,
    present_callsigns: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<CompletionEvent> {
    let mut events = Vec::new();

    for callsign in coalescer.flight_callsigns() {
        let Some(mut flight) = coalescer.flight_mut(&callsign) else {
            continue;
        };
        if flight.status() != FlightStatus::Landed {
            continue;
        }
        if present_callsigns.contains(&callsign) {
            continue;
        }

        flight.set_status(FlightStatus::Completed);
        flight.disconnected_at = Some(now);
        flight.disconnect_method = Some(DisconnectMethod::Detected.as_str().to_string());

        events.push(CompletionEvent {
            callsign: callsign.clone(),
            disconnected_at: now,
            disconnect_method: DisconnectMethod::Detected,
        });
    }

    events
}

/// §4.E timeout detector: a `landed` flight that has not disconnected
/// within `timeout_hours` completes anyway, so nothing lingers forever
/// if the feed simply stops echoing a disconnect.
pub fn run_timeout_detector(coalescer: &Coalescer, config: &Config, now: DateTime<Utc>) -> Vec<CompletionEvent> {
    let mut events = Vec::new();
    let timeout = chrono::Duration::hours(config.timeout_hours);

    for callsign in coalescer.flight_callsigns() {
        let Some(mut flight) = coalescer.flight_mut(&callsign) else {
            continue;
        };
        if flight.status() != FlightStatus::Landed {
            continue;
        }
        let Some(landed_at) = flight.landed_at else {
            continue;
        };
        if now - landed_at < timeout {
            continue;
        }

        flight.set_status(FlightStatus::Completed);
        flight.disconnected_at = Some(now);
        flight.disconnect_method = Some(DisconnectMethod::Timeout.as_str().to_string());

        events.push(CompletionEvent {
            callsign: callsign.clone(),
            disconnected_at: now,
            disconnect_method: DisconnectMethod::Timeout,
        });
    }

    events
}

/// External cancel request: any non-terminal flight moves to `cancelled`
/// immediately, per the highest-precedence row of the transition table.
/// Not driven by a ticker — called on demand (e.g. from an operator
/// tool), so it takes a single callsign rather than sweeping the map.
pub fn cancel_flight(coalescer: &Coalescer, callsign: &str, now: DateTime<Utc>) -> bool {
    let Some(mut flight) = coalescer.flight_mut(callsign) else {
        return false;
    };
    if flight.status().is_terminal() {
        return false;
    }
    flight.set_status(FlightStatus::Cancelled);
    flight.disconnected_at = Some(now);
    flight.disconnect_method = Some("cancelled".to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airports::AirportRef;
    use crate::flights::{FlightState, NormalizedFlight};

    fn airspace_with_airport(icao: &str, lat: f64, lon: f64, elevation_ft: Option<i32>) -> AirspaceReference {
        let mut reference = crate::airspace::testing::sample_airspace();
        reference.insert_airport_for_test(AirportRef {
            icao: icao.to_string(),
            name: "Test".to_string(),
            latitude: lat,
            longitude: lon,
            elevation_ft,
            country: None,
            region: None,
            active: true,
        });
        reference
    }

    fn base_flight(arrival: &str, lat: f64, lon: f64, altitude: i32, groundspeed: i32) -> FlightState {
        FlightState::new_active(
            NormalizedFlight {
                callsign: "QFA123".to_string(),
                pilot_id: 1,
                pilot_name: "Pilot".to_string(),
                aircraft_type: None,
                aircraft_short: None,
                aircraft_faa: None,
                latitude: lat,
                longitude: lon,
                altitude,
                heading: 90,
                groundspeed,
                departure: Some("YSSY".to_string()),
                arrival: Some(arrival.to_string()),
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
            },
            Utc::now(),
        )
    }

    #[test]
    fn landing_detector_fires_within_all_thresholds() {
        let airspace = airspace_with_airport("YBBN", -27.3842, 153.1175, Some(13));
        let config = Config::default();
        let mut flight = base_flight("YBBN", -27.3842, 153.1175, 500, 15);

        let event = check_landing(&mut flight, &airspace, &config, Utc::now());
        assert!(event.is_some());
        assert_eq!(flight.status(), FlightStatus::Landed);
    }

    #[test]
    fn landing_detector_skips_when_too_fast() {
        let airspace = airspace_with_airport("YBBN", -27.3842, 153.1175, Some(13));
        let config = Config::default();
        let mut flight = base_flight("YBBN", -27.3842, 153.1175, 500, 180);

        assert!(check_landing(&mut flight, &airspace, &config, Utc::now()).is_none());
        assert_eq!(flight.status(), FlightStatus::Active);
    }

    #[test]
    fn landing_detector_skips_when_too_high() {
        let airspace = airspace_with_airport("YBBN", -27.3842, 153.1175, Some(13));
        let config = Config::default();
        let mut flight = base_flight("YBBN", -27.3842, 153.1175, 5000, 15);

        assert!(check_landing(&mut flight, &airspace, &config, Utc::now()).is_none());
    }

    #[test]
    fn landing_detector_suppresses_duplicate_within_window() {
        let airspace = airspace_with_airport("YBBN", -27.3842, 153.1175, Some(13));
        let config = Config::default();
        let mut flight = base_flight("YBBN", -27.3842, 153.1175, 500, 15);
        let now = Utc::now();

        assert!(check_landing(&mut flight, &airspace, &config, now).is_some());
        flight.set_status(FlightStatus::Active); // simulate go-around being ignored elsewhere
        let second = check_landing(&mut flight, &airspace, &config, now + chrono::Duration::minutes(2));
        assert!(second.is_none());
    }

    #[test]
    fn landing_detector_skipped_when_arrival_unknown() {
        let airspace = crate::airspace::testing::sample_airspace();
        let config = Config::default();
        let mut flight = base_flight("ZZZZ", -27.3842, 153.1175, 500, 15);

        assert!(check_landing(&mut flight, &airspace, &config, Utc::now()).is_none());
    }

    #[test]
    fn go_around_does_not_revert_landed_status() {
        // Per the transition table, landed -> active is not a transition;
        // the poll tick only ever calls check_landing for active/stale
        // flights, so a landed flight is simply skipped here.
        let mut flight = base_flight("YBBN", -27.3842, 153.1175, 500, 15);
        flight.set_status(FlightStatus::Landed);
        assert_eq!(flight.status(), FlightStatus::Landed);
    }

    #[test]
    fn disconnect_detector_completes_landed_flight_absent_from_snapshot() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        coalescer.upsert_flight(
            NormalizedFlight {
                callsign: "QFA123".to_string(),
                pilot_id: 1,
                pilot_name: "Pilot".to_string(),
                aircraft_type: None,
                aircraft_short: None,
                aircraft_faa: None,
                latitude: -27.38,
                longitude: 153.11,
                altitude: 0,
                heading: 0,
                groundspeed: 0,
                departure: None,
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
                logon_time: now,
                last_updated: now,
            },
            now,
        );
        coalescer.flight_mut("QFA123").unwrap().set_status(FlightStatus::Landed);

        let events = run_disconnect_detector(&coalescer, &HashSet::new(), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].disconnect_method, DisconnectMethod::Detected);
        assert_eq!(coalescer.flight("QFA123").unwrap().status(), FlightStatus::Completed);
    }

    #[test]
    fn timeout_detector_completes_after_timeout_hours() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        let landed_at = now - chrono::Duration::hours(2);
        coalescer.upsert_flight(
            NormalizedFlight {
                callsign: "QFA123".to_string(),
                pilot_id: 1,
                pilot_name: "Pilot".to_string(),
                aircraft_type: None,
                aircraft_short: None,
                aircraft_faa: None,
                latitude: -27.38,
                longitude: 153.11,
                altitude: 0,
                heading: 0,
                groundspeed: 0,
                departure: None,
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
                logon_time: now,
                last_updated: now,
            },
            now,
        );
        {
            let mut flight = coalescer.flight_mut("QFA123").unwrap();
            flight.set_status(FlightStatus::Landed);
            flight.landed_at = Some(landed_at);
        }

        let config = Config::default();
        let events = run_timeout_detector(&coalescer, &config, now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].disconnect_method, DisconnectMethod::Timeout);
    }

    #[test]
    fn cancel_moves_active_flight_to_cancelled() {
        let coalescer = Coalescer::new();
        let now = Utc::now();
        coalescer.upsert_flight(
            NormalizedFlight {
                callsign: "QFA123".to_string(),
                pilot_id: 1,
                pilot_name: "Pilot".to_string(),
                aircraft_type: None,
                aircraft_short: None,
                aircraft_faa: None,
                latitude: -27.38,
                longitude: 153.11,
                altitude: 0,
                heading: 0,
                groundspeed: 0,
                departure: None,
                arrival: None,
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
                logon_time: now,
                last_updated: now,
            },
            now,
        );

        assert!(cancel_flight(&coalescer, "QFA123", now));
        assert_eq!(coalescer.flight("QFA123").unwrap().status(), FlightStatus::Cancelled);
        assert!(!cancel_flight(&coalescer, "QFA123", now));
    }
}
