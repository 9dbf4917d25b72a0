//! Filter Pipeline: the layered predicate chain deciding which
//! controllers and flights from a fetched snapshot are worth tracking.
//! Pure functions, never fallible — a malformed record degrades to the
//! most conservative branch rather than raising an error.

use crate::airspace::AirspaceReference;
use crate::flights::NormalizedFlight;

/// Outcome of the flight filter, a typed result rather than a bare bool
/// so "kept because we couldn't decide" stays distinguishable from
/// "kept because it's clearly regional".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightFilterDecision {
    Included,
    Excluded,
    Uncertain,
}

impl FlightFilterDecision {
    pub fn is_kept(self) -> bool {
        !matches!(self, FlightFilterDecision::Excluded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStats {
    pub total_processed: u64,
    pub included: u64,
    pub excluded: u64,
    pub uncertain: u64,
}

impl FilterStats {
    pub fn record(&mut self, decision: FlightFilterDecision) {
        self.total_processed += 1;
        match decision {
            FlightFilterDecision::Included => self.included += 1,
            FlightFilterDecision::Excluded => self.excluded += 1,
            FlightFilterDecision::Uncertain => self.uncertain += 1,
        }
    }
}

/// Controller callsign filter: membership in the valid-controller set.
/// Case-sensitive by default.
pub fn filter_controller(callsign: &str, airspace: &AirspaceReference, enabled: bool) -> bool {
    if !enabled {
        return true;
    }
    airspace.is_valid_controller(callsign)
}

/// Flight filter, applied in order; the first test that resolves decides
/// the outcome.
///
/// 1. Airport prefix test on departure/arrival.
/// 2. Geographic polygon test on the current position.
/// 3. Conservative default: if neither resolved, keep the flight as
///    uncertain rather than dropping it silently.
pub fn filter_flight(
    flight: &NormalizedFlight,
    airspace: &AirspaceReference,
) -> FlightFilterDecision {
    let departure_regional = flight
        .departure
        .as_deref()
        .map(|icao| airspace.is_regional_airport(icao));
    let arrival_regional = flight
        .arrival
        .as_deref()
        .map(|icao| airspace.is_regional_airport(icao));

    match (departure_regional, arrival_regional) {
        (Some(true), _) | (_, Some(true)) => return FlightFilterDecision::Included,
        (Some(false), Some(false)) => return FlightFilterDecision::Excluded,
        _ => {}
    }

    if is_valid_coordinate(flight.latitude, flight.longitude) {
        return if airspace.point_in_boundary(flight.latitude, flight.longitude) {
            FlightFilterDecision::Included
        } else {
            FlightFilterDecision::Excluded
        };
    }

    FlightFilterDecision::Uncertain
}

fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_airspace() -> AirspaceReference {
        crate::airspace::testing::sample_airspace()
    }

    fn flight(departure: Option<&str>, arrival: Option<&str>, lat: f64, lon: f64) -> NormalizedFlight {
        NormalizedFlight {
            callsign: "QFA123".to_string(),
            pilot_id: 1,
            pilot_name: "Pilot".to_string(),
            aircraft_type: None,
            aircraft_short: None,
            aircraft_faa: None,
            latitude: lat,
            longitude: lon,
            altitude: 35000,
            heading: 90,
            groundspeed: 450,
            departure: departure.map(str::to_string),
            arrival: arrival.map(str::to_string),
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
    fn includes_flight_by_departure_prefix() {
        let airspace = sample_airspace();
        let f = flight(Some("YSSY"), Some("KLAX"), 999.0, 999.0);
        assert_eq!(filter_flight(&f, &airspace), FlightFilterDecision::Included);
    }

    #[test]
    fn excludes_flight_with_non_regional_airports_and_no_coordinates() {
        let airspace = sample_airspace();
        let f = flight(Some("EGLL"), Some("KLAX"), 999.0, 999.0);
        assert_eq!(filter_flight(&f, &airspace), FlightFilterDecision::Excluded);
    }

    #[test]
    fn falls_through_to_polygon_test_when_airports_missing() {
        let airspace = sample_airspace();
        let inside = flight(None, None, -33.868, 151.209);
        assert_eq!(filter_flight(&inside, &airspace), FlightFilterDecision::Included);

        let outside = flight(None, None, 51.5, -0.1);
        assert_eq!(filter_flight(&outside, &airspace), FlightFilterDecision::Excluded);
    }

    #[test]
    fn uncertain_when_everything_missing() {
        let airspace = sample_airspace();
        let f = flight(None, None, 999.0, 999.0);
        assert_eq!(filter_flight(&f, &airspace), FlightFilterDecision::Uncertain);
    }

    #[test]
    fn filter_is_idempotent() {
        let airspace = sample_airspace();
        let f = flight(Some("YSSY"), None, -33.868, 151.209);
        let first = filter_flight(&f, &airspace);
        let second = filter_flight(&f, &airspace);
        assert_eq!(first, second);
    }

    #[test]
    fn controller_filter_respects_enabled_flag() {
        let airspace = sample_airspace();
        assert!(filter_controller("ANYTHING", &airspace, false));
        assert!(!filter_controller("ANYTHING", &airspace, true));
    }

    #[test]
    fn filter_stats_accumulate() {
        let mut stats = FilterStats::default();
        stats.record(FlightFilterDecision::Included);
        stats.record(FlightFilterDecision::Excluded);
        stats.record(FlightFilterDecision::Uncertain);
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.included, 1);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.uncertain, 1);
    }
}
