//! Correlator: computes ATC-coverage statistics for a completed flight by
//! joining its transceiver samples against controller transceiver
//! samples on frequency, time window, and proximity.
//!
//! The 300-unit proximity test is documented upstream only as "coordinate
//! units", not nautical miles or any other named unit. Rather than
//! silently reinterpreting that as haversine nautical miles, this keeps
//! plain Euclidean degrees ([`crate::geometry::euclidean_degrees`]) as
//! the metric, preserving the ambiguity noted in `SPEC_FULL.md` §9.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::controllers::ControllerClass;
use crate::geometry::euclidean_degrees;
use crate::transceivers_repo::TransceiversRepository;

/// Matching window either side of a flight sample's timestamp.
const TIME_WINDOW_SECONDS: i64 = 180;
/// Proximity threshold in the correlator's undocumented "coordinate
/// units" (plain Euclidean degrees).
const PROXIMITY_UNITS: f64 = 300.0;

#[derive(Debug, Clone, Default)]
pub struct CoverageResult {
    pub total_samples: usize,
    pub covered_samples: usize,
    /// Integer percent, rounded half-to-even per §4.H step 4.
    pub controller_time_percentage: i16,
    pub controller_callsigns: Vec<String>,
    pub class_counts: HashMap<ControllerClass, usize>,
}

/// Facility lookup: resolves a controller callsign to its facility
/// taxonomy value so observer-facility samples can be excluded from
/// coverage, per §4.H step 2. Callers supply this from whatever source
/// has it cheaply available (the live Coalescer, falling back to the
/// database for controllers that have since disconnected).
pub trait FacilityLookup {
    fn facility_for(&self, callsign: &str) -> Option<i16>;
}

pub async fn compute_coverage(
    flight_callsign: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    transceivers: &TransceiversRepository,
    facility: &dyn FacilityLookup,
) -> anyhow::Result<CoverageResult> {
    let flight_samples = transceivers
        .samples_for_callsign_between(flight_callsign, t0, t1)
        .await?;

    if flight_samples.is_empty() {
        return Ok(CoverageResult::default());
    }

    let window = Duration::seconds(TIME_WINDOW_SECONDS);
    let controller_samples = transceivers
        .controller_samples_between(t0 - window, t1 + window)
        .await?;

    let mut covered = 0usize;
    let mut seen_controllers: HashSet<String> = HashSet::new();

    for sample in &flight_samples {
        let (Some(s_lat), Some(s_lon)) = (sample.latitude, sample.longitude) else {
            continue;
        };

        // Collect every matching controller for this sample, not just the
        // first — two controllers can legitimately cover the same flight
        // sample (same frequency/window/proximity), and both must end up
        // in the distinct-callsigns set even though one match is enough
        // to mark the sample covered.
        let mut is_covered = false;
        for candidate in &controller_samples {
            let Some(controller_callsign) = candidate.entity_id.as_deref() else {
                continue;
            };

            if candidate.frequency != sample.frequency {
                continue;
            }
            if (candidate.timestamp - sample.timestamp).num_seconds().abs() > TIME_WINDOW_SECONDS {
                continue;
            }
            let (Some(c_lat), Some(c_lon)) = (candidate.latitude, candidate.longitude) else {
                continue;
            };
            if euclidean_degrees(s_lat, s_lon, c_lat, c_lon) > PROXIMITY_UNITS {
                continue;
            }
            if facility.facility_for(controller_callsign) == Some(crate::controllers::FACILITY_OBSERVER) {
                continue;
            }

            seen_controllers.insert(controller_callsign.to_string());
            is_covered = true;
        }

        if is_covered {
            covered += 1;
        }
    }

    let total = flight_samples.len();
    let percentage = round_half_even_percent(covered, total);

    let mut class_counts: HashMap<ControllerClass, usize> = HashMap::new();
    for callsign in &seen_controllers {
        *class_counts.entry(ControllerClass::from_callsign(callsign)).or_insert(0) += 1;
    }

    let mut controller_callsigns: Vec<String> = seen_controllers.into_iter().collect();
    controller_callsigns.sort();

    Ok(CoverageResult {
        total_samples: total,
        covered_samples: covered,
        controller_time_percentage: percentage,
        controller_callsigns,
        class_counts,
    })
}

/// `covered / total * 100`, rounded half-to-even (banker's rounding),
/// matching §4.H step 4's explicit rounding rule.
fn round_half_even_percent(covered: usize, total: usize) -> i16 {
    if total == 0 {
        return 0;
    }
    let ratio = covered as f64 * 100.0 / total as f64;
    let floor = ratio.floor();
    let diff = ratio - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_even_rounds_ties_to_even() {
        // 1/8 * 100 = 12.5 -> rounds to 12 (even)
        assert_eq!(round_half_even_percent(1, 8), 12);
        // 3/8 * 100 = 37.5 -> rounds to 38 (even)
        assert_eq!(round_half_even_percent(3, 8), 38);
    }

    #[test]
    fn round_half_even_non_tie_rounds_normally() {
        assert_eq!(round_half_even_percent(7, 10), 70);
        assert_eq!(round_half_even_percent(1, 3), 33);
        assert_eq!(round_half_even_percent(2, 3), 67);
    }

    #[test]
    fn round_half_even_zero_total_is_zero() {
        assert_eq!(round_half_even_percent(0, 0), 0);
    }

    #[test]
    fn known_scenario_seventy_percent_coverage() {
        assert_eq!(round_half_even_percent(70, 100), 70);
    }
}
