//! Feed Client: fetches the upstream pilot/controller/ATIS snapshot and
//! the separate transceivers feed, and normalizes both into the domain
//! types the rest of the pipeline consumes. Tolerates per-record schema
//! violations by skipping and counting rather than failing the whole
//! fetch, in the manner of the per-record handling grounded on the
//! teacher's OGN ingestion path.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::controllers::NormalizedController;
use crate::flights::NormalizedFlight;
use crate::transceivers::{EntityType, TransceiverSample};

/// One normalized fetch result, ready for the filter pipeline.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pilots: Vec<NormalizedFlight>,
    pub controllers: Vec<NormalizedController>,
    pub transceivers: Vec<TransceiverSample>,
    pub update_timestamp: DateTime<Utc>,
    pub parse_errors: Vec<ParseSkip>,
}

/// One record dropped during normalization, kept for observability.
#[derive(Debug, Clone)]
pub struct ParseSkip {
    pub source: &'static str,
    pub reason: String,
}

pub struct FeedClient {
    client: Client,
    feed_url: String,
    transceivers_url: String,
    max_retries: u32,
}

impl FeedClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .user_agent(concat!("vatpac-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build feed HTTP client")?;

        Ok(Self {
            client,
            feed_url: config.feed_url.clone(),
            transceivers_url: config.transceivers_url.clone(),
            max_retries: config.max_fetch_retries,
        })
    }

    /// Fetch both endpoints and normalize into one [`Snapshot`]. Each
    /// endpoint retries independently with exponential backoff on
    /// timeout/5xx before the whole tick is abandoned.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let raw = self
            .fetch_with_retry::<RawFeedData>(&self.feed_url, "main feed")
            .await?;
        let raw_transceivers = self
            .fetch_with_retry::<Vec<RawTransceiverEntry>>(&self.transceivers_url, "transceivers feed")
            .await?;

        let mut parse_errors = Vec::new();

        let pilots = raw
            .pilots
            .into_iter()
            .filter_map(|p| normalize_pilot(p).map_err(|e| parse_errors.push(e)).ok())
            .collect();

        let controllers = raw
            .controllers
            .into_iter()
            .filter_map(|c| normalize_controller(c).map_err(|e| parse_errors.push(e)).ok())
            .collect();

        let transceivers = raw_transceivers
            .into_iter()
            .flat_map(normalize_transceiver_entry)
            .collect();

        Ok(Snapshot {
            pilots,
            controllers,
            transceivers,
            update_timestamp: raw.general.update_timestamp,
            parse_errors,
        })
    }

    async fn fetch_with_retry<T: for<'de> Deserialize<'de>>(&self, url: &str, label: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once::<T>(url).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt <= self.max_retries => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    warn!(
                        "{label} fetch attempt {attempt}/{} failed: {err:#}; retrying in {backoff:?}",
                        self.max_retries + 1
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err).with_context(|| format!("{label} fetch exhausted retries")),
            }
        }
    }

    async fn fetch_once<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{url} returned {status}: {body}");
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode JSON from {url}"))
    }
}

fn normalize_pilot(raw: RawPilot) -> std::result::Result<NormalizedFlight, ParseSkip> {
    if raw.callsign.trim().is_empty() {
        return Err(ParseSkip {
            source: "pilot",
            reason: "missing callsign".to_string(),
        });
    }

    let plan = raw.flight_plan.unwrap_or_default();

    Ok(NormalizedFlight {
        callsign: raw.callsign,
        pilot_id: raw.cid,
        pilot_name: raw.name,
        aircraft_type: plan.aircraft.clone(),
        aircraft_short: plan.aircraft_short,
        aircraft_faa: plan.aircraft_faa,
        latitude: raw.latitude,
        longitude: raw.longitude,
        altitude: raw.altitude,
        heading: raw.heading,
        groundspeed: raw.groundspeed,
        departure: plan.departure,
        arrival: plan.arrival,
        alternate: plan.alternate,
        route: plan.route,
        planned_altitude: plan.altitude,
        flight_rules: plan.flight_rules,
        cruise_tas: plan.cruise_tas,
        deptime: plan.deptime,
        enroute_time: plan.enroute_time,
        fuel_time: plan.fuel_time,
        remarks: plan.remarks,
        revision_id: plan.revision_id,
        assigned_transponder: plan.assigned_transponder,
        transponder: raw.transponder,
        qnh_i_hg: raw.qnh_i_hg,
        qnh_mb: raw.qnh_mb,
        logon_time: raw.logon_time,
        last_updated: raw.last_updated,
    })
}

fn normalize_controller(raw: RawController) -> std::result::Result<NormalizedController, ParseSkip> {
    if raw.callsign.trim().is_empty() {
        return Err(ParseSkip {
            source: "controller",
            reason: "missing callsign".to_string(),
        });
    }

    Ok(NormalizedController {
        callsign: raw.callsign,
        controller_id: raw.cid,
        name: raw.name,
        rating: raw.rating,
        facility: raw.facility,
        visual_range: raw.visual_range,
        atis: raw.text_atis.map(|lines| lines.join("\n")),
        frequency: raw.frequency,
        network_server: raw.server,
        logon_time: raw.logon_time,
        last_updated: raw.last_updated,
    })
}

fn normalize_transceiver_entry(entry: RawTransceiverEntry) -> Vec<TransceiverSample> {
    if entry.callsign.trim().is_empty() {
        return Vec::new();
    }

    entry
        .transceivers
        .into_iter()
        .map(|t| TransceiverSample {
            callsign: entry.callsign.clone(),
            transceiver_id: t.id,
            timestamp: Utc::now(),
            frequency: t.frequency,
            latitude: t.lat_deg,
            longitude: t.lon_deg,
            height_msl_m: t.height_msl_m,
            height_agl_m: t.height_agl_m,
            entity_type: EntityType::Flight,
            entity_id: None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawFeedData {
    pilots: Vec<RawPilot>,
    controllers: Vec<RawController>,
    general: RawGeneral,
}

#[derive(Debug, Deserialize)]
struct RawGeneral {
    update_timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawPilot {
    callsign: String,
    cid: i32,
    name: String,
    latitude: f64,
    longitude: f64,
    altitude: i32,
    groundspeed: i32,
    heading: i16,
    transponder: Option<String>,
    qnh_i_hg: Option<f64>,
    qnh_mb: Option<i32>,
    logon_time: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    flight_plan: Option<RawFlightPlan>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFlightPlan {
    flight_rules: Option<String>,
    aircraft: Option<String>,
    aircraft_short: Option<String>,
    aircraft_faa: Option<String>,
    departure: Option<String>,
    arrival: Option<String>,
    alternate: Option<String>,
    route: Option<String>,
    altitude: Option<String>,
    cruise_tas: Option<String>,
    deptime: Option<String>,
    enroute_time: Option<String>,
    fuel_time: Option<String>,
    remarks: Option<String>,
    revision_id: Option<i32>,
    assigned_transponder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawController {
    callsign: String,
    cid: i32,
    name: String,
    rating: i16,
    facility: i16,
    visual_range: i32,
    frequency: Option<String>,
    text_atis: Option<Vec<String>>,
    server: Option<String>,
    logon_time: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawTransceiverEntry {
    callsign: String,
    transceivers: Vec<RawTransceiver>,
}

#[derive(Debug, Deserialize)]
struct RawTransceiver {
    id: i32,
    frequency: i64,
    #[serde(rename = "latDeg")]
    lat_deg: Option<f64>,
    #[serde(rename = "lonDeg")]
    lon_deg: Option<f64>,
    #[serde(rename = "heightMslM")]
    height_msl_m: Option<f64>,
    #[serde(rename = "heightAglM")]
    height_agl_m: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pilot(callsign: &str) -> RawPilot {
        RawPilot {
            callsign: callsign.to_string(),
            cid: 1234567,
            name: "Test Pilot".to_string(),
            latitude: -33.868,
            longitude: 151.209,
            altitude: 35000,
            groundspeed: 450,
            heading: 90,
            transponder: Some("2000".to_string()),
            qnh_i_hg: Some(29.92),
            qnh_mb: Some(1013),
            logon_time: Utc::now(),
            last_updated: Utc::now(),
            flight_plan: Some(RawFlightPlan {
                flight_rules: Some("I".to_string()),
                aircraft: Some("B738".to_string()),
                aircraft_short: Some("B738".to_string()),
                aircraft_faa: None,
                departure: Some("YSSY".to_string()),
                arrival: Some("YBBN".to_string()),
                alternate: None,
                route: None,
                altitude: None,
                cruise_tas: None,
                deptime: None,
                enroute_time: None,
                fuel_time: None,
                remarks: None,
                revision_id: None,
                assigned_transponder: None,
            }),
        }
    }

    #[test]
    fn normalizes_valid_pilot() {
        let normalized = normalize_pilot(sample_pilot("QFA123")).unwrap();
        assert_eq!(normalized.callsign, "QFA123");
        assert_eq!(normalized.departure.as_deref(), Some("YSSY"));
    }

    #[test]
    fn rejects_pilot_without_callsign() {
        let skip = normalize_pilot(sample_pilot("")).unwrap_err();
        assert_eq!(skip.source, "pilot");
    }

    #[test]
    fn missing_flight_plan_leaves_optional_fields_unset() {
        let mut raw = sample_pilot("QFA123");
        raw.flight_plan = None;
        let normalized = normalize_pilot(raw).unwrap();
        assert!(normalized.departure.is_none());
        assert!(normalized.arrival.is_none());
    }

    #[test]
    fn normalizes_transceiver_entry_into_one_sample_per_transceiver() {
        let entry = RawTransceiverEntry {
            callsign: "QFA123".to_string(),
            transceivers: vec![
                RawTransceiver {
                    id: 1,
                    frequency: 133_700_000,
                    lat_deg: Some(-33.868),
                    lon_deg: Some(151.209),
                    height_msl_m: Some(10000.0),
                    height_agl_m: Some(9500.0),
                },
                RawTransceiver {
                    id: 2,
                    frequency: 133_700_000,
                    lat_deg: None,
                    lon_deg: None,
                    height_msl_m: None,
                    height_agl_m: None,
                },
            ],
        };

        let samples = normalize_transceiver_entry(entry);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].transceiver_id, 1);
        assert_eq!(samples[1].transceiver_id, 2);
    }

    #[test]
    fn empty_callsign_transceiver_entry_yields_no_samples() {
        let entry = RawTransceiverEntry {
            callsign: "".to_string(),
            transceivers: vec![RawTransceiver {
                id: 1,
                frequency: 1,
                lat_deg: None,
                lon_deg: None,
                height_msl_m: None,
                height_agl_m: None,
            }],
        };
        assert!(normalize_transceiver_entry(entry).is_empty());
    }
}
