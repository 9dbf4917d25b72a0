//! Transceiver sample domain model: append-only time series keyed by
//! `(callsign, transceiver_id, timestamp)`, shared by flights and
//! controllers.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::transceiver_samples;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Flight,
    Atc,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Flight => "flight",
            EntityType::Atc => "atc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransceiverSample {
    pub callsign: String,
    pub transceiver_id: i32,
    pub timestamp: DateTime<Utc>,
    pub frequency: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transceiver_samples)]
pub struct NewTransceiverSampleModel {
    pub callsign: String,
    pub transceiver_id: i32,
    pub timestamp: DateTime<Utc>,
    pub frequency: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub entity_type: String,
    pub entity_id: Option<String>,
}

impl From<&TransceiverSample> for NewTransceiverSampleModel {
    fn from(sample: &TransceiverSample) -> Self {
        Self {
            callsign: sample.callsign.clone(),
            transceiver_id: sample.transceiver_id,
            timestamp: sample.timestamp,
            frequency: sample.frequency,
            latitude: sample.latitude,
            longitude: sample.longitude,
            height_msl_m: sample.height_msl_m,
            height_agl_m: sample.height_agl_m,
            entity_type: sample.entity_type.as_str().to_string(),
            entity_id: sample.entity_id.clone(),
        }
    }
}

/// Row shape used by the correlator's range queries.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = transceiver_samples)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransceiverSampleModel {
    pub id: i64,
    pub callsign: String,
    pub transceiver_id: i32,
    pub timestamp: DateTime<Utc>,
    pub frequency: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
