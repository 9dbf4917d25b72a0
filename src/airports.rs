//! Airport reference data: read-only, loaded once at startup from a CSV
//! dataset and mirrored into the `airports` table for downstream
//! consumers. Keyed by ICAO code.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::airports;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportRef {
    pub icao: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: Option<i32>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub active: bool,
}

/// One row of the provided airport CSV (ICAO, name, lat, lon, elevation,
/// country, region).
#[derive(Debug, Clone, Deserialize)]
pub struct AirportCsvRow {
    pub icao: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: Option<i32>,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl From<AirportCsvRow> for AirportRef {
    fn from(row: AirportCsvRow) -> Self {
        Self {
            icao: row.icao,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            elevation_ft: row.elevation_ft,
            country: row.country,
            region: row.region,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = airports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AirportModel {
    pub icao: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: Option<i32>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = airports)]
pub struct NewAirportModel {
    pub icao: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: Option<i32>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub active: bool,
}

impl From<&AirportRef> for NewAirportModel {
    fn from(airport: &AirportRef) -> Self {
        Self {
            icao: airport.icao.clone(),
            name: airport.name.clone(),
            latitude: airport.latitude,
            longitude: airport.longitude,
            elevation_ft: airport.elevation_ft,
            country: airport.country.clone(),
            region: airport.region.clone(),
            active: airport.active,
        }
    }
}

impl From<AirportModel> for AirportRef {
    fn from(model: AirportModel) -> Self {
        Self {
            icao: model.icao,
            name: model.name,
            latitude: model.latitude,
            longitude: model.longitude,
            elevation_ft: model.elevation_ft,
            country: model.country,
            region: model.region,
            active: model.active,
        }
    }
}

/// Parse the airport reference CSV. Tolerant of a missing `elevation_ft`
/// column value (stored as NULL); rejects rows with a missing ICAO code.
pub fn read_airports_csv_file(path: &std::path::Path) -> anyhow::Result<Vec<AirportRef>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut airports = Vec::new();
    for result in reader.deserialize() {
        let row: AirportCsvRow = result?;
        if row.icao.trim().is_empty() {
            continue;
        }
        airports.push(row.into());
    }
    Ok(airports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_valid_rows_and_skips_blank_icao() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airports.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "icao,name,latitude,longitude,elevation_ft,country,region").unwrap();
        writeln!(file, "YSSY,Sydney,-33.9461,151.1772,21,AU,NSW").unwrap();
        writeln!(file, ",Blank,0.0,0.0,,,").unwrap();
        writeln!(file, "YBBN,Brisbane,-27.3842,153.1175,13,AU,QLD").unwrap();
        drop(file);

        let airports = read_airports_csv_file(&path).unwrap();
        assert_eq!(airports.len(), 2);
        assert_eq!(airports[0].icao, "YSSY");
        assert_eq!(airports[1].icao, "YBBN");
    }
}
