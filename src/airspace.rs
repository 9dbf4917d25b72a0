//! Airspace reference data: airport table, region boundary, sector
//! polygons, and the valid-controller-callsign set. Loaded at startup and
//! on explicit reload; held behind [`arc_swap::ArcSwap`] so readers take
//! a consistent pointer snapshot without blocking a concurrent reload.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use geo::{BoundingRect, Contains, Rect};
use geo_types::{MultiPolygon, Point, Polygon};

use crate::airports::AirportRef;
use crate::airports_repo::AirportsRepository;

/// One named sector polygon plus its precomputed bounding box, used as
/// an O(1) pre-filter before the more expensive ray-cast containment
/// check. A separate R-tree crate is not warranted at the sector counts
/// this system handles (tens, not thousands).
struct Sector {
    name: String,
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
}

/// Immutable snapshot of everything the Filter Pipeline and Lifecycle
/// Engine need to know about the airspace. Replaced atomically on
/// reload; never mutated in place.
pub struct AirspaceReference {
    airports: HashMap<String, AirportRef>,
    boundary: MultiPolygon<f64>,
    sectors: Vec<Sector>,
    valid_controller_callsigns: HashSet<String>,
    region_letter: char,
}

impl AirspaceReference {
    pub fn is_valid_controller(&self, callsign: &str) -> bool {
        self.valid_controller_callsigns.contains(callsign)
    }

    /// ICAO prefix rule: the first letter of the code equals the
    /// configured region letter (e.g. `Y*` for Australia).
    pub fn is_regional_airport(&self, icao: &str) -> bool {
        icao.chars()
            .next()
            .map(|c| c.eq_ignore_ascii_case(&self.region_letter))
            .unwrap_or(false)
    }

    pub fn airport(&self, icao: &str) -> Option<&AirportRef> {
        self.airports.get(icao)
    }

    pub fn point_in_boundary(&self, lat: f64, lon: f64) -> bool {
        self.boundary.contains(&Point::new(lon, lat))
    }

    /// First sector (by declaration order) whose bounding box and
    /// polygon both contain the point.
    pub fn sector_containing(&self, lat: f64, lon: f64) -> Option<&str> {
        let point = Point::new(lon, lat);
        self.sectors
            .iter()
            .find(|sector| sector.bounds.contains(&point) && sector.polygon.contains(&point))
            .map(|sector| sector.name.as_str())
    }

    pub fn airport_count(&self) -> usize {
        self.airports.len()
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }
}

/// Source paths for a (re)load. Kept separate from [`AirspaceReference`]
/// itself so `reload()` can rebuild from the same inputs.
#[derive(Debug, Clone)]
pub struct AirspaceSources {
    pub region_boundary_path: std::path::PathBuf,
    pub sectors_path: std::path::PathBuf,
    pub valid_controllers_path: std::path::PathBuf,
    pub region_letter: char,
}

/// Holds the current [`AirspaceReference`] behind an atomically-swapped
/// pointer. `reload()` builds a fresh snapshot and swaps it in one store;
/// readers that already took a `Guard` keep their pre-reload view.
pub struct AirspaceStore {
    current: ArcSwap<AirspaceReference>,
    sources: AirspaceSources,
    airports_repo: AirportsRepository,
}

impl AirspaceStore {
    pub async fn load(sources: AirspaceSources, airports_repo: AirportsRepository) -> Result<Self> {
        let reference = build_reference(&sources, &airports_repo).await?;
        Ok(Self {
            current: ArcSwap::from_pointee(reference),
            sources,
            airports_repo,
        })
    }

    pub fn current(&self) -> Arc<AirspaceReference> {
        self.current.load_full()
    }

    pub async fn reload(&self) -> Result<()> {
        let reference = build_reference(&self.sources, &self.airports_repo).await?;
        self.current.store(Arc::new(reference));
        Ok(())
    }
}

async fn build_reference(
    sources: &AirspaceSources,
    airports_repo: &AirportsRepository,
) -> Result<AirspaceReference> {
    let airport_list = airports_repo.load_all().await?;
    let airports = airport_list
        .into_iter()
        .map(|airport| (airport.icao.clone(), airport))
        .collect();

    let boundary = read_boundary_geojson(&sources.region_boundary_path)?;
    let sectors = read_sectors_geojson(&sources.sectors_path)?;
    let valid_controller_callsigns = read_valid_controllers_file(&sources.valid_controllers_path)?;

    Ok(AirspaceReference {
        airports,
        boundary,
        sectors,
        valid_controller_callsigns,
        region_letter: sources.region_letter,
    })
}

fn read_boundary_geojson(path: &Path) -> Result<MultiPolygon<f64>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read region boundary file {path:?}"))?;
    let geojson: geojson::GeoJson = contents
        .parse()
        .with_context(|| format!("Failed to parse region boundary GeoJSON {path:?}"))?;

    let geometry: geo_types::Geometry<f64> = match geojson {
        geojson::GeoJson::Geometry(g) => g
            .try_into()
            .context("Failed to convert region boundary geometry")?,
        geojson::GeoJson::Feature(f) => {
            let geom = f
                .geometry
                .context("Region boundary feature has no geometry")?;
            geom.try_into()
                .context("Failed to convert region boundary feature geometry")?
        }
        geojson::GeoJson::FeatureCollection(fc) => {
            let feature = fc
                .features
                .into_iter()
                .next()
                .context("Region boundary feature collection is empty")?;
            let geom = feature
                .geometry
                .context("Region boundary feature has no geometry")?;
            geom.try_into()
                .context("Failed to convert region boundary feature geometry")?
        }
    };

    match geometry {
        geo_types::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo_types::Geometry::MultiPolygon(multi) => Ok(multi),
        other => anyhow::bail!("Region boundary must be a Polygon or MultiPolygon, got {other:?}"),
    }
}

fn read_sectors_geojson(path: &Path) -> Result<Vec<Sector>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sectors file {path:?}"))?;
    let geojson: geojson::GeoJson = contents
        .parse()
        .with_context(|| format!("Failed to parse sectors GeoJSON {path:?}"))?;

    let geojson::GeoJson::FeatureCollection(collection) = geojson else {
        anyhow::bail!("Sectors file must be a GeoJSON FeatureCollection");
    };

    let mut sectors = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let name = feature
            .property("name")
            .and_then(|v| v.as_str())
            .context("Sector feature is missing a `name` property")?
            .to_string();
        let geometry = feature
            .geometry
            .with_context(|| format!("Sector feature {name} has no geometry"))?;
        let geometry: geo_types::Geometry<f64> = geometry
            .try_into()
            .with_context(|| format!("Failed to convert geometry for sector {name}"))?;
        let polygon = match geometry {
            geo_types::Geometry::Polygon(polygon) => polygon,
            other => anyhow::bail!("Sector {name} geometry must be a Polygon, got {other:?}"),
        };
        let bounds = polygon
            .bounding_rect()
            .with_context(|| format!("Sector {name} polygon has no bounding rectangle"))?;
        sectors.push(Sector {
            name,
            polygon,
            bounds,
        });
    }

    Ok(sectors)
}

/// Plain text, one callsign per line, sorted, `#` comments ignored.
fn read_valid_controllers_file(path: &Path) -> Result<HashSet<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read valid-controllers file {path:?}"))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Test-only helpers shared with other modules' test suites (e.g.
/// `filter.rs`) that need a populated [`AirspaceReference`] without a
/// database or reference files.
#[cfg(test)]
pub mod testing {
    use super::*;

    pub fn sample_airspace() -> AirspaceReference {
        super::tests::sample_reference()
    }
}

#[cfg(test)]
impl AirspaceReference {
    /// Insert an airport into a test-built reference without going
    /// through `build_reference`'s database load.
    pub fn insert_airport_for_test(&mut self, airport: AirportRef) {
        self.airports.insert(airport.icao.clone(), airport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn sample_reference() -> AirspaceReference {
        let mut airports = HashMap::new();
        airports.insert(
            "YSSY".to_string(),
            AirportRef {
                icao: "YSSY".to_string(),
                name: "Sydney".to_string(),
                latitude: -33.9461,
                longitude: 151.1772,
                elevation_ft: Some(21),
                country: Some("AU".to_string()),
                region: Some("NSW".to_string()),
                active: true,
            },
        );

        let mut valid_controller_callsigns = HashSet::new();
        valid_controller_callsigns.insert("SY_TWR".to_string());

        // A simple square boundary covering most of eastern Australia.
        let boundary = MultiPolygon::new(vec![geo_types::Polygon::new(
            geo_types::LineString::from(vec![
                (140.0, -38.0),
                (155.0, -38.0),
                (155.0, -10.0),
                (140.0, -10.0),
                (140.0, -38.0),
            ]),
            vec![],
        )]);

        AirspaceReference {
            airports,
            boundary,
            sectors: vec![],
            valid_controller_callsigns,
            region_letter: 'Y',
        }
    }

    #[test]
    fn regional_airport_prefix_rule() {
        let reference = sample_reference();
        assert!(reference.is_regional_airport("YSSY"));
        assert!(!reference.is_regional_airport("EGLL"));
    }

    #[test]
    fn valid_controller_membership() {
        let reference = sample_reference();
        assert!(reference.is_valid_controller("SY_TWR"));
        assert!(!reference.is_valid_controller("SY_OBS"));
    }

    #[test]
    fn point_strictly_inside_boundary_is_contained() {
        let reference = sample_reference();
        assert!(reference.point_in_boundary(-33.868, 151.209));
    }

    #[test]
    fn point_strictly_outside_boundary_is_not_contained() {
        let reference = sample_reference();
        assert!(!reference.point_in_boundary(51.5, -0.1));
    }

    #[test]
    fn airport_lookup_by_icao() {
        let reference = sample_reference();
        assert!(reference.airport("YSSY").is_some());
        assert!(reference.airport("EGLL").is_none());
    }
}
