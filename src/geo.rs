//! Region-level revenue joined against a boundary catalog.

use crate::aggregation::Aggregator;
use crate::error::{AnalyticsError, Result};
use crate::schema::Dataset;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A GeoJSON geometry object, kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryGeometry {
    #[serde(rename = "type")]
    pub geometry_type: String,
    #[serde(default)]
    pub coordinates: Value,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Option<BoundaryGeometry>,
}

/// Region name to boundary geometry. Loaded once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionBoundaryCatalog {
    regions: BTreeMap<String, BoundaryGeometry>,
}

impl RegionBoundaryCatalog {
    pub fn new(regions: BTreeMap<String, BoundaryGeometry>) -> Self {
        Self { regions }
    }

    /// Reads a GeoJSON FeatureCollection, naming each region by `name_property`.
    ///
    /// Features without that property or without a geometry are skipped. The first
    /// feature with a given name wins.
    pub fn from_geojson_str(geojson: &str, name_property: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(geojson)?;
        let mut regions = BTreeMap::new();

        for (idx, feature) in collection.features.into_iter().enumerate() {
            let name = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(name_property))
                .and_then(Value::as_str)
                .map(str::to_string);

            match (name, feature.geometry) {
                (Some(name), Some(geometry)) => {
                    if regions.contains_key(&name) {
                        warn!("Duplicate region '{}' in boundary catalog; keeping the first", name);
                        continue;
                    }
                    regions.insert(name, geometry);
                }
                (None, _) => warn!(
                    "Feature #{} has no '{}' property; skipped",
                    idx, name_property
                ),
                (Some(name), None) => warn!("Region '{}' has no geometry; skipped", name),
            }
        }

        if regions.is_empty() {
            return Err(AnalyticsError::DataUnavailable(format!(
                "boundary catalog has no features named by '{}'",
                name_property
            )));
        }

        Ok(Self { regions })
    }

    pub fn from_geojson_file(path: impl AsRef<Path>, name_property: &str) -> Result<Self> {
        let path = path.as_ref();
        let geojson = std::fs::read_to_string(path)?;
        let catalog = Self::from_geojson_str(&geojson, name_property)?;
        info!(
            "Loaded {} region boundaries from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn get(&self, region: &str) -> Option<&BoundaryGeometry> {
        self.regions.get(region)
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRevenue {
    pub total_revenue: f64,
    pub boundary: BoundaryGeometry,
}

/// Revenue booked against a location the catalog does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedRegion {
    pub region: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCoverage {
    pub mapped_revenue: f64,
    pub unmapped_revenue: f64,
    /// Percentage of revenue that lands on a catalog region. 100 when there is no revenue.
    pub mapped_share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAggregation {
    /// Every catalog region; regions without sales carry 0.
    pub regions: BTreeMap<String, RegionRevenue>,
    pub unmapped: Vec<UnmappedRegion>,
    /// False when the dataset was unavailable and every region reports 0 for that reason.
    pub data_available: bool,
}

impl GeoAggregation {
    pub fn coverage(&self) -> RegionCoverage {
        let mapped_revenue: f64 = self.regions.values().map(|r| r.total_revenue).sum();
        let unmapped_revenue: f64 = self.unmapped.iter().map(|u| u.total_revenue).sum();
        let total = mapped_revenue + unmapped_revenue;

        RegionCoverage {
            mapped_revenue,
            unmapped_revenue,
            mapped_share_pct: if total > 0.0 {
                mapped_revenue / total * 100.0
            } else {
                100.0
            },
        }
    }
}

/// Joins per-location revenue onto the catalog by exact, case-sensitive name.
pub fn revenue_by_region(dataset: &Dataset, catalog: &RegionBoundaryCatalog) -> GeoAggregation {
    let (locations, data_available) = match Aggregator::new(dataset) {
        Ok(aggregator) => (aggregator.revenue_by_location(), true),
        Err(_) => (Vec::new(), false),
    };

    let mut regions: BTreeMap<String, RegionRevenue> = catalog
        .regions
        .iter()
        .map(|(name, boundary)| {
            (
                name.clone(),
                RegionRevenue {
                    total_revenue: 0.0,
                    boundary: boundary.clone(),
                },
            )
        })
        .collect();

    let mut unmapped = Vec::new();
    for location in locations {
        match regions.get_mut(&location.sales_location) {
            Some(region) => region.total_revenue += location.total_revenue,
            None => unmapped.push(UnmappedRegion {
                region: location.sales_location,
                total_revenue: location.total_revenue,
            }),
        }
    }

    if !unmapped.is_empty() {
        let names: Vec<&str> = unmapped.iter().map(|u| u.region.as_str()).collect();
        warn!(
            "{} sales location(s) not in boundary catalog: {}",
            unmapped.len(),
            names.join(", ")
        );
    }

    GeoAggregation {
        regions,
        unmapped,
        data_available,
    }
}

const MAGNITUDES: [(f64, &str); 4] = [(1.0, ""), (1e3, "K"), (1e6, "M"), (1e9, "B")];

/// Abbreviates a revenue figure for map labels: `950`, `1.5K`, `15K`, `2.3M`, `1.2B`.
pub fn format_revenue_magnitude(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    let mut idx = MAGNITUDES
        .iter()
        .rposition(|(scale, _)| abs >= *scale)
        .unwrap_or(0);
    let mut text = abbreviate(abs / MAGNITUDES[idx].0);

    // 999_960 rounds to "1000K"
    if text == "1000" && idx + 1 < MAGNITUDES.len() {
        idx += 1;
        text = "1".to_string();
    }

    format!("{}{}{}", sign, text, MAGNITUDES[idx].1)
}

fn abbreviate(scaled: f64) -> String {
    if scaled >= 10.0 {
        format!("{:.0}", scaled)
    } else {
        let text = format!("{:.1}", scaled);
        match text.strip_suffix(".0") {
            Some(whole) => whole.to_string(),
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SalesMedium, TransactionRecord};
    use chrono::NaiveDate;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "NSW"},
             "geometry": {"type": "Polygon", "coordinates": [[[150.0, -33.0], [151.0, -33.0], [151.0, -34.0], [150.0, -33.0]]]}},
            {"type": "Feature", "properties": {"name": "VIC"},
             "geometry": {"type": "Polygon", "coordinates": [[[144.0, -37.0], [145.0, -37.0], [145.0, -38.0], [144.0, -37.0]]]}},
            {"type": "Feature", "properties": {"code": "XX"},
             "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}
        ]
    }"#;

    fn sale(location: &str, revenue: f64) -> TransactionRecord {
        TransactionRecord {
            date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            product_name: "Milo".to_string(),
            sales_medium: SalesMedium::Online,
            sales_location: location.to_string(),
            sales_count: 1,
            total_revenue: revenue,
        }
    }

    #[test]
    fn test_catalog_from_geojson() {
        let catalog = RegionBoundaryCatalog::from_geojson_str(GEOJSON, "name").unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.region_names().collect::<Vec<_>>(), vec!["NSW", "VIC"]);
        assert_eq!(catalog.get("NSW").unwrap().geometry_type, "Polygon");

        assert!(RegionBoundaryCatalog::from_geojson_str(GEOJSON, "STATE_NAME").is_err());
        assert!(RegionBoundaryCatalog::from_geojson_str("{not json", "name").is_err());
    }

    #[test]
    fn test_join_reports_zero_and_unmapped() {
        let catalog = RegionBoundaryCatalog::from_geojson_str(GEOJSON, "name").unwrap();
        let dataset = Dataset::from_records(vec![
            sale("NSW", 100.0),
            sale("NSW", 50.0),
            sale("nsw", 5.0),
            sale("Tasmania", 20.0),
        ])
        .unwrap();

        let geo = revenue_by_region(&dataset, &catalog);
        assert!(geo.data_available);
        assert!((geo.regions["NSW"].total_revenue - 150.0).abs() < 1e-9);
        assert_eq!(geo.regions["VIC"].total_revenue, 0.0);

        let unmapped: Vec<&str> = geo.unmapped.iter().map(|u| u.region.as_str()).collect();
        assert_eq!(unmapped, vec!["Tasmania", "nsw"]);

        let coverage = geo.coverage();
        assert!((coverage.mapped_revenue - 150.0).abs() < 1e-9);
        assert!((coverage.unmapped_revenue - 25.0).abs() < 1e-9);
        assert!((coverage.mapped_share_pct - 150.0 / 175.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_dataset_reports_every_region_at_zero() {
        let catalog = RegionBoundaryCatalog::from_geojson_str(GEOJSON, "name").unwrap();
        let geo = revenue_by_region(&Dataset::empty(), &catalog);
        assert!(!geo.data_available);
        assert_eq!(geo.regions.len(), catalog.len());
        assert!(geo.regions.values().all(|r| r.total_revenue == 0.0));
        assert!(geo.unmapped.is_empty());
    }

    #[test]
    fn test_format_revenue_magnitude() {
        assert_eq!(format_revenue_magnitude(0.0), "0");
        assert_eq!(format_revenue_magnitude(950.0), "950");
        assert_eq!(format_revenue_magnitude(1_534.0), "1.5K");
        assert_eq!(format_revenue_magnitude(15_340.0), "15K");
        assert_eq!(format_revenue_magnitude(2_000_000.0), "2M");
        assert_eq!(format_revenue_magnitude(2_345_678.0), "2.3M");
        assert_eq!(format_revenue_magnitude(999_960.0), "1M");
        assert_eq!(format_revenue_magnitude(1.2e9), "1.2B");
        assert_eq!(format_revenue_magnitude(-1_500.0), "-1.5K");
        assert_eq!(format_revenue_magnitude(f64::NAN), "n/a");
    }
}
