//! # Sales Dashboard Core
//!
//! Turns raw sales transactions into the aggregates a sales dashboard renders:
//! KPIs, per-product / per-channel / per-location breakdowns, monthly trends, a
//! seasonal revenue forecast and region-level revenue for map views.
//!
//! ## Core Concepts
//!
//! - **Dataset**: the loaded transactions with calendar fields derived once at load time.
//!   Immutable; a reload swaps in a whole new dataset.
//! - **Aggregate**: a grouping key paired with a reduction (sum of revenue, record count,
//!   sales-count share) and a defined output order.
//! - **Forecast**: an additive Holt-Winters fit over dense monthly revenue with a
//!   heuristic +/-10% envelope.
//! - **Unavailable**: an empty dataset never produces numbers. Aggregates report
//!   [`AnalyticsError::DataUnavailable`] instead.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_dashboard_core::*;
//! use std::path::PathBuf;
//!
//! let config = DashboardConfig {
//!     data_path: Some(PathBuf::from("assets/data/sales.csv")),
//!     product_order: vec!["Milo".to_string(), "Nescafe".to_string()],
//!     ..DashboardConfig::default()
//! };
//!
//! let dashboard = SalesDashboard::initialize(config).unwrap();
//! let kpis = dashboard.kpis().unwrap();
//! let forecast = dashboard.forecast().unwrap();
//! ```

pub mod aggregation;
pub mod error;
pub mod forecast;
pub mod geo;
pub mod ingestion;
pub mod kpi;
pub mod schema;
pub mod seasonality;
pub mod store;
pub mod utils;

pub use aggregation::{
    AggregationFilter, Aggregator, LocationRevenue, LocationShare, MediumCount,
    MediumShareOptions, MonthOfYearRevenue, MonthlyRevenue, ProductGrowth, ProductMediumShare,
    ProductRevenue, YearProductRevenue, YearRevenue,
};
pub use error::{AnalyticsError, Result};
pub use forecast::{
    forecast_monthly_revenue, forecast_with_config, monthly_revenue_series, FittedParameters,
    ForecastEngine, ForecastPoint, ForecastSeries, MonthlyRevenueSeries,
};
pub use geo::{
    format_revenue_magnitude, revenue_by_region, BoundaryGeometry, GeoAggregation,
    RegionBoundaryCatalog, RegionCoverage, RegionRevenue, UnmappedRegion,
};
pub use ingestion::{load_csv_path, load_csv_reader, try_load_csv_path, try_load_csv_reader};
pub use kpi::{compute_kpis, KpiSummary};
pub use schema::*;
pub use store::{global_store, DatasetStore};

use log::{debug, info, warn};
use std::sync::Arc;

/// Binds configuration, the dataset handle and the boundary catalog.
///
/// Each query takes one dataset snapshot up front, so a reload running at the same
/// time cannot change the data halfway through a computation.
pub struct SalesDashboard {
    config: DashboardConfig,
    store: Arc<DatasetStore>,
    catalog: Arc<RegionBoundaryCatalog>,
}

impl SalesDashboard {
    /// Validates `config`, loads the boundary catalog and the dataset into the
    /// process-wide store.
    pub fn initialize(config: DashboardConfig) -> Result<Self> {
        Self::initialize_with_store(config, global_store())
    }

    pub fn initialize_with_store(config: DashboardConfig, store: Arc<DatasetStore>) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.boundary_catalog_path {
            Some(path) => {
                match RegionBoundaryCatalog::from_geojson_file(path, &config.region_name_property) {
                    Ok(catalog) => catalog,
                    Err(e) => {
                        warn!(
                            "Boundary catalog {} unusable, region view will be empty: {}",
                            path.display(),
                            e
                        );
                        RegionBoundaryCatalog::default()
                    }
                }
            }
            None => RegionBoundaryCatalog::default(),
        };

        let dashboard = Self {
            config,
            store,
            catalog: Arc::new(catalog),
        };
        dashboard.reload();

        info!(
            "Dashboard initialised with {} records and {} regions",
            dashboard.dataset().len(),
            dashboard.catalog.len()
        );
        Ok(dashboard)
    }

    /// Wraps an already loaded dataset and catalog. Nothing is read from disk.
    pub fn from_parts(
        config: DashboardConfig,
        dataset: Dataset,
        catalog: RegionBoundaryCatalog,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store: Arc::new(DatasetStore::with_dataset(dataset)),
            catalog: Arc::new(catalog),
        })
    }

    /// Re-reads the configured data file and swaps it in.
    pub fn reload(&self) -> Arc<Dataset> {
        match &self.config.data_path {
            Some(path) => self.store.reload_from_path(path),
            None => {
                debug!("No data path configured; keeping current dataset");
                self.store.snapshot()
            }
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn dataset(&self) -> Arc<Dataset> {
        self.store.snapshot()
    }

    pub fn catalog(&self) -> &RegionBoundaryCatalog {
        &self.catalog
    }

    pub fn kpis(&self) -> Result<KpiSummary> {
        compute_kpis(&self.dataset())
    }

    pub fn revenue_by_year_and_product(&self) -> Result<Vec<YearProductRevenue>> {
        aggregation::revenue_by_year_and_product(&self.dataset())
    }

    pub fn revenue_by_product(&self) -> Result<Vec<ProductRevenue>> {
        aggregation::revenue_by_product(&self.dataset())
    }

    pub fn counts_by_medium(&self) -> Result<Vec<MediumCount>> {
        aggregation::counts_by_medium(&self.dataset())
    }

    /// Medium share per product in the configured product order.
    pub fn medium_share_by_product(&self, highlight: Option<&str>) -> Result<Vec<ProductMediumShare>> {
        let options = MediumShareOptions {
            product_order: self.config.product_order.clone(),
            highlight: highlight.map(str::to_string),
        };
        aggregation::medium_share_by_product(&self.dataset(), &options)
    }

    pub fn monthly_revenue_trend(&self) -> Result<Vec<MonthlyRevenue>> {
        aggregation::monthly_revenue_trend(&self.dataset())
    }

    pub fn revenue_by_location(&self) -> Result<Vec<LocationRevenue>> {
        aggregation::revenue_by_location(&self.dataset())
    }

    /// Runs `query` against one snapshot with `filter` applied.
    pub fn filtered<T>(
        &self,
        filter: AggregationFilter,
        query: impl FnOnce(&Aggregator<'_>) -> T,
    ) -> Result<T> {
        let dataset = self.dataset();
        let aggregator = Aggregator::new(&dataset)?.with_filter(filter);
        Ok(query(&aggregator))
    }

    /// Forecast with the configured horizon and model settings.
    pub fn forecast(&self) -> Result<ForecastSeries> {
        forecast_with_config(&self.dataset(), &self.config.forecast)
    }

    pub fn forecast_with_horizon(&self, horizon_months: usize) -> Result<ForecastSeries> {
        let config = ForecastConfig {
            horizon_months,
            ..self.config.forecast.clone()
        };
        forecast_with_config(&self.dataset(), &config)
    }

    pub fn revenue_by_region(&self) -> GeoAggregation {
        revenue_by_region(&self.dataset(), &self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn two_record_dataset() -> Dataset {
        Dataset::from_records(vec![
            TransactionRecord {
                date: NaiveDate::from_ymd_opt(2020, 1, 10).unwrap(),
                product_name: "Milo".to_string(),
                sales_medium: SalesMedium::Online,
                sales_location: "NSW".to_string(),
                sales_count: 2,
                total_revenue: 100.0,
            },
            TransactionRecord {
                date: NaiveDate::from_ymd_opt(2020, 2, 10).unwrap(),
                product_name: "Milo".to_string(),
                sales_medium: SalesMedium::Direct,
                sales_location: "NSW".to_string(),
                sales_count: 1,
                total_revenue: 50.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_end_to_end_two_records() {
        let dashboard = SalesDashboard::from_parts(
            DashboardConfig::default(),
            two_record_dataset(),
            RegionBoundaryCatalog::default(),
        )
        .unwrap();

        let products = dashboard.revenue_by_product().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_name, "Milo");
        assert!((products[0].total_revenue - 150.0).abs() < 1e-9);

        let mediums = dashboard.counts_by_medium().unwrap();
        assert_eq!(
            mediums
                .iter()
                .map(|m| (m.sales_medium, m.count))
                .collect::<Vec<_>>(),
            vec![(SalesMedium::Direct, 1), (SalesMedium::Online, 1)]
        );

        let shares = dashboard.medium_share_by_product(Some("Milo")).unwrap();
        let milo = &shares[0];
        assert!(milo.highlighted);
        assert!((milo.share(SalesMedium::Online) - 200.0 / 3.0).abs() < 1e-9);
        assert!((milo.share(SalesMedium::Direct) - 100.0 / 3.0).abs() < 1e-9);

        assert!(matches!(
            dashboard.forecast(),
            Err(AnalyticsError::InsufficientHistory { available: 2, required: 24 })
        ));

        let geo = dashboard.revenue_by_region();
        assert!(geo.regions.is_empty());
        assert_eq!(geo.unmapped.len(), 1);
    }

    #[test]
    fn test_unconfigured_dashboard_reports_unavailable() {
        let store = Arc::new(DatasetStore::new());
        let dashboard =
            SalesDashboard::initialize_with_store(DashboardConfig::default(), store).unwrap();

        let err = dashboard.kpis().unwrap_err();
        assert!(err.is_unavailable());
        assert!(dashboard.revenue_by_product().is_err());
        assert!(dashboard.forecast().unwrap_err().is_unavailable());
    }

    #[test]
    fn test_filtered_query() {
        let dashboard = SalesDashboard::from_parts(
            DashboardConfig::default(),
            two_record_dataset(),
            RegionBoundaryCatalog::default(),
        )
        .unwrap();

        let filter = AggregationFilter::for_period("2020-02").unwrap();
        let revenue = dashboard
            .filtered(filter, |agg| agg.revenue_by_product())
            .unwrap();
        assert!((revenue[0].total_revenue - 50.0).abs() < 1e-9);
    }
}
