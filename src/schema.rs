use crate::error::{AnalyticsError, Result};
use crate::utils::{month_name, month_start};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Channel a sale went through. Declaration order is the ascending name order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum SalesMedium {
    Direct,
    Online,
}

impl SalesMedium {
    pub const ALL: [SalesMedium; 2] = [SalesMedium::Direct, SalesMedium::Online];

    pub fn as_str(&self) -> &'static str {
        match self {
            SalesMedium::Direct => "Direct",
            SalesMedium::Online => "Online",
        }
    }
}

impl fmt::Display for SalesMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SalesMedium {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(SalesMedium::Online),
            "direct" => Ok(SalesMedium::Direct),
            other => Err(format!("Unknown sales medium '{}'", other)),
        }
    }
}

/// A calendar month bucket, identified by its first day.
///
/// Ordering is chronological. The `YYYY-MM` label happens to sort the same way,
/// the display label (`Feb 2019`) does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthPeriod(NaiveDate);

impl MonthPeriod {
    pub fn containing(date: NaiveDate) -> Self {
        Self(month_start(date))
    }

    pub fn from_ym(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn start(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Bucket key, e.g. `2019-03`.
    pub fn key(&self) -> String {
        self.0.format("%Y-%m").to_string()
    }

    /// Axis label, e.g. `Mar 2019`.
    pub fn display_label(&self) -> String {
        self.0.format("%b %Y").to_string()
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}

impl FromStr for MonthPeriod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let candidate = format!("{}-01", s.trim());
        NaiveDate::parse_from_str(&candidate, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| AnalyticsError::DateError(format!("Invalid month period '{}'", s)))
    }
}

/// One raw transaction row as it appears in the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub product_name: String,
    pub sales_medium: SalesMedium,
    pub sales_location: String,
    pub sales_count: u64,
    pub total_revenue: f64,
}

impl TransactionRecord {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.total_revenue.is_finite() {
            return Err(format!("revenue {} is not a finite number", self.total_revenue));
        }
        if self.total_revenue < 0.0 {
            return Err(format!("revenue {} is negative", self.total_revenue));
        }
        if self.product_name.trim().is_empty() {
            return Err("product name is empty".to_string());
        }
        if self.sales_location.trim().is_empty() {
            return Err("sales location is empty".to_string());
        }
        Ok(())
    }
}

/// A loaded row: the transaction plus the calendar fields derived once at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub product_name: String,
    pub sales_medium: SalesMedium,
    pub sales_location: String,
    pub sales_count: u64,
    pub total_revenue: f64,
    pub month: String,
    pub year: i32,
    pub month_period: MonthPeriod,
}

impl From<TransactionRecord> for SalesRecord {
    fn from(record: TransactionRecord) -> Self {
        Self {
            month: month_name(record.date.month()).to_string(),
            year: record.date.year(),
            month_period: MonthPeriod::containing(record.date),
            date: record.date,
            product_name: record.product_name,
            sales_medium: record.sales_medium,
            sales_location: record.sales_location,
            sales_count: record.sales_count,
            total_revenue: record.total_revenue,
        }
    }
}

/// The canonical, immutable set of loaded sales records.
///
/// A dataset is never partially mutated. Reloading builds a new one and swaps it in
/// (see [`crate::store::DatasetStore`]).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    records: Vec<SalesRecord>,
    source: Option<String>,
    unavailable_reason: Option<String>,
}

impl Dataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// An empty dataset that remembers why loading failed.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            source: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    /// Builds a dataset from in-memory records, rejecting the whole batch if any record is invalid.
    pub fn from_records(records: Vec<TransactionRecord>) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            record
                .validate()
                .map_err(|details| AnalyticsError::InvalidRecord { row: idx + 1, details })?;
            rows.push(SalesRecord::from(record));
        }

        Ok(Self {
            records: rows,
            source: None,
            unavailable_reason: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// Returns the records, or `DataUnavailable` when there are none.
    pub fn ensure_available(&self) -> Result<&[SalesRecord]> {
        if self.records.is_empty() {
            let reason = self
                .unavailable_reason
                .clone()
                .unwrap_or_else(|| "dataset contains no records".to_string());
            return Err(AnalyticsError::DataUnavailable(reason));
        }
        Ok(&self.records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum TrendComponent {
    #[schemars(description = "Level and seasonality only. The projection has no slope.")]
    None,

    #[schemars(description = "Additive linear trend alongside the additive seasonal component.")]
    #[default]
    Additive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    #[schemars(description = "Number of monthly periods to project past the last historical month.")]
    pub horizon_months: usize,

    #[schemars(
        description = "Length of the seasonal cycle in months. At least two full cycles of history are required to fit."
    )]
    pub seasonal_period: usize,

    #[schemars(
        description = "Half-width of the heuristic prediction envelope as a fraction of each forecast point (0.10 = +/-10%). This is not a statistical interval."
    )]
    pub bound_fraction: f64,

    #[schemars(description = "Trend component of the smoothing model")]
    pub trend: TrendComponent,

    #[schemars(
        description = "Optional wall-clock budget for the parameter search in milliseconds. Exceeding it fails the forecast."
    )]
    pub deadline_ms: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_months: 36,
            seasonal_period: 12,
            bound_fraction: 0.10,
            trend: TrendComponent::Additive,
            deadline_ms: None,
        }
    }
}

pub const MAX_HORIZON_MONTHS: usize = 600;
pub const MAX_SEASONAL_PERIOD: usize = 120;

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_HORIZON_MONTHS).contains(&self.horizon_months) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "horizon_months must be between 1 and {}, got {}",
                MAX_HORIZON_MONTHS, self.horizon_months
            )));
        }
        if !(2..=MAX_SEASONAL_PERIOD).contains(&self.seasonal_period) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "seasonal_period must be between 2 and {}, got {}",
                MAX_SEASONAL_PERIOD, self.seasonal_period
            )));
        }
        if !(0.0..1.0).contains(&self.bound_fraction) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "bound_fraction must be in [0, 1), got {}",
                self.bound_fraction
            )));
        }
        Ok(())
    }

    /// Months of history needed before a fit is attempted.
    pub fn required_history(&self) -> usize {
        self.seasonal_period.saturating_mul(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardConfig {
    #[schemars(description = "Path of the CSV file holding the sales transactions")]
    pub data_path: Option<PathBuf>,

    #[schemars(description = "Path of the GeoJSON FeatureCollection with region boundaries")]
    pub boundary_catalog_path: Option<PathBuf>,

    #[schemars(description = "Feature property holding the region name in the boundary catalog")]
    pub region_name_property: String,

    #[schemars(
        description = "Canonical display order of products for the medium-share breakdown. Products not listed follow in name order."
    )]
    pub product_order: Vec<String>,

    #[schemars(description = "Forecast engine settings")]
    pub forecast: ForecastConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            boundary_catalog_path: None,
            region_name_property: "name".to_string(),
            product_order: Vec::new(),
            forecast: ForecastConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DashboardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.region_name_property.trim().is_empty() {
            return Err(AnalyticsError::InvalidConfig(
                "region_name_property must not be empty".to_string(),
            ));
        }
        self.forecast.validate()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
