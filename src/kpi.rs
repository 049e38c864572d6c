use crate::error::Result;
use crate::schema::Dataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whole-dataset summary figures. Values are raw; formatting is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_revenue: f64,
    pub average_revenue: f64,
    pub distinct_products: usize,
    pub total_sales_count: u64,
    pub max_revenue: f64,
    pub min_revenue: f64,
    pub record_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Computes every KPI in one pass. An empty dataset is `DataUnavailable`.
pub fn compute_kpis(dataset: &Dataset) -> Result<KpiSummary> {
    let records = dataset.ensure_available()?;

    let mut total_revenue = 0.0;
    let mut total_sales_count = 0u64;
    let mut max_revenue = f64::MIN;
    let mut min_revenue = f64::MAX;
    let mut first_date = records[0].date;
    let mut last_date = records[0].date;
    let mut products = BTreeSet::new();

    for record in records {
        total_revenue += record.total_revenue;
        total_sales_count = total_sales_count.saturating_add(record.sales_count);
        max_revenue = max_revenue.max(record.total_revenue);
        min_revenue = min_revenue.min(record.total_revenue);
        first_date = first_date.min(record.date);
        last_date = last_date.max(record.date);
        products.insert(record.product_name.as_str());
    }

    Ok(KpiSummary {
        total_revenue,
        average_revenue: total_revenue / records.len() as f64,
        distinct_products: products.len(),
        total_sales_count,
        max_revenue,
        min_revenue,
        record_count: records.len(),
        first_date,
        last_date,
    })
}

pub fn total_revenue(dataset: &Dataset) -> Result<f64> {
    Ok(dataset.ensure_available()?.iter().map(|r| r.total_revenue).sum())
}

pub fn average_revenue(dataset: &Dataset) -> Result<f64> {
    compute_kpis(dataset).map(|k| k.average_revenue)
}

pub fn distinct_products(dataset: &Dataset) -> Result<usize> {
    compute_kpis(dataset).map(|k| k.distinct_products)
}

pub fn total_sales_count(dataset: &Dataset) -> Result<u64> {
    compute_kpis(dataset).map(|k| k.total_sales_count)
}

pub fn max_revenue(dataset: &Dataset) -> Result<f64> {
    compute_kpis(dataset).map(|k| k.max_revenue)
}

pub fn min_revenue(dataset: &Dataset) -> Result<f64> {
    compute_kpis(dataset).map(|k| k.min_revenue)
}
