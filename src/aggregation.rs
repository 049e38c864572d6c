//! Grouped sums, counts and shares over a [`Dataset`].
//!
//! Every aggregate is a grouping key paired with a fold over the records in the
//! group (see [`group_by`]); the public functions only differ in key, fold and
//! output order.

use crate::error::Result;
use crate::schema::{Dataset, MonthPeriod, SalesMedium, SalesRecord};
use crate::utils::{month_name, parse_period_string};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Row selection applied before grouping. The default selects everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationFilter {
    /// Inclusive date range.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub product: Option<String>,
    pub medium: Option<SalesMedium>,
}

impl AggregationFilter {
    /// Restricts to a `YYYY-MM` or `YYYY-MM:YYYY-MM` period.
    pub fn for_period(period: &str) -> Result<Self> {
        let range = parse_period_string(period)?;
        Ok(Self {
            date_range: Some(range),
            ..Self::default()
        })
    }

    pub fn matches(&self, record: &SalesRecord) -> bool {
        if let Some((start, end)) = self.date_range {
            if record.date < start || record.date > end {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if &record.product_name != product {
                return false;
            }
        }
        if let Some(medium) = self.medium {
            if record.sales_medium != medium {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediumShareOptions {
    /// Canonical product order. Products not listed follow in name order.
    pub product_order: Vec<String>,
    /// Product whose row the chart should emphasise.
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearProductRevenue {
    pub product_name: String,
    pub year: i32,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRevenue {
    pub product_name: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediumCount {
    pub sales_medium: SalesMedium,
    pub count: usize,
    /// Fraction of all records, 0.0..=1.0.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMediumShare {
    pub product_name: String,
    pub total_sales_count: u64,
    /// Percentage of the product's sales count per medium, 0.0..=100.0.
    pub shares: BTreeMap<SalesMedium, f64>,
    pub highlighted: bool,
}

impl ProductMediumShare {
    pub fn share(&self, medium: SalesMedium) -> f64 {
        self.shares.get(&medium).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub period: MonthPeriod,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRevenue {
    pub sales_location: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationShare {
    pub sales_location: String,
    pub total_revenue: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRevenue {
    pub year: i32,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthOfYearRevenue {
    pub month: u32,
    pub month_name: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGrowth {
    pub product_name: String,
    pub year: i32,
    pub total_revenue: f64,
    /// Change against the product's previous year, in percent. `None` for the first
    /// year on record or when the previous year had no revenue.
    pub growth_pct: Option<f64>,
}

/// Folds `records` into one accumulator per key.
pub fn group_by<'r, K, A, I, FK, FA>(records: I, key: FK, mut fold: FA) -> BTreeMap<K, A>
where
    K: Ord,
    A: Default,
    I: IntoIterator<Item = &'r SalesRecord>,
    FK: Fn(&SalesRecord) -> K,
    FA: FnMut(&mut A, &SalesRecord),
{
    let mut groups: BTreeMap<K, A> = BTreeMap::new();
    for record in records {
        fold(groups.entry(key(record)).or_default(), record);
    }
    groups
}

fn add_revenue(acc: &mut f64, record: &SalesRecord) {
    *acc += record.total_revenue;
}

fn add_one(acc: &mut usize, _record: &SalesRecord) {
    *acc += 1;
}

fn add_sales_count(acc: &mut u64, record: &SalesRecord) {
    *acc += record.sales_count;
}

fn by_revenue_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Aggregate views over one dataset snapshot.
pub struct Aggregator<'a> {
    records: &'a [SalesRecord],
    filter: AggregationFilter,
}

impl<'a> Aggregator<'a> {
    /// Fails with `DataUnavailable` when the dataset is empty.
    pub fn new(dataset: &'a Dataset) -> Result<Self> {
        let records = dataset.ensure_available()?;
        Ok(Self {
            records,
            filter: AggregationFilter::default(),
        })
    }

    pub fn with_filter(mut self, filter: AggregationFilter) -> Self {
        self.filter = filter;
        self
    }

    fn selected(&self) -> impl Iterator<Item = &'a SalesRecord> + '_ {
        self.records.iter().filter(move |r| self.filter.matches(r))
    }

    /// Revenue per (year, product), ordered by product then year.
    pub fn revenue_by_year_and_product(&self) -> Vec<YearProductRevenue> {
        group_by(
            self.selected(),
            |r| (r.product_name.clone(), r.year),
            add_revenue,
        )
        .into_iter()
        .map(|((product_name, year), total_revenue)| YearProductRevenue {
            product_name,
            year,
            total_revenue,
        })
        .collect()
    }

    /// Revenue per product, highest first; ties by product name.
    pub fn revenue_by_product(&self) -> Vec<ProductRevenue> {
        let mut rows: Vec<ProductRevenue> =
            group_by(self.selected(), |r| r.product_name.clone(), add_revenue)
                .into_iter()
                .map(|(product_name, total_revenue)| ProductRevenue {
                    product_name,
                    total_revenue,
                })
                .collect();

        rows.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        rows
    }

    /// Record count per medium, by medium name.
    pub fn counts_by_medium(&self) -> Vec<MediumCount> {
        let groups = group_by(self.selected(), |r| r.sales_medium, add_one);
        let total: usize = groups.values().sum();

        groups
            .into_iter()
            .map(|(sales_medium, count)| MediumCount {
                sales_medium,
                count,
                share: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
            })
            .collect()
    }

    /// Percentage of each product's sales count per medium.
    ///
    /// Every product row carries every medium; a medium with no sales reports 0, and a
    /// product whose total sales count is zero reports 0 everywhere.
    pub fn medium_share_by_product(&self, options: &MediumShareOptions) -> Vec<ProductMediumShare> {
        let counts = group_by(
            self.selected(),
            |r| (r.product_name.clone(), r.sales_medium),
            add_sales_count,
        );

        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        for ((product, _), count) in &counts {
            *totals.entry(product.as_str()).or_default() += count;
        }

        let order = display_order(&options.product_order, totals.keys().copied());

        order
            .into_iter()
            .map(|product_name| {
                let total = totals.get(product_name.as_str()).copied().unwrap_or(0);
                let shares = SalesMedium::ALL
                    .iter()
                    .map(|&medium| {
                        let group = counts
                            .get(&(product_name.clone(), medium))
                            .copied()
                            .unwrap_or(0);
                        let pct = if total == 0 {
                            0.0
                        } else {
                            group as f64 / total as f64 * 100.0
                        };
                        (medium, pct)
                    })
                    .collect();

                ProductMediumShare {
                    highlighted: options.highlight.as_deref() == Some(product_name.as_str()),
                    product_name,
                    total_sales_count: total,
                    shares,
                }
            })
            .collect()
    }

    /// Revenue per month bucket in chronological order.
    pub fn monthly_revenue_trend(&self) -> Vec<MonthlyRevenue> {
        group_by(self.selected(), |r| r.month_period, add_revenue)
            .into_iter()
            .map(|(period, total_revenue)| MonthlyRevenue {
                period,
                total_revenue,
            })
            .collect()
    }

    /// Revenue per location, by location name.
    pub fn revenue_by_location(&self) -> Vec<LocationRevenue> {
        group_by(self.selected(), |r| r.sales_location.clone(), add_revenue)
            .into_iter()
            .map(|(sales_location, total_revenue)| LocationRevenue {
                sales_location,
                total_revenue,
            })
            .collect()
    }

    /// Share of revenue per location, highest first.
    pub fn location_share(&self) -> Vec<LocationShare> {
        let locations = self.revenue_by_location();
        let total: f64 = locations.iter().map(|l| l.total_revenue).sum();

        let mut rows: Vec<LocationShare> = locations
            .into_iter()
            .map(|l| LocationShare {
                share_pct: if total > 0.0 {
                    l.total_revenue / total * 100.0
                } else {
                    0.0
                },
                sales_location: l.sales_location,
                total_revenue: l.total_revenue,
            })
            .collect();

        rows.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.sales_location.cmp(&b.sales_location))
        });
        rows
    }

    pub fn revenue_by_year(&self) -> Vec<YearRevenue> {
        group_by(self.selected(), |r| r.year, add_revenue)
            .into_iter()
            .map(|(year, total_revenue)| YearRevenue {
                year,
                total_revenue,
            })
            .collect()
    }

    /// Revenue per calendar month summed across years, January through December.
    /// Months without sales report 0.
    pub fn revenue_by_month_of_year(&self) -> Vec<MonthOfYearRevenue> {
        let groups = group_by(self.selected(), |r| r.month_period.month(), add_revenue);

        (1..=12)
            .map(|month| MonthOfYearRevenue {
                month,
                month_name: month_name(month).to_string(),
                total_revenue: groups.get(&month).copied().unwrap_or(0.0),
            })
            .collect()
    }

    /// Year-over-year revenue change per product, ordered by product then year.
    /// Only consecutive years are compared; a year after a gap reports `None`.
    pub fn product_growth(&self) -> Vec<ProductGrowth> {
        let mut rows = Vec::new();
        let mut previous: Option<(String, i32, f64)> = None;

        for entry in self.revenue_by_year_and_product() {
            let growth_pct = match &previous {
                Some((product, year, prev))
                    if *product == entry.product_name && *year + 1 == entry.year && *prev > 0.0 =>
                {
                    Some((entry.total_revenue - prev) / prev * 100.0)
                }
                _ => None,
            };
            previous = Some((entry.product_name.clone(), entry.year, entry.total_revenue));

            rows.push(ProductGrowth {
                product_name: entry.product_name,
                year: entry.year,
                total_revenue: entry.total_revenue,
                growth_pct,
            });
        }

        rows
    }
}

/// Configured products first, in configured order, then the rest by name.
fn display_order<'p>(configured: &[String], present: impl Iterator<Item = &'p str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();

    for product in configured {
        if seen.insert(product.as_str()) {
            order.push(product.clone());
        }
    }

    let mut rest: Vec<&str> = present.filter(|p| !seen.contains(p)).collect();
    rest.sort_unstable();
    rest.dedup();
    order.extend(rest.into_iter().map(str::to_string));

    debug!("Medium share product order: {:?}", order);
    order
}

pub fn revenue_by_year_and_product(dataset: &Dataset) -> Result<Vec<YearProductRevenue>> {
    Ok(Aggregator::new(dataset)?.revenue_by_year_and_product())
}

pub fn revenue_by_product(dataset: &Dataset) -> Result<Vec<ProductRevenue>> {
    Ok(Aggregator::new(dataset)?.revenue_by_product())
}

pub fn counts_by_medium(dataset: &Dataset) -> Result<Vec<MediumCount>> {
    Ok(Aggregator::new(dataset)?.counts_by_medium())
}

pub fn medium_share_by_product(
    dataset: &Dataset,
    options: &MediumShareOptions,
) -> Result<Vec<ProductMediumShare>> {
    Ok(Aggregator::new(dataset)?.medium_share_by_product(options))
}

pub fn monthly_revenue_trend(dataset: &Dataset) -> Result<Vec<MonthlyRevenue>> {
    Ok(Aggregator::new(dataset)?.monthly_revenue_trend())
}

pub fn revenue_by_location(dataset: &Dataset) -> Result<Vec<LocationRevenue>> {
    Ok(Aggregator::new(dataset)?.revenue_by_location())
}
