//! Dataset loading from tabular sources.
//!
//! Loading is all-or-nothing: one bad row, an unreadable file or a missing required
//! column yields an unavailable (empty) [`Dataset`], never a partially parsed one.

use crate::error::{AnalyticsError, Result};
use crate::schema::{Dataset, SalesMedium, TransactionRecord};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, error, info, warn};
use std::io::Read;
use std::path::Path;

pub const COL_DATE: &str = "Date";
pub const COL_PRODUCT_NAME: &str = "Product Name";
pub const COL_SALES_MEDIUM: &str = "Sales Medium";
pub const COL_SALES_LOCATION: &str = "Sales Location";
pub const COL_SALES_COUNT: &str = "Sales Count";
pub const COL_TOTAL_REVENUE: &str = "Total Revenue";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_DATE,
    COL_PRODUCT_NAME,
    COL_SALES_MEDIUM,
    COL_SALES_LOCATION,
    COL_SALES_COUNT,
    COL_TOTAL_REVENUE,
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

struct ColumnIndex {
    date: usize,
    product_name: usize,
    sales_medium: usize,
    sales_location: usize,
    sales_count: usize,
    total_revenue: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            find_column(headers, name).ok_or_else(|| AnalyticsError::MissingColumn(name.to_string()))
        };

        Ok(Self {
            date: find(COL_DATE)?,
            product_name: find(COL_PRODUCT_NAME)?,
            sales_medium: find(COL_SALES_MEDIUM)?,
            sales_location: find(COL_SALES_LOCATION)?,
            sales_count: find(COL_SALES_COUNT)?,
            total_revenue: find(COL_TOTAL_REVENUE)?,
        })
    }
}

/// Parses CSV content into a dataset, failing on the first problem.
pub fn try_load_csv_reader<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;
    debug!("Resolved {} header columns", headers.len());

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        // Header is line 1
        let row_number = row_idx + 2;
        let raw = result?;
        records.push(parse_row(&raw, &columns, row_number)?);
    }

    if records.is_empty() {
        return Err(AnalyticsError::DataUnavailable(
            "source contains a header but no rows".to_string(),
        ));
    }

    Dataset::from_records(records)
}

pub fn try_load_csv_path(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnalyticsError::DataUnavailable(format!(
            "data file not found at {}",
            path.display()
        )));
    }

    let file = std::fs::File::open(path)?;
    let dataset = try_load_csv_reader(file)?.with_source(path.display().to_string());
    info!(
        "Loaded {} sales records from {}",
        dataset.len(),
        path.display()
    );
    Ok(dataset)
}

/// Loads a dataset, degrading to an unavailable dataset on any failure.
pub fn load_csv_path(path: impl AsRef<Path>) -> Dataset {
    let path = path.as_ref();
    match try_load_csv_path(path) {
        Ok(dataset) => dataset,
        Err(e) => degraded(&e, &path.display().to_string()),
    }
}

pub fn load_csv_reader<R: Read>(reader: R) -> Dataset {
    match try_load_csv_reader(reader) {
        Ok(dataset) => dataset,
        Err(e) => degraded(&e, "reader"),
    }
}

fn degraded(e: &AnalyticsError, source: &str) -> Dataset {
    match e {
        AnalyticsError::IoError(_) | AnalyticsError::CsvError(_) => {
            error!("Could not read sales data from {}: {}", source, e)
        }
        _ => warn!("Sales data from {} is unusable: {}", source, e),
    }
    Dataset::unavailable(e.to_string())
}

fn parse_row(
    raw: &csv::StringRecord,
    columns: &ColumnIndex,
    row: usize,
) -> Result<TransactionRecord> {
    let field = |idx: usize| raw.get(idx).unwrap_or("").trim();
    let invalid = |details: String| AnalyticsError::InvalidRecord { row, details };

    let date_str = field(columns.date);
    let date =
        parse_date(date_str).ok_or_else(|| invalid(format!("unparseable date '{}'", date_str)))?;

    let sales_medium = field(columns.sales_medium)
        .parse::<SalesMedium>()
        .map_err(invalid)?;

    let count_str = field(columns.sales_count);
    let sales_count = parse_count(count_str)
        .ok_or_else(|| invalid(format!("invalid sales count '{}'", count_str)))?;

    let revenue_str = field(columns.total_revenue);
    let total_revenue = parse_amount(revenue_str)
        .ok_or_else(|| invalid(format!("invalid revenue '{}'", revenue_str)))?;

    Ok(TransactionRecord {
        date,
        product_name: field(columns.product_name).to_string(),
        sales_medium,
        sales_location: field(columns.sales_location).to_string(),
        sales_count,
        total_revenue,
    })
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Whole, non-negative counts. Spreadsheet exports often write `2.0`.
fn parse_count(value: &str) -> Option<u64> {
    if let Ok(count) = value.parse::<u64>() {
        return Some(count);
    }
    let float = value.parse::<f64>().ok()?;
    if float.is_finite() && float >= 0.0 && float.fract() == 0.0 && float <= u64::MAX as f64 {
        Some(float as u64)
    } else {
        None
    }
}

/// Revenue cells may carry a leading currency symbol and `,` thousands separators
/// (`$1,234.50`). Whatever remains must be a plain decimal or scientific number.
fn parse_amount(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let (sign, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed),
    };
    let number = unsigned.trim_start_matches(is_currency_symbol).trim_start();
    let number = strip_thousands_separators(number)?;
    format!("{}{}", sign, number)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '$' | '€' | '£' | '¥' | '₹')
}

/// Commas are only accepted as separators between groups of three integer digits.
fn strip_thousands_separators(number: &str) -> Option<String> {
    if !number.contains(',') {
        return Some(number.to_string());
    }

    let integer_end = number
        .find(|c| matches!(c, '.' | 'e' | 'E'))
        .unwrap_or(number.len());
    let (integer, rest) = number.split_at(integer_end);
    if rest.contains(',') {
        return None;
    }

    let mut groups = integer.split(',');
    let head = groups.next()?;
    let head_ok = (1..=3).contains(&head.len()) && head.chars().all(|c| c.is_ascii_digit());
    let tail_ok = groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()));
    if !(head_ok && tail_ok) {
        return None;
    }

    Some(format!("{}{}", integer.replace(',', ""), rest))
}
