//! Monthly revenue forecasting.
//!
//! Revenue is bucketed into a dense monthly series and fitted with an additive
//! Holt-Winters model (level, optional additive trend, additive seasonality). The
//! smoothing parameters are chosen by grid search on the one-step-ahead squared error.
//!
//! The prediction bounds are a fixed percentage envelope around each forecast point
//! (`bound_fraction`, 10% by default). They are a presentation heuristic, not a
//! prediction interval: no residual variance enters them.

use crate::error::{AnalyticsError, Result};
use crate::schema::{Dataset, ForecastConfig, TrendComponent};
use crate::seasonality::{align_to_calendar, cycle_mean, initial_seasonal_indices};
use crate::utils::{month_start, month_starts_in_range, next_month_start};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Dense monthly revenue keyed by month start. No month between the first and last is missing.
pub type MonthlyRevenueSeries = BTreeMap<NaiveDate, f64>;

const PARAMETER_GRID: [f64; 19] = [
    0.05, 0.10, 0.15, 0.20, 0.25, 0.30, 0.35, 0.40, 0.45, 0.50, 0.55, 0.60, 0.65, 0.70, 0.75,
    0.80, 0.85, 0.90, 0.95,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period_start: NaiveDate,
    pub historical_revenue: Option<f64>,
    pub forecasted_revenue: Option<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

impl ForecastPoint {
    pub fn is_forecast(&self) -> bool {
        self.forecasted_revenue.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub sse: f64,
    pub trend: TrendComponent,
    pub seasonal_period: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    /// Historical months followed by forecast months, one entry per month.
    pub points: Vec<ForecastPoint>,
    pub parameters: FittedParameters,
    pub bound_fraction: f64,
    /// Final seasonal indices keyed January..December, when the cycle is 12 months.
    pub seasonal_profile: Option<Vec<f64>>,
}

impl ForecastSeries {
    pub fn historical(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|p| !p.is_forecast())
    }

    pub fn forecast(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|p| p.is_forecast())
    }

    pub fn last_historical_period(&self) -> Option<NaiveDate> {
        self.historical().last().map(|p| p.period_start)
    }

    pub fn first_forecast_period(&self) -> Option<NaiveDate> {
        self.forecast().next().map(|p| p.period_start)
    }
}

/// Buckets revenue by calendar month, filling months without transactions with 0.
pub fn monthly_revenue_series(dataset: &Dataset) -> Result<MonthlyRevenueSeries> {
    let records = dataset.ensure_available()?;

    let mut buckets: MonthlyRevenueSeries = BTreeMap::new();
    for record in records {
        *buckets.entry(month_start(record.date)).or_default() += record.total_revenue;
    }

    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AnalyticsError::DataUnavailable("no dated records".to_string())),
    };

    let mut series = BTreeMap::new();
    for month in month_starts_in_range(first, last) {
        series.insert(month, buckets.get(&month).copied().unwrap_or(0.0));
    }

    Ok(series)
}

#[derive(Debug, Clone)]
struct SmoothingState {
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
}

/// Additive Holt-Winters smoother with fixed parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoltWinters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub period: usize,
    pub trend: TrendComponent,
}

impl HoltWinters {
    fn initial_state(values: &[f64], period: usize, trend: TrendComponent) -> Result<SmoothingState> {
        let first_mean = cycle_mean(&values[..period]);
        let slope = match trend {
            TrendComponent::Additive => {
                (cycle_mean(&values[period..2 * period]) - first_mean) / period as f64
            }
            TrendComponent::None => 0.0,
        };

        // Level one step before the first observation.
        let level = first_mean - slope * (period as f64 + 1.0) / 2.0;
        let seasonals = initial_seasonal_indices(values, period, slope)?;

        Ok(SmoothingState {
            level,
            trend: slope,
            seasonals,
        })
    }

    /// Runs the recursions over `values`, returning the final state and the
    /// one-step-ahead sum of squared errors.
    fn smooth(&self, values: &[f64], initial: &SmoothingState) -> (SmoothingState, f64) {
        let mut state = initial.clone();
        let mut sse = 0.0;
        let with_trend = self.trend == TrendComponent::Additive;

        for (t, &y) in values.iter().enumerate() {
            let idx = t % self.period;
            let seasonal = state.seasonals[idx];

            let predicted = state.level + state.trend + seasonal;
            sse += (y - predicted).powi(2);

            let level = self.alpha * (y - seasonal) + (1.0 - self.alpha) * (state.level + state.trend);
            if with_trend {
                state.trend = self.beta * (level - state.level) + (1.0 - self.beta) * state.trend;
            }
            state.seasonals[idx] = self.gamma * (y - level) + (1.0 - self.gamma) * seasonal;
            state.level = level;
        }

        (state, sse)
    }
}

/// A smoother together with its state after the last observation.
#[derive(Debug, Clone)]
pub struct FittedModel {
    model: HoltWinters,
    state: SmoothingState,
    observations: usize,
    sse: f64,
}

impl FittedModel {
    /// Grid-searches alpha, beta and gamma on `values`.
    pub fn fit(
        values: &[f64],
        period: usize,
        trend: TrendComponent,
        deadline: Option<Instant>,
    ) -> Result<Self> {
        if period < 2 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "seasonal period must be at least 2, got {}",
                period
            )));
        }
        let required = period.saturating_mul(2);
        if values.len() < required {
            return Err(AnalyticsError::InsufficientHistory {
                available: values.len(),
                required,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::FitFailure(
                "series contains non-finite values".to_string(),
            ));
        }
        if values.iter().all(|v| *v == 0.0) {
            return Err(AnalyticsError::FitFailure(
                "degenerate series: no revenue in any month".to_string(),
            ));
        }

        let started = Instant::now();
        let initial = HoltWinters::initial_state(values, period, trend)?;
        let betas: &[f64] = match trend {
            TrendComponent::Additive => &PARAMETER_GRID,
            TrendComponent::None => &[0.0],
        };

        let mut best: Option<(HoltWinters, SmoothingState, f64)> = None;
        for &alpha in PARAMETER_GRID.iter() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(AnalyticsError::DeadlineExceeded {
                        elapsed_ms: started.elapsed().as_millis(),
                    });
                }
            }

            for &beta in betas {
                for &gamma in PARAMETER_GRID.iter() {
                    let model = HoltWinters {
                        alpha,
                        beta,
                        gamma,
                        period,
                        trend,
                    };
                    let (state, sse) = model.smooth(values, &initial);
                    if !sse.is_finite() {
                        continue;
                    }
                    let improves = best.as_ref().map_or(true, |(_, _, best_sse)| sse < *best_sse);
                    if improves {
                        best = Some((model, state, sse));
                    }
                }
            }
        }

        let (model, state, sse) = best.ok_or_else(|| {
            AnalyticsError::FitFailure("no parameter combination produced a finite error".to_string())
        })?;

        debug!(
            "Selected alpha={:.2} beta={:.2} gamma={:.2} (sse={:.4}) in {:?}",
            model.alpha,
            model.beta,
            model.gamma,
            sse,
            started.elapsed()
        );

        Ok(Self {
            model,
            state,
            observations: values.len(),
            sse,
        })
    }

    /// Point forecasts for the next `horizon` periods, floored at zero.
    pub fn project(&self, horizon: usize) -> Vec<f64> {
        let period = self.model.period;
        (1..=horizon)
            .map(|h| {
                let seasonal = self.state.seasonals[(self.observations + h - 1) % period];
                let value = self.state.level + h as f64 * self.state.trend + seasonal;
                value.max(0.0)
            })
            .collect()
    }

    pub fn parameters(&self) -> FittedParameters {
        FittedParameters {
            alpha: self.model.alpha,
            beta: self.model.beta,
            gamma: self.model.gamma,
            sse: self.sse,
            trend: self.model.trend,
            seasonal_period: self.model.period,
        }
    }

    /// Final seasonal indices. Slot 0 belongs to the series' first month.
    fn seasonals(&self) -> &[f64] {
        &self.state.seasonals
    }
}

/// Fits and projects monthly revenue with a fixed configuration. Holds no state
/// between calls.
pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn forecast(&self, dataset: &Dataset) -> Result<ForecastSeries> {
        let series = monthly_revenue_series(dataset)?;
        self.forecast_series(&series)
    }

    pub fn forecast_series(&self, series: &MonthlyRevenueSeries) -> Result<ForecastSeries> {
        let started = Instant::now();
        let deadline = self
            .config
            .deadline_ms
            .map(|ms| started + Duration::from_millis(ms));

        let values: Vec<f64> = series.values().copied().collect();
        let (first_period, last_period) = match (series.keys().next(), series.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(AnalyticsError::InsufficientHistory {
                    available: 0,
                    required: self.config.required_history(),
                })
            }
        };

        let model = FittedModel::fit(
            &values,
            self.config.seasonal_period,
            self.config.trend,
            deadline,
        )?;
        let projected = model.project(self.config.horizon_months);
        if projected.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::FitFailure(
                "model produced non-finite forecasts".to_string(),
            ));
        }
        let floor = values.iter().copied().fold(0.0, f64::max) * 1e-9;
        if projected.iter().all(|v| *v <= floor) {
            return Err(AnalyticsError::FitFailure(
                "projection collapses to zero over the whole horizon".to_string(),
            ));
        }

        let mut points: Vec<ForecastPoint> = series
            .iter()
            .map(|(&period_start, &revenue)| ForecastPoint {
                period_start,
                historical_revenue: Some(revenue),
                forecasted_revenue: None,
                lower_bound: None,
                upper_bound: None,
            })
            .collect();

        let fraction = self.config.bound_fraction;
        let mut period_start = last_period;
        for value in projected {
            period_start = next_month_start(period_start).ok_or_else(|| {
                AnalyticsError::DateError(format!("no month follows {}", period_start))
            })?;
            points.push(ForecastPoint {
                period_start,
                historical_revenue: None,
                forecasted_revenue: Some(value),
                lower_bound: Some(value * (1.0 - fraction)),
                upper_bound: Some(value * (1.0 + fraction)),
            });
        }

        let seasonal_profile = if self.config.seasonal_period == 12 {
            align_to_calendar(model.seasonals(), first_period.month())
        } else {
            None
        };

        info!(
            "Forecast {} months from {} months of history (through {})",
            self.config.horizon_months,
            values.len(),
            last_period.format("%Y-%m")
        );

        Ok(ForecastSeries {
            points,
            parameters: model.parameters(),
            bound_fraction: fraction,
            seasonal_profile,
        })
    }
}

/// Forecasts `horizon_months` of revenue with the default model settings.
pub fn forecast_monthly_revenue(dataset: &Dataset, horizon_months: usize) -> Result<ForecastSeries> {
    let config = ForecastConfig {
        horizon_months,
        ..ForecastConfig::default()
    };
    forecast_with_config(dataset, &config)
}

pub fn forecast_with_config(dataset: &Dataset, config: &ForecastConfig) -> Result<ForecastSeries> {
    ForecastEngine::new(config.clone())?.forecast(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SalesMedium, TransactionRecord};
    use std::f64::consts::PI;

    fn seasonal_values(months: usize, slope: f64) -> Vec<f64> {
        (0..months)
            .map(|t| 1000.0 + slope * t as f64 + 200.0 * (2.0 * PI * t as f64 / 12.0).sin())
            .collect()
    }

    fn dataset_from_monthly(start: NaiveDate, values: &[f64]) -> Dataset {
        let mut date = start;
        let mut records = Vec::new();
        for &value in values {
            records.push(TransactionRecord {
                date,
                product_name: "Milo".to_string(),
                sales_medium: SalesMedium::Online,
                sales_location: "NSW".to_string(),
                sales_count: 1,
                total_revenue: value,
            });
            date = next_month_start(date).unwrap();
        }
        Dataset::from_records(records).unwrap()
    }

    #[test]
    fn test_series_fills_gaps_with_zero() {
        let start = NaiveDate::from_ymd_opt(2018, 1, 10).unwrap();
        let dataset = Dataset::from_records(vec![
            TransactionRecord {
                date: start,
                product_name: "Milo".to_string(),
                sales_medium: SalesMedium::Online,
                sales_location: "NSW".to_string(),
                sales_count: 1,
                total_revenue: 10.0,
            },
            TransactionRecord {
                date: NaiveDate::from_ymd_opt(2018, 4, 2).unwrap(),
                product_name: "Milo".to_string(),
                sales_medium: SalesMedium::Direct,
                sales_location: "NSW".to_string(),
                sales_count: 1,
                total_revenue: 40.0,
            },
        ])
        .unwrap();

        let series = monthly_revenue_series(&dataset).unwrap();
        let values: Vec<f64> = series.values().copied().collect();
        assert_eq!(values, vec![10.0, 0.0, 0.0, 40.0]);
        assert_eq!(
            series.keys().next(),
            Some(&NaiveDate::from_ymd_opt(2018, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_recovers_trend_and_seasonality() {
        let history = seasonal_values(48, 5.0);
        let model = FittedModel::fit(&history, 12, TrendComponent::Additive, None).unwrap();
        let projected = model.project(12);

        let truth = seasonal_values(60, 5.0);
        for (h, value) in projected.iter().enumerate() {
            let expected = truth[48 + h];
            assert!(
                (value - expected).abs() / expected < 0.01,
                "h={} got {} expected {}",
                h + 1,
                value,
                expected
            );
        }
    }

    #[test]
    fn test_insufficient_history() {
        let history = seasonal_values(23, 0.0);
        let result = FittedModel::fit(&history, 12, TrendComponent::Additive, None);
        assert!(matches!(
            result,
            Err(AnalyticsError::InsufficientHistory { available: 23, required: 24 })
        ));
    }

    #[test]
    fn test_all_zero_history_is_fit_failure() {
        let result = FittedModel::fit(&[0.0; 30], 12, TrendComponent::None, None);
        assert!(matches!(result, Err(AnalyticsError::FitFailure(_))));
    }

    #[test]
    fn test_falling_history_projecting_to_zero_is_fit_failure() {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let falling: Vec<f64> = (0..24).map(|m| 2400.0 - 100.0 * m as f64).collect();
        let dataset = dataset_from_monthly(start, &falling);

        let result = forecast_monthly_revenue(&dataset, 36);
        assert!(
            matches!(result, Err(AnalyticsError::FitFailure(_))),
            "expected FitFailure, got {:?}",
            result.map(|s| s.forecast().take(4).cloned().collect::<Vec<_>>())
        );
    }

    #[test]
    fn test_fit_rejects_degenerate_period() {
        let history = seasonal_values(30, 0.0);
        let result = FittedModel::fit(&history, 0, TrendComponent::None, None);
        assert!(matches!(result, Err(AnalyticsError::InvalidConfig(_))));
    }

    #[test]
    fn test_expired_deadline_is_typed_failure() {
        let history = seasonal_values(36, 0.0);
        let result = FittedModel::fit(&history, 12, TrendComponent::Additive, Some(Instant::now()));
        assert!(matches!(result, Err(AnalyticsError::DeadlineExceeded { .. })));
    }

    #[test]
    fn test_forecast_series_shape_and_bounds() {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let dataset = dataset_from_monthly(start, &seasonal_values(30, 3.0));

        let series = forecast_monthly_revenue(&dataset, 36).unwrap();
        assert_eq!(series.points.len(), 66);
        assert_eq!(series.historical().count(), 30);
        assert_eq!(series.forecast().count(), 36);

        for point in series.historical() {
            assert!(point.historical_revenue.is_some());
            assert!(point.lower_bound.is_none() && point.upper_bound.is_none());
        }
        for point in series.forecast() {
            assert!(point.historical_revenue.is_none());
            let value = point.forecasted_revenue.unwrap();
            assert!(point.lower_bound.unwrap() <= value);
            assert!(value <= point.upper_bound.unwrap());
            assert!((point.upper_bound.unwrap() - value * 1.1).abs() < 1e-6);
        }

        let last = series.last_historical_period().unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(series.first_forecast_period(), next_month_start(last));

        for pair in series.points.windows(2) {
            assert_eq!(next_month_start(pair[0].period_start), Some(pair[1].period_start));
        }

        let profile = series.seasonal_profile.as_ref().unwrap();
        assert_eq!(profile.len(), 12);
        // Sine peaks in April for a January start
        let peak = profile
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 3);
    }

    #[test]
    fn test_forecast_is_idempotent() {
        let start = NaiveDate::from_ymd_opt(2017, 7, 1).unwrap();
        let dataset = dataset_from_monthly(start, &seasonal_values(36, 1.0));
        let first = forecast_monthly_revenue(&dataset, 12).unwrap();
        let second = forecast_monthly_revenue(&dataset, 12).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_forecast_on_empty_dataset_is_unavailable() {
        let result = forecast_monthly_revenue(&Dataset::empty(), 36);
        assert!(matches!(result, Err(AnalyticsError::DataUnavailable(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ForecastConfig {
            horizon_months: 0,
            ..ForecastConfig::default()
        };
        assert!(matches!(
            ForecastEngine::new(config),
            Err(AnalyticsError::InvalidConfig(_))
        ));
    }
}
