use crate::error::{AnalyticsError, Result};

/// Initial additive seasonal indices estimated from every complete cycle in `values`.
///
/// Each observation is compared against its cycle mean, corrected for the within-cycle
/// drift implied by `slope` (per-period trend), and the deviations are averaged per
/// position. The result sums to zero.
pub fn initial_seasonal_indices(values: &[f64], period: usize, slope: f64) -> Result<Vec<f64>> {
    if period < 2 {
        return Err(AnalyticsError::InvalidConfig(format!(
            "Seasonal period must be at least 2, got {}",
            period
        )));
    }

    let cycles = values.len() / period;
    if cycles == 0 {
        return Err(AnalyticsError::InsufficientHistory {
            available: values.len(),
            required: period,
        });
    }

    let centre = (period as f64 - 1.0) / 2.0;
    let mut indices = vec![0.0; period];

    for cycle in values.chunks_exact(period) {
        let mean = cycle_mean(cycle);
        for (i, value) in cycle.iter().enumerate() {
            let drift = slope * (i as f64 - centre);
            indices[i] += value - (mean + drift);
        }
    }

    for index in indices.iter_mut() {
        *index /= cycles as f64;
    }

    Ok(center_indices(&indices))
}

pub fn cycle_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Shifts additive indices so they sum to zero.
fn center_indices(indices: &[f64]) -> Vec<f64> {
    let mean = cycle_mean(indices);
    indices.iter().map(|i| i - mean).collect()
}

/// Re-keys indices that start at calendar month `first_month` (1-based) so that
/// position 0 is January. Only meaningful for a 12-period cycle.
pub fn align_to_calendar(indices: &[f64], first_month: u32) -> Option<Vec<f64>> {
    if indices.len() != 12 || !(1..=12).contains(&first_month) {
        return None;
    }

    let mut calendar = vec![0.0; 12];
    for (idx, &value) in indices.iter().enumerate() {
        let cal_idx = (first_month as usize - 1 + idx) % 12;
        calendar[cal_idx] = value;
    }
    Some(calendar)
}
