use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CellResult, Undefined, VoccError};
use crate::grid::{CellId, Grid, ScalarField, SeriesStack};

/// OLS fit of value on time for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendFit {
    /// Units per time unit (per year for annual series).
    pub slope: f64,
    /// Fitted value at the mean observed time (equal to the mean observed value).
    pub mean: f64,
    /// Fitted value at time 0.
    pub intercept: f64,
    /// Standard error of the slope; `None` with two observations.
    pub std_error: Option<f64>,
}

impl TrendFit {
    /// Slope divided by its standard error.
    pub fn t_value(&self) -> Option<f64> {
        match self.std_error {
            Some(se) if se > 0.0 => Some(self.slope / se),
            // A perfect fit is as significant as it gets
            Some(_) if self.slope != 0.0 => Some(f64::INFINITY.copysign(self.slope)),
            _ => None,
        }
    }

    /// Whether `|t| >= t_threshold`.
    pub fn significant(&self, t_threshold: f64) -> bool {
        self.t_value().map(|t| t.abs() >= t_threshold).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    /// Number of non-missing observations.
    pub n_obs: usize,
    pub fit: CellResult<TrendFit>,
}

impl TrendResult {
    pub fn slope(&self) -> Option<f64> {
        self.fit.as_ref().ok().map(|f| f.slope)
    }

    pub fn is_valid(&self) -> bool {
        self.fit.is_ok()
    }
}

/// Fit a linear trend to one series.
///
/// Only non-missing observations enter the regression. Time is centered on
/// the mean observed time before fitting.
pub fn estimate_trend(series: &[Option<f64>], times: &[f64], min_observations: usize) -> TrendResult {
    let observed: Vec<(f64, f64)> = times
        .iter()
        .zip(series)
        .filter_map(|(&t, v)| v.filter(|x| x.is_finite()).map(|x| (t, x)))
        .collect();
    let n_obs = observed.len();

    if n_obs < min_observations.max(2) {
        return TrendResult {
            n_obs,
            fit: Err(Undefined::InsufficientData),
        };
    }

    let n = n_obs as f64;
    let t_mean = observed.iter().map(|&(t, _)| t).sum::<f64>() / n;
    let y_mean = observed.iter().map(|&(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(t, y) in &observed {
        let dt = t - t_mean;
        sxx += dt * dt;
        sxy += dt * (y - y_mean);
    }
    if sxx <= 0.0 {
        return TrendResult {
            n_obs,
            fit: Err(Undefined::InsufficientData),
        };
    }

    let slope = sxy / sxx;
    let std_error = if n_obs > 2 {
        let rss: f64 = observed
            .iter()
            .map(|&(t, y)| {
                let residual = y - (y_mean + slope * (t - t_mean));
                residual * residual
            })
            .sum();
        Some((rss / (n - 2.0) / sxx).sqrt())
    } else {
        None
    };

    TrendResult {
        n_obs,
        fit: Ok(TrendFit {
            slope,
            mean: y_mean,
            intercept: y_mean - slope * t_mean,
            std_error,
        }),
    }
}

/// Fit a trend for every cell in parallel. Masked cells are `Masked`.
pub fn estimate_trends(
    grid: &Grid,
    stack: &SeriesStack,
    min_observations: usize,
) -> Result<Vec<TrendResult>, VoccError> {
    if min_observations < 2 {
        return Err(VoccError::Config(format!(
            "min_observations must be >= 2, got {}. Example: min_observations = 10",
            min_observations
        )));
    }
    VoccError::check_len("series stack", grid.len(), stack.cell_count())?;

    let times = stack.times();
    Ok(grid
        .cells()
        .par_iter()
        .map(|cell| {
            if !cell.valid {
                return TrendResult {
                    n_obs: 0,
                    fit: Err(Undefined::Masked),
                };
            }
            estimate_trend(stack.series(cell.id), times, min_observations)
        })
        .collect())
}

/// Slopes as a plain field, `None` where the trend is undefined.
pub fn slope_field(trends: &[TrendResult]) -> ScalarField {
    trends.iter().map(TrendResult::slope).collect()
}

/// Keep only trends with `|t| >= t_threshold`; others become `InsufficientData`.
pub fn filter_significant(trends: &[TrendResult], t_threshold: f64) -> Vec<TrendResult> {
    trends
        .iter()
        .map(|tr| match tr.fit {
            Ok(fit) if !fit.significant(t_threshold) => TrendResult {
                n_obs: tr.n_obs,
                fit: Err(Undefined::InsufficientData),
            },
            _ => *tr,
        })
        .collect()
}

/// Cell ids whose trend is valid.
pub fn valid_cells(trends: &[TrendResult]) -> Vec<CellId> {
    trends
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_valid())
        .map(|(i, _)| i as CellId)
        .collect()
}
