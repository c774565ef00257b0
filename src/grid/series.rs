use serde::{Deserialize, Serialize};

use crate::error::VoccError;
use crate::grid::{CellId, ScalarField};

/// How a block of consecutive time steps is folded into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Sum,
    Min,
    Max,
}

impl Aggregation {
    fn fold(self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Per-cell time series sharing one time axis.
///
/// Values are stored cell-major: the series of cell `i` occupies
/// `values[i * times.len()..(i + 1) * times.len()]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStack {
    times: Vec<f64>,
    values: Vec<Option<f64>>,
}

impl SeriesStack {
    /// Build a stack from a time axis and cell-major values.
    pub fn new(times: Vec<f64>, values: Vec<Option<f64>>) -> Result<SeriesStack, VoccError> {
        if times.is_empty() {
            return Err(VoccError::Config(
                "time axis must contain at least one step".to_string(),
            ));
        }
        if times.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(VoccError::Config(
                "time axis must be strictly increasing".to_string(),
            ));
        }
        if values.len() % times.len() != 0 {
            return Err(VoccError::Shape {
                what: "series values (multiple of time steps)".to_string(),
                expected: (values.len() / times.len() + 1) * times.len(),
                got: values.len(),
            });
        }
        Ok(SeriesStack { times, values })
    }

    /// Build a stack from one field per time step (layer-major input).
    pub fn from_layers(times: Vec<f64>, layers: &[ScalarField]) -> Result<SeriesStack, VoccError> {
        VoccError::check_len("series layers", times.len(), layers.len())?;
        let cells = layers.first().map(|l| l.len()).unwrap_or(0);
        for layer in layers {
            VoccError::check_len("series layer", cells, layer.len())?;
        }
        let mut values = Vec::with_capacity(cells * times.len());
        for cell in 0..cells {
            for layer in layers {
                values.push(layer[cell]);
            }
        }
        SeriesStack::new(times, values)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn steps(&self) -> usize {
        self.times.len()
    }

    pub fn cell_count(&self) -> usize {
        self.values.len() / self.times.len()
    }

    pub fn series(&self, cell: CellId) -> &[Option<f64>] {
        let n = self.times.len();
        let start = cell as usize * n;
        &self.values[start..start + n]
    }

    /// Values of every cell at one time step.
    pub fn layer(&self, step: usize) -> ScalarField {
        (0..self.cell_count())
            .map(|cell| self.series(cell as CellId)[step])
            .collect()
    }

    /// Fold consecutive blocks of `block` steps into one step each, e.g.
    /// monthly to annual with `block = 12`. A block with any missing value
    /// is missing. Each block takes the time of its first step, so monthly
    /// `1960.0, 1960.083, ..` becomes `1960.0, 1961.0, ..`.
    ///
    /// Trailing steps that do not fill a complete block are dropped.
    pub fn aggregate(&self, block: usize, how: Aggregation) -> Result<SeriesStack, VoccError> {
        if block == 0 || block > self.steps() {
            return Err(VoccError::Config(format!(
                "aggregation block must be in 1..={}, got {}",
                self.steps(),
                block
            )));
        }
        let blocks = self.steps() / block;
        let times: Vec<f64> = (0..blocks).map(|b| self.times[b * block]).collect();

        let mut values = Vec::with_capacity(self.cell_count() * blocks);
        let mut scratch = Vec::with_capacity(block);
        for cell in 0..self.cell_count() {
            let series = self.series(cell as CellId);
            for b in 0..blocks {
                scratch.clear();
                scratch.extend(series[b * block..(b + 1) * block].iter().flatten());
                values.push(if scratch.len() == block {
                    Some(how.fold(&scratch))
                } else {
                    None
                });
            }
        }
        SeriesStack::new(times, values)
    }

    /// Mean of each cell over the steps whose time lies in `start..=end`.
    /// Cells with no observation in the period are missing.
    pub fn period_mean(&self, start: f64, end: f64) -> Result<ScalarField, VoccError> {
        self.period_fold(start, end, |observed| {
            if observed.is_empty() {
                None
            } else {
                Some(observed.iter().sum::<f64>() / observed.len() as f64)
            }
        })
    }

    /// Sample standard deviation of each cell over `start..=end`.
    /// Cells with fewer than two observations in the period are missing.
    pub fn period_std(&self, start: f64, end: f64) -> Result<ScalarField, VoccError> {
        self.period_fold(start, end, |observed| {
            let n = observed.len();
            if n < 2 {
                return None;
            }
            let mean = observed.iter().sum::<f64>() / n as f64;
            let ss: f64 = observed.iter().map(|v| (v - mean).powi(2)).sum();
            Some((ss / (n - 1) as f64).sqrt())
        })
    }

    fn period_fold(
        &self,
        start: f64,
        end: f64,
        fold: impl Fn(&[f64]) -> Option<f64>,
    ) -> Result<ScalarField, VoccError> {
        let steps: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|&(_, &t)| t >= start && t <= end)
            .map(|(i, _)| i)
            .collect();
        if steps.is_empty() {
            return Err(VoccError::EmptyPeriod { start, end });
        }

        let mut observed = Vec::with_capacity(steps.len());
        Ok((0..self.cell_count())
            .map(|cell| {
                let series = self.series(cell as CellId);
                observed.clear();
                observed.extend(steps.iter().filter_map(|&s| series[s]));
                fold(&observed)
            })
            .collect())
    }

    /// Mean of every cell over the whole series.
    pub fn overall_mean(&self) -> ScalarField {
        let first = self.times[0];
        let last = self.times[self.steps() - 1];
        // The full time axis is never an empty period
        self.period_mean(first, last).unwrap_or_default()
    }
}

/// Elapsed time between the midpoints of two periods.
pub fn period_gap(baseline: (f64, f64), future: (f64, f64)) -> f64 {
    (future.0 + future.1) / 2.0 - (baseline.0 + baseline.1) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cell_stack() -> SeriesStack {
        let times = vec![2000.0, 2001.0, 2002.0, 2003.0];
        let values = vec![
            Some(1.0),
            Some(2.0),
            Some(3.0),
            Some(4.0),
            Some(10.0),
            None,
            Some(30.0),
            Some(40.0),
        ];
        SeriesStack::new(times, values).unwrap()
    }

    #[test]
    fn series_slices_are_cell_major() {
        let stack = two_cell_stack();
        assert_eq!(stack.cell_count(), 2);
        assert_eq!(stack.series(1), &[Some(10.0), None, Some(30.0), Some(40.0)]);
        assert_eq!(stack.layer(1), vec![Some(2.0), None]);
    }

    #[test]
    fn from_layers_transposes() {
        let layers = vec![vec![Some(1.0), Some(10.0)], vec![Some(2.0), None]];
        let stack = SeriesStack::from_layers(vec![0.0, 1.0], &layers).unwrap();
        assert_eq!(stack.series(0), &[Some(1.0), Some(2.0)]);
        assert_eq!(stack.series(1), &[Some(10.0), None]);
    }

    #[test]
    fn non_increasing_times_rejected() {
        let err = SeriesStack::new(vec![1.0, 1.0], vec![None, None]).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn ragged_values_rejected() {
        let err = SeriesStack::new(vec![1.0, 2.0], vec![None, None, None]).unwrap_err();
        assert!(matches!(err, VoccError::Shape { .. }));
    }

    #[test]
    fn aggregate_mean_drops_incomplete_blocks() {
        let stack = two_cell_stack();
        let annual = stack.aggregate(2, Aggregation::Mean).unwrap();
        assert_eq!(annual.times(), &[2000.0, 2002.0]);
        assert_eq!(annual.series(0), &[Some(1.5), Some(3.5)]);
        assert_eq!(annual.series(1), &[None, Some(35.0)]);
    }

    #[test]
    fn aggregate_sum_min_max() {
        let stack = two_cell_stack();
        assert_eq!(stack.aggregate(4, Aggregation::Sum).unwrap().series(0), &[Some(10.0)]);
        assert_eq!(stack.aggregate(4, Aggregation::Min).unwrap().series(0), &[Some(1.0)]);
        assert_eq!(stack.aggregate(4, Aggregation::Max).unwrap().series(0), &[Some(4.0)]);
    }

    #[test]
    fn aggregate_rejects_bad_block() {
        let stack = two_cell_stack();
        assert!(stack.aggregate(0, Aggregation::Mean).is_err());
        assert!(stack.aggregate(5, Aggregation::Mean).is_err());
    }

    #[test]
    fn period_mean_skips_missing() {
        let stack = two_cell_stack();
        let mean = stack.period_mean(2000.0, 2001.0).unwrap();
        assert_eq!(mean, vec![Some(1.5), Some(10.0)]);
    }

    #[test]
    fn empty_period_is_an_error() {
        let stack = two_cell_stack();
        let err = stack.period_mean(1990.0, 1995.0).unwrap_err();
        assert!(matches!(err, VoccError::EmptyPeriod { .. }));
    }

    #[test]
    fn period_std_needs_two_observations() {
        let stack = two_cell_stack();
        let std = stack.period_std(2000.0, 2001.0).unwrap();
        assert!((std[0].unwrap() - 0.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(std[1], None, "one observation has no spread");
    }

    #[test]
    fn overall_mean_covers_all_steps() {
        let stack = two_cell_stack();
        assert_eq!(stack.overall_mean()[0], Some(2.5));
    }

    #[test]
    fn period_gap_between_midpoints() {
        assert_eq!(period_gap((1960.0, 1970.0), (2000.0, 2010.0)), 40.0);
    }
}
