pub mod analogue;
pub mod field;
pub mod gradient;
pub mod index;
pub mod statistics;
pub mod trajectory;
pub mod trend;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Undefined, VoccError};
use crate::grid::series::period_gap;
use crate::grid::{CellId, Grid, ScalarField, SeriesStack};
use crate::velocity::analogue::{AnalogueMatch, AnalogueParams, AnalogueSearch, Tolerance};
use crate::velocity::field::VelocityField;
use crate::velocity::statistics::{FieldStatistics, TrajectoryStatistics};
use crate::velocity::trajectory::{TraceParams, Trajectory};

/// gVoCC for one variable: trend, gradient of the series mean, velocity.
///
/// Each stage finishes for the whole grid before the next starts. When
/// `significance_t` is set, trends with a smaller |t| are treated as
/// undefined before the velocity is formed.
pub fn compute_gvocc(
    grid: &Grid,
    variable: &str,
    stack: &SeriesStack,
    min_observations: usize,
    significance_t: Option<f64>,
) -> Result<(VelocityField, FieldStatistics), VoccError> {
    let start = Instant::now();

    let mut trends = trend::estimate_trends(grid, stack, min_observations)?;
    if let Some(t) = significance_t {
        trends = trend::filter_significant(&trends, t);
    }
    debug!(
        variable,
        valid = trends.iter().filter(|t| t.is_valid()).count(),
        "Trends estimated"
    );

    let mean = stack.overall_mean();
    let gradients = gradient::estimate_gradient(grid, &mean)?;
    debug!(
        variable,
        valid = gradients.iter().filter(|g| g.is_ok()).count(),
        "Gradients estimated"
    );

    let velocities = field::compute_velocity(&trends, &gradients)?;
    let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
    let stats = statistics::velocity_statistics(&velocities, duration_ms);

    info!(
        variable,
        cells = stats.total,
        defined = stats.defined,
        mean_speed = stats.mean_abs,
        duration_ms,
        "Gradient velocity computed"
    );
    warn_if_widespread(variable, "gradient velocity", &stats);

    let field = VelocityField {
        variable: variable.to_string(),
        trends,
        gradients,
        velocities,
        mean,
    };
    Ok((field, stats))
}

/// Trace trajectories from `seeds` through a velocity field.
pub fn trace_field(
    grid: &Grid,
    field: &VelocityField,
    seeds: &[CellId],
    params: TraceParams,
) -> Result<(Vec<Trajectory>, TrajectoryStatistics), VoccError> {
    let start = Instant::now();
    let trajectories =
        trajectory::trace_trajectories(grid, &field.velocities, &field.mean, seeds, params)?;
    let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
    let stats = statistics::trajectory_statistics(grid, &trajectories, duration_ms);

    info!(
        variable = %field.variable,
        seeds = stats.seeds,
        mean_elapsed_years = stats.mean_elapsed_years,
        mean_path_length = stats.mean_path_length,
        duration_ms,
        "Trajectories traced"
    );
    for (state, count) in &stats.terminals {
        debug!(terminal = ?state, count, "Trajectory terminal states");
    }
    Ok((trajectories, stats))
}

/// Baseline and future periods (inclusive time ranges) of a dVoCC run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimatePeriods {
    pub baseline: (f64, f64),
    pub future: (f64, f64),
}

impl ClimatePeriods {
    /// Time between the period midpoints.
    pub fn elapsed_years(&self) -> f64 {
        period_gap(self.baseline, self.future)
    }
}

/// Period climatologies and analogue matches of a dVoCC run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogueField {
    pub variables: Vec<String>,
    pub baseline: Vec<ScalarField>,
    pub future: Vec<ScalarField>,
    pub elapsed_years: f64,
    pub matches: Vec<AnalogueMatch>,
}

impl AnalogueField {
    pub fn velocities(&self) -> ScalarField {
        self.matches.iter().map(AnalogueMatch::velocity).collect()
    }
}

/// dVoCC over one or more variables: period means, then analogue search.
pub fn compute_dvocc(
    grid: &Grid,
    variables: &[(&str, &SeriesStack)],
    periods: ClimatePeriods,
    tolerances: &[Tolerance],
    params: AnalogueParams,
) -> Result<(AnalogueField, FieldStatistics), VoccError> {
    let start = Instant::now();

    let mut baseline = Vec::with_capacity(variables.len());
    let mut future = Vec::with_capacity(variables.len());
    for (name, stack) in variables {
        VoccError::check_len(&format!("series stack '{}'", name), grid.len(), stack.cell_count())?;
        baseline.push(stack.period_mean(periods.baseline.0, periods.baseline.1)?);
        future.push(stack.period_mean(periods.future.0, periods.future.1)?);
    }

    let matches = AnalogueSearch::new(grid, &baseline, &future, tolerances, params)?.find_all();
    let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
    let stats = statistics::analogue_statistics(&matches, duration_ms);

    let names: Vec<String> = variables.iter().map(|(n, _)| n.to_string()).collect();
    let label = names.join("+");
    info!(
        variables = %label,
        cells = stats.total,
        found = stats.defined,
        no_analogue = stats.count(Undefined::NoAnalogueFound),
        mean_velocity = stats.mean_abs,
        elapsed_years = params.elapsed_years,
        duration_ms,
        "Analogue velocity computed"
    );
    warn_if_widespread(&label, "analogue search", &stats);

    let field = AnalogueField {
        variables: names,
        baseline,
        future,
        elapsed_years: params.elapsed_years,
        matches,
    };
    Ok((field, stats))
}

/// Warn when more than 10% of unmasked cells came out undefined.
fn warn_if_widespread(variable: &str, stage: &str, stats: &FieldStatistics) -> bool {
    let share = stats.failure_share();
    if share <= 0.1 {
        return false;
    }
    warn!(
        variable,
        stage,
        pct = share * 100.0,
        insufficient_data = stats.count(Undefined::InsufficientData),
        undefined_gradient = stats.count(Undefined::UndefinedGradient),
        undefined_velocity = stats.count(Undefined::UndefinedVelocity),
        no_analogue = stats.count(Undefined::NoAnalogueFound),
        "Widespread undefined cells"
    );
    true
}
