use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CellResult, Undefined};
use crate::grid::Grid;
use crate::velocity::analogue::AnalogueMatch;
use crate::velocity::field::VelocityResult;
use crate::velocity::trajectory::{TerminalState, Trajectory};

/// Summary of one per-cell field, used for logging and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub total: u32,
    pub defined: u32,
    pub undefined: HashMap<Undefined, u32>,
    /// Mean of |value| over defined cells; 0 when none are defined.
    pub mean_abs: f64,
    pub median_abs: f64,
    pub max_abs: f64,
    pub duration_ms: f32,
}

impl FieldStatistics {
    /// Undefined cells that were not masked, as a share of unmasked cells.
    pub fn failure_share(&self) -> f64 {
        let masked = self.count(Undefined::Masked);
        let considered = self.total.saturating_sub(masked);
        if considered == 0 {
            return 0.0;
        }
        let failed = self.total - self.defined - masked;
        failed as f64 / considered as f64
    }

    pub fn count(&self, reason: Undefined) -> u32 {
        self.undefined.get(&reason).copied().unwrap_or(0)
    }
}

/// Summarise any per-cell result field by a scalar projection of its values.
pub fn field_statistics<T>(
    results: &[CellResult<T>],
    value: impl Fn(&T) -> f64,
    duration_ms: f32,
) -> FieldStatistics {
    let mut undefined: HashMap<Undefined, u32> = HashMap::new();
    let mut magnitudes = Vec::with_capacity(results.len());

    for result in results {
        match result {
            Ok(v) => {
                let m = value(v).abs();
                if m.is_finite() {
                    magnitudes.push(m);
                }
            }
            Err(reason) => *undefined.entry(*reason).or_insert(0) += 1,
        }
    }

    let defined = results.len() as u32 - undefined.values().sum::<u32>();
    magnitudes.sort_unstable_by(f64::total_cmp);

    FieldStatistics {
        total: results.len() as u32,
        defined,
        undefined,
        mean_abs: mean(&magnitudes),
        median_abs: median(&magnitudes),
        max_abs: magnitudes.last().copied().unwrap_or(0.0),
        duration_ms,
    }
}

pub fn velocity_statistics(velocities: &[VelocityResult], duration_ms: f32) -> FieldStatistics {
    field_statistics(velocities, |v| v.magnitude, duration_ms)
}

pub fn analogue_statistics(matches: &[AnalogueMatch], duration_ms: f32) -> FieldStatistics {
    let outcomes: Vec<_> = matches.iter().map(|m| m.outcome).collect();
    field_statistics(&outcomes, |a| a.velocity, duration_ms)
}

/// Terminal-state histogram and path summary of a trajectory batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStatistics {
    pub seeds: u32,
    pub terminals: HashMap<TerminalState, u32>,
    pub mean_elapsed_years: f64,
    pub mean_path_length: f64,
    pub mean_waypoints: f64,
    pub duration_ms: f32,
}

impl TrajectoryStatistics {
    pub fn count(&self, state: TerminalState) -> u32 {
        self.terminals.get(&state).copied().unwrap_or(0)
    }
}

pub fn trajectory_statistics(grid: &Grid, trajectories: &[Trajectory], duration_ms: f32) -> TrajectoryStatistics {
    let mut terminals: HashMap<TerminalState, u32> = HashMap::new();
    for state in TerminalState::all() {
        terminals.insert(*state, 0);
    }
    for t in trajectories {
        *terminals.entry(t.terminal).or_insert(0) += 1;
    }

    let elapsed: Vec<f64> = trajectories.iter().map(|t| t.elapsed_years()).collect();
    let lengths: Vec<f64> = trajectories.iter().map(|t| t.path_length(grid)).collect();
    let waypoints: Vec<f64> = trajectories.iter().map(|t| t.waypoints.len() as f64).collect();

    TrajectoryStatistics {
        seeds: trajectories.len() as u32,
        terminals,
        mean_elapsed_years: mean(&elapsed),
        mean_path_length: mean(&lengths),
        mean_waypoints: mean(&waypoints),
        duration_ms,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Median of sorted values.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSpec;
    use crate::velocity::analogue::Analogue;
    use crate::velocity::field::Velocity;
    use crate::velocity::trajectory::Waypoint;

    const EPSILON: f64 = 1e-9;

    fn velocity(magnitude: f64) -> VelocityResult {
        Ok(Velocity {
            magnitude,
            bearing: 0.0,
        })
    }

    #[test]
    fn counts_and_averages() {
        let field = vec![
            velocity(2.0),
            velocity(-4.0),
            velocity(6.0),
            Err(Undefined::Masked),
            Err(Undefined::UndefinedGradient),
        ];
        let stats = velocity_statistics(&field, 1.5);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.defined, 3);
        assert_eq!(stats.count(Undefined::Masked), 1);
        assert_eq!(stats.count(Undefined::UndefinedGradient), 1);
        assert_eq!(stats.count(Undefined::InsufficientData), 0);
        assert!((stats.mean_abs - 4.0).abs() < EPSILON, "mean of |v| uses speed");
        assert!((stats.median_abs - 4.0).abs() < EPSILON);
        assert!((stats.max_abs - 6.0).abs() < EPSILON);
    }

    #[test]
    fn failure_share_ignores_masked_cells() {
        let mut field = vec![Err(Undefined::Masked); 6];
        field.push(velocity(1.0));
        field.push(velocity(1.0));
        field.push(velocity(1.0));
        field.push(Err(Undefined::InsufficientData));
        let stats = velocity_statistics(&field, 0.0);
        assert!((stats.failure_share() - 0.25).abs() < EPSILON);
    }

    #[test]
    fn empty_field_is_all_zero() {
        let stats = velocity_statistics(&[], 0.0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mean_abs, 0.0);
        assert_eq!(stats.median_abs, 0.0);
        assert_eq!(stats.failure_share(), 0.0);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert!((median(&[1.0, 2.0, 3.0, 10.0]) - 2.5).abs() < EPSILON);
    }

    #[test]
    fn analogue_statistics_use_velocity() {
        let matches = vec![
            AnalogueMatch {
                focal: 0,
                outcome: Ok(Analogue {
                    cell: 1,
                    distance: 100.0,
                    elapsed_years: 50.0,
                    velocity: 2.0,
                    bearing: Some(90.0),
                }),
            },
            AnalogueMatch {
                focal: 1,
                outcome: Err(Undefined::NoAnalogueFound),
            },
        ];
        let stats = analogue_statistics(&matches, 0.0);
        assert_eq!(stats.defined, 1);
        assert_eq!(stats.count(Undefined::NoAnalogueFound), 1);
        assert!((stats.mean_abs - 2.0).abs() < EPSILON);
    }

    #[test]
    fn terminal_histogram_lists_every_state() {
        let grid = Grid::new(GridSpec::planar(3, 1, 0.0, 1.0, 1.0), None).unwrap();
        let wp = |x: f64, t: f64| Waypoint {
            x,
            y: 0.5,
            cell: x as u32,
            elapsed_years: t,
        };
        let trajectories = vec![
            Trajectory {
                seed: 0,
                waypoints: vec![wp(0.5, 0.0), wp(2.5, 4.0)],
                terminal: TerminalState::Completed,
            },
            Trajectory {
                seed: 1,
                waypoints: vec![wp(1.5, 0.0)],
                terminal: TerminalState::NoData,
            },
        ];
        let stats = trajectory_statistics(&grid, &trajectories, 0.0);
        assert_eq!(stats.seeds, 2);
        assert_eq!(stats.count(TerminalState::Completed), 1);
        assert_eq!(stats.count(TerminalState::NoData), 1);
        assert_eq!(stats.count(TerminalState::Stalled), 0);
        assert_eq!(stats.terminals.len(), TerminalState::all().len());
        assert!((stats.mean_elapsed_years - 2.0).abs() < EPSILON);
        assert!((stats.mean_path_length - 1.0).abs() < EPSILON);
        assert!((stats.mean_waypoints - 1.5).abs() < EPSILON);
    }
}
