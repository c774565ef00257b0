use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::VoccError;
use crate::grid::sphere_math::{EARTH_RADIUS_KM, bearing_to_tangent, destination};
use crate::grid::topology::QUEEN_OFFSETS;
use crate::grid::{CellId, Grid};
use crate::velocity::field::{Velocity, VelocityResult};

/// Why a trajectory stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// The time budget was used up.
    Completed,
    /// The path left the grid extent.
    OutOfBounds,
    /// The path reached a cell with undefined velocity or mean value.
    NoData,
    /// The path made no measurable progress within one cell for too many
    /// consecutive steps.
    Stalled,
}

impl TerminalState {
    pub fn all() -> &'static [TerminalState] {
        &[
            TerminalState::Completed,
            TerminalState::OutOfBounds,
            TerminalState::NoData,
            TerminalState::Stalled,
        ]
    }
}

/// What happens when a step lands on a cell without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Stop with `NoData`.
    #[default]
    Absorb,
    /// Move instead to the valid 8-neighbour of the departure cell whose mean
    /// value is closest to the departure cell's.
    Deflect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub cell: CellId,
    pub elapsed_years: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub seed: CellId,
    /// Never empty; the first waypoint is the seed cell centre at time 0.
    pub waypoints: Vec<Waypoint>,
    pub terminal: TerminalState,
}

impl Trajectory {
    pub fn end(&self) -> &Waypoint {
        // Constructed with the seed waypoint, never drained
        &self.waypoints[self.waypoints.len() - 1]
    }

    pub fn elapsed_years(&self) -> f64 {
        self.end().elapsed_years
    }

    /// Sum of segment lengths in the grid's distance unit.
    pub fn path_length(&self, grid: &Grid) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| grid.distance_between(w[0].x, w[0].y, w[1].x, w[1].y))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceParams {
    pub total_years: f64,
    pub step_years: f64,
    /// Consecutive motionless steps in one cell tolerated before `Stalled`.
    pub stall_steps: u32,
    pub boundary: BoundaryPolicy,
}

impl TraceParams {
    pub fn validate(&self) -> Result<(), VoccError> {
        let mut errors = Vec::new();
        if !(self.total_years >= 0.0) || !self.total_years.is_finite() {
            errors.push(format!(
                "total_years must be a finite value >= 0, got {}. Example: total_years = 50.0",
                self.total_years
            ));
        }
        if !(self.step_years > 0.0) || !self.step_years.is_finite() {
            errors.push(format!(
                "step_years must be > 0, got {}. Example: step_years = 1.0",
                self.step_years
            ));
        }
        VoccError::from_messages(errors)
    }

    /// Number of integration steps needed to cover `total_years`.
    pub fn step_budget(&self) -> u64 {
        let ratio = self.total_years / self.step_years;
        // Absorb round-off so 10 / 0.1 is 100 steps, not 101
        (ratio - 1e-9).ceil().max(0.0) as u64
    }
}

/// A step shorter than this fraction of the smallest cell side counts as no
/// movement.
const STALL_FRACTION: f64 = 1e-6;

/// Inputs shared by every trajectory traced through one field.
struct Tracer<'a> {
    grid: &'a Grid,
    velocities: &'a [VelocityResult],
    mean: &'a [Option<f64>],
    params: TraceParams,
    /// Displacement at or below which a step is motionless.
    stall_distance: f64,
}

impl<'a> Tracer<'a> {
    /// Validate everything upfront so tracing itself cannot fail.
    fn new(
        grid: &'a Grid,
        velocities: &'a [VelocityResult],
        mean: &'a [Option<f64>],
        seeds: &[CellId],
        params: TraceParams,
    ) -> Result<Tracer<'a>, VoccError> {
        params.validate()?;
        grid.check_field("velocity field", velocities)?;
        grid.check_field("mean field", mean)?;
        if let Some(&bad) = seeds.iter().find(|&&s| s as usize >= grid.len()) {
            return Err(VoccError::Config(format!(
                "seed cell {} is outside the grid ({} cells)",
                bad,
                grid.len()
            )));
        }
        let spec = grid.spec();
        let side = spec.cell_width.min(spec.cell_height);
        // Degrees of latitude to km
        let side = if grid.is_lonlat() {
            side.to_radians() * EARTH_RADIUS_KM
        } else {
            side
        };
        Ok(Tracer {
            grid,
            velocities,
            mean,
            params,
            stall_distance: side * STALL_FRACTION,
        })
    }

    fn sample(&self, cell: CellId) -> Option<(Velocity, f64)> {
        if !self.grid.cell(cell).valid {
            return None;
        }
        let v = self.velocities[cell as usize].ok()?;
        let m = self.mean[cell as usize].filter(|m| m.is_finite())?;
        Some((v, m))
    }

    fn advance(&self, x: f64, y: f64, bearing: f64, distance: f64) -> (f64, f64) {
        if self.grid.is_lonlat() {
            let (lat, lon) = destination(y, x, bearing, distance);
            (lon, lat)
        } else {
            let (e, n) = bearing_to_tangent(bearing);
            (x + e * distance, y + n * distance)
        }
    }

    /// Valid 8-neighbour of `from` with the mean value closest to `value`.
    fn deflect(&self, from: CellId, value: f64) -> Option<CellId> {
        let mut best: Option<(f64, CellId)> = None;
        for &(dr, dc) in &QUEEN_OFFSETS {
            let Some(n) = self.grid.offset(from, dr, dc) else {
                continue;
            };
            let Some((_, m)) = self.sample(n) else {
                continue;
            };
            let diff = (m - value).abs();
            let better = match best {
                None => true,
                Some((d, id)) => diff < d || (diff == d && n < id),
            };
            if better {
                best = Some((diff, n));
            }
        }
        best.map(|(_, id)| id)
    }

    fn trace(&self, seed: CellId) -> Trajectory {
        let start = self.grid.cell(seed);
        let mut waypoints = vec![Waypoint {
            x: start.x,
            y: start.y,
            cell: seed,
            elapsed_years: 0.0,
        }];
        let budget = self.params.step_budget();
        let mut steps = 0u64;
        let mut cell = seed;
        let (mut x, mut y) = (start.x, start.y);
        let mut elapsed = 0.0_f64;
        let mut stays = 0u32;

        let terminal = loop {
            if steps >= budget {
                break TerminalState::Completed;
            }
            let Some((velocity, mean)) = self.sample(cell) else {
                break TerminalState::NoData;
            };

            let dt = self.params.step_years.min(self.params.total_years - elapsed);
            let displacement = velocity.speed() * dt;
            let (nx, ny) = self.advance(x, y, velocity.bearing, displacement);
            let Some(landed) = self.grid.locate(nx, ny) else {
                break TerminalState::OutOfBounds;
            };
            steps += 1;
            elapsed = if steps == budget {
                self.params.total_years
            } else {
                elapsed + dt
            };

            let (next, px, py) = if self.sample(landed).is_some() {
                (landed, nx, ny)
            } else {
                match self.params.boundary {
                    BoundaryPolicy::Absorb => (landed, nx, ny),
                    BoundaryPolicy::Deflect => match self.deflect(cell, mean) {
                        Some(n) => {
                            let c = self.grid.cell(n);
                            (n, c.x, c.y)
                        }
                        None => (landed, nx, ny),
                    },
                }
            };

            let motionless = next == cell && displacement <= self.stall_distance;
            stays = if motionless { stays + 1 } else { 0 };
            cell = next;
            x = px;
            y = py;
            waypoints.push(Waypoint {
                x,
                y,
                cell,
                elapsed_years: elapsed,
            });

            // Checked before the budget so a final step onto a gap is not Completed
            if self.sample(cell).is_none() {
                break TerminalState::NoData;
            }
            if stays > self.params.stall_steps {
                break TerminalState::Stalled;
            }
        };

        Trajectory {
            seed,
            waypoints,
            terminal,
        }
    }
}

/// Integrate the velocity field forward from one seed cell.
///
/// `mean` is the climatology the velocity was derived from; a cell missing
/// either value ends the path with `NoData`.
pub fn trace_trajectory(
    grid: &Grid,
    velocities: &[VelocityResult],
    mean: &[Option<f64>],
    seed: CellId,
    params: TraceParams,
) -> Result<Trajectory, VoccError> {
    let tracer = Tracer::new(grid, velocities, mean, &[seed], params)?;
    Ok(tracer.trace(seed))
}

/// Trace every seed in parallel. Seeds are independent.
pub fn trace_trajectories(
    grid: &Grid,
    velocities: &[VelocityResult],
    mean: &[Option<f64>],
    seeds: &[CellId],
    params: TraceParams,
) -> Result<Vec<Trajectory>, VoccError> {
    let tracer = Tracer::new(grid, velocities, mean, seeds, params)?;
    Ok(seeds.par_iter().map(|&seed| tracer.trace(seed)).collect())
}

/// Seeds on every `stride`-th row and column where the velocity is defined.
pub fn seeds_every(grid: &Grid, velocities: &[VelocityResult], stride: u32) -> Vec<CellId> {
    let stride = stride.max(1);
    grid.cells()
        .iter()
        .filter(|c| c.valid && c.row % stride == 0 && c.col % stride == 0)
        .filter(|c| velocities.get(c.id as usize).is_some_and(|v| v.is_ok()))
        .map(|c| c.id)
        .collect()
}
