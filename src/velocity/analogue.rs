use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CellResult, Undefined, VoccError};
use crate::grid::sphere_math::{initial_bearing, tangent_to_bearing};
use crate::grid::{CellId, Grid, ScalarField};
use crate::velocity::index::{DistanceFunction, SpatialIndex};

/// Climate tolerance of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tolerance {
    /// The same tolerance for every focal cell.
    Fixed(f64),
    /// A tolerance per focal cell; `None` leaves the cell without a search.
    PerCell(ScalarField),
}

impl Tolerance {
    fn at(&self, cell: CellId) -> Option<f64> {
        match self {
            Tolerance::Fixed(t) => Some(*t),
            Tolerance::PerCell(values) => values[cell as usize],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogueParams {
    /// Maximum distance to an analogue (km for great-circle search).
    pub geo_tolerance: f64,
    pub distance: DistanceFunction,
    /// Years between the baseline and future climates.
    pub elapsed_years: f64,
    /// Let a focal cell be its own analogue.
    pub allow_self_match: bool,
}

/// Nearest cell whose future climate matches the focal baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Analogue {
    pub cell: CellId,
    pub distance: f64,
    pub elapsed_years: f64,
    /// `distance / elapsed_years`.
    pub velocity: f64,
    /// Initial bearing from the focal cell; `None` for a self match.
    pub bearing: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogueMatch {
    pub focal: CellId,
    pub outcome: CellResult<Analogue>,
}

impl AnalogueMatch {
    pub fn velocity(&self) -> Option<f64> {
        self.outcome.as_ref().ok().map(|a| a.velocity)
    }
}

/// Validated analogue search over one grid.
///
/// Construction checks every input and builds the spatial index; searching
/// cannot fail afterwards and only reads shared state.
pub struct AnalogueSearch<'a> {
    grid: &'a Grid,
    baseline: &'a [ScalarField],
    future: &'a [ScalarField],
    tolerances: &'a [Tolerance],
    params: AnalogueParams,
    index: SpatialIndex,
}

impl<'a> AnalogueSearch<'a> {
    pub fn new(
        grid: &'a Grid,
        baseline: &'a [ScalarField],
        future: &'a [ScalarField],
        tolerances: &'a [Tolerance],
        params: AnalogueParams,
    ) -> Result<AnalogueSearch<'a>, VoccError> {
        validate(grid, baseline, future, tolerances, &params)?;

        let candidates = grid
            .cells()
            .iter()
            .filter(|c| c.valid && future.iter().all(|f| defined(f[c.id as usize])))
            .map(|c| c.id);
        let index = SpatialIndex::build(grid, candidates, params.geo_tolerance, params.distance);
        debug!(
            candidates = index.len(),
            variables = baseline.len(),
            geo_tolerance = params.geo_tolerance,
            "Analogue index built"
        );

        Ok(AnalogueSearch {
            grid,
            baseline,
            future,
            tolerances,
            params,
            index,
        })
    }

    /// Search for the analogue of one focal cell.
    pub fn find(&self, focal: CellId) -> AnalogueMatch {
        let mut scratch = Vec::new();
        self.find_with(focal, &mut scratch)
    }

    /// Search every cell in parallel.
    pub fn find_all(&self) -> Vec<AnalogueMatch> {
        (0..self.grid.len() as CellId)
            .into_par_iter()
            .map_init(Vec::new, |scratch, focal| self.find_with(focal, scratch))
            .collect()
    }

    fn find_with(&self, focal: CellId, scratch: &mut Vec<CellId>) -> AnalogueMatch {
        AnalogueMatch {
            focal,
            outcome: self.search(focal, scratch),
        }
    }

    fn search(&self, focal: CellId, scratch: &mut Vec<CellId>) -> CellResult<Analogue> {
        if focal as usize >= self.grid.len() || !self.grid.cell(focal).valid {
            return Err(Undefined::Masked);
        }

        // Resolve baseline and tolerance once per focal cell
        let mut centre = Vec::with_capacity(self.baseline.len());
        for (field, tol) in self.baseline.iter().zip(self.tolerances) {
            let b = field[focal as usize].filter(|v| v.is_finite());
            match (b, tol.at(focal)) {
                (Some(b), Some(t)) => centre.push((b, t)),
                _ => return Err(Undefined::Masked),
            }
        }

        let metric = self.params.distance;
        let limit = self.params.geo_tolerance;
        self.index.candidates(self.grid, focal, limit, metric, scratch);

        let mut best: Option<(f64, CellId)> = None;
        for &c in scratch.iter() {
            if c == focal && !self.params.allow_self_match {
                continue;
            }
            let matches = self
                .future
                .iter()
                .zip(&centre)
                .all(|(f, &(b, t))| f[c as usize].is_some_and(|v| (v - b).abs() <= t));
            if !matches {
                continue;
            }
            let d = metric.distance(self.grid, focal, c);
            if d > limit {
                continue;
            }
            let better = match best {
                None => true,
                Some((bd, bc)) => d < bd || (d == bd && c < bc),
            };
            if better {
                best = Some((d, c));
            }
        }

        let (distance, cell) = best.ok_or(Undefined::NoAnalogueFound)?;
        Ok(Analogue {
            cell,
            distance,
            elapsed_years: self.params.elapsed_years,
            velocity: distance / self.params.elapsed_years,
            bearing: self.bearing(focal, cell),
        })
    }

    fn bearing(&self, from: CellId, to: CellId) -> Option<f64> {
        if from == to {
            return None;
        }
        let a = self.grid.cell(from);
        let b = self.grid.cell(to);
        if self.grid.is_lonlat() {
            initial_bearing(a.y, a.x, b.y, b.x)
        } else {
            Some(tangent_to_bearing(b.x - a.x, b.y - a.y))
        }
    }
}

fn defined(v: Option<f64>) -> bool {
    v.is_some_and(f64::is_finite)
}

fn validate(
    grid: &Grid,
    baseline: &[ScalarField],
    future: &[ScalarField],
    tolerances: &[Tolerance],
    params: &AnalogueParams,
) -> Result<(), VoccError> {
    let mut errors = Vec::new();

    if baseline.is_empty() {
        errors.push("at least one climate variable is required".to_string());
    }
    if baseline.len() != future.len() {
        errors.push(format!(
            "baseline has {} variables but future has {}",
            baseline.len(),
            future.len()
        ));
    }
    if tolerances.len() != baseline.len() {
        errors.push(format!(
            "tolerances has {} entries but there are {} variables. Example: tolerances = [0.5]",
            tolerances.len(),
            baseline.len()
        ));
    }
    for (i, tol) in tolerances.iter().enumerate() {
        match tol {
            Tolerance::Fixed(t) if !(*t >= 0.0) || !t.is_finite() => errors.push(format!(
                "tolerance {} must be a finite value >= 0, got {}",
                i, t
            )),
            Tolerance::PerCell(values) if values.len() != grid.len() => errors.push(format!(
                "per-cell tolerance {} has {} values but the grid has {} cells",
                i,
                values.len(),
                grid.len()
            )),
            Tolerance::PerCell(values) => {
                if let Some(bad) = values.iter().flatten().find(|t| !(**t >= 0.0) || !t.is_finite()) {
                    errors.push(format!(
                        "per-cell tolerance {} contains {}, every value must be finite and >= 0",
                        i, bad
                    ));
                }
            }
            _ => {}
        }
    }
    if !(params.geo_tolerance >= 0.0) {
        errors.push(format!(
            "geo_tolerance must be >= 0, got {}. Example: geo_tolerance = 3000.0",
            params.geo_tolerance
        ));
    }
    if !(params.elapsed_years > 0.0) || !params.elapsed_years.is_finite() {
        errors.push(format!(
            "elapsed_years must be > 0, got {}",
            params.elapsed_years
        ));
    }
    if params.distance == DistanceFunction::GreatCircle && !grid.is_lonlat() {
        errors.push(
            "great_circle distance needs a lon/lat grid. Example: distance_function = \"planar\""
                .to_string(),
        );
    }

    VoccError::from_messages(errors)?;

    for (i, field) in baseline.iter().enumerate() {
        grid.check_field(&format!("baseline variable {}", i), field)?;
    }
    for (i, field) in future.iter().enumerate() {
        grid.check_field(&format!("future variable {}", i), field)?;
    }
    Ok(())
}

/// Find the analogue of a single focal cell.
pub fn find_analogue(
    grid: &Grid,
    focal: CellId,
    baseline: &[ScalarField],
    future: &[ScalarField],
    tolerances: &[Tolerance],
    params: AnalogueParams,
) -> Result<AnalogueMatch, VoccError> {
    Ok(AnalogueSearch::new(grid, baseline, future, tolerances, params)?.find(focal))
}

/// Find analogues for every cell of the grid (dVoCC).
pub fn find_analogues(
    grid: &Grid,
    baseline: &[ScalarField],
    future: &[ScalarField],
    tolerances: &[Tolerance],
    params: AnalogueParams,
) -> Result<Vec<AnalogueMatch>, VoccError> {
    Ok(AnalogueSearch::new(grid, baseline, future, tolerances, params)?.find_all())
}
