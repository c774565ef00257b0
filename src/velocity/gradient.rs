use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CellResult, Undefined, VoccError};
use crate::grid::sphere_math::tangent_to_bearing;
use crate::grid::{Adjacency, CellId, Grid};

/// Local spatial gradient of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    /// Units per distance unit (per km on lon/lat grids). Never negative.
    pub magnitude: f64,
    /// Compass bearing of steepest increase; `None` when `magnitude` is 0.
    pub bearing: Option<f64>,
    /// Eastward component, units per distance unit.
    pub d_east: f64,
    /// Northward component, units per distance unit.
    pub d_north: f64,
}

impl Gradient {
    fn from_components(d_east: f64, d_north: f64) -> Gradient {
        let magnitude = d_east.hypot(d_north);
        let bearing = if magnitude > 0.0 {
            Some(tangent_to_bearing(d_east, d_north))
        } else {
            None
        };
        Gradient {
            magnitude,
            bearing,
            d_east,
            d_north,
        }
    }
}

pub type GradientResult = CellResult<Gradient>;

/// Horn weights for the three rows (or columns) of a 3x3 window.
const HORN_WEIGHTS: [(i32, f64); 3] = [(-1, 1.0), (0, 2.0), (1, 1.0)];

/// Estimate the spatial gradient of `field` at every cell.
///
/// Rook grids use a single centered difference per axis; queen grids
/// average the three rows/columns of the 3x3 window with 1-2-1 weights.
/// Distances between neighbours are true ground distances, so longitude
/// spacing shrinks with latitude on lon/lat grids.
pub fn estimate_gradient(grid: &Grid, field: &[Option<f64>]) -> Result<Vec<GradientResult>, VoccError> {
    grid.check_field("gradient input field", field)?;

    Ok(grid
        .cells()
        .par_iter()
        .map(|cell| {
            if !cell.valid || value_at(grid, field, cell.id).is_none() {
                return Err(Undefined::Masked);
            }
            gradient_at(grid, field, cell.id)
        })
        .collect())
}

fn gradient_at(grid: &Grid, field: &[Option<f64>], id: CellId) -> GradientResult {
    let (d_east, d_north) = match grid.spec().adjacency {
        Adjacency::Rook => (
            axis_derivative(grid, field, Some(id), Axis::EastWest),
            axis_derivative(grid, field, Some(id), Axis::NorthSouth),
        ),
        Adjacency::Queen => (
            horn_derivative(grid, field, id, Axis::EastWest),
            horn_derivative(grid, field, id, Axis::NorthSouth),
        ),
    };

    match (d_east, d_north) {
        (Some(e), Some(n)) => Ok(Gradient::from_components(e, n)),
        _ => Err(Undefined::UndefinedGradient),
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    EastWest,
    NorthSouth,
}

impl Axis {
    /// (low, high) offsets: west→east, south→north.
    fn ends(self) -> ((i32, i32), (i32, i32)) {
        match self {
            Axis::EastWest => ((0, -1), (0, 1)),
            Axis::NorthSouth => ((1, 0), (-1, 0)),
        }
    }

    /// Offset that moves a Horn window line perpendicular to this axis.
    fn across(self, k: i32) -> (i32, i32) {
        match self {
            Axis::EastWest => (k, 0),
            Axis::NorthSouth => (0, k),
        }
    }
}

fn value_at(grid: &Grid, field: &[Option<f64>], id: CellId) -> Option<f64> {
    if grid.cell(id).valid {
        field[id as usize].filter(|v| v.is_finite())
    } else {
        None
    }
}

/// Derivative along one axis through `center`, which may itself be off-grid
/// or missing (then only the centered difference is possible).
///
/// `center` is used to find the two ends; an absent `center` yields `None`.
fn axis_derivative(
    grid: &Grid,
    field: &[Option<f64>],
    center: Option<CellId>,
    axis: Axis,
) -> Option<f64> {
    let center = center?;
    let ((lr, lc), (hr, hc)) = axis.ends();
    let lo = grid
        .offset(center, lr, lc)
        .and_then(|id| value_at(grid, field, id).map(|v| (id, v)));
    let hi = grid
        .offset(center, hr, hc)
        .and_then(|id| value_at(grid, field, id).map(|v| (id, v)));
    let mid = value_at(grid, field, center).map(|v| (center, v));

    let (a, b) = match (lo, mid, hi) {
        (Some(lo), _, Some(hi)) => (lo, hi),
        (None, Some(mid), Some(hi)) => (mid, hi),
        (Some(lo), Some(mid), None) => (lo, mid),
        _ => return None,
    };

    let distance = grid.distance(a.0, b.0);
    if distance > 0.0 {
        Some((b.1 - a.1) / distance)
    } else {
        None
    }
}

fn horn_derivative(grid: &Grid, field: &[Option<f64>], id: CellId, axis: Axis) -> Option<f64> {
    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for &(k, w) in &HORN_WEIGHTS {
        let (dr, dc) = axis.across(k);
        let line_center = if k == 0 { Some(id) } else { grid.offset(id, dr, dc) };
        if let Some(d) = axis_derivative(grid, field, line_center, axis) {
            sum += w * d;
            weight_sum += w;
        }
    }
    if weight_sum > 0.0 {
        Some(sum / weight_sum)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sphere_math::great_circle_km;
    use crate::grid::GridSpec;

    const EPSILON: f64 = 1e-9;

    fn planar(ncols: u32, nrows: u32, adjacency: Adjacency) -> Grid {
        Grid::new(
            GridSpec::planar(ncols, nrows, 0.0, nrows as f64 * 10.0, 10.0).with_adjacency(adjacency),
            None,
        )
        .unwrap()
    }

    fn field_from(grid: &Grid, f: impl Fn(f64, f64) -> f64) -> Vec<Option<f64>> {
        grid.cells().iter().map(|c| Some(f(c.x, c.y))).collect()
    }

    #[test]
    fn flat_field_has_zero_magnitude_and_no_bearing() {
        for adjacency in [Adjacency::Rook, Adjacency::Queen] {
            let grid = planar(5, 5, adjacency);
            let field = vec![Some(3.0); 25];
            for result in estimate_gradient(&grid, &field).unwrap() {
                let g = result.unwrap();
                assert_eq!(g.magnitude, 0.0);
                assert_eq!(g.bearing, None);
            }
        }
    }

    #[test]
    fn eastward_ramp_points_east() {
        for adjacency in [Adjacency::Rook, Adjacency::Queen] {
            let grid = planar(5, 5, adjacency);
            let field = field_from(&grid, |x, _| 0.5 * x);
            for result in estimate_gradient(&grid, &field).unwrap() {
                let g = result.unwrap();
                assert!((g.magnitude - 0.5).abs() < EPSILON, "{:?}", g);
                assert!((g.bearing.unwrap() - 90.0).abs() < EPSILON);
            }
        }
    }

    #[test]
    fn northward_ramp_points_north() {
        let grid = planar(4, 4, Adjacency::Rook);
        let field = field_from(&grid, |_, y| 2.0 * y);
        let g = estimate_gradient(&grid, &field).unwrap()[5].unwrap();
        assert!((g.d_north - 2.0).abs() < EPSILON);
        assert!(g.d_east.abs() < EPSILON);
        assert!(g.bearing.unwrap().abs() < EPSILON);
    }

    #[test]
    fn diagonal_ramp_bearing() {
        let grid = planar(5, 5, Adjacency::Queen);
        // Increases toward the southwest
        let field = field_from(&grid, |x, y| -x - y);
        let g = estimate_gradient(&grid, &field).unwrap()[12].unwrap();
        assert!((g.bearing.unwrap() - 225.0).abs() < EPSILON);
        assert!((g.magnitude - 2.0_f64.sqrt()).abs() < EPSILON);
    }

    #[test]
    fn edges_fall_back_to_one_sided_differences() {
        let grid = planar(3, 1, Adjacency::Rook);
        let field = vec![Some(0.0), Some(10.0), Some(40.0)];
        let results = estimate_gradient(&grid, &field).unwrap();
        // A single row has no north-south pair at all
        assert!(results.iter().all(|r| *r == Err(Undefined::UndefinedGradient)));

        let grid = planar(3, 2, Adjacency::Rook);
        let field = vec![Some(0.0), Some(10.0), Some(40.0), Some(0.0), Some(10.0), Some(40.0)];
        let results = estimate_gradient(&grid, &field).unwrap();
        assert!((results[0].unwrap().d_east - 1.0).abs() < EPSILON);
        assert!((results[1].unwrap().d_east - 2.0).abs() < EPSILON);
        assert!((results[2].unwrap().d_east - 3.0).abs() < EPSILON);
    }

    #[test]
    fn missing_neighbour_uses_the_other_side() {
        let grid = planar(3, 3, Adjacency::Rook);
        let mut field = field_from(&grid, |x, _| x);
        field[5] = None; // east of the centre
        let g = estimate_gradient(&grid, &field).unwrap()[4].unwrap();
        assert!((g.d_east - 1.0).abs() < EPSILON);
    }

    #[test]
    fn isolated_cell_is_undefined() {
        let mut mask = vec![false; 9];
        mask[4] = true;
        let grid = Grid::new(GridSpec::planar(3, 3, 0.0, 30.0, 10.0), Some(mask)).unwrap();
        let field = vec![Some(1.0); 9];
        let results = estimate_gradient(&grid, &field).unwrap();
        assert_eq!(results[4], Err(Undefined::UndefinedGradient));
        assert_eq!(results[0], Err(Undefined::Masked));
    }

    #[test]
    fn longitude_spacing_is_rescaled_by_latitude() {
        // Field increases by 1 per degree of longitude
        let grid = Grid::new(GridSpec::lonlat(0.0, 3.0, 59.0, 62.0, 1.0), None).unwrap();
        let field = field_from(&grid, |lon, _| lon);
        let g = estimate_gradient(&grid, &field).unwrap()[4].unwrap();
        let lat = grid.cell(4).y;
        let expected = 2.0 / great_circle_km(lat, 0.5, lat, 2.5);
        assert!((g.d_east - expected).abs() < 1e-12, "{} vs {}", g.d_east, expected);
        // Roughly twice the equatorial value at 60N
        let equatorial = 1.0 / great_circle_km(0.0, 0.0, 0.0, 1.0);
        assert!((g.d_east / equatorial - 2.0).abs() < 0.05);
    }

    #[test]
    fn global_grid_differences_wrap_the_antimeridian() {
        let grid = Grid::new(GridSpec::lonlat(-180.0, 180.0, -10.0, 10.0, 10.0), None).unwrap();
        let field: Vec<Option<f64>> = grid.cells().iter().map(|c| Some(c.col as f64)).collect();
        let results = estimate_gradient(&grid, &field).unwrap();
        // Column 0 sees column 35 to its west: centered difference (1 - 35)
        let id = grid.id(0, 0);
        let g = results[id as usize].unwrap();
        assert!(g.d_east < 0.0, "wrapped difference should be negative: {:?}", g);
    }

    #[test]
    fn finer_cells_see_steeper_local_gradients() {
        // A step between columns 1 and 2 spread over less distance at finer resolution
        let coarse = Grid::new(GridSpec::planar(4, 3, 0.0, 30.0, 10.0), None).unwrap();
        let fine = Grid::new(GridSpec::planar(4, 3, 0.0, 15.0, 5.0), None).unwrap();
        let step = |g: &Grid| -> Vec<Option<f64>> {
            g.cells().iter().map(|c| Some(if c.col >= 2 { 1.0 } else { 0.0 })).collect()
        };
        let gc = estimate_gradient(&coarse, &step(&coarse)).unwrap()[5].unwrap();
        let gf = estimate_gradient(&fine, &step(&fine)).unwrap()[5].unwrap();
        assert!((gf.magnitude / gc.magnitude - 2.0).abs() < EPSILON);
    }

    #[test]
    fn wrong_field_length_rejected() {
        let grid = planar(3, 3, Adjacency::Rook);
        assert!(estimate_gradient(&grid, &vec![Some(0.0); 4]).is_err());
    }
}
