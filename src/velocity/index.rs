use serde::{Deserialize, Serialize};

use crate::grid::sphere_math::{EARTH_RADIUS_KM, great_circle_km};
use crate::grid::{CellId, Grid};

/// How distances between cells are measured during analogue search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFunction {
    /// Haversine distance in km. Requires a lon/lat grid.
    #[default]
    GreatCircle,
    /// Euclidean distance in grid coordinate units.
    Planar,
}

impl DistanceFunction {
    pub fn distance(self, grid: &Grid, a: CellId, b: CellId) -> f64 {
        let ca = grid.cell(a);
        let cb = grid.cell(b);
        match self {
            DistanceFunction::GreatCircle => great_circle_km(ca.y, ca.x, cb.y, cb.x),
            DistanceFunction::Planar => {
                let (ua, va) = grid_uv(grid, a);
                let (ub, vb) = grid_uv(grid, b);
                (ub - ua).hypot(vb - va)
            }
        }
    }
}

/// Position of a cell centre relative to the grid's north-west corner,
/// in coordinate units (u grows east, v grows south).
fn grid_uv(grid: &Grid, id: CellId) -> (f64, f64) {
    let cell = grid.cell(id);
    (grid.relative_x(cell.x), grid.spec().y_max - cell.y)
}

/// Grid-bucket spatial index over a subset of cells.
///
/// Built once, then shared read-only across search workers. Queries return
/// every indexed cell inside a bounding box that contains the search radius;
/// callers filter by exact distance.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bucket_w: f64,
    bucket_h: f64,
    bucket_cols: usize,
    bucket_rows: usize,
    /// Width of the grid extent in coordinate units.
    extent_w: f64,
    lonlat: bool,
    buckets: Vec<Vec<CellId>>,
    len: usize,
}

impl SpatialIndex {
    /// Index `cells`, sizing buckets so a query of `radius` touches few of them.
    pub fn build(
        grid: &Grid,
        cells: impl IntoIterator<Item = CellId>,
        radius: f64,
        metric: DistanceFunction,
    ) -> SpatialIndex {
        let spec = grid.spec();
        let extent_w = spec.ncols as f64 * spec.cell_width;
        let extent_h = spec.nrows as f64 * spec.cell_height;

        // Radius in coordinate units; degrees of latitude for great-circle search
        let span = match metric {
            DistanceFunction::GreatCircle => (radius / EARTH_RADIUS_KM).to_degrees(),
            DistanceFunction::Planar => radius,
        };
        let span = if span.is_finite() { span } else { f64::MAX };
        let bucket_w = span.clamp(spec.cell_width, extent_w.max(spec.cell_width));
        let bucket_h = span.clamp(spec.cell_height, extent_h.max(spec.cell_height));
        let bucket_cols = ((extent_w / bucket_w).ceil() as usize).max(1);
        let bucket_rows = ((extent_h / bucket_h).ceil() as usize).max(1);

        let mut index = SpatialIndex {
            bucket_w,
            bucket_h,
            bucket_cols,
            bucket_rows,
            extent_w,
            lonlat: spec.lonlat,
            buckets: vec![Vec::new(); bucket_cols * bucket_rows],
            len: 0,
        };
        for id in cells {
            let (u, v) = grid_uv(grid, id);
            let (bc, br) = index.bucket_of(u, v);
            index.buckets[br * bucket_cols + bc].push(id);
            index.len += 1;
        }
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_of(&self, u: f64, v: f64) -> (usize, usize) {
        let bc = ((u / self.bucket_w).floor().max(0.0) as usize).min(self.bucket_cols - 1);
        let br = ((v / self.bucket_h).floor().max(0.0) as usize).min(self.bucket_rows - 1);
        (bc, br)
    }

    /// Push every indexed cell that may lie within `radius` of `focal` into `out`.
    pub fn candidates(
        &self,
        grid: &Grid,
        focal: CellId,
        radius: f64,
        metric: DistanceFunction,
        out: &mut Vec<CellId>,
    ) {
        out.clear();
        if !radius.is_finite() {
            for bucket in &self.buckets {
                out.extend_from_slice(bucket);
            }
            return;
        }

        let (u, v) = grid_uv(grid, focal);
        let (half_u, half_v) = match metric {
            DistanceFunction::Planar => (radius, radius),
            DistanceFunction::GreatCircle => {
                let delta = radius / EARTH_RADIUS_KM;
                let lat = grid.cell(focal).y;
                (lon_half_width(lat, delta), delta.to_degrees())
            }
        };

        let rows = self.span_rows(v - half_v, v + half_v);
        let cols = if self.lonlat && metric == DistanceFunction::GreatCircle {
            self.span_cols_wrapped(u - half_u, u + half_u)
        } else {
            self.span_cols(u - half_u, u + half_u).into_iter().collect()
        };

        for br in rows.0..=rows.1 {
            for &(c0, c1) in &cols {
                for bc in c0..=c1 {
                    out.extend_from_slice(&self.buckets[br * self.bucket_cols + bc]);
                }
            }
        }
    }

    fn span_rows(&self, lo: f64, hi: f64) -> (usize, usize) {
        let (_, r0) = self.bucket_of(0.0, lo);
        let (_, r1) = self.bucket_of(0.0, hi);
        (r0, r1)
    }

    /// Bucket columns overlapping `[lo, hi]`, clipped to the extent.
    fn span_cols(&self, lo: f64, hi: f64) -> Option<(usize, usize)> {
        if hi < 0.0 || lo > self.extent_w {
            return None;
        }
        let (c0, _) = self.bucket_of(lo.max(0.0), 0.0);
        let (c1, _) = self.bucket_of(hi.min(self.extent_w), 0.0);
        Some((c0, c1))
    }

    /// Like `span_cols`, but longitudes are circular: the interval is also
    /// tried shifted by a full turn in either direction.
    fn span_cols_wrapped(&self, lo: f64, hi: f64) -> Vec<(usize, usize)> {
        if hi - lo >= 360.0 {
            return vec![(0, self.bucket_cols - 1)];
        }
        let mut ranges: Vec<(usize, usize)> = [-360.0, 0.0, 360.0]
            .iter()
            .filter_map(|shift| self.span_cols(lo + shift, hi + shift))
            .collect();
        ranges.sort_unstable();
        ranges.dedup();
        // Overlapping ranges would yield duplicate candidates
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (a, b) in ranges {
            match merged.last_mut() {
                Some(last) if a <= last.1 + 1 => last.1 = last.1.max(b),
                _ => merged.push((a, b)),
            }
        }
        merged
    }
}

/// Half-width in degrees of longitude of the band containing every point
/// within angular distance `delta` (radians) of latitude `lat` (degrees).
fn lon_half_width(lat: f64, delta: f64) -> f64 {
    let phi = lat.to_radians();
    if delta >= std::f64::consts::FRAC_PI_2 || phi.abs() + delta >= std::f64::consts::FRAC_PI_2 {
        return 360.0;
    }
    let ratio = delta.sin() / phi.cos();
    if ratio >= 1.0 {
        360.0
    } else {
        ratio.asin().to_degrees()
    }
}
