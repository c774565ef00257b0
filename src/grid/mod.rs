pub mod series;
pub mod sphere_math;
pub mod topology;

use serde::{Deserialize, Serialize};

use crate::error::VoccError;
pub use series::{Aggregation, SeriesStack};
pub use topology::Adjacency;

/// Flattened row-major cell index.
pub type CellId = u32;

/// One optional value per cell; `None` marks missing data.
pub type ScalarField = Vec<Option<f64>>;

/// Geometry of a regular grid.
///
/// For lon/lat grids `x` is longitude and `y` is latitude in degrees.
/// For projected grids both are in the distance unit used for every output
/// (gradients per unit, velocities in units per year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub ncols: u32,
    pub nrows: u32,
    /// Western edge of column 0.
    pub x_min: f64,
    /// Northern edge of row 0.
    pub y_max: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub lonlat: bool,
    #[serde(default)]
    pub adjacency: Adjacency,
}

impl GridSpec {
    /// A lon/lat grid covering the given extent at `resolution` degrees.
    pub fn lonlat(
        lon_min: f64,
        lon_max: f64,
        lat_min: f64,
        lat_max: f64,
        resolution: f64,
    ) -> GridSpec {
        GridSpec {
            ncols: ((lon_max - lon_min) / resolution).round().max(1.0) as u32,
            nrows: ((lat_max - lat_min) / resolution).round().max(1.0) as u32,
            x_min: lon_min,
            y_max: lat_max,
            cell_width: resolution,
            cell_height: resolution,
            lonlat: true,
            adjacency: Adjacency::Rook,
        }
    }

    /// A projected grid with square cells.
    pub fn planar(ncols: u32, nrows: u32, x_min: f64, y_max: f64, cell_size: f64) -> GridSpec {
        GridSpec {
            ncols,
            nrows,
            x_min,
            y_max,
            cell_width: cell_size,
            cell_height: cell_size,
            lonlat: false,
            adjacency: Adjacency::Rook,
        }
    }

    pub fn with_adjacency(mut self, adjacency: Adjacency) -> GridSpec {
        self.adjacency = adjacency;
        self
    }

    pub fn x_max(&self) -> f64 {
        self.x_min + self.ncols as f64 * self.cell_width
    }

    pub fn y_min(&self) -> f64 {
        self.y_max - self.nrows as f64 * self.cell_height
    }

    pub fn cell_count(&self) -> usize {
        self.ncols as usize * self.nrows as usize
    }

    /// True when a lon/lat grid spans the full circle, so columns wrap.
    pub fn wraps_longitude(&self) -> bool {
        self.lonlat && (self.ncols as f64 * self.cell_width - 360.0).abs() < 1e-6
    }

    pub fn validate(&self) -> Result<(), VoccError> {
        let mut errors = Vec::new();

        if self.ncols == 0 || self.nrows == 0 {
            errors.push(format!(
                "grid must have at least one row and column, got {}x{}",
                self.nrows, self.ncols
            ));
        }
        if !(self.cell_width > 0.0) || !(self.cell_height > 0.0) {
            errors.push(format!(
                "cell size must be > 0, got {} x {}",
                self.cell_width, self.cell_height
            ));
        }
        if self.lonlat {
            if self.y_max > 90.0 || self.y_min() < -90.0 {
                errors.push(format!(
                    "latitude extent must lie within [-90, 90], got [{}, {}]",
                    self.y_min(),
                    self.y_max
                ));
            }
            if self.ncols as f64 * self.cell_width > 360.0 + 1e-6 {
                errors.push(format!(
                    "longitude extent must not exceed 360 degrees, got {}",
                    self.ncols as f64 * self.cell_width
                ));
            }
        }

        VoccError::from_messages(errors)
    }
}

/// A single grid cell. Immutable once the grid is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub row: u32,
    pub col: u32,
    /// Cell-centre x (longitude for lon/lat grids).
    pub x: f64,
    /// Cell-centre y (latitude for lon/lat grids).
    pub y: f64,
    pub valid: bool,
}

/// Immutable regular grid with adjacency and a validity mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    spec: GridSpec,
    cells: Vec<Cell>,
    neighbors: Vec<Vec<CellId>>,
}

impl Grid {
    /// Build a grid. `mask[i] == false` removes cell `i` from every computation.
    pub fn new(spec: GridSpec, mask: Option<Vec<bool>>) -> Result<Grid, VoccError> {
        spec.validate()?;
        let total = spec.cell_count();
        if let Some(m) = &mask {
            VoccError::check_len("grid mask", total, m.len())?;
        }

        let mut cells = Vec::with_capacity(total);
        for row in 0..spec.nrows {
            for col in 0..spec.ncols {
                let id = row * spec.ncols + col;
                let x = spec.x_min + (col as f64 + 0.5) * spec.cell_width;
                let y = spec.y_max - (row as f64 + 0.5) * spec.cell_height;
                let x = if spec.lonlat { sphere_math::normalize_lon(x) } else { x };
                let valid = mask.as_ref().map(|m| m[id as usize]).unwrap_or(true);
                cells.push(Cell {
                    id,
                    row,
                    col,
                    x,
                    y,
                    valid,
                });
            }
        }

        let neighbors = topology::neighbor_table(
            spec.nrows,
            spec.ncols,
            spec.adjacency,
            spec.wraps_longitude(),
        );

        Ok(Grid {
            spec,
            cells,
            neighbors,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id as usize]
    }

    pub fn is_lonlat(&self) -> bool {
        self.spec.lonlat
    }

    pub fn wraps_longitude(&self) -> bool {
        self.spec.wraps_longitude()
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.valid).count()
    }

    pub fn id(&self, row: u32, col: u32) -> CellId {
        row * self.spec.ncols + col
    }

    /// Cell reached by a (row, col) offset, honouring longitude wrap.
    pub fn offset(&self, id: CellId, dr: i32, dc: i32) -> Option<CellId> {
        let cell = self.cell(id);
        topology::offset_index(
            self.spec.nrows,
            self.spec.ncols,
            cell.row,
            cell.col,
            dr,
            dc,
            self.wraps_longitude(),
        )
        .map(|(r, c)| self.id(r, c))
    }

    /// Neighbours under the grid's adjacency, regardless of validity.
    pub fn neighbors(&self, id: CellId) -> &[CellId] {
        &self.neighbors[id as usize]
    }

    /// Ground distance between two cell centres: great-circle km on lon/lat
    /// grids, Euclidean coordinate units otherwise.
    pub fn distance(&self, a: CellId, b: CellId) -> f64 {
        let ca = self.cell(a);
        let cb = self.cell(b);
        self.distance_between(ca.x, ca.y, cb.x, cb.y)
    }

    pub fn distance_between(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        if self.spec.lonlat {
            sphere_math::great_circle_km(y1, x1, y2, x2)
        } else {
            sphere_math::planar_distance(x1, y1, x2, y2)
        }
    }

    /// Whether a position lies inside the grid extent. Longitude is always
    /// inside on a wrapped grid.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let inside_y = y >= self.spec.y_min() && y <= self.spec.y_max;
        if !inside_y {
            return false;
        }
        if self.wraps_longitude() {
            return true;
        }
        let x = self.relative_x(x);
        x >= 0.0 && x <= self.spec.ncols as f64 * self.spec.cell_width
    }

    /// Nearest cell (the cell containing the position), or `None` outside the extent.
    pub fn locate(&self, x: f64, y: f64) -> Option<CellId> {
        if !self.contains(x, y) {
            return None;
        }
        let row = ((self.spec.y_max - y) / self.spec.cell_height).floor() as i64;
        let mut col = (self.relative_x(x) / self.spec.cell_width).floor() as i64;
        if self.wraps_longitude() {
            col = col.rem_euclid(self.spec.ncols as i64);
        }
        let row = row.clamp(0, self.spec.nrows as i64 - 1) as u32;
        let col = col.clamp(0, self.spec.ncols as i64 - 1) as u32;
        Some(self.id(row, col))
    }

    /// Offset of `x` from the western edge, unwrapping longitudes that
    /// `normalize_lon` moved across the anti-meridian.
    pub fn relative_x(&self, x: f64) -> f64 {
        let dx = x - self.spec.x_min;
        if self.spec.lonlat {
            dx.rem_euclid(360.0)
        } else {
            dx
        }
    }

    /// Check that a per-cell field matches the grid.
    pub fn check_field<T>(&self, what: &str, field: &[T]) -> Result<(), VoccError> {
        VoccError::check_len(what, self.len(), field.len())
    }
}
