pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod persistence;
pub mod report;
pub mod velocity;

pub use error::{Undefined, VoccError};
pub use grid::{Adjacency, CellId, Grid, GridSpec, ScalarField};
