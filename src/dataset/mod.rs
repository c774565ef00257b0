pub mod generation;

use serde::{Deserialize, Serialize};

use crate::config::synthetic::SyntheticParams;
use crate::error::VoccError;
use crate::grid::{Adjacency, Grid, GridSpec, SeriesStack};

/// One climate variable over the dataset grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub units: String,
    pub stack: SeriesStack,
}

/// A gridded climate dataset: grid geometry, land/sea mask and one or more
/// per-cell time series sharing a time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateDataset {
    pub name: String,
    pub created_at: String,
    pub grid: GridSpec,
    /// `true` where the cell takes part in the analysis.
    pub mask: Vec<bool>,
    pub variables: Vec<Variable>,
    /// Present when the dataset was generated synthetically.
    pub generation_params: Option<SyntheticParams>,
}

impl ClimateDataset {
    /// Check that the mask and every series stack match the grid.
    pub fn validate(&self) -> Result<(), VoccError> {
        self.grid.validate()?;
        let cells = self.grid.cell_count();
        VoccError::check_len("dataset mask", cells, self.mask.len())?;
        if self.variables.is_empty() {
            return Err(VoccError::Config(format!("dataset '{}' has no variables", self.name)));
        }
        for v in &self.variables {
            VoccError::check_len(&format!("variable '{}'", v.name), cells, v.stack.cell_count())?;
        }
        Ok(())
    }

    /// Build the analysis grid, optionally overriding the stored adjacency.
    pub fn build_grid(&self, adjacency: Option<Adjacency>) -> Result<Grid, VoccError> {
        let spec = match adjacency {
            Some(a) => self.grid.clone().with_adjacency(a),
            None => self.grid.clone(),
        };
        Grid::new(spec, Some(self.mask.clone()))
    }

    pub fn variable(&self, name: &str) -> Result<&Variable, VoccError> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| VoccError::UnknownVariable(name.to_string()))
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// First and last time step of the shared time axis.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let times = self.variables.first()?.stack.times();
        Some((*times.first()?, *times.last()?))
    }

    pub fn masked_count(&self) -> usize {
        self.mask.iter().filter(|valid| !**valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_dataset() -> ClimateDataset {
        let stack = SeriesStack::new(vec![2000.0, 2001.0], vec![Some(1.0); 8]).unwrap();
        ClimateDataset {
            name: "tiny".to_string(),
            created_at: "0".to_string(),
            grid: GridSpec::planar(2, 2, 0.0, 2.0, 1.0),
            mask: vec![true, true, false, true],
            variables: vec![Variable {
                name: "tas".to_string(),
                units: "degC".to_string(),
                stack,
            }],
            generation_params: None,
        }
    }

    #[test]
    fn valid_dataset_builds_masked_grid() {
        let ds = tiny_dataset();
        assert!(ds.validate().is_ok());
        let grid = ds.build_grid(None).unwrap();
        assert_eq!(grid.valid_count(), 3);
        assert_eq!(ds.masked_count(), 1);
        assert_eq!(ds.time_range(), Some((2000.0, 2001.0)));
    }

    #[test]
    fn adjacency_override() {
        let ds = tiny_dataset();
        let grid = ds.build_grid(Some(Adjacency::Queen)).unwrap();
        assert_eq!(grid.spec().adjacency, Adjacency::Queen);
        assert_eq!(grid.neighbors(0).len(), 3);
    }

    #[test]
    fn unknown_variable_is_reported() {
        let ds = tiny_dataset();
        assert!(ds.variable("tas").is_ok());
        assert_eq!(
            ds.variable("pr").unwrap_err(),
            VoccError::UnknownVariable("pr".to_string())
        );
        assert_eq!(ds.variable_names(), vec!["tas"]);
    }

    #[test]
    fn mismatched_stack_rejected() {
        let mut ds = tiny_dataset();
        ds.variables[0].stack = SeriesStack::new(vec![2000.0], vec![Some(1.0); 3]).unwrap();
        assert!(matches!(ds.validate(), Err(VoccError::Shape { .. })));
    }

    #[test]
    fn dataset_without_variables_rejected() {
        let mut ds = tiny_dataset();
        ds.variables.clear();
        assert!(ds.validate().is_err());
        assert_eq!(ds.time_range(), None);
    }
}
