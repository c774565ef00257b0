use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::VoccError;
use crate::grid::{Adjacency, SeriesStack};
use crate::velocity::ClimatePeriods;
use crate::velocity::analogue::{AnalogueParams, Tolerance};
use crate::velocity::index::DistanceFunction;
use crate::velocity::trajectory::{BoundaryPolicy, TraceParams};

/// Engine parameters loaded from `climvel.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Overrides the dataset's adjacency when set.
    #[serde(default)]
    pub adjacency: Option<Adjacency>,
    #[serde(default = "default_dataset_directory")]
    pub dataset_directory: String,
    #[serde(default = "default_report_directory")]
    pub report_directory: String,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub analogue: AnalogueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Drop trends with |t| below this before forming velocities.
    #[serde(default)]
    pub significance_t: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    #[serde(default = "default_step_years")]
    pub step_years: f64,
    #[serde(default = "default_total_years")]
    pub total_years: f64,
    #[serde(default = "default_stall_steps")]
    pub stall_steps: u32,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    /// Seed every n-th row and column.
    #[serde(default = "default_seed_stride")]
    pub seed_stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// `tolerances[i]` applies to every focal cell.
    #[default]
    Single,
    /// `tolerances[i]` multiplies each focal cell's baseline-period
    /// standard deviation.
    Variable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogueConfig {
    #[serde(default)]
    pub threshold_mode: ThresholdMode,
    /// One entry per variable, in the order variables are requested.
    #[serde(default = "default_tolerances")]
    pub tolerances: Vec<f64>,
    /// km for great-circle search, grid units for planar.
    #[serde(default = "default_geo_tolerance")]
    pub geo_tolerance: f64,
    #[serde(default)]
    pub distance_function: DistanceFunction,
    #[serde(default)]
    pub allow_self_match: bool,
    /// Elapsed time between climates; the gap between period midpoints when unset.
    #[serde(default)]
    pub elapsed_years: Option<f64>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_dataset_directory() -> String {
    "./datasets".to_string()
}
fn default_report_directory() -> String {
    "./reports".to_string()
}
fn default_min_observations() -> usize {
    10
}
fn default_step_years() -> f64 {
    1.0
}
fn default_total_years() -> f64 {
    50.0
}
fn default_stall_steps() -> u32 {
    5
}
fn default_seed_stride() -> u32 {
    1
}
fn default_tolerances() -> Vec<f64> {
    vec![0.5]
}
fn default_geo_tolerance() -> f64 {
    3000.0
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            min_observations: default_min_observations(),
            significance_t: None,
        }
    }
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig {
            step_years: default_step_years(),
            total_years: default_total_years(),
            stall_steps: default_stall_steps(),
            boundary: BoundaryPolicy::default(),
            seed_stride: default_seed_stride(),
        }
    }
}

impl Default for AnalogueConfig {
    fn default() -> Self {
        AnalogueConfig {
            threshold_mode: ThresholdMode::default(),
            tolerances: default_tolerances(),
            geo_tolerance: default_geo_tolerance(),
            distance_function: DistanceFunction::default(),
            allow_self_match: false,
            elapsed_years: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            log_level: default_log_level(),
            adjacency: None,
            dataset_directory: default_dataset_directory(),
            report_directory: default_report_directory(),
            trend: TrendConfig::default(),
            trajectory: TrajectoryConfig::default(),
            analogue: AnalogueConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: AnalysisConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        if self.trend.min_observations < 2 {
            errors.push(format!(
                "trend.min_observations must be >= 2, got {}. Example: min_observations = 10",
                self.trend.min_observations
            ));
        }
        if let Some(t) = self.trend.significance_t {
            if !(t >= 0.0) || !t.is_finite() {
                errors.push(format!(
                    "trend.significance_t must be a finite value >= 0, got {}. Example: significance_t = 2.0",
                    t
                ));
            }
        }

        if let Err(VoccError::Config(msg)) = self.trajectory.params().validate() {
            errors.extend(msg.lines().map(|l| format!("trajectory.{}", l)));
        }
        if self.trajectory.seed_stride == 0 {
            errors.push("trajectory.seed_stride must be > 0, got 0. Example: seed_stride = 4".to_string());
        }

        let analogue = &self.analogue;
        if analogue.tolerances.is_empty() {
            errors.push("analogue.tolerances must not be empty. Example: tolerances = [0.5]".to_string());
        }
        for (i, t) in analogue.tolerances.iter().enumerate() {
            if !(*t >= 0.0) || !t.is_finite() {
                errors.push(format!(
                    "analogue.tolerances[{}] must be a finite value >= 0, got {}",
                    i, t
                ));
            }
        }
        if !(analogue.geo_tolerance >= 0.0) {
            errors.push(format!(
                "analogue.geo_tolerance must be >= 0, got {}. Example: geo_tolerance = 3000.0",
                analogue.geo_tolerance
            ));
        }
        if let Some(years) = analogue.elapsed_years {
            if !(years > 0.0) || !years.is_finite() {
                errors.push(format!(
                    "analogue.elapsed_years must be > 0, got {}. Example: elapsed_years = 50.0",
                    years
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}

impl TrajectoryConfig {
    pub fn params(&self) -> TraceParams {
        TraceParams {
            total_years: self.total_years,
            step_years: self.step_years,
            stall_steps: self.stall_steps,
            boundary: self.boundary,
        }
    }
}

impl AnalogueConfig {
    pub fn params(&self, periods: &ClimatePeriods) -> AnalogueParams {
        AnalogueParams {
            geo_tolerance: self.geo_tolerance,
            distance: self.distance_function,
            elapsed_years: self.elapsed_years.unwrap_or_else(|| periods.elapsed_years()),
            allow_self_match: self.allow_self_match,
        }
    }

    /// Resolve one tolerance per variable for the given stacks.
    pub fn tolerances(
        &self,
        stacks: &[&SeriesStack],
        periods: &ClimatePeriods,
    ) -> Result<Vec<Tolerance>, VoccError> {
        if self.tolerances.len() != stacks.len() {
            return Err(VoccError::Config(format!(
                "analogue.tolerances has {} entries but {} variables were requested. Example: tolerances = {:?}",
                self.tolerances.len(),
                stacks.len(),
                vec![0.5; stacks.len()]
            )));
        }

        match self.threshold_mode {
            ThresholdMode::Single => Ok(self.tolerances.iter().map(|t| Tolerance::Fixed(*t)).collect()),
            ThresholdMode::Variable => stacks
                .iter()
                .zip(&self.tolerances)
                .map(|(stack, scale)| {
                    let spread = stack.period_std(periods.baseline.0, periods.baseline.1)?;
                    Ok(Tolerance::PerCell(
                        spread.into_iter().map(|s| s.map(|s| s * scale)).collect(),
                    ))
                })
                .collect(),
        }
    }
}
