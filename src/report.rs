use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::Undefined;
use crate::grid::{Grid, GridSpec};
use crate::velocity::AnalogueField;
use crate::velocity::field::VelocityField;
use crate::velocity::statistics::{FieldStatistics, TrajectoryStatistics};
use crate::velocity::trajectory::{TerminalState, TraceParams, Trajectory};

/// Summary statistics included in every field report.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub total: u32,
    pub defined: u32,
    pub undefined: HashMap<String, u32>,
    pub mean_abs: f64,
    pub median_abs: f64,
    pub max_abs: f64,
    pub duration_ms: f32,
}

impl FieldSummary {
    pub fn from_statistics(stats: &FieldStatistics) -> Self {
        FieldSummary {
            total: stats.total,
            defined: stats.defined,
            undefined: stats
                .undefined
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            mean_abs: stats.mean_abs,
            median_abs: stats.median_abs,
            max_abs: stats.max_abs,
            duration_ms: stats.duration_ms,
        }
    }
}

/// One cell of a gradient velocity report.
#[derive(Debug, Clone, Serialize)]
pub struct VelocityCell {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undefined: Option<Undefined>,
}

/// Gradient-based velocity field of one variable.
#[derive(Debug, Clone, Serialize)]
pub struct GvoccReport {
    pub report_type: &'static str,
    pub dataset: String,
    pub variable: String,
    pub grid: GridSpec,
    pub summary: FieldSummary,
    pub cells: Vec<VelocityCell>,
}

impl GvoccReport {
    pub fn new(dataset: &str, grid: &Grid, field: &VelocityField, stats: &FieldStatistics) -> Self {
        let cells = grid
            .cells()
            .iter()
            .map(|c| {
                let i = c.id as usize;
                let velocity = field.velocities[i].as_ref().ok();
                VelocityCell {
                    id: c.id,
                    x: c.x,
                    y: c.y,
                    slope: field.trends[i].slope(),
                    gradient: field.gradients[i].as_ref().ok().map(|g| g.magnitude),
                    velocity: velocity.map(|v| v.magnitude),
                    bearing: velocity.map(|v| v.bearing),
                    undefined: field.velocities[i].err(),
                }
            })
            .collect();

        GvoccReport {
            report_type: "GvoccReport",
            dataset: dataset.to_string(),
            variable: field.variable.clone(),
            grid: grid.spec().clone(),
            summary: FieldSummary::from_statistics(stats),
            cells,
        }
    }
}

/// A traced path as (x, y) vertices.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryRecord {
    pub seed: u32,
    pub terminal: TerminalState,
    pub elapsed_years: f64,
    pub path: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryReport {
    pub report_type: &'static str,
    pub dataset: String,
    pub variable: String,
    pub params: TraceParams,
    pub seeds: u32,
    pub terminals: HashMap<TerminalState, u32>,
    pub mean_elapsed_years: f64,
    pub mean_path_length: f64,
    pub duration_ms: f32,
    pub trajectories: Vec<TrajectoryRecord>,
}

impl TrajectoryReport {
    pub fn new(
        dataset: &str,
        variable: &str,
        params: TraceParams,
        trajectories: &[Trajectory],
        stats: &TrajectoryStatistics,
    ) -> Self {
        TrajectoryReport {
            report_type: "TrajectoryReport",
            dataset: dataset.to_string(),
            variable: variable.to_string(),
            params,
            seeds: stats.seeds,
            terminals: stats.terminals.clone(),
            mean_elapsed_years: stats.mean_elapsed_years,
            mean_path_length: stats.mean_path_length,
            duration_ms: stats.duration_ms,
            trajectories: trajectories
                .iter()
                .map(|t| TrajectoryRecord {
                    seed: t.seed,
                    terminal: t.terminal,
                    elapsed_years: t.elapsed_years(),
                    path: t.waypoints.iter().map(|w| [w.x, w.y]).collect(),
                })
                .collect(),
        }
    }
}

/// One focal cell of an analogue velocity report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalogueCell {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analogue: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undefined: Option<Undefined>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DvoccReport {
    pub report_type: &'static str,
    pub dataset: String,
    pub variables: Vec<String>,
    pub elapsed_years: f64,
    pub grid: GridSpec,
    pub summary: FieldSummary,
    pub cells: Vec<AnalogueCell>,
}

impl DvoccReport {
    pub fn new(dataset: &str, grid: &Grid, field: &AnalogueField, stats: &FieldStatistics) -> Self {
        let cells = field
            .matches
            .iter()
            .map(|m| {
                let c = grid.cell(m.focal);
                let found = m.outcome.as_ref().ok();
                AnalogueCell {
                    id: m.focal,
                    x: c.x,
                    y: c.y,
                    analogue: found.map(|a| a.cell),
                    distance: found.map(|a| a.distance),
                    velocity: found.map(|a| a.velocity),
                    bearing: found.and_then(|a| a.bearing),
                    undefined: m.outcome.err(),
                }
            })
            .collect();

        DvoccReport {
            report_type: "DvoccReport",
            dataset: dataset.to_string(),
            variables: field.variables.clone(),
            elapsed_years: field.elapsed_years,
            grid: grid.spec().clone(),
            summary: FieldSummary::from_statistics(stats),
            cells,
        }
    }
}

/// Write a report as pretty-printed JSON, creating parent directories.
pub fn write_report<T: Serialize>(report: &T, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()
}
