use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::analysis::AnalysisConfig;
use crate::config::synthetic::SyntheticParams;
use crate::dataset::ClimateDataset;
use crate::dataset::generation::{generate_dataset, print_dataset_summary};
use crate::grid::{CellId, Grid, SeriesStack};
use crate::persistence;
use crate::report::{self, DvoccReport, GvoccReport, TrajectoryReport};
use crate::velocity::trajectory::seeds_every;
use crate::velocity::trend::estimate_trend;
use crate::velocity::{self, ClimatePeriods};

const DEFAULT_CONFIG: &str = "climvel.toml";

/// Load the analysis config. Without an explicit path, `climvel.toml` is
/// used when present and defaults otherwise.
pub fn load_config(path: Option<&str>) -> Result<AnalysisConfig, String> {
    match path {
        Some(p) => AnalysisConfig::from_file(Path::new(p)),
        None if Path::new(DEFAULT_CONFIG).exists() => AnalysisConfig::from_file(Path::new(DEFAULT_CONFIG)),
        None => Ok(AnalysisConfig::default()),
    }
}

/// Parse a `start:end` period such as `1960:1989`.
pub fn parse_period(text: &str) -> Result<(f64, f64), String> {
    let (start, end) = text
        .split_once(':')
        .ok_or_else(|| format!("Period '{}' must look like start:end, e.g. 1960:1989", text))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|_| format!("Invalid period start '{}'", start))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|_| format!("Invalid period end '{}'", end))?;
    if end < start {
        return Err(format!("Period '{}' ends before it starts", text));
    }
    Ok((start, end))
}

/// Generate a synthetic dataset and save it to the dataset directory.
pub fn synth(config: &AnalysisConfig, params_path: Option<&str>, output: Option<&str>) -> Result<PathBuf, String> {
    let params = match params_path {
        Some(p) => SyntheticParams::from_file(Path::new(p))?,
        None => SyntheticParams::default(),
    };
    let dataset = generate_dataset(&params).map_err(|e| e.to_string())?;
    print_dataset_summary(&dataset);

    let dir = Path::new(output.unwrap_or(&config.dataset_directory));
    let (path, _) = persistence::save_dataset(&dataset, dir).map_err(|e| format!("Cannot save dataset: {}", e))?;
    println!("\nDataset saved to {}", path.display());
    Ok(path)
}

/// Load an explicit dataset file, or the newest valid one in the dataset directory.
fn load_dataset(config: &AnalysisConfig, path: Option<&str>) -> Result<ClimateDataset, String> {
    let dataset = match path {
        Some(p) => persistence::load_dataset(Path::new(p)),
        None => persistence::load_newest(Path::new(&config.dataset_directory)),
    }
    .map_err(|e| format!("Failed to load dataset: {}", e))?;
    info!(
        name = %dataset.name,
        cells = dataset.grid.cell_count(),
        variables = dataset.variables.len(),
        "Dataset loaded"
    );
    Ok(dataset)
}

fn report_path(config: &AnalysisConfig, output: Option<&str>, default_name: String) -> PathBuf {
    match output {
        Some(p) => PathBuf::from(p),
        None => Path::new(&config.report_directory).join(default_name),
    }
}

fn grid_for(config: &AnalysisConfig, dataset: &ClimateDataset) -> Result<Grid, String> {
    dataset.build_grid(config.adjacency).map_err(|e| e.to_string())
}

/// Compute the gradient velocity field of one variable and write a JSON report.
pub fn gvocc(
    config: &AnalysisConfig,
    dataset_path: Option<&str>,
    variable: &str,
    output: Option<&str>,
) -> Result<PathBuf, String> {
    let dataset = load_dataset(config, dataset_path)?;
    let grid = grid_for(config, &dataset)?;
    let stack = &dataset.variable(variable).map_err(|e| e.to_string())?.stack;

    let (field, stats) = velocity::compute_gvocc(
        &grid,
        variable,
        stack,
        config.trend.min_observations,
        config.trend.significance_t,
    )
    .map_err(|e| e.to_string())?;

    let path = report_path(config, output, format!("gvocc-{}.json", variable));
    report::write_report(&GvoccReport::new(&dataset.name, &grid, &field, &stats), &path)
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;

    println!(
        "{}: {} of {} cells defined, mean speed {:.3}, median {:.3}",
        variable, stats.defined, stats.total, stats.mean_abs, stats.median_abs
    );
    println!("Report written to {}", path.display());
    Ok(path)
}

/// Trace trajectories through the gradient velocity field of one variable.
pub fn trajectories(
    config: &AnalysisConfig,
    dataset_path: Option<&str>,
    variable: &str,
    stride: Option<u32>,
    output: Option<&str>,
) -> Result<PathBuf, String> {
    let dataset = load_dataset(config, dataset_path)?;
    let grid = grid_for(config, &dataset)?;
    let stack = &dataset.variable(variable).map_err(|e| e.to_string())?.stack;

    let (field, _) = velocity::compute_gvocc(
        &grid,
        variable,
        stack,
        config.trend.min_observations,
        config.trend.significance_t,
    )
    .map_err(|e| e.to_string())?;

    let seeds = seeds_every(&grid, &field.velocities, stride.unwrap_or(config.trajectory.seed_stride));
    let params = config.trajectory.params();
    let (paths, stats) = velocity::trace_field(&grid, &field, &seeds, params).map_err(|e| e.to_string())?;

    let path = report_path(config, output, format!("trajectories-{}.json", variable));
    let report = TrajectoryReport::new(&dataset.name, variable, params, &paths, &stats);
    report::write_report(&report, &path).map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;

    println!("{} trajectories from {} seeds", paths.len(), seeds.len());
    let mut terminals: Vec<_> = stats.terminals.iter().collect();
    terminals.sort_by(|a, b| b.1.cmp(a.1));
    for (state, count) in terminals {
        println!("  {:<14} {:>6}", format!("{:?}", state), count);
    }
    println!("Report written to {}", path.display());
    Ok(path)
}

/// Compute analogue velocity between two periods over one or more variables.
pub fn dvocc(
    config: &AnalysisConfig,
    dataset_path: Option<&str>,
    variables: &[String],
    baseline: &str,
    future: &str,
    output: Option<&str>,
) -> Result<PathBuf, String> {
    let periods = ClimatePeriods {
        baseline: parse_period(baseline)?,
        future: parse_period(future)?,
    };
    let dataset = load_dataset(config, dataset_path)?;
    let grid = grid_for(config, &dataset)?;

    let mut named: Vec<(&str, &SeriesStack)> = Vec::with_capacity(variables.len());
    for name in variables {
        let v = dataset.variable(name).map_err(|e| e.to_string())?;
        named.push((v.name.as_str(), &v.stack));
    }
    let stacks: Vec<&SeriesStack> = named.iter().map(|(_, s)| *s).collect();

    let tolerances = config
        .analogue
        .tolerances(&stacks, &periods)
        .map_err(|e| e.to_string())?;
    let params = config.analogue.params(&periods);
    let (field, stats) =
        velocity::compute_dvocc(&grid, &named, periods, &tolerances, params).map_err(|e| e.to_string())?;

    let label = variables.join("-");
    let path = report_path(config, output, format!("dvocc-{}.json", label));
    report::write_report(&DvoccReport::new(&dataset.name, &grid, &field, &stats), &path)
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;

    println!(
        "{}: analogues for {} of {} cells over {} years, mean velocity {:.3}",
        label, stats.defined, stats.total, field.elapsed_years, stats.mean_abs
    );
    println!("Report written to {}", path.display());
    Ok(path)
}

/// Print a dataset summary, or the series diagnostics of one cell.
pub fn inspect(config: &AnalysisConfig, dataset_path: Option<&str>, cell: Option<CellId>) -> Result<(), String> {
    let dataset = load_dataset(config, dataset_path)?;
    match cell {
        Some(id) => inspect_cell(config, &dataset, id),
        None => {
            print_dataset_summary(&dataset);
            Ok(())
        }
    }
}

fn inspect_cell(config: &AnalysisConfig, dataset: &ClimateDataset, id: CellId) -> Result<(), String> {
    let grid = grid_for(config, dataset)?;
    if id as usize >= grid.len() {
        return Err(format!("Cell {} not found (grid has {} cells)", id, grid.len()));
    }
    let cell = grid.cell(id);

    println!("=== Cell {} ===", id);
    println!("Row/col: {}, {}", cell.row, cell.col);
    println!("Centre: ({:.3}, {:.3})", cell.x, cell.y);
    println!("Valid: {}", cell.valid);
    println!("Neighbors: {:?}", grid.neighbors(id));

    for v in &dataset.variables {
        let series = v.stack.series(id);
        let trend = estimate_trend(series, v.stack.times(), config.trend.min_observations);
        println!();
        println!("--- {} ({}) ---", v.name, v.units);
        println!("  Observations: {} of {}", trend.n_obs, series.len());
        match trend.fit {
            Ok(fit) => {
                println!("  Mean: {:.3}", fit.mean);
                println!("  Trend: {:.5} per year", fit.slope);
                match fit.t_value() {
                    Some(t) => println!("  t-value: {:.2}", t),
                    None => println!("  t-value: n/a"),
                }
            }
            Err(reason) => println!("  Trend: undefined ({})", reason),
        }
    }
    Ok(())
}

/// Print the datasets stored in a directory, newest first.
pub fn list_datasets(dir: &Path) -> Result<(), String> {
    let entries = persistence::catalog(dir).map_err(|e| format!("Error listing datasets: {}", e))?;
    if entries.is_empty() {
        println!("No datasets found in {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<32} {:<12} {:>9} {:>11} {:>9}",
        "File", "Variables", "Grid", "Years", "Size"
    );
    println!("{}", "-".repeat(77));
    for entry in &entries {
        let file = entry.path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        let info = &entry.info;
        let years = match info.time_range {
            Some((first, last)) => format!("{:.0}-{:.0}", first, last),
            None => "-".to_string(),
        };
        println!(
            "{:<32} {:<12} {:>9} {:>11} {:>6} KB",
            file,
            info.variables.join(","),
            format!("{}x{}", info.ncols, info.nrows),
            years,
            entry.bytes / 1024
        );
    }
    println!("\n{} dataset(s) in {}", entries.len(), dir.display());
    Ok(())
}

/// Load one dataset file and print its summary.
pub fn show_dataset(file: &Path) -> Result<(), String> {
    let dataset = persistence::load_dataset(file).map_err(|e| format!("Error loading dataset: {}", e))?;
    println!("Loaded dataset from {}", file.display());
    print_dataset_summary(&dataset);
    Ok(())
}
