use noise::{NoiseFn, Perlin};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::config::synthetic::SyntheticParams;
use crate::dataset::{ClimateDataset, Variable};
use crate::error::VoccError;
use crate::grid::sphere_math::lat_lon_to_xyz;
use crate::grid::{Grid, GridSpec, ScalarField, SeriesStack};

/// Generate a synthetic climate dataset from the given parameters.
///
/// If `params.seed` is 0, a random seed is chosen. The actual seed used is
/// stored in the returned dataset's `generation_params` for reproducibility.
pub fn generate_dataset(params: &SyntheticParams) -> Result<ClimateDataset, VoccError> {
    params.validate().map_err(VoccError::Config)?;

    let seed = if params.seed == 0 {
        rand::thread_rng().r#gen()
    } else {
        params.seed
    };
    let resolved_params = SyntheticParams {
        seed,
        ..params.clone()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let spec = GridSpec::lonlat(
        params.lon_min,
        params.lon_max,
        params.lat_min,
        params.lat_max,
        params.resolution,
    )
    .with_adjacency(params.adjacency);
    let grid = Grid::new(spec.clone(), None)?;

    let mask = land_mask(&grid, seed as u32, params.land_ratio);
    let times: Vec<f64> = (0..params.years)
        .map(|y| (params.start_year + y as i32) as f64)
        .collect();

    let mut variables = Vec::new();
    let temperature = temperature_layers(&grid, &mask, &times, params, seed.wrapping_add(1) as u32, &mut rng);
    variables.push(Variable {
        name: "tas".to_string(),
        units: "degC".to_string(),
        stack: SeriesStack::from_layers(times.clone(), &temperature)?,
    });
    if params.precipitation {
        let precipitation =
            precipitation_layers(&grid, &mask, &times, params, seed.wrapping_add(2) as u32, &mut rng);
        variables.push(Variable {
            name: "pr".to_string(),
            units: "mm".to_string(),
            stack: SeriesStack::from_layers(times, &precipitation)?,
        });
    }

    Ok(ClimateDataset {
        name: format!("Synthetic-{}", seed),
        created_at: format!(
            "{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        ),
        grid: spec,
        mask,
        variables,
        generation_params: Some(resolved_params),
    })
}

/// Print a summary of a dataset.
pub fn print_dataset_summary(dataset: &ClimateDataset) {
    let spec = &dataset.grid;
    println!("=== Dataset Summary ===");
    println!("Name: {}", dataset.name);
    println!(
        "Grid: {} x {} ({} cells, {}), cell {} x {}",
        spec.ncols,
        spec.nrows,
        spec.cell_count(),
        if spec.lonlat { "lon/lat" } else { "projected" },
        spec.cell_width,
        spec.cell_height
    );
    println!(
        "Masked: {} ({:.1}%)",
        dataset.masked_count(),
        dataset.masked_count() as f64 / spec.cell_count().max(1) as f64 * 100.0
    );
    if let Some((first, last)) = dataset.time_range() {
        println!("Time: {} - {}", first, last);
    }
    if let Some(params) = &dataset.generation_params {
        println!("Seed: {}", params.seed);
    }

    println!("\nVariables:");
    for v in &dataset.variables {
        let mean = v.stack.overall_mean();
        let defined: Vec<f64> = mean.iter().flatten().copied().collect();
        let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
        let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = if defined.is_empty() {
            0.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };
        println!(
            "  {:<6} {:<6} {:>4} steps  mean {:>8.2}  range {:>8.2} .. {:<8.2}",
            v.name,
            v.units,
            v.stack.steps(),
            avg,
            min,
            max
        );
    }
}

// --- Internal generation functions ---

/// Perlin noise sampled on the unit sphere so the texture is seamless
/// across the anti-meridian.
fn sphere_noise(perlin: &Perlin, lat: f64, lon: f64, scale: f64) -> f64 {
    let (x, y, z) = lat_lon_to_xyz(lat, lon);
    perlin.get([x * scale, y * scale, z * scale])
}

/// Mask the `land_ratio` share of cells with the highest noise value.
fn land_mask(grid: &Grid, seed: u32, land_ratio: f64) -> Vec<bool> {
    let perlin = Perlin::new(seed);
    let elevation: Vec<f64> = grid
        .cells()
        .iter()
        .map(|c| sphere_noise(&perlin, c.y, c.x, 2.5))
        .collect();

    // Assign land by percentile of elevation
    let mut indices: Vec<usize> = (0..elevation.len()).collect();
    indices.sort_by(|&a, &b| elevation[b].total_cmp(&elevation[a]));
    let land_count = (elevation.len() as f64 * land_ratio).round() as usize;

    let mut mask = vec![true; elevation.len()];
    for &i in indices.iter().take(land_count) {
        mask[i] = false;
    }
    mask
}

/// Zero-mean noise with standard deviation `sd`.
fn jitter(rng: &mut impl Rng, sd: f64) -> f64 {
    if sd == 0.0 {
        return 0.0;
    }
    rng.gen_range(-1.0..1.0) * sd * 3.0_f64.sqrt()
}

fn temperature_layers(
    grid: &Grid,
    mask: &[bool],
    times: &[f64],
    params: &SyntheticParams,
    seed: u32,
    rng: &mut impl Rng,
) -> Vec<ScalarField> {
    let perlin = Perlin::new(seed);
    let start = params.start_year as f64;

    // Climatology and trend per cell
    let cells: Vec<Option<(f64, f64)>> = grid
        .cells()
        .iter()
        .map(|c| {
            if !mask[c.id as usize] {
                return None;
            }
            let lat = c.y.to_radians();
            let base = 28.0 * lat.cos() - 2.0 + params.roughness * sphere_noise(&perlin, c.y, c.x, 4.0);
            let rate = params.warming_rate * (1.0 + params.polar_amplification * lat.sin().powi(2));
            Some((base, rate))
        })
        .collect();

    times
        .iter()
        .map(|t| {
            cells
                .iter()
                .map(|cell| {
                    let (base, rate) = (*cell)?;
                    let value = base + rate * (t - start) + jitter(rng, params.noise);
                    (!rng.gen_bool(params.missing_ratio)).then_some(value)
                })
                .collect()
        })
        .collect()
}

fn precipitation_layers(
    grid: &Grid,
    mask: &[bool],
    times: &[f64],
    params: &SyntheticParams,
    seed: u32,
    rng: &mut impl Rng,
) -> Vec<ScalarField> {
    let perlin = Perlin::new(seed);
    let start = params.start_year as f64;

    // Wet tropics, dry subtropics; subtropics dry further as the climate warms
    let cells: Vec<Option<(f64, f64)>> = grid
        .cells()
        .iter()
        .map(|c| {
            if !mask[c.id as usize] {
                return None;
            }
            let lat = c.y;
            let base = 400.0
                + 1600.0 * (-(lat / 12.0).powi(2)).exp()
                + 50.0 * params.roughness * sphere_noise(&perlin, c.y, c.x, 4.0);
            let rate = 50.0 * params.warming_rate * (2.0 * lat.to_radians()).cos();
            Some((base.max(50.0), rate))
        })
        .collect();

    times
        .iter()
        .map(|t| {
            cells
                .iter()
                .map(|cell| {
                    let (base, rate) = (*cell)?;
                    let value = base + rate * (t - start) + jitter(rng, 25.0 * params.noise);
                    (!rng.gen_bool(params.missing_ratio)).then_some(value.max(0.0))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::trend::estimate_trends;

    fn small_params() -> SyntheticParams {
        SyntheticParams {
            seed: 42,
            resolution: 10.0,
            lat_min: -60.0,
            lat_max: 60.0,
            years: 30,
            ..SyntheticParams::default()
        }
    }

    #[test]
    fn generated_dataset_matches_grid() {
        let ds = generate_dataset(&small_params()).unwrap();
        assert!(ds.validate().is_ok());
        assert_eq!(ds.grid.ncols, 36);
        assert_eq!(ds.grid.nrows, 12);
        assert_eq!(ds.variable_names(), vec!["tas", "pr"]);
        assert_eq!(ds.variables[0].stack.steps(), 30);
        assert_eq!(ds.time_range(), Some((1960.0, 1989.0)));
    }

    #[test]
    fn land_ratio_masks_expected_share() {
        let ds = generate_dataset(&small_params()).unwrap();
        let expected = (ds.mask.len() as f64 * 0.3).round() as usize;
        assert_eq!(ds.masked_count(), expected);

        let stack = &ds.variables[0].stack;
        for (i, valid) in ds.mask.iter().enumerate() {
            if !valid {
                assert!(stack.series(i as u32).iter().all(Option::is_none), "land cell {} has data", i);
            }
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_dataset(&small_params()).unwrap();
        let b = generate_dataset(&small_params()).unwrap();
        assert_eq!(a.mask, b.mask);
        assert_eq!(a.variables, b.variables);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate_dataset(&small_params()).unwrap();
        let b = generate_dataset(&SyntheticParams {
            seed: 43,
            ..small_params()
        })
        .unwrap();
        assert_ne!(a.variables[0].stack, b.variables[0].stack);
    }

    #[test]
    fn temperature_follows_latitude_and_warms() {
        let params = SyntheticParams {
            noise: 0.0,
            roughness: 0.0,
            land_ratio: 0.0,
            polar_amplification: 0.0,
            ..small_params()
        };
        let ds = generate_dataset(&params).unwrap();
        let grid = ds.build_grid(None).unwrap();
        let tas = &ds.variable("tas").unwrap().stack;

        let equator = grid.id(6, 0) as usize;
        let high = grid.id(0, 0) as usize;
        let mean = tas.overall_mean();
        assert!(mean[equator].unwrap() > mean[high].unwrap(), "equator should be warmer");

        let trends = estimate_trends(&grid, tas, 10).unwrap();
        for t in &trends {
            assert!((t.slope().unwrap() - 0.02).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_observations_are_sprinkled() {
        let params = SyntheticParams {
            missing_ratio: 0.2,
            land_ratio: 0.0,
            ..small_params()
        };
        let ds = generate_dataset(&params).unwrap();
        let stack = &ds.variables[0].stack;
        let missing = (0..stack.cell_count())
            .flat_map(|c| stack.series(c as u32).iter())
            .filter(|v| v.is_none())
            .count();
        let total = stack.cell_count() * stack.steps();
        let share = missing as f64 / total as f64;
        assert!(share > 0.1 && share < 0.3, "missing share {}", share);
    }

    #[test]
    fn precipitation_can_be_disabled() {
        let ds = generate_dataset(&SyntheticParams {
            precipitation: false,
            ..small_params()
        })
        .unwrap();
        assert_eq!(ds.variable_names(), vec!["tas"]);
        assert!(ds.variable("pr").is_err());
    }

    #[test]
    fn invalid_params_rejected() {
        let err = generate_dataset(&SyntheticParams {
            years: 0,
            ..small_params()
        })
        .unwrap_err();
        assert!(err.to_string().contains("years"));
    }

    #[test]
    fn seed_zero_generates_random() {
        let ds = generate_dataset(&SyntheticParams {
            seed: 0,
            ..small_params()
        })
        .unwrap();
        let params = ds.generation_params.unwrap();
        assert_ne!(params.seed, 0, "Resolved seed should be non-zero");
    }
}
