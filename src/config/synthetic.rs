use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::grid::Adjacency;

/// Parameters of a synthetic gridded climate dataset.
/// Stored with the dataset for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticParams {
    /// 0 picks a random seed; the resolved seed is stored with the dataset.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Cell size in degrees.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_lon_min")]
    pub lon_min: f64,
    #[serde(default = "default_lon_max")]
    pub lon_max: f64,
    #[serde(default = "default_lat_min")]
    pub lat_min: f64,
    #[serde(default = "default_lat_max")]
    pub lat_max: f64,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_years")]
    pub years: u32,
    /// Temperature trend at the equator, degrees per year.
    #[serde(default = "default_warming_rate")]
    pub warming_rate: f64,
    /// Extra warming at the poles relative to the equator (0 = uniform).
    #[serde(default = "default_polar_amplification")]
    pub polar_amplification: f64,
    /// Standard deviation of year-to-year noise, in variable units.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Amplitude of the spatial Perlin texture added to the climatology.
    #[serde(default = "default_roughness")]
    pub roughness: f64,
    /// Share of cells masked out as land.
    #[serde(default = "default_land_ratio")]
    pub land_ratio: f64,
    /// Probability that a single observation is missing.
    #[serde(default)]
    pub missing_ratio: f64,
    /// Also generate a precipitation variable.
    #[serde(default = "default_precipitation")]
    pub precipitation: bool,
    #[serde(default)]
    pub adjacency: Adjacency,
}

fn default_seed() -> u64 {
    42
}
fn default_resolution() -> f64 {
    5.0
}
fn default_lon_min() -> f64 {
    -180.0
}
fn default_lon_max() -> f64 {
    180.0
}
fn default_lat_min() -> f64 {
    -80.0
}
fn default_lat_max() -> f64 {
    80.0
}
fn default_start_year() -> i32 {
    1960
}
fn default_years() -> u32 {
    60
}
fn default_warming_rate() -> f64 {
    0.02
}
fn default_polar_amplification() -> f64 {
    1.0
}
fn default_noise() -> f64 {
    0.2
}
fn default_roughness() -> f64 {
    2.0
}
fn default_land_ratio() -> f64 {
    0.3
}
fn default_precipitation() -> bool {
    true
}

impl Default for SyntheticParams {
    fn default() -> Self {
        SyntheticParams {
            seed: default_seed(),
            resolution: default_resolution(),
            lon_min: default_lon_min(),
            lon_max: default_lon_max(),
            lat_min: default_lat_min(),
            lat_max: default_lat_max(),
            start_year: default_start_year(),
            years: default_years(),
            warming_rate: default_warming_rate(),
            polar_amplification: default_polar_amplification(),
            noise: default_noise(),
            roughness: default_roughness(),
            land_ratio: default_land_ratio(),
            missing_ratio: 0.0,
            precipitation: default_precipitation(),
            adjacency: Adjacency::default(),
        }
    }
}

impl SyntheticParams {
    /// Load synthetic dataset parameters from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        let params: Self =
            toml::from_str(&content).map_err(|e| format!("Invalid TOML in {}: {}", path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.resolution > 0.0) {
            return Err(format!("resolution must be > 0, got {}", self.resolution));
        }
        if !(self.lon_max > self.lon_min) || self.lon_max - self.lon_min > 360.0 {
            return Err(format!(
                "longitude range must be increasing and at most 360 degrees, got {}..{}",
                self.lon_min, self.lon_max
            ));
        }
        if !(self.lat_max > self.lat_min) || self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(format!(
                "latitude range must be increasing within -90..90, got {}..{}",
                self.lat_min, self.lat_max
            ));
        }
        let cols = (self.lon_max - self.lon_min) / self.resolution;
        let rows = (self.lat_max - self.lat_min) / self.resolution;
        if (cols - cols.round()).abs() > 1e-6 || (rows - rows.round()).abs() > 1e-6 {
            return Err(format!(
                "resolution {} must divide the lon/lat extent evenly",
                self.resolution
            ));
        }
        if self.years < 2 {
            return Err(format!("years must be >= 2, got {}", self.years));
        }
        if !self.warming_rate.is_finite() {
            return Err(format!("warming_rate must be finite, got {}", self.warming_rate));
        }
        if !(self.polar_amplification >= 0.0) {
            return Err(format!(
                "polar_amplification must be >= 0, got {}",
                self.polar_amplification
            ));
        }
        if !(self.noise >= 0.0) {
            return Err(format!("noise must be >= 0, got {}", self.noise));
        }
        if !(self.roughness >= 0.0) {
            return Err(format!("roughness must be >= 0, got {}", self.roughness));
        }
        if !(0.0..=0.9).contains(&self.land_ratio) {
            return Err(format!("land_ratio must be 0.0-0.9, got {}", self.land_ratio));
        }
        if !(0.0..=0.5).contains(&self.missing_ratio) {
            return Err(format!(
                "missing_ratio must be 0.0-0.5, got {}",
                self.missing_ratio
            ));
        }
        Ok(())
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.years as i32 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_params_are_valid() {
        assert!(SyntheticParams::default().validate().is_ok());
        assert_eq!(SyntheticParams::default().end_year(), 2019);
    }

    #[test]
    fn invalid_resolution() {
        let params = SyntheticParams {
            resolution: 0.0,
            ..SyntheticParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("resolution"), "Error should mention resolution: {}", err);
    }

    #[test]
    fn uneven_resolution_rejected() {
        let params = SyntheticParams {
            resolution: 7.0,
            ..SyntheticParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("evenly"), "Error should mention the extent: {}", err);
    }

    #[test]
    fn invalid_latitude_range() {
        let params = SyntheticParams {
            lat_min: -95.0,
            ..SyntheticParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("latitude"), "Error should mention latitude: {}", err);
    }

    #[test]
    fn too_few_years() {
        let params = SyntheticParams {
            years: 1,
            ..SyntheticParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("years"), "Error should mention years: {}", err);
    }

    #[test]
    fn invalid_land_ratio() {
        let params = SyntheticParams {
            land_ratio: 1.0,
            ..SyntheticParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("land_ratio"), "Error should mention land_ratio: {}", err);
    }

    #[test]
    fn from_file_valid() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
seed = 7
resolution = 2.5
lat_min = -60.0
lat_max = 60.0
years = 30
adjacency = "queen"
"#
        )
        .unwrap();
        let params = SyntheticParams::from_file(tmp.path()).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.resolution, 2.5);
        assert_eq!(params.years, 30);
        assert_eq!(params.adjacency, Adjacency::Queen);
        assert_eq!(params.lon_min, -180.0, "unset fields use defaults");
    }

    #[test]
    fn from_file_invalid_toml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "this is not valid toml {{{{").unwrap();
        let err = SyntheticParams::from_file(tmp.path()).unwrap_err();
        assert!(err.contains("Invalid TOML"), "got: {}", err);
    }

    #[test]
    fn from_file_out_of_range_value() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "missing_ratio = 0.9").unwrap();
        let err = SyntheticParams::from_file(tmp.path()).unwrap_err();
        assert!(err.contains("missing_ratio"), "got: {}", err);
    }
}
