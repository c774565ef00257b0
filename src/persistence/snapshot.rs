//! Dataset files.
//!
//! Layout: a 4-byte tag, a little-endian `u16` format version, a bincode
//! [`SnapshotInfo`] header, then the bincode [`ClimateDataset`]. Listing a
//! directory decodes headers only. Loading decodes both and refuses a file
//! whose header does not describe the dataset that follows it.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::dataset::ClimateDataset;

const TAG: &[u8; 4] = b"CVDS";
const FORMAT_VERSION: u16 = 1;

/// File extension of dataset files.
pub const EXTENSION: &str = "cvds";

/// Description of a stored dataset, readable without decoding its series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    /// Unix seconds at save time.
    pub saved_at: u64,
    pub variables: Vec<String>,
    pub ncols: u32,
    pub nrows: u32,
    pub lonlat: bool,
    pub valid_cells: usize,
    pub time_steps: usize,
    pub time_range: Option<(f64, f64)>,
    /// Generator seed of synthetic datasets.
    pub seed: Option<u64>,
}

impl SnapshotInfo {
    pub fn describe(dataset: &ClimateDataset, saved_at: u64) -> SnapshotInfo {
        SnapshotInfo {
            name: dataset.name.clone(),
            saved_at,
            variables: dataset.variable_names().into_iter().map(String::from).collect(),
            ncols: dataset.grid.ncols,
            nrows: dataset.grid.nrows,
            lonlat: dataset.grid.lonlat,
            valid_cells: dataset.mask.iter().filter(|valid| **valid).count(),
            time_steps: dataset.variables.first().map_or(0, |v| v.stack.steps()),
            time_range: dataset.time_range(),
            seed: dataset.generation_params.as_ref().map(|p| p.seed),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.ncols as usize * self.nrows as usize
    }
}

/// A readable dataset file found in a directory.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub bytes: u64,
    pub info: SnapshotInfo,
}

#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    Encoding(bincode::Error),
    /// The file does not start with the dataset tag.
    NotADataset(PathBuf),
    UnsupportedVersion { path: PathBuf, version: u16 },
    /// Decoded, but the contents contradict the header or themselves.
    Inconsistent { path: PathBuf, reason: String },
    NoDatasets(PathBuf),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "I/O error: {}", e),
            SnapshotError::Encoding(e) => write!(f, "Encoding error: {}", e),
            SnapshotError::NotADataset(path) => {
                write!(f, "{} is not a climvel dataset file", path.display())
            }
            SnapshotError::UnsupportedVersion { path, version } => write!(
                f,
                "{} uses dataset format {}, this build reads format {}",
                path.display(),
                version,
                FORMAT_VERSION
            ),
            SnapshotError::Inconsistent { path, reason } => {
                write!(f, "Inconsistent dataset file {}: {}", path.display(), reason)
            }
            SnapshotError::NoDatasets(dir) => write!(
                f,
                "No readable datasets in {}. Generate one with: climvel synth",
                dir.display()
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

impl From<bincode::Error> for SnapshotError {
    fn from(e: bincode::Error) -> Self {
        SnapshotError::Encoding(e)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Lowercase ASCII name with every other character folded to '-'.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "dataset".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<slug>-<saved_at>.cvds`, with a counter when that name is taken.
fn free_path(dir: &Path, info: &SnapshotInfo) -> PathBuf {
    let stem = format!("{}-{}", slug(&info.name), info.saved_at);
    let mut path = dir.join(format!("{}.{}", stem, EXTENSION));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}-{}.{}", stem, n, EXTENSION));
        n += 1;
    }
    path
}

fn write_file(path: &Path, info: &SnapshotInfo, dataset: &ClimateDataset) -> Result<u64, SnapshotError> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(TAG)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut out, info)?;
    bincode::serialize_into(&mut out, dataset)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// Save a dataset into `dir` and return its path and header.
///
/// The file is written under a `.partial` name and renamed once complete.
pub fn save_dataset(dataset: &ClimateDataset, dir: &Path) -> Result<(PathBuf, SnapshotInfo), SnapshotError> {
    fs::create_dir_all(dir)?;
    let info = SnapshotInfo::describe(dataset, unix_now());
    let target = free_path(dir, &info);
    let partial = target.with_extension("partial");

    let written = write_file(&partial, &info, dataset)
        .and_then(|bytes| fs::rename(&partial, &target).map(|_| bytes).map_err(SnapshotError::from));
    let bytes = match written {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    info!(
        path = %target.display(),
        bytes,
        variables = ?info.variables,
        "Dataset saved"
    );
    Ok((target, info))
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<SnapshotInfo, SnapshotError> {
    let mut tag = [0u8; 4];
    if reader.read_exact(&mut tag).is_err() || &tag != TAG {
        return Err(SnapshotError::NotADataset(path.to_path_buf()));
    }
    let mut version = [0u8; 2];
    reader
        .read_exact(&mut version)
        .map_err(|_| SnapshotError::NotADataset(path.to_path_buf()))?;
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            path: path.to_path_buf(),
            version,
        });
    }
    Ok(bincode::deserialize_from(reader)?)
}

/// Read only the header of a dataset file.
pub fn read_info(path: &Path) -> Result<SnapshotInfo, SnapshotError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_header(&mut reader, path)
}

/// Checks a decoded dataset against itself and against its header.
fn check_contents(header: &SnapshotInfo, dataset: &ClimateDataset) -> Result<(), String> {
    dataset.validate().map_err(|e| e.to_string())?;

    let Some(first) = dataset.variables.first() else {
        return Err("no variables".to_string());
    };
    let times = first.stack.times();
    if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(format!("time axis of '{}' is not strictly increasing", first.name));
    }
    for (i, v) in dataset.variables.iter().enumerate() {
        if dataset.variables[..i].iter().any(|other| other.name == v.name) {
            return Err(format!("variable '{}' is stored twice", v.name));
        }
        if v.stack.times() != times {
            return Err(format!(
                "variable '{}' does not share the time axis of '{}'",
                v.name, first.name
            ));
        }
    }

    let stored = SnapshotInfo::describe(dataset, header.saved_at);
    if stored.variables != header.variables {
        return Err(format!(
            "header lists variables {:?} but the file holds {:?}",
            header.variables, stored.variables
        ));
    }
    if stored.time_steps != header.time_steps || stored.time_range != header.time_range {
        return Err(format!(
            "header time axis {} steps {:?} but the file holds {} steps {:?}",
            header.time_steps, header.time_range, stored.time_steps, stored.time_range
        ));
    }
    if (stored.ncols, stored.nrows, stored.lonlat, stored.valid_cells)
        != (header.ncols, header.nrows, header.lonlat, header.valid_cells)
    {
        return Err(format!(
            "header grid {}x{} ({} valid) but the file holds {}x{} ({} valid)",
            header.ncols, header.nrows, header.valid_cells, stored.ncols, stored.nrows, stored.valid_cells
        ));
    }
    if stored != *header {
        return Err("header does not describe the stored dataset".to_string());
    }
    Ok(())
}

/// Load a dataset file, refusing one whose contents contradict its header.
pub fn load_dataset(path: &Path) -> Result<ClimateDataset, SnapshotError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader, path)?;
    let dataset: ClimateDataset = bincode::deserialize_from(&mut reader)?;
    check_contents(&header, &dataset).map_err(|reason| SnapshotError::Inconsistent {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(dataset)
}

/// Every dataset file in `dir` with a readable header, most recently saved
/// first. A missing directory is an empty catalog.
pub fn catalog(dir: &Path) -> Result<Vec<CatalogEntry>, SnapshotError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        match read_info(&path) {
            Ok(info) => {
                let bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                entries.push(CatalogEntry { path, bytes, info });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable dataset file"),
        }
    }

    entries.sort_by(|a, b| {
        b.info
            .saved_at
            .cmp(&a.info.saved_at)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(entries)
}

/// Load the most recently saved dataset in `dir` that passes every check.
pub fn load_newest(dir: &Path) -> Result<ClimateDataset, SnapshotError> {
    for entry in catalog(dir)? {
        match load_dataset(&entry.path) {
            Ok(dataset) => return Ok(dataset),
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Dataset rejected, trying older"),
        }
    }
    Err(SnapshotError::NoDatasets(dir.to_path_buf()))
}
