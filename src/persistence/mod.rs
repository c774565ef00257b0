//! Dataset files on disk.

pub mod snapshot;

pub use snapshot::{
    catalog, load_dataset, load_newest, read_info, save_dataset, CatalogEntry, SnapshotError, SnapshotInfo,
};
