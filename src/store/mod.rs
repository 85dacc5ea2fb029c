//! Append-only storage for the recorded time series.
//!
//! A store holds five columns in fixed order (see [`COLUMNS`]). Opening an
//! existing file validates that layout and resumes after its last row; nothing
//! ever rewrites or reorders rows already written, apart from dropping a torn
//! trailing row left by an interrupted append.
//!
//! The backend follows the file extension:
//!
//! | extension       | backend       | cargo feature   |
//! |-----------------|---------------|-----------------|
//! | `.h5`, `.hdf5`  | [`Hdf5Store`] | `storage_hdf5`  |
//! | anything else   | [`CsvStore`]  | `storage_csv`   |

#[cfg(feature = "storage_csv")]
mod csv_store;
#[cfg(feature = "storage_hdf5")]
mod hdf5_store;

#[cfg(feature = "storage_csv")]
pub use csv_store::CsvStore;
#[cfg(feature = "storage_hdf5")]
pub use hdf5_store::Hdf5Store;

use crate::error::{AppResult, GaugeError};
use crate::measurement::Record;
use std::path::Path;

/// Column names, in storage order.
pub const COLUMNS: [&str; 5] = [
    "index",
    "timestamp",
    "ionization_pressure",
    "channel1_pressure",
    "channel2_pressure",
];

/// Persistent, append-only record table.
pub trait AppendStore: Send {
    /// File backing this store.
    fn path(&self) -> &Path;

    /// Rows currently in the store; also the index the next record must carry.
    fn row_count(&self) -> u64;

    /// Write exactly one row at the end.
    ///
    /// Fails with `Storage` if `record.index` is not [`row_count`](Self::row_count).
    fn append(&mut self, record: &Record) -> AppResult<()>;

    /// Make every appended row durable.
    fn flush(&mut self) -> AppResult<()>;
}

/// On-disk format of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    /// Comma-separated text with a header row.
    Csv,
    /// HDF5 file with one resizable dataset per column.
    Hdf5,
}

impl StoreFormat {
    /// Format implied by the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("h5") | Some("hdf5") => StoreFormat::Hdf5,
            _ => StoreFormat::Csv,
        }
    }
}

/// Open or create the store at `path`, choosing the backend from the extension.
///
/// Missing parent directories are created.
pub fn open_store(path: &Path) -> AppResult<Box<dyn AppendStore>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let store: Box<dyn AppendStore> = match StoreFormat::from_path(path) {
        StoreFormat::Csv => open_csv(path)?,
        StoreFormat::Hdf5 => open_hdf5(path)?,
    };
    tracing::info!(
        path = %path.display(),
        rows = store.row_count(),
        "store opened"
    );
    Ok(store)
}

#[cfg(feature = "storage_csv")]
fn open_csv(path: &Path) -> AppResult<Box<dyn AppendStore>> {
    Ok(Box::new(CsvStore::open_or_create(path)?))
}

#[cfg(not(feature = "storage_csv"))]
fn open_csv(_path: &Path) -> AppResult<Box<dyn AppendStore>> {
    Err(GaugeError::FeatureNotEnabled("storage_csv".to_string()))
}

#[cfg(feature = "storage_hdf5")]
fn open_hdf5(path: &Path) -> AppResult<Box<dyn AppendStore>> {
    Ok(Box::new(Hdf5Store::open_or_create(path)?))
}

#[cfg(not(feature = "storage_hdf5"))]
fn open_hdf5(_path: &Path) -> AppResult<Box<dyn AppendStore>> {
    Err(GaugeError::FeatureNotEnabled("storage_hdf5".to_string()))
}

/// Reject a record whose index would leave a gap or duplicate.
pub(crate) fn check_next_index(rows: u64, record: &Record) -> AppResult<()> {
    if record.index == rows {
        Ok(())
    } else {
        Err(GaugeError::Storage(format!(
            "record index {} does not continue store of {rows} rows",
            record.index
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(StoreFormat::from_path(Path::new("a/vacuum.h5")), StoreFormat::Hdf5);
        assert_eq!(StoreFormat::from_path(Path::new("vacuum.HDF5")), StoreFormat::Hdf5);
        assert_eq!(StoreFormat::from_path(Path::new("vacuum.csv")), StoreFormat::Csv);
        assert_eq!(StoreFormat::from_path(Path::new("vacuum")), StoreFormat::Csv);
    }

    #[cfg(not(feature = "storage_hdf5"))]
    #[test]
    fn test_disabled_backend_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_store(&dir.path().join("run.h5"));
        assert!(matches!(result, Err(GaugeError::FeatureNotEnabled(f)) if f == "storage_hdf5"));
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_open_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/run.csv");
        let store = open_store(&path).unwrap();
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
    }
}
