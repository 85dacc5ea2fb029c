//! HDF5 backend: one resizable 1-D dataset per column at the file root.
//!
//! `index` is stored as `u64`, every other column as `f64`. The layout opens
//! directly in h5py, MATLAB and Igor.

use super::{check_next_index, AppendStore, COLUMNS};
use crate::error::{AppResult, GaugeError};
use crate::measurement::Record;
use hdf5::{Dataset, File};
use std::path::{Path, PathBuf};

const CHUNK_ROWS: usize = 1024;

/// Append store writing an HDF5 file.
pub struct Hdf5Store {
    path: PathBuf,
    file: File,
    index: Dataset,
    values: [Dataset; 4],
    rows: u64,
}

impl Hdf5Store {
    /// Open an existing HDF5 store (validating and repairing it) or create a new one.
    pub fn open_or_create(path: &Path) -> AppResult<Self> {
        let file = if path.exists() {
            File::open_rw(path)?
        } else {
            File::create(path)?
        };

        let members = file.member_names()?;
        let present = COLUMNS
            .iter()
            .filter(|name| members.iter().any(|m| m == *name))
            .count();

        let datasets = if present == 0 && members.is_empty() {
            create_datasets(&file)?
        } else if present == COLUMNS.len() {
            open_datasets(&file, path)?
        } else {
            return Err(GaugeError::Schema(format!(
                "{}: expected datasets {COLUMNS:?}, found {members:?}",
                path.display()
            )));
        };
        let [index, timestamp, ionization, channel1, channel2] = datasets;
        let values = [timestamp, ionization, channel1, channel2];

        let (rows, torn) = common_length(path, &index, &values)?;
        validate_index(path, &index, rows)?;
        if torn {
            discard_torn_row(path, &index, &values, rows)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            values,
            rows,
        })
    }
}

fn create_datasets(file: &File) -> AppResult<[Dataset; 5]> {
    let index = file
        .new_dataset::<u64>()
        .chunk(CHUNK_ROWS)
        .shape(0..)
        .create(COLUMNS[0])?;
    let create_f64 = |name: &str| -> AppResult<Dataset> {
        Ok(file
            .new_dataset::<f64>()
            .chunk(CHUNK_ROWS)
            .shape(0..)
            .create(name)?)
    };
    Ok([
        index,
        create_f64(COLUMNS[1])?,
        create_f64(COLUMNS[2])?,
        create_f64(COLUMNS[3])?,
        create_f64(COLUMNS[4])?,
    ])
}

fn open_datasets(file: &File, path: &Path) -> AppResult<[Dataset; 5]> {
    let open = |name: &str, want_index: bool| -> AppResult<Dataset> {
        let ds = file.dataset(name)?;
        let dtype = ds.dtype()?;
        let type_ok = if want_index {
            dtype.is::<u64>()
        } else {
            dtype.is::<f64>()
        };
        if ds.ndim() != 1 || !type_ok {
            return Err(GaugeError::Schema(format!(
                "{}: dataset '{name}' must be a 1-D {} column",
                path.display(),
                if want_index { "u64" } else { "f64" }
            )));
        }
        Ok(ds)
    };
    Ok([
        open(COLUMNS[0], true)?,
        open(COLUMNS[1], false)?,
        open(COLUMNS[2], false)?,
        open(COLUMNS[3], false)?,
        open(COLUMNS[4], false)?,
    ])
}

/// Rows present in every column, and whether some columns hold one more.
///
/// Columns may differ by one element after an interrupted append.
fn common_length(path: &Path, index: &Dataset, values: &[Dataset; 4]) -> AppResult<(u64, bool)> {
    let lengths: Vec<usize> = std::iter::once(index)
        .chain(values.iter())
        .map(|ds| ds.size())
        .collect();
    let shortest = lengths.iter().copied().min().unwrap_or(0);
    let longest = lengths.iter().copied().max().unwrap_or(0);

    if longest - shortest > 1 {
        return Err(GaugeError::Schema(format!(
            "{}: column lengths {lengths:?} differ by more than one row",
            path.display()
        )));
    }
    Ok((shortest as u64, longest != shortest))
}

/// Shrink every column to `rows`; only called once the file has been validated.
fn discard_torn_row(path: &Path, index: &Dataset, values: &[Dataset; 4], rows: u64) -> AppResult<()> {
    tracing::warn!(path = %path.display(), rows, "discarding incomplete trailing row");
    let rows = rows as usize;
    for ds in std::iter::once(index).chain(values.iter()) {
        if ds.size() != rows {
            ds.resize(rows)?;
        }
    }
    Ok(())
}

fn validate_index(path: &Path, index: &Dataset, rows: u64) -> AppResult<()> {
    if rows == 0 {
        return Ok(());
    }
    let stored: Vec<u64> = index.read_raw()?;
    let mismatch = stored
        .iter()
        .take(rows as usize)
        .zip(0u64..)
        .find(|(value, expected)| **value != *expected);
    match mismatch {
        Some((value, expected)) => Err(GaugeError::Schema(format!(
            "{}: row {expected} carries index {value}",
            path.display()
        ))),
        None => Ok(()),
    }
}

impl AppendStore for Hdf5Store {
    fn path(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> u64 {
        self.rows
    }

    fn append(&mut self, record: &Record) -> AppResult<()> {
        check_next_index(self.rows, record)?;
        let (index, timestamp, ionization, channel1, channel2) = record.row();
        let at = self.rows as usize;
        let next = at + 1;

        // Values first, index last: a crash in between leaves the index column short
        for (ds, value) in self.values.iter().zip([timestamp, ionization, channel1, channel2]) {
            ds.resize(next)?;
            ds.write_slice(&[value], at..next)?;
        }
        self.index.resize(next)?;
        self.index.write_slice(&[index], at..next)?;

        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> AppResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{ChannelReadings, Reading};
    use tracing_test::traced_test;

    fn record(index: u64) -> Record {
        Record::new(
            index,
            1_700_000_000.0 + index as f64,
            ChannelReadings {
                ionization: Reading::Pressure(2.0e-7),
                channel1: Reading::Unavailable,
                channel2: Reading::Pressure(1.0e-3),
            },
        )
    }

    #[test]
    fn test_append_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");

        {
            let mut store = Hdf5Store::open_or_create(&path).unwrap();
            for i in 0..3 {
                store.append(&record(i)).unwrap();
            }
            store.flush().unwrap();
        }
        {
            let mut store = Hdf5Store::open_or_create(&path).unwrap();
            assert_eq!(store.row_count(), 3);
            store.append(&record(3)).unwrap();
            store.flush().unwrap();
        }

        let file = File::open(&path).unwrap();
        let index: Vec<u64> = file.dataset("index").unwrap().read_raw().unwrap();
        let ch1: Vec<f64> = file.dataset("channel1_pressure").unwrap().read_raw().unwrap();
        assert_eq!(index, vec![0, 1, 2, 3]);
        assert_eq!(ch1, vec![0.0; 4]);
    }

    #[test]
    #[traced_test]
    fn test_short_index_column_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        {
            let mut store = Hdf5Store::open_or_create(&path).unwrap();
            store.append(&record(0)).unwrap();
            store.append(&record(1)).unwrap();
            store.index.resize(1).unwrap();
            store.flush().unwrap();
        }

        let store = Hdf5Store::open_or_create(&path).unwrap();
        assert_eq!(store.row_count(), 1);
        assert!(store.values.iter().all(|ds| ds.size() == 1));
        assert!(logs_contain("discarding incomplete trailing row"));
    }

    #[test]
    fn test_foreign_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.h5");
        {
            let file = File::create(&path).unwrap();
            file.new_dataset::<f64>().shape(4).create("spectrum").unwrap();
        }
        assert!(matches!(
            Hdf5Store::open_or_create(&path),
            Err(GaugeError::Schema(_))
        ));
    }

    #[test]
    fn test_bad_index_with_torn_row_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        {
            let mut store = Hdf5Store::open_or_create(&path).unwrap();
            for i in 0..3 {
                store.append(&record(i)).unwrap();
            }
            store.index.write_slice(&[5u64], 1..2).unwrap();
            store.index.resize(2).unwrap();
            store.flush().unwrap();
        }

        assert!(matches!(
            Hdf5Store::open_or_create(&path),
            Err(GaugeError::Schema(_))
        ));
        let file = File::open(&path).unwrap();
        assert_eq!(file.dataset("index").unwrap().size(), 2);
        assert_eq!(file.dataset("timestamp").unwrap().size(), 3);
    }
}
