//! CSV backend: a header row followed by one line per record.

use super::{check_next_index, AppendStore, COLUMNS};
use crate::error::{AppResult, GaugeError};
use crate::measurement::Record;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Append store writing comma-separated text.
pub struct CsvStore {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: u64,
}

impl CsvStore {
    /// Open an existing CSV store (validating and repairing it) or create a new one.
    ///
    /// The existing file is checked read-only first. It is only written to
    /// once the header and every complete row are known to be valid.
    pub fn open_or_create(path: &Path) -> AppResult<Self> {
        let existing = match std::fs::metadata(path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let (rows, tail) = if existing {
            inspect(path)?
        } else {
            (0, Tail::Clean)
        };

        if let Tail::Torn { keep, discarded } = tail {
            tracing::warn!(
                path = %path.display(),
                discarded_bytes = discarded,
                "discarding incomplete trailing row"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(keep)?;
            file.sync_all()?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Tail::Unterminated = tail {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !existing {
            writer.write_record(COLUMNS)?;
            writer.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows,
        })
    }
}

impl AppendStore for CsvStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> u64 {
        self.rows
    }

    fn append(&mut self, record: &Record) -> AppResult<()> {
        check_next_index(self.rows, record)?;
        let (index, timestamp, ionization, channel1, channel2) = record.row();
        self.writer.write_record(&[
            index.to_string(),
            timestamp.to_string(),
            ionization.to_string(),
            channel1.to_string(),
            channel2.to_string(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> AppResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// State of the bytes after the last newline of an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// The file ends with a newline.
    Clean,
    /// A valid line without its terminator; it is kept and terminated.
    Unterminated,
    /// An interrupted append; the file is cut back to `keep` bytes.
    Torn { keep: u64, discarded: usize },
}

/// Validate an existing file without modifying it; returns its row count and
/// what to do with the trailing fragment.
fn inspect(path: &Path) -> AppResult<(u64, Tail)> {
    let schema = |detail: String| GaugeError::Schema(format!("{}: {detail}", path.display()));

    let bytes = std::fs::read(path)?;
    let split = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1);
    let (body, fragment) = bytes.split_at(split);

    if body.is_empty() {
        return match parse_line(fragment) {
            Some(header) if is_header(&header) => Ok((0, Tail::Unterminated)),
            _ => Err(schema("no complete header row".to_string())),
        };
    }

    let rows = validate(body).map_err(schema)?;
    if fragment.is_empty() {
        return Ok((rows, Tail::Clean));
    }

    match parse_line(fragment) {
        Some(row) if check_row(&row, rows).is_ok() => Ok((rows + 1, Tail::Unterminated)),
        _ => Ok((
            rows,
            Tail::Torn {
                keep: split as u64,
                discarded: fragment.len(),
            },
        )),
    }
}

fn parse_line(line: &[u8]) -> Option<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line)
        .records()
        .next()?
        .ok()
}

fn is_header(row: &csv::StringRecord) -> bool {
    row.iter().map(str::trim).eq(COLUMNS)
}

/// Check the header and every complete row; returns the row count.
fn validate(body: &[u8]) -> Result<u64, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let headers = reader.headers().map_err(|e| e.to_string())?;
    if !is_header(headers) {
        return Err(format!(
            "expected columns {COLUMNS:?}, found {:?}",
            headers.iter().collect::<Vec<_>>()
        ));
    }

    let mut rows = 0u64;
    for result in reader.records() {
        let row = result.map_err(|e| e.to_string())?;
        check_row(&row, rows)?;
        rows += 1;
    }
    Ok(rows)
}

/// A row must have every column, the expected index and numeric values.
fn check_row(row: &csv::StringRecord, expected: u64) -> Result<(), String> {
    if row.len() != COLUMNS.len() {
        return Err(format!("row {expected} has {} fields", row.len()));
    }

    let index: u64 = row[0]
        .trim()
        .parse()
        .map_err(|_| format!("row {expected} has non-integer index '{}'", &row[0]))?;
    if index != expected {
        return Err(format!("row {expected} carries index {index}"));
    }
    for (name, value) in COLUMNS.iter().zip(row.iter()).skip(1) {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("row {expected} has non-numeric {name} '{value}'"))?;
    }
    Ok(())
}
