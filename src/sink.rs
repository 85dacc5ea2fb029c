//! Record sinks: where each cycle's record is shown.
//!
//! The recorder forwards every successfully stored record to one sink. The
//! binary uses [`ConsoleSink`]; tests collect into a [`MemorySink`].

use crate::error::AppResult;
use crate::measurement::Record;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Consumer of completed records.
pub trait RecordSink: Send {
    /// Handle one record. Called once per successful cycle, in index order.
    fn emit(&mut self, record: &Record) -> AppResult<()>;
}

/// One console line for a record, e.g.
/// `[3] 1760000000.123 s  IG 1.300e-6 Torr  CG1 7.600e-1 Torr  CG2 N/A`.
pub fn format_record(record: &Record) -> String {
    format!(
        "[{}] {:.3} s  IG {}  CG1 {}  CG2 {}",
        record.index,
        record.timestamp,
        record.ionization_pressure,
        record.channel1_pressure,
        record.channel2_pressure
    )
}

/// Prints one line per record.
pub struct ConsoleSink<W: Write + Send = std::io::Stdout> {
    out: W,
}

impl ConsoleSink {
    /// Sink writing to stdout.
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    /// Sink writing to any writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RecordSink for ConsoleSink<W> {
    fn emit(&mut self, record: &Record) -> AppResult<()> {
        writeln!(self.out, "{}", format_record(record))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RecordSink for MemorySink {
    fn emit(&mut self, record: &Record) -> AppResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(*record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{ChannelReadings, Reading};

    fn record() -> Record {
        Record::new(
            3,
            1_760_000_000.123,
            ChannelReadings {
                ionization: Reading::Pressure(1.3e-6),
                channel1: Reading::Pressure(0.76),
                channel2: Reading::Unavailable,
            },
        )
    }

    #[test]
    fn test_console_line_format() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.emit(&record()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "[3] 1760000000.123 s  IG 1.300e-6 Torr  CG1 7.600e-1 Torr  CG2 N/A\n"
        );
    }

    #[test]
    fn test_memory_sink_shares_records() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.emit(&record()).unwrap();
        assert_eq!(sink.records(), vec![record()]);
    }
}
