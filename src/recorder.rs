//! Recording loop: poll, store, print, wait, repeat.
//!
//! A [`Recorder`] walks `Idle → Running → {Completed, Aborted}` exactly once.
//! Cycles start on a fixed grid anchored at the run start (`start + k·interval`);
//! a cycle that overruns skips the boundaries it missed instead of firing a burst.
//!
//! The loop is a lazy sequence: each [`Recorder::next_record`] call waits for the
//! next boundary, runs one cycle and yields its record. [`Recorder::run`] drains it.
//! A stop request is only looked at while waiting for a boundary, so a cycle in
//! flight always finishes (or fails) as a whole.

use crate::client::GaugeClient;
use crate::config::RecordingConfig;
use crate::error::{AppResult, GaugeError};
use crate::measurement::{epoch_seconds, Record};
use crate::sink::RecordSink;
use crate::store::{open_store, AppendStore};
use crate::transport::Transport;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Lifecycle of one recording run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, nothing opened yet.
    Idle,
    /// Store open, cycles being recorded.
    Running,
    /// Finished normally: duration reached or stop requested.
    Completed,
    /// Stopped by a failed cycle.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Receiving side of a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop is requested. Pends forever if the handle is gone.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending side of a stop request.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask the run to stop at the next interval boundary.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Linked stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Final state.
    pub state: RunState,
    /// Records appended during this run.
    pub records_written: u64,
    /// Index of the first record of this run (rows already in the store).
    pub first_index: u64,
    /// True when a stop request ended the run.
    pub cancelled: bool,
}

enum Wake {
    Stop,
    Boundary,
}

/// Drives the recording loop for one gauge.
pub struct Recorder<T: Transport> {
    client: GaugeClient<T>,
    config: RecordingConfig,
    sink: Box<dyn RecordSink>,
    store: Option<Box<dyn AppendStore>>,
    stop: StopSignal,
    schedule: Option<Interval>,
    state: RunState,
    first_index: u64,
    next_index: u64,
    written: u64,
    cancelled: bool,
}

impl<T: Transport> Recorder<T> {
    /// Recorder over an already open gauge client.
    ///
    /// The store named by `config` is opened by [`start`](Self::start).
    pub fn new(
        client: GaugeClient<T>,
        config: RecordingConfig,
        sink: Box<dyn RecordSink>,
        stop: StopSignal,
    ) -> Self {
        Self {
            client,
            config,
            sink,
            store: None,
            stop,
            schedule: None,
            state: RunState::Idle,
            first_index: 0,
            next_index: 0,
            written: 0,
            cancelled: false,
        }
    }

    /// Use an already open store instead of the one named by the configuration.
    pub fn with_store(mut self, store: Box<dyn AppendStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Summary of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            records_written: self.written,
            first_index: self.first_index,
            cancelled: self.cancelled,
        }
    }

    /// Open the store and enter `Running`.
    ///
    /// A store that cannot be opened (including a schema mismatch) releases the
    /// gauge link and leaves the recorder `Idle`.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.state != RunState::Idle {
            return Err(GaugeError::Configuration(format!(
                "recorder cannot be started from state {}",
                self.state
            )));
        }

        if self.store.is_none() {
            if let Some(path) = self.config.store_path().map(Path::to_path_buf) {
                match open_store(&path) {
                    Ok(store) => self.store = Some(store),
                    Err(e) => {
                        self.release().await;
                        return Err(e);
                    }
                }
            }
        }

        self.first_index = self.store.as_ref().map_or(0, |store| store.row_count());
        self.next_index = self.first_index;

        let mut schedule = interval_at(Instant::now(), self.config.interval);
        schedule.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.schedule = Some(schedule);
        self.state = RunState::Running;

        tracing::info!(
            address = %self.client.address(),
            interval = ?self.config.interval,
            duration = self.config.duration,
            first_index = self.first_index,
            storing = self.store.is_some(),
            "recording started"
        );
        Ok(())
    }

    /// Wait for the next boundary and record one cycle.
    ///
    /// Returns `Ok(None)` once the run has completed (duration reached or stop
    /// requested). A failed cycle aborts the run and returns its error.
    pub async fn next_record(&mut self) -> AppResult<Option<Record>> {
        if self.state != RunState::Running {
            return Ok(None);
        }
        if self.config.is_bounded() && self.written >= self.config.duration {
            self.finish(RunState::Completed).await;
            return Ok(None);
        }

        let wake = match self.schedule.as_mut() {
            Some(schedule) => {
                let stop = &mut self.stop;
                tokio::select! {
                    biased;
                    _ = stop.stopped() => Wake::Stop,
                    _ = schedule.tick() => Wake::Boundary,
                }
            }
            None => Wake::Stop,
        };
        if let Wake::Stop = wake {
            tracing::info!(records = self.written, "stop requested");
            self.cancelled = true;
            self.finish(RunState::Completed).await;
            return Ok(None);
        }

        match self.cycle().await {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::error!(
                    index = self.next_index,
                    communication = e.is_communication(),
                    error = %e,
                    "cycle failed, aborting run"
                );
                self.finish(RunState::Aborted).await;
                Err(e)
            }
        }
    }

    /// Start, record until done, and report.
    pub async fn run(mut self) -> AppResult<RunSummary> {
        self.start().await?;
        while self.next_record().await?.is_some() {}
        Ok(self.summary())
    }

    async fn cycle(&mut self) -> AppResult<Record> {
        let timestamp = epoch_seconds(Utc::now());
        let readings = self.client.poll_all().await?;
        let record = Record::new(self.next_index, timestamp, readings);

        if let Some(store) = self.store.as_mut() {
            store.append(&record)?;
        }
        // The row is complete from here on: a flush or console failure below
        // still aborts the run, but the row stays in the store and is counted.
        self.written += 1;
        self.next_index += 1;

        if let Some(store) = self.store.as_mut() {
            store.flush()?;
        }
        self.sink.emit(&record)?;
        tracing::debug!(index = record.index, "record written");
        Ok(record)
    }

    async fn finish(&mut self, state: RunState) {
        self.release().await;
        self.state = state;
        tracing::info!(
            state = %state,
            records = self.written,
            cancelled = self.cancelled,
            "recording finished"
        );
    }

    /// Close the gauge link and drop the store; both happen on every exit path.
    async fn release(&mut self) {
        self.schedule = None;
        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.flush() {
                tracing::warn!(path = %store.path().display(), error = %e, "final store flush failed");
            }
        }
        if let Err(e) = self.client.close().await {
            tracing::warn!(error = %e, "closing gauge link failed");
        }
    }
}
