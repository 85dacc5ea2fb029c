//! # Ion Gauge DAQ Library
//!
//! Polls a vacuum ionization gauge over a serial link at a fixed interval and
//! appends each cycle's pressures to a resumable on-disk time series.
//!
//! ## Crate Structure
//!
//! - **`transport`**: The [`transport::Transport`] byte link: the real serial port
//!   (`tokio-serial`) with minimum command spacing, and a scripted mock.
//! - **`protocol`**: Per-family codecs behind [`protocol::GaugeCodec`]: the 354 series
//!   ASCII protocol and the 392 series binary protocol with CRC-16.
//! - **`client`**: [`client::GaugeClient`], one request/response per channel, polled in a
//!   fixed order without retries.
//! - **`recorder`**: The recording loop state machine (`Idle → Running → Completed/Aborted`),
//!   interval scheduling and cooperative stop.
//! - **`store`**: Append-only CSV and HDF5 stores with schema validation and
//!   torn-row recovery.
//! - **`sink`**: Console output of each record.
//! - **`measurement`**: `Reading`, `Channel` and the per-cycle `Record`.
//! - **`config`**: INI configuration for the gauge and the recording run.
//! - **`error`**: The crate-wide `GaugeError`.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`app`**: Wiring used by the binary.

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod protocol;
pub mod recorder;
pub mod sink;
pub mod store;
pub mod transport;
