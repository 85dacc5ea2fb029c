//! Pressure readings and the per-cycle record handed to the sinks.
//!
//! A [`Reading`] is either a valid pressure in Torr or the "unavailable" sentinel,
//! which is what the gauge's own display shows when a channel has no value. The
//! sentinel is persisted as `0.0` so downstream tools see the same number the
//! operator saw on the instrument.

use chrono::{DateTime, Utc};
use std::fmt;

/// One pressure measurement from a single gauge channel.
///
/// Invariant: a `Pressure` value is always finite and non-negative.
/// [`Reading::from_torr`] is the only constructor that checks this; building
/// `Reading::Pressure` directly skips the check and is meant for known-good
/// values such as test fixtures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A measured pressure in Torr.
    Pressure(f64),
    /// The gauge reported no value for this channel.
    Unavailable,
}

impl Reading {
    /// Validate a raw value coming off the wire.
    ///
    /// Returns `None` for NaN, infinities and negative values; those are
    /// malformed data, not missing data. A negative zero becomes `0.0`.
    pub fn from_torr(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            Some(Reading::Pressure(value.abs()))
        } else {
            None
        }
    }

    /// Value as stored in the append store and printed on the console.
    pub fn torr(&self) -> f64 {
        match self {
            Reading::Pressure(value) => *value,
            Reading::Unavailable => 0.0,
        }
    }

    /// True when the gauge returned a value for this channel.
    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Pressure(_))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Pressure(value) => write!(f, "{:.3e} Torr", value),
            Reading::Unavailable => write!(f, "N/A"),
        }
    }
}

/// The three measurement sources of the gauge, in poll order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Hot/cold cathode ionization gauge.
    Ionization,
    /// Convection gauge channel 1.
    Channel1,
    /// Convection gauge channel 2.
    Channel2,
}

impl Channel {
    /// Fixed poll sequence used by every cycle.
    pub const ALL: [Channel; 3] = [Channel::Ionization, Channel::Channel1, Channel::Channel2];

    /// Short label used in logs and console output.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Ionization => "IG",
            Channel::Channel1 => "CG1",
            Channel::Channel2 => "CG2",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of polling all three channels once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReadings {
    /// Ionization gauge pressure.
    pub ionization: Reading,
    /// Convection channel 1 pressure.
    pub channel1: Reading,
    /// Convection channel 2 pressure.
    pub channel2: Reading,
}

impl ChannelReadings {
    /// Reading for a given channel.
    pub fn get(&self, channel: Channel) -> Reading {
        match channel {
            Channel::Ionization => self.ionization,
            Channel::Channel1 => self.channel1,
            Channel::Channel2 => self.channel2,
        }
    }
}

/// One row of the time series, produced once per successful cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Row index, continuing from the existing store contents.
    pub index: u64,
    /// Wall-clock time at cycle start, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Ionization gauge pressure.
    pub ionization_pressure: Reading,
    /// Convection channel 1 pressure.
    pub channel1_pressure: Reading,
    /// Convection channel 2 pressure.
    pub channel2_pressure: Reading,
}

impl Record {
    /// Build a record from one cycle's readings.
    pub fn new(index: u64, timestamp: f64, readings: ChannelReadings) -> Self {
        Self {
            index,
            timestamp,
            ionization_pressure: readings.ionization,
            channel1_pressure: readings.channel1,
            channel2_pressure: readings.channel2,
        }
    }

    /// Column values in store order.
    pub fn row(&self) -> (u64, f64, f64, f64, f64) {
        (
            self.index,
            self.timestamp,
            self.ionization_pressure.torr(),
            self.channel1_pressure.torr(),
            self.channel2_pressure.torr(),
        )
    }
}

/// Convert a UTC instant to fractional seconds since the Unix epoch.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0
}
