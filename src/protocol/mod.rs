//! Gauge protocol codecs.
//!
//! Each supported device family speaks one fixed protocol, modelled as an
//! implementation of [`GaugeCodec`] selected from configuration through
//! [`GaugeModel::codec`]:
//!
//! - [`Ascii354Codec`]: 354 series, CR-terminated ASCII lines over RS-485.
//! - [`Binary392Codec`]: 392 series, fixed-size binary frames with CRC-16/MODBUS.
//!
//! Decoding never branches on loose strings in the client: the codec classifies a
//! frame into the closed [`Response`] set, and only `Malformed` becomes an error.

mod ascii_354;
mod binary_392;

pub use ascii_354::Ascii354Codec;
pub use binary_392::Binary392Codec;

use crate::error::{AppResult, GaugeError};
use crate::measurement::{Channel, Reading};
use crate::transport::Framing;
use std::fmt;
use std::str::FromStr;

/// Payload at or above this value is the "gauge off" display value, not a pressure.
pub const NO_READING_THRESHOLD: f64 = 9.9e9;

// =============================================================================
// Device address
// =============================================================================

/// RS-485 address of the gauge, written as two hexadecimal digits (`01`..`FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Wrap a raw address byte.
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Raw address byte, as sent in binary frames.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 2 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GaugeError::Configuration(format!(
                "address must be two hexadecimal digits, got '{s}'"
            )));
        }
        u8::from_str_radix(s, 16)
            .map(DeviceAddress)
            .map_err(|e| GaugeError::Configuration(format!("invalid address '{s}': {e}")))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

// =============================================================================
// Device family
// =============================================================================

/// Supported gauge families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GaugeModel {
    /// 354 series, ASCII protocol.
    #[default]
    Series354,
    /// 392 series, binary protocol.
    Series392,
}

impl GaugeModel {
    /// Protocol codec for this family.
    pub fn codec(&self) -> Box<dyn GaugeCodec> {
        match self {
            GaugeModel::Series354 => Box::new(Ascii354Codec),
            GaugeModel::Series392 => Box::new(Binary392Codec),
        }
    }
}

impl FromStr for GaugeModel {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "354" => Ok(GaugeModel::Series354),
            "392" => Ok(GaugeModel::Series392),
            other => Err(GaugeError::Configuration(format!(
                "unknown gauge model '{other}', expected 354 or 392"
            ))),
        }
    }
}

impl fmt::Display for GaugeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeModel::Series354 => f.write_str("354"),
            GaugeModel::Series392 => f.write_str("392"),
        }
    }
}

// =============================================================================
// Codec capability
// =============================================================================

/// Classified gauge response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A numeric pressure in Torr.
    Value(f64),
    /// Well-formed frame that carries no reading for this channel.
    NoReading,
    /// Frame that violates the protocol, with the reason.
    Malformed(String),
}

impl Response {
    /// Turn the classification into a reading; only `Malformed` fails.
    pub fn into_reading(self) -> AppResult<Reading> {
        match self {
            Response::Value(value) => Reading::from_torr(value).ok_or_else(|| {
                GaugeError::Protocol(format!("pressure {value} is not a valid reading"))
            }),
            Response::NoReading => Ok(Reading::Unavailable),
            Response::Malformed(reason) => Err(GaugeError::Protocol(reason)),
        }
    }
}

/// Command encoding and response decoding for one device family.
pub trait GaugeCodec: Send + Sync + fmt::Debug {
    /// Device family this codec implements.
    fn model(&self) -> GaugeModel;

    /// How the transport delimits a response frame.
    fn framing(&self) -> Framing;

    /// Build the poll command for `channel` on the gauge at `address`.
    fn encode_command(&self, address: DeviceAddress, channel: Channel) -> Vec<u8>;

    /// Parse a command frame produced by [`encode_command`](Self::encode_command).
    fn decode_command(&self, frame: &[u8]) -> AppResult<(DeviceAddress, Channel)>;

    /// Classify a response frame (terminator already removed).
    fn classify_response(&self, address: DeviceAddress, channel: Channel, frame: &[u8])
        -> Response;

    /// Decode a response frame into a reading.
    fn decode_response(
        &self,
        address: DeviceAddress,
        channel: Channel,
        frame: &[u8],
    ) -> AppResult<Reading> {
        self.classify_response(address, channel, frame).into_reading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        assert_eq!("01".parse::<DeviceAddress>().unwrap().value(), 1);
        assert_eq!("ff".parse::<DeviceAddress>().unwrap().value(), 0xFF);
        assert_eq!(DeviceAddress::new(0x0A).to_string(), "0A");
        assert!("1".parse::<DeviceAddress>().is_err());
        assert!("001".parse::<DeviceAddress>().is_err());
        assert!("G1".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_model_selects_codec() {
        assert_eq!("354".parse::<GaugeModel>().unwrap().codec().model(), GaugeModel::Series354);
        assert_eq!("392".parse::<GaugeModel>().unwrap().codec().model(), GaugeModel::Series392);
        assert!("358".parse::<GaugeModel>().is_err());
    }

    #[test]
    fn test_response_into_reading() {
        assert_eq!(
            Response::Value(1.3e-6).into_reading().unwrap(),
            Reading::Pressure(1.3e-6)
        );
        assert_eq!(Response::NoReading.into_reading().unwrap(), Reading::Unavailable);
        assert!(matches!(
            Response::Malformed("bad".into()).into_reading(),
            Err(GaugeError::Protocol(_))
        ));
        assert!(matches!(
            Response::Value(-1.0).into_reading(),
            Err(GaugeError::Protocol(_))
        ));
    }

    #[test]
    fn test_command_round_trip_for_every_channel() {
        let addresses = [DeviceAddress::new(0x01), DeviceAddress::new(0x2F), DeviceAddress::new(0xFE)];
        for model in [GaugeModel::Series354, GaugeModel::Series392] {
            let codec = model.codec();
            for address in addresses {
                for channel in Channel::ALL {
                    let encoded = codec.encode_command(address, channel);
                    let (decoded_address, decoded_channel) = codec.decode_command(&encoded).unwrap();
                    assert_eq!(
                        codec.encode_command(decoded_address, decoded_channel),
                        encoded,
                        "{model} {address} {channel}"
                    );
                }
            }
        }
    }
}
