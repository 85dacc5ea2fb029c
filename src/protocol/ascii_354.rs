//! 354 series ASCII protocol.
//!
//! Protocol Overview:
//! - Format: `#<AA><CMD>\r` commands, `*<AA> <value>\r` responses
//! - Terminator: CR (`\r`); a stray LF is tolerated
//! - Commands: `RDIG` (ionization gauge), `RDCG1`, `RDCG2` (convection channels)
//! - Responses use scientific notation (e.g. `*01 1.30E-06`)
//!
//! # Important Notes
//!
//! - There is no checksum; the framing check is the address echo. The leading `*`
//!   response marker is optional, some firmware omits it.
//! - A leading `?` is the device's error marker (e.g. `?01 SYNTX ER`).
//! - With the filament off the gauge answers `9.90E+09`; that, or an empty payload,
//!   is a missing reading rather than an error.

use super::{DeviceAddress, GaugeCodec, GaugeModel, Response, NO_READING_THRESHOLD};
use crate::error::{AppResult, GaugeError};
use crate::measurement::Channel;
use crate::transport::Framing;

const COMMAND_START: char = '#';
const RESPONSE_MARKER: char = '*';
const ERROR_MARKER: char = '?';
const TERMINATOR: u8 = b'\r';

/// Codec for the 354 series ASCII protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii354Codec;

impl Ascii354Codec {
    fn command_code(channel: Channel) -> &'static str {
        match channel {
            Channel::Ionization => "RDIG",
            Channel::Channel1 => "RDCG1",
            Channel::Channel2 => "RDCG2",
        }
    }

    fn channel_for_code(code: &str) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| Self::command_code(*channel) == code)
    }

    /// Build the line a 354 gauge would send back (without terminator).
    ///
    /// `None` produces the empty-payload form used when no reading exists.
    pub fn format_response(address: DeviceAddress, value: Option<f64>) -> Vec<u8> {
        match value {
            Some(v) => format!("{RESPONSE_MARKER}{address} {v:.2E}").into_bytes(),
            None => format!("{RESPONSE_MARKER}{address} ").into_bytes(),
        }
    }
}

impl GaugeCodec for Ascii354Codec {
    fn model(&self) -> GaugeModel {
        GaugeModel::Series354
    }

    fn framing(&self) -> Framing {
        Framing::Terminated(TERMINATOR)
    }

    fn encode_command(&self, address: DeviceAddress, channel: Channel) -> Vec<u8> {
        format!(
            "{COMMAND_START}{address}{}{}",
            Self::command_code(channel),
            TERMINATOR as char
        )
        .into_bytes()
    }

    fn decode_command(&self, frame: &[u8]) -> AppResult<(DeviceAddress, Channel)> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| GaugeError::Protocol("command is not ASCII".into()))?;
        let body = text
            .strip_prefix(COMMAND_START)
            .and_then(|rest| rest.strip_suffix(TERMINATOR as char))
            .ok_or_else(|| GaugeError::Protocol(format!("unframed command {text:?}")))?;

        let (address, code) = split_address(body)
            .ok_or_else(|| GaugeError::Protocol(format!("command too short: {text:?}")))?;
        let address = address
            .parse::<DeviceAddress>()
            .map_err(|_| GaugeError::Protocol(format!("bad address in command {text:?}")))?;
        let channel = Self::channel_for_code(code)
            .ok_or_else(|| GaugeError::Protocol(format!("unknown command code '{code}'")))?;
        Ok((address, channel))
    }

    fn classify_response(
        &self,
        address: DeviceAddress,
        _channel: Channel,
        frame: &[u8],
    ) -> Response {
        let Ok(text) = std::str::from_utf8(frame) else {
            return Response::Malformed(format!("non-ASCII response {frame:02X?}"));
        };
        let text = text.trim_matches(|c: char| c == '\r' || c == '\n');

        if text.starts_with(ERROR_MARKER) {
            return Response::Malformed(format!("device rejected command: {text}"));
        }
        let body = text.strip_prefix(RESPONSE_MARKER).unwrap_or(text);

        let Some((echo, rest)) = split_address(body) else {
            return Response::Malformed(format!("response too short: {text:?}"));
        };
        match echo.parse::<DeviceAddress>() {
            Ok(echoed) if echoed == address => {}
            Ok(echoed) => {
                return Response::Malformed(format!(
                    "address echo {echoed} does not match {address}"
                ))
            }
            Err(_) => return Response::Malformed(format!("missing address echo in {text:?}")),
        }

        let payload = match rest.chars().next() {
            None => return Response::NoReading,
            Some(' ') | Some('_') => rest[1..].trim(),
            Some(_) => return Response::Malformed(format!("missing separator in {text:?}")),
        };
        if payload.is_empty() {
            return Response::NoReading;
        }

        match payload.parse::<f64>() {
            Ok(value) if value.is_nan() || value.is_infinite() => {
                Response::Malformed(format!("non-finite payload '{payload}'"))
            }
            Ok(value) if value >= NO_READING_THRESHOLD => Response::NoReading,
            Ok(value) if value < 0.0 => Response::Malformed(format!("negative pressure '{payload}'")),
            Ok(value) => Response::Value(value),
            Err(_) => Response::Malformed(format!("non-numeric payload '{payload}'")),
        }
    }
}

/// Split off the two-character address field.
fn split_address(body: &str) -> Option<(&str, &str)> {
    Some((body.get(..2)?, body.get(2..)?))
}
