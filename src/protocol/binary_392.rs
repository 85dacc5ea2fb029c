//! 392 series binary protocol.
//!
//! Command frame (5 bytes):
//!
//! ```text
//! '!' | address | command | CRC16 lo | CRC16 hi
//! ```
//!
//! Response frame (10 bytes):
//!
//! ```text
//! '*' | address | command echo | unit | f32 big-endian pressure | CRC16 lo | CRC16 hi
//! ```
//!
//! The CRC is CRC-16/MODBUS over every byte between the start marker and the CRC.
//! A NaN payload, or the `9.9E9` "gauge off" value, means no reading.

use super::{DeviceAddress, GaugeCodec, GaugeModel, Response, NO_READING_THRESHOLD};
use crate::error::{AppResult, GaugeError};
use crate::measurement::Channel;
use crate::transport::Framing;
use crc::{Crc, CRC_16_MODBUS};

const COMMAND_START: u8 = b'!';
const RESPONSE_START: u8 = b'*';
const COMMAND_LEN: usize = 5;
const RESPONSE_LEN: usize = 10;
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Unit byte the gauge reports for Torr.
const UNIT_TORR: u8 = 0x00;

/// Codec for the 392 series binary protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary392Codec;

impl Binary392Codec {
    fn command_byte(channel: Channel) -> u8 {
        match channel {
            Channel::Ionization => 0x02,
            Channel::Channel1 => 0x03,
            Channel::Channel2 => 0x04,
        }
    }

    fn channel_for_byte(byte: u8) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| Self::command_byte(*channel) == byte)
    }

    fn crc_bytes(body: &[u8]) -> [u8; 2] {
        CRC16.checksum(body).to_le_bytes()
    }

    /// Build the frame a 392 gauge would send back.
    pub fn encode_response(address: DeviceAddress, channel: Channel, unit: u8, value: f32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(RESPONSE_LEN);
        frame.push(RESPONSE_START);
        frame.push(address.value());
        frame.push(Self::command_byte(channel));
        frame.push(unit);
        frame.extend_from_slice(&value.to_be_bytes());
        let crc = Self::crc_bytes(&frame[1..]);
        frame.extend_from_slice(&crc);
        frame
    }
}

impl GaugeCodec for Binary392Codec {
    fn model(&self) -> GaugeModel {
        GaugeModel::Series392
    }

    fn framing(&self) -> Framing {
        Framing::FixedLength(RESPONSE_LEN)
    }

    fn encode_command(&self, address: DeviceAddress, channel: Channel) -> Vec<u8> {
        let body = [address.value(), Self::command_byte(channel)];
        let mut frame = Vec::with_capacity(COMMAND_LEN);
        frame.push(COMMAND_START);
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&Self::crc_bytes(&body));
        frame
    }

    fn decode_command(&self, frame: &[u8]) -> AppResult<(DeviceAddress, Channel)> {
        if frame.len() != COMMAND_LEN || frame[0] != COMMAND_START {
            return Err(GaugeError::Protocol(format!("unframed command {frame:02X?}")));
        }
        if Self::crc_bytes(&frame[1..3]) != frame[3..5] {
            return Err(GaugeError::Protocol(format!("command CRC mismatch in {frame:02X?}")));
        }
        let channel = Self::channel_for_byte(frame[2]).ok_or_else(|| {
            GaugeError::Protocol(format!("unknown command byte 0x{:02X}", frame[2]))
        })?;
        Ok((DeviceAddress::new(frame[1]), channel))
    }

    fn classify_response(&self, address: DeviceAddress, channel: Channel, frame: &[u8]) -> Response {
        if frame.len() != RESPONSE_LEN {
            return Response::Malformed(format!(
                "expected {RESPONSE_LEN} byte response, got {}",
                frame.len()
            ));
        }
        if frame[0] != RESPONSE_START {
            return Response::Malformed(format!("bad start marker 0x{:02X}", frame[0]));
        }
        let expected_crc = Self::crc_bytes(&frame[1..8]);
        if expected_crc != frame[8..10] {
            return Response::Malformed(format!(
                "checksum mismatch: expected {expected_crc:02X?}, got {:02X?}",
                &frame[8..10]
            ));
        }
        if frame[1] != address.value() {
            return Response::Malformed(format!(
                "address echo {:02X} does not match {address}",
                frame[1]
            ));
        }
        let expected_cmd = Self::command_byte(channel);
        if frame[2] != expected_cmd {
            return Response::Malformed(format!(
                "command echo 0x{:02X} does not match 0x{expected_cmd:02X}",
                frame[2]
            ));
        }
        if frame[3] != UNIT_TORR {
            tracing::debug!(unit = frame[3], "392 gauge reports non-Torr unit byte");
        }

        let value = f64::from(f32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]));
        if value.is_nan() || value >= NO_READING_THRESHOLD {
            Response::NoReading
        } else if value.is_infinite() || value < 0.0 {
            Response::Malformed(format!("invalid pressure payload {value}"))
        } else {
            Response::Value(value)
        }
    }
}
