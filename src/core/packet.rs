//! Packet Framer
//!
//! Turns transaction requests and outcomes into the byte-level packet records
//! shown in the trace view: device address, function code, data, CRC.

use crate::core::protocol::checksum::{crc16_wire_hex, CrcMode};
use crate::core::protocol::{ExceptionCode, EXCEPTION_FLAG};
use crate::core::simulator::SimRng;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Packet direction on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    /// Sent by the master
    Request,
    /// Returned by the device (normal or exception)
    Response,
}

/// A single framed packet. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// Unique, monotonically increasing per bus
    pub id: u64,
    /// ISO-8601 creation time
    pub timestamp: String,
    /// Request or response
    #[serde(rename = "type")]
    pub kind: PacketKind,
    /// Device (slave) address
    pub device_address: u8,
    /// Function code, with 0x80 set on exception responses
    pub function_code: u8,
    /// Data field, lowercase hex
    pub data: String,
    /// Checksum, 4 lowercase hex digits
    pub crc: String,
    /// address + function + data + crc, lowercase hex without separators
    pub raw: String,
    /// `false` for exception responses
    pub is_valid: bool,
}

impl Packet {
    /// Whether this is an exception response
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }

    /// Raw frame bytes
    pub fn bytes(&self) -> Vec<u8> {
        hex::decode(&self.raw).unwrap_or_default()
    }

    /// `raw` grouped in bytes for display, e.g. `01 03 00 00`
    pub fn spaced_raw(&self) -> String {
        self.raw
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Value returned by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    /// Holding or input register
    Word(u16),
    /// Coil or discrete input
    Bit(bool),
}

impl RegisterValue {
    /// Value as a 16-bit word (bits become 0 or 1)
    pub fn as_word(self) -> u16 {
        match self {
            Self::Word(w) => w,
            Self::Bit(b) => u16::from(b),
        }
    }
}

/// Data field of a read request: start address then quantity
pub fn read_request_data(start: u16, quantity: u16) -> String {
    format!("{:04x}{:04x}", start, quantity)
}

/// Data field of a single-register write (request and echo response)
pub fn write_data(address: u16, value: u16) -> String {
    format!("{:04x}{:04x}", address, value)
}

/// Data field of a successful read response: byte count, then each value
pub fn read_response_data(values: &[RegisterValue]) -> String {
    let byte_count = (values.len() * 2) as u8;
    let mut data = format!("{:02x}", byte_count);
    for value in values {
        data.push_str(&format!("{:04x}", value.as_word()));
    }
    data
}

/// Builds packets, assigning ids, timestamps and checksums
#[derive(Debug)]
pub struct PacketFramer {
    next_id: AtomicU64,
    crc_mode: CrcMode,
    rng: SimRng,
}

impl PacketFramer {
    /// Create a framer; ids start at 1
    pub fn new(crc_mode: CrcMode, rng: SimRng) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            crc_mode,
            rng,
        }
    }

    /// Frame one packet
    pub fn frame(
        &self,
        kind: PacketKind,
        device_address: u8,
        function_code: u8,
        data: &str,
        is_valid: bool,
    ) -> Packet {
        let data = data.to_ascii_lowercase();
        let body = format!("{:02x}{:02x}{}", device_address, function_code, data);
        let crc = match self.crc_mode {
            CrcMode::Synthetic => format!("{:04x}", self.rng.word()),
            CrcMode::Modbus => crc16_wire_hex(&hex::decode(&body).unwrap_or_default()),
        };

        Packet {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            device_address,
            function_code,
            raw: format!("{}{}", body, crc),
            data,
            crc,
            is_valid,
        }
    }

    /// Frame the outbound request
    pub fn request(&self, device_address: u8, function_code: u8, data: &str) -> Packet {
        self.frame(PacketKind::Request, device_address, function_code, data, true)
    }

    /// Frame a normal response
    pub fn response(&self, device_address: u8, function_code: u8, data: &str) -> Packet {
        self.frame(PacketKind::Response, device_address, function_code, data, true)
    }

    /// Frame an exception response: function code with 0x80 set, one exception byte
    pub fn exception(
        &self,
        device_address: u8,
        function_code: u8,
        exception: ExceptionCode,
    ) -> Packet {
        self.frame(
            PacketKind::Response,
            device_address,
            function_code | EXCEPTION_FLAG,
            &format!("{:02x}", exception.code()),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer(mode: CrcMode) -> PacketFramer {
        PacketFramer::new(mode, SimRng::seeded(5))
    }

    #[test]
    fn test_request_framing() {
        let packet = framer(CrcMode::Synthetic).request(1, 3, &read_request_data(0, 4));
        assert_eq!(packet.kind, PacketKind::Request);
        assert_eq!(packet.data, "00000004");
        assert_eq!(packet.crc.len(), 4);
        assert_eq!(packet.raw, format!("0103{}{}", packet.data, packet.crc));
        assert!(packet.is_valid);
    }

    #[test]
    fn test_read_response_data() {
        let values = [RegisterValue::Word(0x1234), RegisterValue::Word(0xABCD)];
        assert_eq!(read_response_data(&values), "041234abcd");

        let bits = [RegisterValue::Bit(true), RegisterValue::Bit(false)];
        assert_eq!(read_response_data(&bits), "0400010000");
    }

    #[test]
    fn test_exception_framing() {
        let packet = framer(CrcMode::Synthetic).exception(2, 3, ExceptionCode::ServerDeviceFailure);
        assert_eq!(packet.function_code, 0x83);
        assert_eq!(packet.data, "04");
        assert!(!packet.is_valid);
        assert!(packet.is_exception());
        assert!(packet.raw.starts_with("028304"));
    }

    #[test]
    fn test_modbus_crc_mode() {
        let packet = framer(CrcMode::Modbus).request(1, 3, &read_request_data(0, 10));
        assert_eq!(packet.raw, "01030000000ac5cd");
        assert_eq!(packet.bytes().len(), 8);
        assert_eq!(packet.spaced_raw(), "01 03 00 00 00 0a c5 cd");
    }

    #[test]
    fn test_ids_are_monotonic() {
        let framer = framer(CrcMode::Synthetic);
        let a = framer.request(1, 6, &write_data(1, 2));
        let b = framer.response(1, 6, &write_data(1, 2));
        assert!(b.id > a.id);
    }

    #[test]
    fn test_json_field_names() {
        let packet = framer(CrcMode::Synthetic).request(1, 3, "00000001");
        let json = serde_json::to_value(&packet).unwrap();
        let keys = [
            "id",
            "timestamp",
            "type",
            "deviceAddress",
            "functionCode",
            "data",
            "crc",
            "raw",
            "isValid",
        ];
        for key in keys {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["type"], "request");
    }
}
