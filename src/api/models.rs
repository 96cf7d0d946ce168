//! API request and response models

use crate::core::packet::RegisterValue;
use crate::core::serial::SerialParams;
use crate::core::state_machine::ConnectionStatus;
use serde::{Deserialize, Serialize};

/// Connect request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Port name; required
    pub port: Option<String>,
    /// Baud rate, 9600 when absent
    pub baud_rate: Option<u32>,
    /// Data bits, 8 when absent
    pub data_bits: Option<u8>,
    /// `none`, `even` or `odd`
    pub parity: Option<String>,
    /// Stop bits, 1 when absent
    pub stop_bits: Option<u8>,
    /// Response timeout in milliseconds
    pub timeout: Option<u64>,
}

impl ConnectRequest {
    /// Serial parameters, falling back to 9600 8N1
    pub fn serial_params(&self) -> Result<SerialParams, String> {
        let mut params = SerialParams::default();
        if let Some(baud) = self.baud_rate {
            params = SerialParams::new(baud);
        }
        if let Some(bits) = self.data_bits {
            params = params.data_bits(bits);
        }
        if let Some(parity) = &self.parity {
            params = params.parity(parity.parse()?);
        }
        if let Some(bits) = self.stop_bits {
            params = params.stop_bits(bits);
        }
        if let Some(timeout) = self.timeout {
            params = params.timeout_ms(timeout);
        }
        Ok(params)
    }
}

/// Connect and disconnect response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    /// Always `true`; failures use the error body
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Whether the port is open afterwards
    pub is_open: bool,
}

/// Connection status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Whether transactions may run
    pub is_open: bool,
    /// Port of the last successful connect
    pub port: Option<String>,
    /// Connection state
    pub status: ConnectionStatus,
}

fn default_slave_id() -> u8 {
    1
}

fn default_length() -> u16 {
    1
}

fn default_function_code() -> u8 {
    3
}

/// Read request; every field is optional and an empty body means all defaults
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    /// First coil or register, default 0
    #[serde(default)]
    pub address: u16,
    /// Quantity to read, default 1
    #[serde(default = "default_length")]
    pub length: u16,
    /// Device address, default 1
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Function code, default 3
    #[serde(default = "default_function_code")]
    pub function_code: u8,
}

impl Default for ReadRequest {
    fn default() -> Self {
        Self {
            address: 0,
            length: default_length(),
            slave_id: default_slave_id(),
            function_code: default_function_code(),
        }
    }
}

/// Read response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    /// `true` even after a simulated fault
    pub success: bool,
    /// Values read, or fallback values after a fault
    pub data: Vec<RegisterValue>,
    /// Echo of the first address
    pub address: u16,
    /// Echo of the function code
    pub function_code: u8,
    /// Fault description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write Single Register request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    /// Register address
    pub address: u16,
    /// Value to store
    pub value: u16,
    /// Device address, default 1
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
}

/// Write response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    /// `true` even after a simulated fault
    pub success: bool,
    /// Echo of the register address
    pub address: u16,
    /// Echo of the requested value
    pub value: u16,
    /// Fault description; the value was not stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Packet log query parameters
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Newest packets to return; all when absent
    pub limit: Option<usize>,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable summary
    pub message: String,
}

/// Mock port enumeration
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    /// Always `true`
    pub success: bool,
    /// Mock port names for the platform
    pub ports: Vec<String>,
    /// Operating system the names were chosen for
    pub platform: String,
}

/// Function code lookup
#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    /// Code that was looked up
    pub code: u8,
    /// Display name
    pub name: String,
    /// Whether the simulator dispatches it
    pub supported: bool,
}

/// Health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serial::SerialParity;

    #[test]
    fn test_read_request_defaults() {
        let request: ReadRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.address, 0);
        assert_eq!(request.length, 1);
        assert_eq!(request.slave_id, 1);
        assert_eq!(request.function_code, 3);
    }

    #[test]
    fn test_connect_params() {
        let request: ConnectRequest = serde_json::from_str(
            r#"{"port":"COM3","baudRate":19200,"parity":"even","stopBits":2}"#,
        )
        .unwrap();
        let params = request.serial_params().unwrap();
        assert_eq!(params.baud_rate, 19200);
        assert_eq!(params.parity, SerialParity::Even);
        assert_eq!(params.stop_bits, 2);
        assert_eq!(params.data_bits, 8);

        let bad = ConnectRequest {
            parity: Some("mark".into()),
            ..ConnectRequest::default()
        };
        assert!(bad.serial_params().is_err());
    }

    #[test]
    fn test_read_response_omits_missing_error() {
        let response = ReadResponse {
            success: true,
            data: vec![RegisterValue::Bit(true)],
            address: 0,
            function_code: 1,
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["functionCode"], 1);
        assert_eq!(json["data"][0], true);
    }
}
