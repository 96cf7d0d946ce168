//! Modbus RTU vocabulary
//!
//! Function codes, exception codes and the display names the dashboard resolves
//! for every code that appears in the packet trace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Largest quantity accepted by a single simulated read
pub const MAX_READ_QUANTITY: u16 = 125;

/// Modbus function codes known to the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Get function code from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FunctionCode::ReadCoils),
            0x02 => Some(FunctionCode::ReadDiscreteInputs),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Display name used by the packet trace view
    pub fn name(self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "Read Coil Status",
            FunctionCode::ReadDiscreteInputs => "Read Input Status",
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
            FunctionCode::WriteSingleRegister => "Write Single Register",
            FunctionCode::WriteMultipleCoils => "Write Multiple Coils",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }

    /// Whether the code reads from the device
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// Whether the simulated executor dispatches this code
    pub fn is_simulated(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
                | Self::WriteSingleRegister
        )
    }

    /// All known function codes, in wire order
    pub fn all() -> &'static [FunctionCode] {
        &[
            FunctionCode::ReadCoils,
            FunctionCode::ReadDiscreteInputs,
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
            FunctionCode::WriteSingleCoil,
            FunctionCode::WriteSingleRegister,
            FunctionCode::WriteMultipleCoils,
            FunctionCode::WriteMultipleRegisters,
        ]
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// Whether a raw code is dispatched by the simulated executor
pub fn is_supported(code: u8) -> bool {
    FunctionCode::from_u8(code).is_some_and(FunctionCode::is_simulated)
}

/// Resolve any function code seen on the bus to a display name.
///
/// Exception responses (`0x80..=0x8F`) render as `Error(n)` where `n` is the
/// code without the exception flag.
pub fn describe_function_code(code: u8) -> String {
    if let Some(function) = FunctionCode::from_u8(code) {
        return function.name().to_string();
    }
    if (EXCEPTION_FLAG..=0x8F).contains(&code) {
        return format!("Error({})", code - EXCEPTION_FLAG);
    }
    format!("Unknown Function({})", code)
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported by the device
    IllegalFunction = 0x01,
    /// Address outside the device's range
    IllegalDataAddress = 0x02,
    /// Value not acceptable to the device
    IllegalDataValue = 0x03,
    /// Unrecoverable error while serving the request
    ServerDeviceFailure = 0x04,
    /// Accepted, still processing
    Acknowledge = 0x05,
    /// Busy with a long-running command
    ServerDeviceBusy = 0x06,
}

impl ExceptionCode {
    /// Get exception from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ExceptionCode::IllegalFunction),
            0x02 => Some(ExceptionCode::IllegalDataAddress),
            0x03 => Some(ExceptionCode::IllegalDataValue),
            0x04 => Some(ExceptionCode::ServerDeviceFailure),
            0x05 => Some(ExceptionCode::Acknowledge),
            0x06 => Some(ExceptionCode::ServerDeviceBusy),
            _ => None,
        }
    }

    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Get name of exception
    pub fn name(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::ServerDeviceFailure => "Server Device Failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::ServerDeviceBusy => "Server Device Busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names() {
        assert_eq!(describe_function_code(1), "Read Coil Status");
        assert_eq!(describe_function_code(2), "Read Input Status");
        assert_eq!(describe_function_code(3), "Read Holding Registers");
        assert_eq!(describe_function_code(15), "Write Multiple Coils");
        assert_eq!(describe_function_code(16), "Write Multiple Registers");
    }

    #[test]
    fn test_exception_and_unknown_names() {
        assert_eq!(describe_function_code(0x83), "Error(3)");
        assert_eq!(describe_function_code(0x80), "Error(0)");
        assert_eq!(describe_function_code(0x8F), "Error(15)");
        assert_eq!(describe_function_code(0x90), "Unknown Function(144)");
        assert_eq!(describe_function_code(99), "Unknown Function(99)");
    }

    #[test]
    fn test_supported_codes() {
        for code in [1, 2, 3, 4, 6] {
            assert!(is_supported(code), "code {code} should be simulated");
        }
        for code in [0, 5, 15, 16, 99] {
            assert!(!is_supported(code), "code {code} should not be simulated");
        }
    }

    #[test]
    fn test_round_trip_from_u8() {
        for function in FunctionCode::all() {
            assert_eq!(FunctionCode::from_u8(function.code()), Some(*function));
        }
        assert_eq!(ExceptionCode::from_u8(4), Some(ExceptionCode::ServerDeviceFailure));
    }
}
