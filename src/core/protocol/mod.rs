//! Protocol definitions
//!
//! - Modbus function and exception codes with display names
//! - Checksum helpers (CRC-16/Modbus)

pub mod checksum;
pub mod modbus;

pub use checksum::{crc16_modbus, CrcMode};
pub use modbus::{
    describe_function_code, is_supported, ExceptionCode, FunctionCode, EXCEPTION_FLAG,
    MAX_READ_QUANTITY,
};
