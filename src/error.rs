//! Error types for the simulated bus

use crate::core::state_machine::ConnectionStatus;
use thiserror::Error;

/// Result alias used across the core
pub type Result<T> = std::result::Result<T, BusError>;

/// Bus error taxonomy
#[derive(Error, Debug)]
pub enum BusError {
    /// Transaction attempted while the connection is not open
    #[error("Modbus connection is not open")]
    NotConnected,

    /// Randomized transient bus fault
    #[error("Simulated communication error (device {device}, function {function})")]
    SimulatedCommunication {
        /// Device address of the failed transaction
        device: u8,
        /// Function code of the failed transaction
        function: u8,
    },

    /// Function code the simulator does not dispatch
    #[error("Unsupported function code: {0}")]
    UnsupportedFunction(u8),

    /// Connect failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected state machine transition
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State before the attempted transition
        from: ConnectionStatus,
        /// Requested state
        to: ConnectionStatus,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    /// Errors caused by the request itself rather than the bus
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::UnsupportedFunction(_) | Self::InvalidRequest(_)
        )
    }

    /// Transient faults the caller may retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SimulatedCommunication { .. })
    }
}
