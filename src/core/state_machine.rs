//! Connection State Machine
//!
//! Tracks the simulated bus connection lifecycle and gates every transaction
//! on the connection being open.

use crate::core::serial::SerialParams;
use crate::error::{BusError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected (initial state)
    #[default]
    Closed,
    /// Connect in progress
    Connecting,
    /// Connected, transactions allowed
    Open,
    /// Last connect attempt failed
    Error,
}

impl ConnectionStatus {
    /// Check if transactions may execute
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state
    pub from: ConnectionStatus,
    /// New state
    pub to: ConnectionStatus,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Reason for transition
    pub reason: Option<String>,
}

/// Point-in-time view of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    /// Current status
    pub status: ConnectionStatus,
    /// Port recorded by the last successful connect
    pub port: Option<String>,
    /// Serial parameters of the open connection
    pub params: Option<SerialParams>,
}

impl ConnectionSnapshot {
    /// Shorthand for `status.is_open()`
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Connection state machine
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionStatus,
    port: Option<String>,
    params: Option<SerialParams>,
    history: Vec<StateTransition>,
    max_history: usize,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a closed state machine
    pub fn new() -> Self {
        Self {
            state: ConnectionStatus::Closed,
            port: None,
            params: None,
            history: Vec::new(),
            max_history: 100,
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionStatus {
        self.state
    }

    /// Current state and port, without side effects
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.state,
            port: self.port.clone(),
            params: self.params.clone(),
        }
    }

    /// Serial parameters of the open connection
    pub fn params(&self) -> Option<&SerialParams> {
        self.params.as_ref()
    }

    /// Get state history
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Fail with `NotConnected` unless the connection is open
    pub fn ensure_open(&self) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(BusError::NotConnected)
        }
    }

    /// Enter `Connecting`
    pub fn begin_connect(&mut self) -> Result<()> {
        self.transition(ConnectionStatus::Connecting, Some("connect requested"))
    }

    /// Connect succeeded: enter `Open` and record the port
    pub fn opened(&mut self, port: &str, params: SerialParams) -> Result<()> {
        self.transition(ConnectionStatus::Open, Some("port opened"))?;
        self.port = Some(port.to_string());
        self.params = Some(params);
        Ok(())
    }

    /// Connect failed: enter `Error`
    pub fn failed(&mut self, reason: &str) -> Result<()> {
        self.transition(ConnectionStatus::Error, Some(reason))?;
        self.port = None;
        self.params = None;
        Ok(())
    }

    /// Enter `Closed` from any state
    pub fn closed(&mut self) {
        // Every state may close, so this cannot be rejected.
        let _ = self.transition(ConnectionStatus::Closed, Some("disconnected"));
        self.port = None;
        self.params = None;
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: ConnectionStatus, reason: Option<&str>) -> Result<()> {
        if !self.is_valid_transition(new_state) {
            return Err(BusError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        self.history.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason: reason.map(String::from),
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        tracing::debug!(from = %self.state, to = %new_state, "connection state change");
        self.state = new_state;
        Ok(())
    }

    /// Check if transition is valid
    fn is_valid_transition(&self, new_state: ConnectionStatus) -> bool {
        use ConnectionStatus::*;

        match (self.state, new_state) {
            (Closed, Connecting) => true,
            (Error, Connecting) => true,

            (Connecting, Open) => true,
            (Connecting, Error) => true,

            // Disconnect is accepted from every state
            (_, Closed) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_lifecycle() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.state(), ConnectionStatus::Closed);

        sm.begin_connect().unwrap();
        assert_eq!(sm.state(), ConnectionStatus::Connecting);

        sm.opened("/dev/ttyUSB0", SerialParams::default()).unwrap();
        let snapshot = sm.snapshot();
        assert!(snapshot.is_open());
        assert_eq!(snapshot.port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(sm.ensure_open().is_ok());

        sm.closed();
        assert_eq!(sm.state(), ConnectionStatus::Closed);
        assert!(sm.snapshot().port.is_none());
        assert!(matches!(sm.ensure_open(), Err(BusError::NotConnected)));
    }

    #[test]
    fn test_invalid_transition() {
        let mut sm = ConnectionStateMachine::new();

        // Can't go directly from Closed to Open
        let result = sm.transition(ConnectionStatus::Open, None);
        assert!(matches!(result, Err(BusError::InvalidTransition { .. })));
    }

    #[test]
    fn test_failure_then_retry() {
        let mut sm = ConnectionStateMachine::new();
        sm.begin_connect().unwrap();
        sm.failed("bad port").unwrap();
        assert_eq!(sm.state(), ConnectionStatus::Error);

        sm.begin_connect().unwrap();
        sm.opened("COM1", SerialParams::default()).unwrap();
        assert_eq!(sm.history().len(), 4);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut sm = ConnectionStateMachine::new();
        sm.closed();
        sm.closed();
        assert_eq!(sm.state(), ConnectionStatus::Closed);
    }
}
