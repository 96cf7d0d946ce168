//! Core module containing the simulated bus
//!
//! This module provides:
//! - Register store with per-device banks
//! - Transaction executor with simulated latency and faults
//! - Packet framing and the bounded packet log
//! - Connection state machine
//! - Durable packet mirror

pub mod bus;
pub mod executor;
pub mod logger;
pub mod packet;
pub mod packet_log;
pub mod protocol;
pub mod registers;
pub mod serial;
pub mod simulator;
pub mod state_machine;
