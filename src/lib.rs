//! # Busview Core Library
//!
//! A simulated Modbus RTU bus with a packet trace, served over HTTP:
//! - Per-device register banks with randomized seeding and read drift
//! - Coil, discrete input, holding and input register reads
//! - Single register writes
//! - Simulated wire latency and transient faults
//! - Bounded, newest-first packet log
//!
//! ## Example
//!
//! ```rust,no_run
//! use busview_core::{BusConfig, ModbusBus, SerialParams};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = ModbusBus::new(BusConfig::default());
//!     bus.connect("/dev/ttyUSB0", SerialParams::new(9600)).await?;
//!
//!     let outcome = bus.read(1, 3, 0, 4).await?;
//!     println!("values: {:?}", outcome.values);
//!
//!     for packet in bus.logs() {
//!         println!("{} {}", packet.id, packet.spaced_raw());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, LoggingConfig, ServerConfig};
pub use crate::core::bus::{BusConfig, ModbusBus, TransactionOutcome};
pub use crate::core::packet::{Packet, PacketKind, RegisterValue};
pub use crate::core::protocol::{CrcMode, FunctionCode};
pub use crate::core::serial::{SerialParams, SerialParity};
pub use crate::core::state_machine::{ConnectionSnapshot, ConnectionStatus};
pub use crate::error::{BusError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
