//! Simulated Modbus RTU bus
//!
//! Owns the register store, packet log and connection state of one simulated
//! bus. Request handlers hold a cloned [`ModbusBus`]; tests build as many
//! isolated buses as they need.

use crate::core::executor::{TransactionExecutor, TransactionRequest};
use crate::core::logger::PacketMirror;
use crate::core::packet::{Packet, PacketFramer, RegisterValue};
use crate::core::packet_log::{PacketLog, PacketLogStats, DEFAULT_CAPACITY};
use crate::core::protocol::{CrcMode, ExceptionCode};
use crate::core::registers::{RegisterBank, RegisterStore};
use crate::core::serial::SerialParams;
use crate::core::simulator::{FaultInjector, LatencyConfig, LatencySimulator, SimRng};
use crate::core::state_machine::{ConnectionSnapshot, ConnectionStateMachine};
use crate::error::{BusError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Packet log capacity
    pub capacity: usize,
    /// Registers seeded per device on first access
    pub seed_registers: u16,
    /// Maximum drift applied by a register read (0 = pure reads)
    pub drift: u16,
    /// Offset applied to input register reads (function 4)
    pub input_register_offset: u16,
    /// Probability that a transaction fails with a simulated fault
    pub failure_probability: f64,
    /// Simulated wire latency
    pub latency: LatencyConfig,
    /// Simulated connect delay
    pub connect_delay_ms: u64,
    /// Simulated disconnect delay
    pub disconnect_delay_ms: u64,
    /// Port name that always fails to connect
    pub invalid_port: String,
    /// How packet checksums are produced
    pub crc_mode: CrcMode,
    /// Run one operation at a time, like a single-master RTU line
    pub serialize_transactions: bool,
    /// Fixed random seed; OS entropy when absent
    pub seed: Option<u64>,
    /// JSON-lines file mirroring the packet log
    pub mirror_path: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            seed_registers: 100,
            drift: 5,
            input_register_offset: 3,
            failure_probability: 0.05,
            latency: LatencyConfig::default(),
            connect_delay_ms: 100,
            disconnect_delay_ms: 50,
            invalid_port: "ERROR".to_string(),
            crc_mode: CrcMode::Synthetic,
            serialize_transactions: true,
            seed: None,
            mirror_path: None,
        }
    }
}

impl BusConfig {
    /// Zero delays, no faults and a fixed seed
    pub fn deterministic(seed: u64) -> Self {
        Self {
            failure_probability: 0.0,
            latency: LatencyConfig { base_ms: 0, max_ms: 0 },
            connect_delay_ms: 0,
            disconnect_delay_ms: 0,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Result handed back to the caller of a read or write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    /// Values read (or the written value); fallback values after a fault
    pub values: Vec<RegisterValue>,
    /// Fault description when the transaction did not reach the device
    pub error: Option<String>,
}

impl TransactionOutcome {
    /// Whether the device answered normally
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
struct BusInner {
    config: BusConfig,
    connection: Mutex<ConnectionStateMachine>,
    store: Arc<Mutex<RegisterStore>>,
    executor: TransactionExecutor,
    framer: PacketFramer,
    log: PacketLog,
    line: tokio::sync::Mutex<()>,
}

/// Handle to a simulated bus
#[derive(Debug, Clone)]
pub struct ModbusBus {
    inner: Arc<BusInner>,
}

impl ModbusBus {
    /// Build a bus; the seed comes from `config.seed`
    pub fn new(config: BusConfig) -> Self {
        let rng = SimRng::from_option(config.seed);
        Self::with_rng(config, rng)
    }

    /// Build a bus drawing every random decision from `rng`
    pub fn with_rng(config: BusConfig, rng: SimRng) -> Self {
        Self::assemble(config, rng, None)
    }

    /// Build a bus whose packet log is mirrored to `config.mirror_path`.
    ///
    /// Must be called inside a tokio runtime when a mirror path is set.
    pub fn with_mirror(config: BusConfig) -> std::io::Result<Self> {
        let mirror = match &config.mirror_path {
            Some(path) => Some(PacketMirror::spawn(path.clone())?),
            None => None,
        };
        let rng = SimRng::from_option(config.seed);
        Ok(Self::assemble(config, rng, mirror))
    }

    fn assemble(config: BusConfig, rng: SimRng, mirror: Option<PacketMirror>) -> Self {
        let store = Arc::new(Mutex::new(RegisterStore::new(
            config.seed_registers,
            config.drift,
            rng.clone(),
        )));
        let executor = TransactionExecutor::new(
            Arc::clone(&store),
            LatencySimulator::new(config.latency.clone()),
            FaultInjector::new(config.failure_probability),
            rng.clone(),
            config.input_register_offset,
        );
        let framer = PacketFramer::new(config.crc_mode, rng);
        let mut log = PacketLog::new(config.capacity);
        if let Some(mirror) = mirror {
            log = log.with_mirror(mirror);
        }

        Self {
            inner: Arc::new(BusInner {
                config,
                connection: Mutex::new(ConnectionStateMachine::new()),
                store,
                executor,
                framer,
                log,
                line: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    async fn acquire_line(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if self.inner.config.serialize_transactions {
            Some(self.inner.line.lock().await)
        } else {
            None
        }
    }

    /// Open the simulated port.
    ///
    /// An open connection is closed first. Connecting to the configured
    /// invalid port leaves the bus in the error state.
    ///
    /// The attempt runs on its own task, so it reaches `open` or `error`
    /// even when the caller stops waiting.
    pub async fn connect(&self, port: &str, params: SerialParams) -> Result<ConnectionSnapshot> {
        let bus = self.clone();
        let port = port.to_string();
        tokio::spawn(async move { bus.open_port(&port, params).await })
            .await
            .map_err(|e| BusError::Connection(format!("connect task failed: {e}")))?
    }

    async fn open_port(&self, port: &str, params: SerialParams) -> Result<ConnectionSnapshot> {
        let _line = self.acquire_line().await;

        if self.inner.connection.lock().state().is_open() {
            debug!("connect on open bus, closing first");
            self.close().await;
        }

        self.inner.connection.lock().begin_connect()?;
        sleep_ms(self.inner.config.connect_delay_ms).await;

        let mut connection = self.inner.connection.lock();
        if port == self.inner.config.invalid_port {
            connection.failed("invalid port")?;
            tracing::warn!(port, "failed to open simulated port");
            return Err(BusError::Connection(format!("cannot open port {port}")));
        }

        info!(port, params = %params, "simulated port opened");
        connection.opened(port, params)?;
        Ok(connection.snapshot())
    }

    /// Close the port. Succeeds from any state.
    pub async fn disconnect(&self) -> ConnectionSnapshot {
        let _line = self.acquire_line().await;
        self.close().await;
        self.status()
    }

    async fn close(&self) {
        sleep_ms(self.inner.config.disconnect_delay_ms).await;
        self.inner.connection.lock().closed();
        info!("simulated port closed");
    }

    /// Current state and port
    pub fn status(&self) -> ConnectionSnapshot {
        self.inner.connection.lock().snapshot()
    }

    /// Run one transaction and log its request and response packets.
    ///
    /// A simulated fault still succeeds: the response packet is an exception
    /// frame and the outcome carries fallback values plus the fault text.
    /// Every other error is returned without logging anything.
    pub async fn transact(&self, request: TransactionRequest) -> Result<TransactionOutcome> {
        let _line = self.acquire_line().await;
        let inner = &self.inner;

        debug!(
            device = request.device_address,
            function = request.function_code,
            start = request.start_address,
            "transaction"
        );

        match inner.executor.execute(&request, &inner.connection).await {
            Ok(values) => {
                let req = inner.framer.request(
                    request.device_address,
                    request.function_code,
                    &request.request_data(),
                );
                let resp = inner.framer.response(
                    request.device_address,
                    request.function_code,
                    &request.response_data(&values),
                );
                inner.log.append_pair(req, resp);
                Ok(TransactionOutcome { values, error: None })
            }
            Err(e) if e.is_recoverable() => {
                let req = inner.framer.request(
                    request.device_address,
                    request.function_code,
                    &request.request_data(),
                );
                let resp = inner.framer.exception(
                    request.device_address,
                    request.function_code,
                    ExceptionCode::ServerDeviceFailure,
                );
                inner.log.append_pair(req, resp);
                Ok(TransactionOutcome {
                    values: inner.executor.fallback(&request),
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Read coils, discrete inputs, holding or input registers
    pub async fn read(
        &self,
        device: u8,
        function_code: u8,
        start: u16,
        quantity: u16,
    ) -> Result<TransactionOutcome> {
        self.transact(TransactionRequest::read(device, function_code, start, quantity))
            .await
    }

    /// Write Single Register
    pub async fn write(&self, device: u8, address: u16, value: u16) -> Result<TransactionOutcome> {
        self.transact(TransactionRequest::write_register(device, address, value))
            .await
    }

    /// Packet log, newest first
    pub fn logs(&self) -> Vec<Packet> {
        self.inner.log.list()
    }

    /// Up to `limit` newest packets
    pub fn logs_limited(&self, limit: usize) -> Vec<Packet> {
        self.inner.log.list_limited(limit)
    }

    /// Empty the packet log
    pub fn clear_logs(&self) {
        self.inner.log.clear();
        info!("packet log cleared");
    }

    /// Wait for the durable mirror to catch up
    pub async fn flush_mirror(&self) {
        if let Some(mirror) = self.inner.log.mirror() {
            mirror.flush().await;
        }
    }

    /// Packet log statistics
    pub fn log_stats(&self) -> PacketLogStats {
        self.inner.log.stats()
    }

    /// Copy of one device's registers
    pub fn store_snapshot(&self, device: u8) -> Option<RegisterBank> {
        self.inner.store.lock().snapshot(device)
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::PacketKind;
    use crate::core::state_machine::ConnectionStatus;

    async fn open_bus(config: BusConfig) -> ModbusBus {
        let bus = ModbusBus::new(config);
        bus.connect("/dev/ttyUSB0", SerialParams::default()).await.unwrap();
        bus
    }

    #[tokio::test]
    async fn test_read_logs_two_packets() {
        let bus = open_bus(BusConfig::deterministic(1)).await;
        let outcome = bus.read(1, 3, 0, 4).await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.values.len(), 4);

        let logs = bus.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].kind, PacketKind::Request);
        assert_eq!(logs[0].kind, PacketKind::Response);
        assert_eq!(logs[0].data.len(), 2 + 4 * 4);
    }

    #[tokio::test]
    async fn test_fault_logs_exception_response() {
        let config = BusConfig {
            failure_probability: 1.0,
            ..BusConfig::deterministic(2)
        };
        let bus = open_bus(config).await;

        let outcome = bus.read(1, 3, 0, 2).await.unwrap();
        assert!(!outcome.is_ok());
        assert_eq!(outcome.values.len(), 2);

        let logs = bus.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].function_code, 0x83);
        assert_eq!(logs[0].data, "04");
        assert!(!logs[0].is_valid);
        assert!(logs[1].is_valid);
    }

    #[tokio::test]
    async fn test_reconnect_closes_first() {
        let bus = open_bus(BusConfig::deterministic(3)).await;
        let snapshot = bus.connect("COM7", SerialParams::new(19200)).await.unwrap();
        assert_eq!(snapshot.port.as_deref(), Some("COM7"));
        assert_eq!(snapshot.params.map(|p| p.baud_rate), Some(19200));
    }

    #[tokio::test]
    async fn test_invalid_port_enters_error() {
        let bus = ModbusBus::new(BusConfig::deterministic(4));
        let result = bus.connect("ERROR", SerialParams::default()).await;
        assert!(matches!(result, Err(BusError::Connection(_))));
        assert_eq!(bus.status().status, ConnectionStatus::Error);

        // The error state can be retried
        bus.connect("COM1", SerialParams::default()).await.unwrap();
        assert!(bus.status().is_open());
    }

    #[tokio::test]
    async fn test_unserialized_bus_runs_concurrently() {
        let config = BusConfig {
            serialize_transactions: false,
            ..BusConfig::deterministic(5)
        };
        let bus = open_bus(config).await;
        let (a, b) = tokio::join!(bus.read(1, 3, 0, 1), bus.write(1, 5, 10));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(bus.logs().len(), 4);
    }
}
