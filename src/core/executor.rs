//! Transaction Executor
//!
//! Runs one logical Modbus operation against the register store, with
//! simulated wire latency and transient faults.

use crate::core::packet::{read_request_data, read_response_data, write_data, RegisterValue};
use crate::core::protocol::{is_supported, FunctionCode, MAX_READ_QUANTITY};
use crate::core::registers::RegisterStore;
use crate::core::simulator::{FaultInjector, LatencySimulator, SimRng};
use crate::core::state_machine::ConnectionStateMachine;
use crate::error::{BusError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Quantity for reads, value for single writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operand {
    /// Number of coils or registers to read
    Quantity(u16),
    /// Value to write
    Value(u16),
}

/// One logical Modbus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Modbus function code
    pub function_code: u8,
    /// Device (slave) address
    pub device_address: u8,
    /// First coil or register, or the written register
    pub start_address: u16,
    /// Read quantity or written value
    pub operand: Operand,
}

impl TransactionRequest {
    /// Read request
    pub fn read(device_address: u8, function_code: u8, start_address: u16, quantity: u16) -> Self {
        Self {
            function_code,
            device_address,
            start_address,
            operand: Operand::Quantity(quantity),
        }
    }

    /// Write Single Register request
    pub fn write_register(device_address: u8, address: u16, value: u16) -> Self {
        Self {
            function_code: FunctionCode::WriteSingleRegister.code(),
            device_address,
            start_address: address,
            operand: Operand::Value(value),
        }
    }

    /// Reject codes the simulator does not dispatch and malformed operands
    pub fn validate(&self) -> Result<FunctionCode> {
        if !is_supported(self.function_code) {
            return Err(BusError::UnsupportedFunction(self.function_code));
        }
        let function = FunctionCode::from_u8(self.function_code)
            .ok_or(BusError::UnsupportedFunction(self.function_code))?;

        match (function.is_read(), self.operand) {
            (true, Operand::Quantity(q)) if (1..=MAX_READ_QUANTITY).contains(&q) => Ok(function),
            (true, Operand::Quantity(q)) => Err(BusError::InvalidRequest(format!(
                "quantity must be between 1 and {MAX_READ_QUANTITY}, got {q}"
            ))),
            (false, Operand::Value(_)) => Ok(function),
            _ => Err(BusError::InvalidRequest(format!(
                "operand {:?} does not match function code {}",
                self.operand, self.function_code
            ))),
        }
    }

    /// Data field of the request packet
    pub fn request_data(&self) -> String {
        match self.operand {
            Operand::Quantity(q) => read_request_data(self.start_address, q),
            Operand::Value(v) => write_data(self.start_address, v),
        }
    }

    /// Data field of a successful response packet
    pub fn response_data(&self, values: &[RegisterValue]) -> String {
        match self.operand {
            Operand::Quantity(_) => read_response_data(values),
            Operand::Value(v) => write_data(self.start_address, v),
        }
    }

    fn count(&self) -> u16 {
        match self.operand {
            Operand::Quantity(q) => q,
            Operand::Value(_) => 1,
        }
    }
}

/// Executes transactions against the register store
#[derive(Debug)]
pub struct TransactionExecutor {
    store: Arc<Mutex<RegisterStore>>,
    latency: LatencySimulator,
    faults: FaultInjector,
    rng: SimRng,
    input_register_offset: u16,
}

impl TransactionExecutor {
    /// Create an executor over a shared store. Input register reads are
    /// shifted by `input_register_offset`.
    pub fn new(
        store: Arc<Mutex<RegisterStore>>,
        latency: LatencySimulator,
        faults: FaultInjector,
        rng: SimRng,
        input_register_offset: u16,
    ) -> Self {
        Self {
            store,
            latency,
            faults,
            rng,
            input_register_offset,
        }
    }

    /// Execute one transaction.
    ///
    /// The connection must be open when the call starts. A simulated fault
    /// leaves the register store untouched.
    pub async fn execute(
        &self,
        request: &TransactionRequest,
        connection: &Mutex<ConnectionStateMachine>,
    ) -> Result<Vec<RegisterValue>> {
        let timeout_ms = {
            let connection = connection.lock();
            connection.ensure_open()?;
            connection.params().and_then(|p| p.timeout_ms)
        };
        let function = request.validate()?;

        self.latency.apply(timeout_ms).await;

        if self.faults.should_fail(&self.rng) {
            tracing::warn!(
                device = request.device_address,
                function = request.function_code,
                "simulated communication error"
            );
            return Err(BusError::SimulatedCommunication {
                device: request.device_address,
                function: request.function_code,
            });
        }

        Ok(self.dispatch(function, request))
    }

    fn dispatch(&self, function: FunctionCode, request: &TransactionRequest) -> Vec<RegisterValue> {
        let device = request.device_address;
        let start = request.start_address;
        let count = request.count();

        match (function, request.operand) {
            (FunctionCode::ReadCoils, _) => coil_pattern(start, count, 3),
            (FunctionCode::ReadDiscreteInputs, _) => coil_pattern(start, count, 2),
            (FunctionCode::ReadHoldingRegisters, _) => {
                words(self.store.lock().read_registers(device, start, count))
            }
            (FunctionCode::ReadInputRegisters, _) => words(self.store.lock().read_registers(
                device,
                start.wrapping_add(self.input_register_offset),
                count,
            )),
            (FunctionCode::WriteSingleRegister, Operand::Value(value)) => {
                self.store.lock().write_register(device, start, value);
                vec![RegisterValue::Word(value)]
            }
            // validate() admits nothing else
            _ => Vec::new(),
        }
    }

    /// Values handed back after a fault: read straight from the store,
    /// without drift and without creating anything.
    pub fn fallback(&self, request: &TransactionRequest) -> Vec<RegisterValue> {
        let device = request.device_address;
        let start = request.start_address;
        let count = request.count();

        match FunctionCode::from_u8(request.function_code) {
            Some(FunctionCode::ReadCoils) => coil_pattern(start, count, 3),
            Some(FunctionCode::ReadDiscreteInputs) => coil_pattern(start, count, 2),
            Some(FunctionCode::ReadInputRegisters) => words(self.store.lock().peek_registers(
                device,
                start.wrapping_add(self.input_register_offset),
                count,
            )),
            Some(_) => words(self.store.lock().peek_registers(device, start, count)),
            None => Vec::new(),
        }
    }
}

fn coil_pattern(start: u16, count: u16, modulus: u32) -> Vec<RegisterValue> {
    (0..u32::from(count))
        .map(|i| RegisterValue::Bit((u32::from(start) + i) % modulus == 0))
        .collect()
}

fn words(values: Vec<u16>) -> Vec<RegisterValue> {
    values.into_iter().map(RegisterValue::Word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serial::SerialParams;
    use crate::core::simulator::LatencyConfig;

    fn executor(failure_probability: f64) -> TransactionExecutor {
        let rng = SimRng::seeded(21);
        let store = Arc::new(Mutex::new(RegisterStore::new(100, 5, rng.clone())));
        TransactionExecutor::new(
            store,
            LatencySimulator::new(LatencyConfig { base_ms: 0, max_ms: 0 }),
            FaultInjector::new(failure_probability),
            rng,
            3,
        )
    }

    fn open_connection() -> Mutex<ConnectionStateMachine> {
        let mut sm = ConnectionStateMachine::new();
        sm.begin_connect().unwrap();
        sm.opened("COM1", SerialParams::default()).unwrap();
        Mutex::new(sm)
    }

    #[tokio::test]
    async fn test_requires_open_connection() {
        let exec = executor(0.0);
        let closed = Mutex::new(ConnectionStateMachine::new());
        let result = exec.execute(&TransactionRequest::read(1, 3, 0, 1), &closed).await;
        assert!(matches!(result, Err(BusError::NotConnected)));
    }

    #[tokio::test]
    async fn test_coil_patterns() {
        let exec = executor(0.0);
        let conn = open_connection();

        let coils = exec.execute(&TransactionRequest::read(1, 1, 0, 4), &conn).await.unwrap();
        assert_eq!(
            coils,
            vec![
                RegisterValue::Bit(true),
                RegisterValue::Bit(false),
                RegisterValue::Bit(false),
                RegisterValue::Bit(true)
            ]
        );

        let inputs = exec.execute(&TransactionRequest::read(1, 2, 1, 3), &conn).await.unwrap();
        assert_eq!(
            inputs,
            vec![RegisterValue::Bit(false), RegisterValue::Bit(true), RegisterValue::Bit(false)]
        );
    }

    #[tokio::test]
    async fn test_input_registers_use_offset() {
        let exec = executor(0.0);
        let conn = open_connection();
        exec.store.lock().write_register(1, 13, 500);

        let values = exec.execute(&TransactionRequest::read(1, 4, 10, 1), &conn).await.unwrap();
        let word = values[0].as_word();
        assert!((495..=505).contains(&word));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let exec = executor(0.0);
        let conn = open_connection();

        exec.execute(&TransactionRequest::write_register(2, 0x10, 1234), &conn)
            .await
            .unwrap();
        let values = exec.execute(&TransactionRequest::read(2, 3, 0x10, 1), &conn).await.unwrap();
        assert!((1229..=1239).contains(&values[0].as_word()));
    }

    #[tokio::test]
    async fn test_fault_leaves_store_untouched() {
        let exec = executor(1.0);
        let conn = open_connection();
        let result = exec
            .execute(&TransactionRequest::write_register(4, 1, 99), &conn)
            .await;
        assert!(matches!(result, Err(BusError::SimulatedCommunication { device: 4, function: 6 })));
        assert!(!exec.store.lock().has_bank(4));
    }

    #[tokio::test]
    async fn test_faulted_input_read_falls_back_to_offset_cell() {
        let exec = executor(1.0);
        let conn = open_connection();
        exec.store.lock().write_register(1, 13, 500);

        let request = TransactionRequest::read(1, 4, 10, 1);
        let result = exec.execute(&request, &conn).await;
        assert!(matches!(result, Err(BusError::SimulatedCommunication { device: 1, function: 4 })));
        assert_eq!(exec.fallback(&request), vec![RegisterValue::Word(500)]);

        // Holding registers read the unshifted cell
        let holding = exec.fallback(&TransactionRequest::read(1, 3, 13, 1));
        assert_eq!(holding, vec![RegisterValue::Word(500)]);
    }

    #[tokio::test]
    async fn test_unsupported_and_invalid_requests() {
        let exec = executor(0.0);
        let conn = open_connection();

        let unsupported = exec.execute(&TransactionRequest::read(1, 99, 0, 1), &conn).await;
        assert!(matches!(unsupported, Err(BusError::UnsupportedFunction(99))));

        let zero = exec.execute(&TransactionRequest::read(1, 3, 0, 0), &conn).await;
        assert!(matches!(zero, Err(BusError::InvalidRequest(_))));

        let too_many = exec.execute(&TransactionRequest::read(1, 3, 0, 126), &conn).await;
        assert!(matches!(too_many, Err(BusError::InvalidRequest(_))));
    }

    #[test]
    fn test_fallback_has_no_side_effects() {
        let exec = executor(0.0);
        let values = exec.fallback(&TransactionRequest::read(7, 3, 0, 2));
        assert_eq!(values, vec![RegisterValue::Word(0), RegisterValue::Word(0)]);
        assert!(!exec.store.lock().has_bank(7));
    }

    #[test]
    fn test_request_data() {
        assert_eq!(TransactionRequest::read(1, 3, 0x10, 4).request_data(), "00100004");
        assert_eq!(TransactionRequest::write_register(1, 0x10, 1234).request_data(), "001004d2");
    }
}
