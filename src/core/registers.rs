//! Register Store
//!
//! Per-device register banks, seeded lazily with random values the first time
//! a device address is touched.

use crate::core::simulator::SimRng;
use std::collections::{BTreeMap, HashMap};

/// One device's registers, index -> value
pub type RegisterBank = BTreeMap<u16, u16>;

/// Register storage for every simulated device on the bus
#[derive(Debug)]
pub struct RegisterStore {
    banks: HashMap<u8, RegisterBank>,
    seed_count: u16,
    drift: u16,
    rng: SimRng,
}

impl RegisterStore {
    /// Create an empty store.
    ///
    /// `seed_count` consecutive registers are seeded on first access to a
    /// device; `drift` is the maximum signed change a read applies (0 makes
    /// reads pure).
    pub fn new(seed_count: u16, drift: u16, rng: SimRng) -> Self {
        Self {
            banks: HashMap::new(),
            seed_count,
            drift,
            rng,
        }
    }

    /// Bank for `device`, seeding it if this is the first access
    pub fn get_or_create_bank(&mut self, device: u8) -> &mut RegisterBank {
        let seed_count = self.seed_count;
        let rng = &self.rng;
        self.banks.entry(device).or_insert_with(|| {
            tracing::debug!(device, seed_count, "seeding register bank");
            (0..seed_count).map(|index| (index, rng.register_value())).collect()
        })
    }

    /// Whether a bank exists for `device`
    pub fn has_bank(&self, device: u8) -> bool {
        self.banks.contains_key(&device)
    }

    /// Read `count` registers starting at `start`.
    ///
    /// Indices never written before read as 0 and that 0 is stored. Existing
    /// values drift by up to `±drift`, clamped to the u16 range, and the
    /// drifted value is written back.
    pub fn read_registers(&mut self, device: u8, start: u16, count: u16) -> Vec<u16> {
        let drift = self.drift;
        let rng = self.rng.clone();
        let bank = self.get_or_create_bank(device);

        (0..count)
            .map(|i| {
                let index = start.wrapping_add(i);
                match bank.get_mut(&index) {
                    Some(value) => {
                        if drift > 0 {
                            *value = apply_drift(*value, rng.drift(drift));
                        }
                        *value
                    }
                    None => {
                        bank.insert(index, 0);
                        0
                    }
                }
            })
            .collect()
    }

    /// Read without drift or any mutation; unknown cells read as 0
    pub fn peek_registers(&self, device: u8, start: u16, count: u16) -> Vec<u16> {
        let bank = self.banks.get(&device);
        (0..count)
            .map(|i| {
                let index = start.wrapping_add(i);
                bank.and_then(|b| b.get(&index)).copied().unwrap_or(0)
            })
            .collect()
    }

    /// Store `value` verbatim
    pub fn write_register(&mut self, device: u8, address: u16, value: u16) {
        self.get_or_create_bank(device).insert(address, value);
    }

    /// Copy of a device bank, if one exists
    pub fn snapshot(&self, device: u8) -> Option<RegisterBank> {
        self.banks.get(&device).cloned()
    }

    /// Device addresses with a bank
    pub fn devices(&self) -> Vec<u8> {
        let mut devices: Vec<u8> = self.banks.keys().copied().collect();
        devices.sort_unstable();
        devices
    }
}

fn apply_drift(value: u16, delta: i32) -> u16 {
    let drifted = (i32::from(value) + delta).clamp(0, i32::from(u16::MAX));
    drifted as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(drift: u16) -> RegisterStore {
        RegisterStore::new(100, drift, SimRng::seeded(11))
    }

    #[test]
    fn test_first_access_seeds_bank() {
        let mut store = store(5);
        assert!(!store.has_bank(2));

        let values = store.read_registers(2, 0, 10);
        assert_eq!(values.len(), 10);

        let bank = store.snapshot(2).unwrap();
        assert_eq!(bank.len(), 100);
        assert_eq!(bank.keys().next(), Some(&0));
        assert_eq!(bank.keys().last(), Some(&99));
    }

    #[test]
    fn test_unseeded_indices_read_zero_and_persist() {
        let mut store = store(5);
        let values = store.read_registers(1, 500, 3);
        assert_eq!(values, vec![0, 0, 0]);
        assert_eq!(store.snapshot(1).unwrap().get(&501), Some(&0));
    }

    #[test]
    fn test_write_then_read_within_drift() {
        let mut store = store(5);
        store.write_register(3, 0x10, 1234);
        let value = store.read_registers(3, 0x10, 1)[0];
        assert!((1229..=1239).contains(&value), "value {value} out of drift range");
    }

    #[test]
    fn test_drift_clamps_at_bounds() {
        let mut store = store(5);
        for _ in 0..50 {
            store.write_register(1, 0, 0);
            store.write_register(1, 1, u16::MAX);
            let values = store.read_registers(1, 0, 2);
            assert!(values[0] <= 5);
            assert!(values[1] >= u16::MAX - 5);
        }
    }

    #[test]
    fn test_pure_reads_without_drift() {
        let mut store = store(0);
        store.write_register(4, 7, 4242);
        for _ in 0..10 {
            assert_eq!(store.read_registers(4, 7, 1), vec![4242]);
        }
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut store = store(5);
        assert_eq!(store.peek_registers(9, 0, 2), vec![0, 0]);
        assert!(!store.has_bank(9));

        store.write_register(9, 0, 77);
        assert_eq!(store.peek_registers(9, 0, 1), vec![77]);
        assert_eq!(store.devices(), vec![9]);
    }
}
