//! Packet Log
//!
//! Bounded, newest-first trace of framed packets with an optional durable
//! mirror.

use crate::core::logger::PacketMirror;
use crate::core::packet::{Packet, PacketKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of packets retained
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded packet trace.
///
/// All mutations happen under one lock, so `append`, `append_pair` and
/// `clear` are atomic with respect to each other.
#[derive(Debug)]
pub struct PacketLog {
    packets: Mutex<VecDeque<Packet>>,
    capacity: usize,
    mirror: Option<PacketMirror>,
}

impl Default for PacketLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PacketLog {
    /// Create an in-memory log
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            packets: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            mirror: None,
        }
    }

    /// Mirror every appended packet to durable storage
    #[must_use]
    pub fn with_mirror(mut self, mirror: PacketMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Durable mirror, if any
    pub fn mirror(&self) -> Option<&PacketMirror> {
        self.mirror.as_ref()
    }

    /// Maximum number of retained packets
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front, evicting the oldest entry when full
    pub fn append(&self, packet: Packet) {
        let mut packets = self.packets.lock();
        if let Some(mirror) = &self.mirror {
            mirror.record(&packet);
        }
        packets.push_front(packet);
        packets.truncate(self.capacity);
    }

    /// Insert a request and its response as one unit, request first.
    ///
    /// The mirror is fed under the log lock so it sees the same order.
    pub fn append_pair(&self, request: Packet, response: Packet) {
        let mut packets = self.packets.lock();
        if let Some(mirror) = &self.mirror {
            mirror.record(&request);
            mirror.record(&response);
        }
        packets.push_front(request);
        packets.push_front(response);
        packets.truncate(self.capacity);
    }

    /// All packets, newest first
    pub fn list(&self) -> Vec<Packet> {
        self.packets.lock().iter().cloned().collect()
    }

    /// Up to `limit` newest packets
    pub fn list_limited(&self, limit: usize) -> Vec<Packet> {
        self.packets.lock().iter().take(limit).cloned().collect()
    }

    /// Remove every packet
    pub fn clear(&self) {
        self.packets.lock().clear();
    }

    /// Get packet count
    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> PacketLogStats {
        let packets = self.packets.lock();
        PacketLogStats {
            total_packets: packets.len(),
            requests: packets.iter().filter(|p| p.kind == PacketKind::Request).count(),
            responses: packets.iter().filter(|p| p.kind == PacketKind::Response).count(),
            invalid: packets.iter().filter(|p| !p.is_valid).count(),
            capacity: self.capacity,
        }
    }
}

/// Packet log statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketLogStats {
    /// Packets currently retained
    pub total_packets: usize,
    /// Retained request packets
    pub requests: usize,
    /// Retained response packets, exceptions included
    pub responses: usize,
    /// Retained packets with `isValid: false`
    pub invalid: usize,
    /// Maximum number of retained packets
    pub capacity: usize,
}
