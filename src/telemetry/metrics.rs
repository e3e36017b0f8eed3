//! Forwarding statistics.
//!
//! Thread-safe counters tracking how the fast path disposed of packets,
//! globally and per outgoing interface.

use crate::dataplane::IfIndex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface transmit statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
    pub tx_errors: Counter,
}

impl InterfaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records frames handed to the link layer.
    pub fn record_tx(&self, frames: usize, bytes: usize) {
        self.tx_packets.add(frames as u64);
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_tx_error(&self) {
        self.tx_errors.inc();
    }
}

/// Fast-path statistics, one counter per outcome.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    interfaces: RwLock<HashMap<IfIndex, InterfaceStats>>,

    /// Packets that passed the eligibility check
    pub total: Counter,
    /// Packets handed back to the full input path
    pub not_eligible: Counter,
    /// Packets fully transmitted
    pub forwarded: Counter,
    /// Packets transmitted without leaving the fast path
    pub fast_forwarded: Counter,
    /// Packets with no usable route (no route, reject, discard)
    pub cant_forward: Counter,
    /// Packets without any matching route
    pub no_route: Counter,
    /// Packets dropped by a policy hook
    pub hook_dropped: Counter,
    /// Packets whose TTL ran out
    pub ttl_expired: Counter,
    /// Packets too big for the MTU with DF set
    pub cant_frag: Counter,
    /// Packets sent as a complete fragment train
    pub fragmented: Counter,
    /// Packets lost to transmit or fragmentation failure
    pub output_dropped: Counter,
    /// ICMP redirects sent
    pub redirects_sent: Counter,
    /// Packets refused because of IP options
    pub options_rejected: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records transmitted frames on an interface, registering it on first use.
    pub fn record_tx(&self, ifindex: IfIndex, frames: usize, bytes: usize) {
        self.with_stats(ifindex, |stats| stats.record_tx(frames, bytes));
    }

    /// Records a transmit error on an interface.
    pub fn record_tx_error(&self, ifindex: IfIndex) {
        self.with_stats(ifindex, InterfaceStats::record_tx_error);
    }

    fn with_stats(&self, ifindex: IfIndex, f: impl FnOnce(&InterfaceStats)) {
        if let Ok(interfaces) = self.interfaces.read() {
            if let Some(stats) = interfaces.get(&ifindex) {
                f(stats);
                return;
            }
        }
        if let Ok(mut interfaces) = self.interfaces.write() {
            f(interfaces.entry(ifindex).or_default());
        }
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("total".into(), self.total.get()),
            ("not_eligible".into(), self.not_eligible.get()),
            ("forwarded".into(), self.forwarded.get()),
            ("fast_forwarded".into(), self.fast_forwarded.get()),
            ("cant_forward".into(), self.cant_forward.get()),
            ("no_route".into(), self.no_route.get()),
            ("hook_dropped".into(), self.hook_dropped.get()),
            ("ttl_expired".into(), self.ttl_expired.get()),
            ("cant_frag".into(), self.cant_frag.get()),
            ("fragmented".into(), self.fragmented.get()),
            ("output_dropped".into(), self.output_dropped.get()),
            ("redirects_sent".into(), self.redirects_sent.get()),
            ("options_rejected".into(), self.options_rejected.get()),
        ];

        if let Ok(interfaces) = self.interfaces.read() {
            for (index, stats) in interfaces.iter() {
                result.extend([
                    (format!("if{}_tx_packets", index), stats.tx_packets.get()),
                    (format!("if{}_tx_bytes", index), stats.tx_bytes.get()),
                    (format!("if{}_tx_errors", index), stats.tx_errors.get()),
                ]);
            }
        }

        result
    }

    /// Value of a single exported metric
    pub fn get(&self, name: &str) -> Option<u64> {
        self.export()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}
