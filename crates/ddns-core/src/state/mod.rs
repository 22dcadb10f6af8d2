// # Last-Known State
//
// In-memory record of the address last confirmed written to DNS for each
// interface. This is also the change detector: the sync loop asks
// `should_update` before touching the provider, and calls `commit` only
// after every prefix upsert for that interface succeeded.
//
// ## Crash Behavior
//
// - Nothing is persisted; the map starts empty on every process start
// - The first tick after a restart re-syncs every interface
// - That re-sync is harmless because upserts are idempotent

use std::collections::HashMap;
use std::net::Ipv6Addr;

/// What was last synced for one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    /// The address confirmed written to DNS
    pub address: Ipv6Addr,
    /// When the write was confirmed
    pub synced_at: chrono::DateTime<chrono::Utc>,
}

/// Interface name -> last successfully synced address
///
/// Owned by the sync loop; there is exactly one writer.
#[derive(Debug, Clone, Default)]
pub struct LastKnownState {
    entries: HashMap<String, StateEntry>,
}

impl LastKnownState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `address` must be pushed to DNS for `interface`
    ///
    /// True when nothing was synced yet or the synced address differs.
    pub fn should_update(&self, interface: &str, address: Ipv6Addr) -> bool {
        self.entries
            .get(interface)
            .is_none_or(|entry| entry.address != address)
    }

    /// Record a confirmed write
    pub fn commit(&mut self, interface: &str, address: Ipv6Addr) {
        self.entries.insert(
            interface.to_string(),
            StateEntry {
                address,
                synced_at: chrono::Utc::now(),
            },
        );
    }

    /// Last synced address for `interface`
    pub fn last_address(&self, interface: &str) -> Option<Ipv6Addr> {
        self.entries.get(interface).map(|entry| entry.address)
    }

    /// Full entry for `interface`
    pub fn entry(&self, interface: &str) -> Option<&StateEntry> {
        self.entries.get(interface)
    }

    /// Number of interfaces with a synced address
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was synced yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
