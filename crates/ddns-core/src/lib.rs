// # ddns-core
//
// Core library for the IPv6 DDNS sync loop.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping AAAA records in
// step with the addresses of local interfaces:
// - **AddressSource**: Trait for reading an interface's publishable IPv6 address
// - **DnsProvider**: Trait for upserting DNS records via provider APIs
// - **LastKnownState**: In-memory change detector (one entry per interface)
// - **SyncEngine**: Polling loop that ties the three together
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Polling**: One tick per interval; ticks never overlap
// 3. **Commit After Success**: State only advances once every record is written
// 4. **Library-First**: All core functionality can be used as a library

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use address::{AddressCandidate, is_publishable, select_address};
pub use config::{Credentials, DdnsConfig, DnsConfig, RecordType, SyncConfig};
pub use engine::{DomainMapping, EngineEvent, EngineSettings, SyncEngine, TickReport};
pub use error::{Error, Result, Severity};
pub use state::{LastKnownState, StateEntry};
pub use traits::{AddressSource, DnsProvider, RecordTarget, UpsertOutcome};
