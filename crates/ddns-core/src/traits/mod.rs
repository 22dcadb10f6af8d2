//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces the sync loop consumes.
//!
//! - [`AddressSource`]: Read the current IPv6 address of an interface
//! - [`DnsProvider`]: Upsert DNS records via a provider API

pub mod address_source;
pub mod dns_provider;

pub use address_source::AddressSource;
pub use dns_provider::{DnsProvider, RecordTarget, UpsertOutcome};
