// # DNS Provider Trait
//
// Defines the interface for writing DNS records via provider APIs.
//
// ## Implementations
//
// - Aliyun DNS: `ddns-provider-aliyun` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::{DnsProvider, RecordTarget, config::RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let target = RecordTarget::new(
//         "home.example.com",
//         "www",
//         RecordType::Aaaa,
//         "2001:db8::1".parse()?,
//     );
//     provider.upsert(&target).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv6Addr;

use crate::config::RecordType;

/// One record the sync loop wants to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTarget {
    /// Base domain (e.g., "example.com")
    pub domain: String,
    /// Record prefix ("@" for the bare domain, "www", "*", ...)
    pub prefix: String,
    /// Record type
    pub record_type: RecordType,
    /// Value to publish
    pub value: Ipv6Addr,
}

impl RecordTarget {
    /// Create a new record target
    pub fn new(
        domain: impl Into<String>,
        prefix: impl Into<String>,
        record_type: RecordType,
        value: Ipv6Addr,
    ) -> Self {
        Self {
            domain: domain.into(),
            prefix: prefix.into(),
            record_type,
            value,
        }
    }

    /// Fully-qualified record name
    pub fn fqdn(&self) -> String {
        if self.prefix == "@" {
            self.domain.clone()
        } else {
            format!("{}.{}", self.prefix, self.domain)
        }
    }
}

impl std::fmt::Display for RecordTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.fqdn(), self.record_type, self.value)
    }
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Record did not exist and was created
    Created,
    /// Record existed with another value and was overwritten
    Updated {
        /// The value the record held before
        previous: String,
    },
    /// Record already held the requested value (no-op)
    Unchanged,
}

/// Trait for DNS provider implementations
///
/// # Idempotency
///
/// `upsert` must be safe to repeat: calling it twice with the same target
/// succeeds both times and never produces a duplicate record. A provider
/// reporting "record already exists" for an identical value is a success.
///
/// # Trust Level: Untrusted
///
/// Providers execute API calls and report the result. They do not retry,
/// sleep, spawn tasks, or cache state between calls; the sync loop owns
/// scheduling and the last-known state.
///
/// # Errors
///
/// Map provider failures onto the shared taxonomy so the sync loop can react:
/// `Authentication` stops the loop, `InvalidDomain` disables one mapping,
/// `RateLimited` / `TransientNetwork` / `RecordConflict` retry next tick.
/// Credentials must never appear in error messages.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or overwrite the record described by `target`
    async fn upsert(&self, target: &RecordTarget) -> Result<UpsertOutcome, crate::Error>;

    /// Check that the configured credentials are accepted
    ///
    /// Called once at startup so bad credentials fail fast.
    async fn verify_credentials(&self) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
