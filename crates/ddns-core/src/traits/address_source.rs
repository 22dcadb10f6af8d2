// # Address Source Trait
//
// Defines the interface for reading the IPv6 address of a local interface.
//
// ## Implementations
//
// - Netlink (Linux): `ddns-ip-netlink` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::AddressSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* AddressSource implementation */;
//
//     let address = source.read("eth0").await?;
//     println!("eth0 -> {}", address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv6Addr;

/// Trait for address source implementations
///
/// A source answers one question: which globally routable IPv6 address does
/// this interface carry right now? It is queried once per interface per tick.
///
/// # Contract
///
/// - Never return link-local, loopback, or other non-global addresses. Use
///   [`crate::address::select_address`] to apply the shared policy.
/// - When several addresses qualify, the choice must be deterministic so
///   consecutive ticks do not flip between them.
/// - No side effects: the source only observes OS state.
///
/// # Errors
///
/// - [`crate::Error::InterfaceNotFound`]: no interface with that name
/// - [`crate::Error::NoAddressAvailable`]: the interface has no qualifying address
///
/// Both are recoverable; the sync loop skips the interface for this tick.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Read the address to publish for `interface`
    async fn read(&self, interface: &str) -> Result<Ipv6Addr, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
