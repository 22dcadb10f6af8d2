// # Netlink Address Source
//
// This crate reads interface addresses from the kernel over rtnetlink on
// Linux.
//
// ## How It Works
//
// Each read performs two dumps on a NETLINK_ROUTE socket:
// 1. RTM_GETLINK resolves the interface name to its index
// 2. RTM_GETADDR (AF_INET6) lists every IPv6 address with its IFA_F_* flags
//
// The flags carry what the selection policy needs: temporary (privacy)
// addresses, deprecated addresses, and addresses still in or failed at
// duplicate address detection.
//
// Both dumps sit behind [`AddressTable`], so the source can be driven by
// fixture tables in tests.
//
// ## Platform Support
//
// Message decoding is portable; the socket only exists on Linux, and
// [`NetlinkAddressSource::new`] reports a configuration error elsewhere.

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
mod message;
#[cfg(target_os = "linux")]
mod socket;

pub use message::{decode_address, decode_link, parse_datagram};
#[cfg(target_os = "linux")]
pub use socket::KernelTable;

use async_trait::async_trait;
use ddns_core::address::{AddressCandidate, select_address};
use ddns_core::config::validate_interface_name;
use ddns_core::traits::AddressSource;
use ddns_core::{Error, Result};
use std::net::Ipv6Addr;
use tracing::debug;

/// Privacy address (RFC 8981)
pub const IFA_F_TEMPORARY: u32 = 0x01;
/// Duplicate address detection failed
pub const IFA_F_DADFAILED: u32 = 0x08;
/// Preferred lifetime expired
pub const IFA_F_DEPRECATED: u32 = 0x20;
/// Duplicate address detection still running
pub const IFA_F_TENTATIVE: u32 = 0x40;

/// A network interface as listed by RTM_GETLINK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: u32,
    pub name: String,
}

/// One IPv6 address as listed by RTM_GETADDR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub index: u32,
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub scope: u8,
    pub flags: u32,
}

impl InterfaceAddress {
    /// Whether the kernel would use this address for new connections
    pub fn is_usable(&self) -> bool {
        self.flags & (IFA_F_TENTATIVE | IFA_F_DADFAILED) == 0
    }

    pub fn candidate(&self) -> AddressCandidate {
        AddressCandidate {
            address: self.address,
            temporary: self.flags & IFA_F_TEMPORARY != 0,
            deprecated: self.flags & IFA_F_DEPRECATED != 0,
        }
    }
}

/// Snapshot of the kernel's link and address tables
#[async_trait]
pub trait AddressTable: Send + Sync {
    async fn interfaces(&self) -> Result<Vec<Interface>>;

    async fn addresses(&self) -> Result<Vec<InterfaceAddress>>;
}

/// Address source backed by rtnetlink dumps
pub struct NetlinkAddressSource {
    table: Box<dyn AddressTable>,
}

impl NetlinkAddressSource {
    /// Create a source reading the live kernel tables
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self> {
        Ok(Self::with_table(KernelTable))
    }

    /// Create a source reading the live kernel tables
    #[cfg(not(target_os = "linux"))]
    pub fn new() -> Result<Self> {
        Err(Error::config(
            "netlink address source is only supported on Linux",
        ))
    }

    /// Create a source over any table (used by tests)
    pub fn with_table(table: impl AddressTable + 'static) -> Self {
        Self {
            table: Box::new(table),
        }
    }
}

#[async_trait]
impl AddressSource for NetlinkAddressSource {
    async fn read(&self, interface: &str) -> Result<Ipv6Addr> {
        validate_interface_name(interface)?;

        let index = self
            .table
            .interfaces()
            .await?
            .into_iter()
            .find(|link| link.name == interface)
            .map(|link| link.index)
            .ok_or_else(|| Error::interface_not_found(interface))?;

        let rows: Vec<InterfaceAddress> = self
            .table
            .addresses()
            .await?
            .into_iter()
            .filter(|row| row.index == index)
            .collect();

        let candidates: Vec<AddressCandidate> = rows
            .iter()
            .filter(|row| row.is_usable())
            .map(InterfaceAddress::candidate)
            .collect();

        let selected = select_address(&candidates).ok_or_else(|| {
            Error::no_address(format!(
                "{} has no global IPv6 address ({} address(es) listed)",
                interface,
                rows.len()
            ))
        })?;

        debug!(
            interface = interface,
            index = index,
            listed = rows.len(),
            usable = candidates.len(),
            selected = %selected,
            "Read interface address"
        );

        Ok(selected)
    }

    fn source_name(&self) -> &'static str {
        "netlink"
    }
}
