//! Address selection policy
//!
//! Decides which of an interface's IPv6 addresses may be published and,
//! when several qualify, which one wins. Platform sources only enumerate;
//! this module is the single place the policy lives.

use std::net::Ipv6Addr;

/// An IPv6 address as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCandidate {
    /// The address itself
    pub address: Ipv6Addr,
    /// Privacy/temporary address (RFC 8981)
    pub temporary: bool,
    /// Preferred lifetime expired
    pub deprecated: bool,
}

impl AddressCandidate {
    /// A stable (non-temporary, non-deprecated) candidate
    pub fn stable(address: Ipv6Addr) -> Self {
        Self {
            address,
            temporary: false,
            deprecated: false,
        }
    }

    /// A temporary (privacy) candidate
    pub fn temporary(address: Ipv6Addr) -> Self {
        Self {
            address,
            temporary: true,
            deprecated: false,
        }
    }
}

/// Whether an address is routable beyond the local link and worth publishing
///
/// Only global unicast (`2000::/3`) qualifies. Within it, 6to4 (`2002::/16`)
/// and the retired 6bone range (`3ffe::/16`) are excluded.
pub fn is_publishable(address: &Ipv6Addr) -> bool {
    if address.is_loopback() || address.is_unspecified() || address.is_multicast() {
        return false;
    }

    let first = address.segments()[0];

    // fe80::/10 link-local, fec0::/10 site-local, fc00::/7 unique-local
    if (first & 0xffc0) == 0xfe80 || (first & 0xffc0) == 0xfec0 || (first & 0xfe00) == 0xfc00 {
        return false;
    }

    if first == 0x2002 || first == 0x3ffe {
        return false;
    }

    (first & 0xe000) == 0x2000
}

/// Pick the address to publish from an interface's candidates
///
/// Deterministic across calls with the same input regardless of order:
/// non-deprecated first, then non-temporary, then the shortest textual
/// form, then the numerically smallest address.
pub fn select_address(candidates: &[AddressCandidate]) -> Option<Ipv6Addr> {
    candidates
        .iter()
        .filter(|c| is_publishable(&c.address))
        .min_by_key(|c| {
            (
                c.deprecated,
                c.temporary,
                c.address.to_string().len(),
                u128::from(c.address),
            )
        })
        .map(|c| c.address)
}
