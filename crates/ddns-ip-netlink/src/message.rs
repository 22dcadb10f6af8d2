// # Route Message Codec
//
// Encodes RTM_GETLINK / RTM_GETADDR dump requests and decodes the kernel's
// replies into plain [`Interface`] and [`InterfaceAddress`] rows.
//
// A dump reply spans one or more datagrams; each datagram carries several
// netlink messages, each padded to a 4-byte boundary. The dump ends with
// NLMSG_DONE.

use crate::{Interface, InterfaceAddress};
use ddns_core::{Error, Result};
use netlink_packet_core::{
    NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::address::nlas::Nla as AddressNla;
use netlink_packet_route::link::nlas::Nla as LinkNla;
use netlink_packet_route::{AddressMessage, LinkMessage, RtnlMessage};
use std::net::Ipv6Addr;

/// Address family of IPv6 route messages
pub const AF_INET6: u8 = 10;

/// RTM_GETLINK dump: every interface with its index and name
pub fn link_request() -> RtnlMessage {
    RtnlMessage::GetLink(LinkMessage::default())
}

/// RTM_GETADDR dump restricted to IPv6
pub fn address_request() -> RtnlMessage {
    let mut message = AddressMessage::default();
    message.header.family = AF_INET6;
    RtnlMessage::GetAddress(message)
}

/// Serialize `message` as a dump request
pub fn dump_request(message: RtnlMessage, sequence_number: u32) -> Vec<u8> {
    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_DUMP;
    header.sequence_number = sequence_number;
    encode(header, message)
}

pub(crate) fn encode(header: NetlinkHeader, message: RtnlMessage) -> Vec<u8> {
    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
    packet.finalize();

    let mut buffer = vec![0; packet.buffer_len()];
    packet.serialize(&mut buffer[..]);
    buffer
}

/// Decode every message in one datagram into `out`
///
/// Returns `true` once NLMSG_DONE is seen.
pub fn parse_datagram(bytes: &[u8], out: &mut Vec<RtnlMessage>) -> Result<bool> {
    let mut offset = 0;

    while offset < bytes.len() {
        let packet = NetlinkMessage::<RtnlMessage>::deserialize(&bytes[offset..])
            .map_err(|e| Error::Other(format!("Malformed netlink message: {}", e)))?;
        let length = packet.header.length as usize;

        match packet.payload {
            NetlinkPayload::InnerMessage(message) => out.push(message),
            NetlinkPayload::Done { .. } => return Ok(true),
            NetlinkPayload::Error(err) => {
                return Err(Error::Other(format!("Netlink dump failed: {:?}", err)));
            }
            _ => {}
        }

        if length == 0 {
            break;
        }
        offset += (length + 3) & !3;
    }

    Ok(false)
}

pub fn decode_link(message: &LinkMessage) -> Option<Interface> {
    let name = message.nlas.iter().find_map(|nla| match nla {
        LinkNla::IfName(name) => Some(name.clone()),
        _ => None,
    })?;

    Some(Interface {
        index: message.header.index,
        name,
    })
}

/// Decode one RTM_NEWADDR message; non-IPv6 messages yield `None`
///
/// IFA_FLAGS carries the full 32-bit flag set; the header only has the low
/// 8 bits and is used when the attribute is absent.
pub fn decode_address(message: &AddressMessage) -> Option<InterfaceAddress> {
    if message.header.family != AF_INET6 {
        return None;
    }

    let mut address = None;
    let mut local = None;
    let mut flags = u32::from(message.header.flags);

    for nla in &message.nlas {
        match nla {
            AddressNla::Address(bytes) => address = ipv6_from_bytes(bytes),
            AddressNla::Local(bytes) => local = ipv6_from_bytes(bytes),
            AddressNla::Flags(value) => flags = *value,
            _ => {}
        }
    }

    Some(InterfaceAddress {
        index: message.header.index,
        address: address.or(local)?,
        prefix_len: message.header.prefix_len,
        scope: message.header.scope,
        flags,
    })
}

fn ipv6_from_bytes(bytes: &[u8]) -> Option<Ipv6Addr> {
    let octets: [u8; 16] = bytes.try_into().ok()?;
    Some(Ipv6Addr::from(octets))
}
