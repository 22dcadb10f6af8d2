// # Route Socket
//
// One NETLINK_ROUTE socket per dump. The socket is blocking, so every dump
// runs on the blocking pool.

use crate::message::{
    address_request, decode_address, decode_link, dump_request, link_request, parse_datagram,
};
use crate::{AddressTable, Interface, InterfaceAddress};
use async_trait::async_trait;
use ddns_core::{Error, Result};
use netlink_packet_route::RtnlMessage;
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{Socket, SocketAddr};
use tracing::trace;

const RECEIVE_BUFFER_SIZE: usize = 32 * 1024;

/// Live kernel tables over rtnetlink
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelTable;

#[async_trait]
impl AddressTable for KernelTable {
    async fn interfaces(&self) -> Result<Vec<Interface>> {
        let messages = dump_blocking(link_request()).await?;
        Ok(messages
            .iter()
            .filter_map(|message| match message {
                RtnlMessage::NewLink(link) => decode_link(link),
                _ => None,
            })
            .collect())
    }

    async fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        let messages = dump_blocking(address_request()).await?;
        Ok(messages
            .iter()
            .filter_map(|message| match message {
                RtnlMessage::NewAddress(address) => decode_address(address),
                _ => None,
            })
            .collect())
    }
}

async fn dump_blocking(request: RtnlMessage) -> Result<Vec<RtnlMessage>> {
    tokio::task::spawn_blocking(move || dump(request))
        .await
        .map_err(|e| Error::Other(format!("Netlink dump task failed: {}", e)))?
}

fn dump(request: RtnlMessage) -> Result<Vec<RtnlMessage>> {
    let mut socket = Socket::new(NETLINK_ROUTE)?;
    socket.bind_auto()?;
    socket.connect(&SocketAddr::new(0, 0))?;

    let request = dump_request(request, 1);
    socket.send(&request, 0)?;

    let mut messages = Vec::new();
    let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        let size = socket.recv(&mut &mut buffer[..], 0)?;
        trace!(bytes = size, "Received netlink datagram");
        if parse_datagram(&buffer[..size], &mut messages)? {
            return Ok(messages);
        }
    }
}
