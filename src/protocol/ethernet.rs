//! Ethernet II framing.

use etherparse::Ethernet2HeaderSlice;

use crate::error::ProtocolError;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Destination MAC, source MAC, EtherType.
pub const HEADER_LEN: usize = 14;

/// Well-known EtherTypes.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
}

/// An Ethernet II frame split into EtherType and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub ether_type: u16,
    pub payload: &'a [u8],
}

pub fn parse(data: &[u8]) -> Result<EthernetFrame<'_>, ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::PacketTooShort {
            protocol: "ethernet",
            needed: HEADER_LEN,
            have: data.len(),
        });
    }

    let eth = Ethernet2HeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
        protocol: "ethernet",
        field: "header",
        reason: e.to_string(),
    })?;

    Ok(EthernetFrame {
        ether_type: eth.ether_type().0,
        payload: &data[eth.slice().len()..],
    })
}
