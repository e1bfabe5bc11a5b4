//! Frame decoding down to the TCP payload.
//!
//! Only Ethernet II / IPv4 / TCP is understood. Anything else is reported
//! as "not a TCP segment" rather than as an error, since captures routinely
//! contain ARP, IPv6 and UDP alongside the traffic being traced.

mod ethernet;
mod ipv4;
mod tcp;

// Test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;

pub use ethernet::{ethertype, EthernetFrame, LINKTYPE_ETHERNET};
pub use ipv4::Ipv4Packet;
pub use tcp::{flags, TcpFlags, TcpSegment, IP_PROTO_TCP};

use crate::error::ProtocolError;

/// Decode an Ethernet frame into its TCP segment.
///
/// Returns `Ok(None)` for frames that are well-formed but not IPv4/TCP,
/// and for IPv4 fragments past the first, which carry no TCP header.
pub fn decode_segment(data: &[u8]) -> Result<Option<TcpSegment<'_>>, ProtocolError> {
    let frame = ethernet::parse(data)?;
    if frame.ether_type != ethertype::IPV4 {
        return Ok(None);
    }

    let packet = ipv4::parse(frame.payload)?;
    if packet.protocol != IP_PROTO_TCP || packet.fragment_offset != 0 {
        return Ok(None);
    }

    tcp::parse(packet.payload).map(Some)
}
