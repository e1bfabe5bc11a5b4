//! IPv4 header decoding.

use etherparse::Ipv4HeaderSlice;

use crate::error::ProtocolError;

/// Header length with no options (IHL = 5).
pub const MIN_HEADER_LEN: usize = 20;

/// An IPv4 packet reduced to what the TCP layer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet<'a> {
    pub protocol: u8,
    /// Fragment offset in 8-byte units; non-zero means no transport header.
    pub fragment_offset: u16,
    /// Bytes after the header, bounded by the total length field so that
    /// Ethernet padding is never included.
    pub payload: &'a [u8],
}

pub fn parse(data: &[u8]) -> Result<Ipv4Packet<'_>, ProtocolError> {
    if data.len() < MIN_HEADER_LEN {
        return Err(ProtocolError::PacketTooShort {
            protocol: "ipv4",
            needed: MIN_HEADER_LEN,
            have: data.len(),
        });
    }

    let ihl = data[0] & 0x0f;
    let header_len = usize::from(ihl) * 4;
    if header_len < MIN_HEADER_LEN {
        return Err(ProtocolError::InvalidField {
            protocol: "ipv4",
            field: "ihl",
            reason: format!("{ihl} is below the minimum of 5"),
        });
    }
    if data.len() < header_len {
        return Err(ProtocolError::PacketTooShort {
            protocol: "ipv4",
            needed: header_len,
            have: data.len(),
        });
    }

    let ipv4 = Ipv4HeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
        protocol: "ipv4",
        field: "header",
        reason: e.to_string(),
    })?;

    let total_len = usize::from(ipv4.total_len());
    if total_len < header_len {
        return Err(ProtocolError::InvalidField {
            protocol: "ipv4",
            field: "total_length",
            reason: format!("{total_len} is shorter than the {header_len}-byte header"),
        });
    }

    let payload = data
        .get(header_len..total_len)
        .ok_or(ProtocolError::PacketTooShort {
            protocol: "ipv4",
            needed: total_len,
            have: data.len(),
        })?;

    Ok(Ipv4Packet {
        protocol: ipv4.protocol().0,
        fragment_offset: ipv4.fragments_offset().value(),
        payload,
    })
}
