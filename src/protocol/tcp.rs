//! TCP header decoding.

use etherparse::TcpHeaderSlice;

use crate::error::ProtocolError;

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// Header length with no options (data offset = 5).
pub const MIN_HEADER_LEN: usize = 20;

/// TCP flags bit positions.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

/// The flags the tracer acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            syn: bits & flags::SYN != 0,
            ack: bits & flags::ACK != 0,
            fin: bits & flags::FIN != 0,
            rst: bits & flags::RST != 0,
        }
    }
}

/// A decoded TCP segment borrowing its payload from the captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub flags: TcpFlags,
    pub payload: &'a [u8],
}

pub fn parse(data: &[u8]) -> Result<TcpSegment<'_>, ProtocolError> {
    if data.len() < MIN_HEADER_LEN {
        return Err(ProtocolError::PacketTooShort {
            protocol: "tcp",
            needed: MIN_HEADER_LEN,
            have: data.len(),
        });
    }

    let data_offset = data[12] >> 4;
    let header_len = usize::from(data_offset) * 4;
    if header_len < MIN_HEADER_LEN {
        return Err(ProtocolError::InvalidField {
            protocol: "tcp",
            field: "data_offset",
            reason: format!("{data_offset} is below the minimum of 5"),
        });
    }
    if data.len() < header_len {
        return Err(ProtocolError::PacketTooShort {
            protocol: "tcp",
            needed: header_len,
            have: data.len(),
        });
    }

    let tcp = TcpHeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
        protocol: "tcp",
        field: "header",
        reason: e.to_string(),
    })?;

    Ok(TcpSegment {
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        seq: tcp.sequence_number(),
        ack: tcp.acknowledgment_number(),
        window: tcp.window_size(),
        flags: TcpFlags {
            syn: tcp.syn(),
            ack: tcp.ack(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        },
        payload: &data[tcp.slice().len()..],
    })
}
