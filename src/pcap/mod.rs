//! Capture input.
//!
//! Reads pcap and pcapng data from files or stdin, optionally
//! gzip-compressed, and yields raw link-layer frames.

mod packet;
mod reader;

pub use packet::RawPacket;
pub use reader::PcapReader;
