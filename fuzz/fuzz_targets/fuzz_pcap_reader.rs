//! Fuzz target for capture file parsing.
//!
//! Tests handling of malformed inputs including:
//! - Magic byte detection (legacy, PCAPNG, gzip)
//! - Global and section headers
//! - Packet record headers (caplen, origlen, timestamps)

#![no_main]

use libfuzzer_sys::fuzz_target;
use pgtrace::pcap::PcapReader;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(reader) = PcapReader::from_reader(Box::new(Cursor::new(data.to_vec()))) else {
        return;
    };
    // Read until the first error - should never panic
    for packet in reader {
        if packet.is_err() {
            break;
        }
    }
});
