//! Fuzz target for the frame decoding chain.
//!
//! Every input is treated as one Ethernet frame and run through the
//! whole manager: Ethernet, IPv4 and TCP header bounds, the sequence
//! gate, and the wire protocol parsers behind it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pgtrace::pcap::RawPacket;
use pgtrace::stream::TraceManager;

fuzz_target!(|data: &[u8]| {
    let mut manager = TraceManager::with_defaults();
    let packet = RawPacket::ethernet(1, 0, data.to_vec());
    let _ = manager.process_packet(&packet, &mut std::io::sink());
});
