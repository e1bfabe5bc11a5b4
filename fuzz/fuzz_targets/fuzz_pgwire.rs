//! Fuzz target for the PostgreSQL message parsers.
//!
//! The first byte selects the direction; the rest is split into
//! packets at every 0xff byte so that packet-size dependent paths (the
//! lone SSL response byte) are reached as well.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pgtrace::format::MIN_RECORD_CAPACITY;
use pgtrace::stream::{ConnectionRecord, Direction, PacketContext};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let direction = if selector & 1 == 0 {
        Direction::Frontend
    } else {
        Direction::Backend
    };

    // Small limits so length aborts and truncation are both reachable
    let mut connection = ConnectionRecord::new(4096, MIN_RECORD_CAPACITY);
    let mut out = Vec::new();

    for (i, packet) in rest.split(|&b| b == 0xff).enumerate() {
        let ctx = PacketContext::new(i as i64, packet.len());
        for &byte in packet {
            if connection.dispatch(40000, direction, byte, &ctx, &mut out).is_err() {
                return;
            }
        }
        // Every flushed record stays within its capacity
        for line in out.split(|&b| b == b'\n') {
            assert!(line.len() < MIN_RECORD_CAPACITY);
        }
        out.clear();
    }
});
