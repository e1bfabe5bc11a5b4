//! Bounded trace line builder.

use std::io::{self, Write};

use crate::stream::Direction;

/// Default capacity of a trace record, newline included.
pub const DEFAULT_RECORD_CAPACITY: usize = 4096;

/// Smallest capacity that still fits a record prefix with the longest
/// message name and length field.
pub const MIN_RECORD_CAPACITY: usize = 64;

/// Largest record capacity; larger requests are lowered to it.
pub const MAX_RECORD_CAPACITY: usize = 1 << 20;

/// Appended once when a record runs out of room.
const TRUNCATION_MARKER: &[u8] = b"...";

/// Render a raw payload byte as a printable character.
///
/// Printable ASCII and space pass through; anything else becomes `.`.
#[inline]
pub fn sanitize_byte(byte: u8) -> u8 {
    if byte == b' ' || byte.is_ascii_graphic() {
        byte
    } else {
        b'.'
    }
}

/// One output line under construction.
///
/// Layout: `<timestamp_us> <port> <f|b>e <name>[ <length>[ <payload>]]`.
/// The buffer never grows past its capacity; once full, a `...` marker is
/// appended and all further bytes are dropped until the next [`start`].
///
/// The backing storage is allocated on first use, so idle records cost
/// nothing beyond the struct itself.
///
/// [`start`]: TraceRecord::start
#[derive(Debug, Clone)]
pub struct TraceRecord {
    buf: Vec<u8>,
    capacity: usize,
    truncated: bool,
}

impl Default for TraceRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRecord {
    /// Create a record with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RECORD_CAPACITY)
    }

    /// Create a record holding at most `capacity` bytes including the newline.
    ///
    /// The capacity is clamped to
    /// [`MIN_RECORD_CAPACITY`]`..=`[`MAX_RECORD_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity: capacity.clamp(MIN_RECORD_CAPACITY, MAX_RECORD_CAPACITY),
            truncated: false,
        }
    }

    /// Begin a new record, discarding anything not yet flushed.
    pub fn start(&mut self, timestamp_us: i64, port: u16, direction: Direction, name: &str) {
        self.clear();
        self.push_decimal(u64::try_from(timestamp_us).unwrap_or(0));
        self.push(b' ');
        self.push_decimal(u64::from(port));
        self.push(b' ');
        self.push(direction.tag());
        self.push(b'e');
        self.push(b' ');
        for &byte in name.as_bytes() {
            self.push(byte);
        }
    }

    /// Append the decimal message length.
    pub fn append_length(&mut self, length: u32) {
        self.push(b' ');
        self.push_decimal(u64::from(length));
    }

    /// Append the separator between the length and the payload.
    pub fn begin_payload(&mut self) {
        self.push(b' ');
    }

    /// Append one raw payload byte, sanitized.
    #[inline]
    pub fn append_byte(&mut self, byte: u8) {
        self.push(sanitize_byte(byte));
    }

    /// Write the record followed by a newline and reset it.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.buf.push(b'\n');
        let result = out.write_all(&self.buf);
        self.clear();
        result
    }

    /// Drop the current contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.truncated = false;
    }

    /// Bytes written so far (no trailing newline).
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the truncation marker has been appended.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Maximum flushed size in bytes, newline included.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last offset at which a content byte may still be written.
    fn limit(&self) -> usize {
        self.capacity - TRUNCATION_MARKER.len() - 1
    }

    #[inline]
    fn push(&mut self, byte: u8) {
        if self.truncated {
            return;
        }
        if self.buf.len() < self.limit() {
            if self.buf.capacity() == 0 {
                self.buf.reserve_exact(self.capacity);
            }
            self.buf.push(byte);
        } else {
            self.buf.extend_from_slice(TRUNCATION_MARKER);
            self.truncated = true;
        }
    }

    fn push_decimal(&mut self, mut value: u64) {
        let mut digits = [0u8; 20];
        let mut start = digits.len();
        loop {
            start -= 1;
            digits[start] = b'0' + (value % 10) as u8;
            value /= 10;
            if value == 0 {
                break;
            }
        }
        for &digit in &digits[start..] {
            self.push(digit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flushed(record: &mut TraceRecord) -> String {
        let mut out = Vec::new();
        record.flush(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_sanitize_byte() {
        assert_eq!(sanitize_byte(b'A'), b'A');
        assert_eq!(sanitize_byte(b'~'), b'~');
        assert_eq!(sanitize_byte(b'!'), b'!');
        assert_eq!(sanitize_byte(b' '), b' ');
        assert_eq!(sanitize_byte(0x00), b'.');
        assert_eq!(sanitize_byte(b'\n'), b'.');
        assert_eq!(sanitize_byte(b'\t'), b'.');
        assert_eq!(sanitize_byte(0x7f), b'.');
        assert_eq!(sanitize_byte(0xff), b'.');
    }

    #[test]
    fn test_prefix_layout() {
        let mut record = TraceRecord::new();
        record.start(1_700_000_000_123_456, 54321, Direction::Frontend, "Query");
        assert_eq!(flushed(&mut record), "1700000000123456 54321 fe Query\n");

        record.start(0, 0, Direction::Backend, "SSLResponseNo");
        assert_eq!(flushed(&mut record), "0 0 be SSLResponseNo\n");
    }

    #[test]
    fn test_length_and_payload() {
        let mut record = TraceRecord::new();
        record.start(7, 255, Direction::Frontend, "test");
        record.append_length(12);
        record.begin_payload();
        for byte in [0x00, 0x00, 0x00, 0x05, b'o', b'k', b' ', 0x80] {
            record.append_byte(byte);
        }
        assert_eq!(flushed(&mut record), "7 255 fe test 12 ....ok .\n");
    }

    #[test]
    fn test_negative_timestamp_clamped() {
        let mut record = TraceRecord::new();
        record.start(-5, 1, Direction::Backend, "NoData");
        assert_eq!(flushed(&mut record), "0 1 be NoData\n");
    }

    #[test]
    fn test_truncation_marker() {
        let mut record = TraceRecord::with_capacity(MIN_RECORD_CAPACITY);
        record.start(1, 2, Direction::Backend, "DataRow");
        record.append_length(10_000);
        record.begin_payload();
        for _ in 0..10_000 {
            record.append_byte(b'x');
        }
        assert!(record.is_truncated());

        let line = flushed(&mut record);
        assert_eq!(line.len(), MIN_RECORD_CAPACITY);
        assert!(line.ends_with("xxx...\n"));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(!line.contains('\0'));
        assert!(!record.is_truncated());
    }

    #[test]
    fn test_small_capacity_is_raised() {
        let record = TraceRecord::with_capacity(3);
        assert_eq!(record.capacity(), MIN_RECORD_CAPACITY);
    }

    #[test]
    fn test_huge_capacity_is_lowered() {
        let mut record = TraceRecord::with_capacity(usize::MAX);
        assert_eq!(record.capacity(), MAX_RECORD_CAPACITY);

        record.start(1, 1, Direction::Frontend, "Query");
        assert_eq!(record.as_bytes(), b"1 1 fe Query");
    }

    #[test]
    fn test_allocates_lazily() {
        let mut record = TraceRecord::new();
        assert_eq!(record.buf.capacity(), 0);
        record.start(1, 1, Direction::Frontend, "Sync");
        assert!(record.buf.capacity() >= DEFAULT_RECORD_CAPACITY);
    }

    #[test]
    fn test_start_discards_previous() {
        let mut record = TraceRecord::new();
        record.start(1, 1, Direction::Frontend, "Parse");
        record.append_length(99);
        record.start(2, 2, Direction::Frontend, "Sync");
        assert_eq!(record.as_bytes(), b"2 2 fe Sync");
    }
}
