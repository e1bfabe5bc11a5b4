//! Incremental big-endian 32-bit integer decoding.

/// Builds a network-order `i32` from bytes delivered one at a time.
///
/// Message lengths are the only multi-byte fields the framer needs to read,
/// and they can straddle packet boundaries, so the value is assembled
/// across calls rather than from a slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Int32Accumulator {
    filled: u8,
    value: u32,
}

impl Int32Accumulator {
    pub const fn new() -> Self {
        Self {
            filled: 0,
            value: 0,
        }
    }

    /// Add the next byte, most significant first.
    ///
    /// Returns `true` once all four bytes are present. Bytes pushed after
    /// that are ignored.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.filled >= 4 {
            return true;
        }
        let shift = u32::from(3 - self.filled) * 8;
        self.value |= u32::from(byte) << shift;
        self.filled += 1;
        self.filled == 4
    }

    /// The value assembled so far, reinterpreted as signed.
    pub fn value(&self) -> i32 {
        self.value as i32
    }

    /// Whether the most significant byte is non-zero.
    ///
    /// No plausible message length has its top byte set.
    pub fn high_byte_set(&self) -> bool {
        self.value & 0xff00_0000 != 0
    }

    pub fn bytes_filled(&self) -> u8 {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == 4
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulate(bytes: [u8; 4]) -> Int32Accumulator {
        let mut acc = Int32Accumulator::new();
        assert!(!acc.push(bytes[0]));
        assert!(!acc.push(bytes[1]));
        assert!(!acc.push(bytes[2]));
        assert!(acc.push(bytes[3]));
        acc
    }

    #[test]
    fn test_big_endian_values() {
        let cases: [([u8; 4], u32); 10] = [
            ([0x00, 0x00, 0x00, 0x00], 0),
            ([0x00, 0x00, 0x00, 0x01], 1),
            ([0x00, 0x00, 0x00, 0x08], 8),
            ([0x00, 0x00, 0x00, 0xff], 0xff),
            ([0x00, 0x00, 0x01, 0xff], 0x1ff),
            ([0x00, 0x00, 0x09, 0xff], 2559),
            ([0x00, 0x00, 0xff, 0xff], 65535),
            ([0x00, 0xff, 0xff, 0xff], 0xff_ffff),
            ([0x01, 0xff, 0xff, 0xff], 0x1ff_ffff),
            ([0xff, 0xff, 0xff, 0xff], 4_294_967_295),
        ];

        for (bytes, expected) in cases {
            let acc = accumulate(bytes);
            assert_eq!(acc.value() as u32, expected, "bytes {bytes:02x?}");
            assert_eq!(acc.value() as u32, u32::from_be_bytes(bytes));
        }
    }

    #[test]
    fn test_signed_reinterpretation() {
        assert_eq!(accumulate([0xff, 0xff, 0xff, 0xff]).value(), -1);
        assert_eq!(accumulate([0x7f, 0xff, 0xff, 0xff]).value(), i32::MAX);
    }

    #[test]
    fn test_high_byte_detection() {
        let mut acc = Int32Accumulator::new();
        acc.push(0x00);
        assert!(!acc.high_byte_set());
        acc.push(0xff);
        assert!(!acc.high_byte_set());

        let mut acc = Int32Accumulator::new();
        acc.push(0x01);
        assert!(acc.high_byte_set());
    }

    #[test]
    fn test_push_after_complete_is_ignored() {
        let mut acc = accumulate([0x00, 0x00, 0x00, 0x10]);
        assert!(acc.push(0xff));
        assert_eq!(acc.value(), 16);
        assert_eq!(acc.bytes_filled(), 4);
    }

    #[test]
    fn test_reset() {
        let mut acc = accumulate([0x00, 0x00, 0x01, 0x00]);
        acc.reset();
        assert_eq!(acc.bytes_filled(), 0);
        assert_eq!(acc.value(), 0);
        assert!(!acc.is_complete());
    }
}
