use crate::protocol::LINKTYPE_ETHERNET;

/// One captured frame, as read from the capture.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Frame number (1-indexed).
    pub frame_number: u64,

    /// Capture timestamp in microseconds since epoch.
    pub timestamp_us: i64,

    /// Bytes actually captured.
    pub captured_length: u32,

    /// Length on the wire.
    pub original_length: u32,

    /// Link layer type (e.g., 1 = Ethernet).
    pub link_type: u16,

    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(
        frame_number: u64,
        timestamp_us: i64,
        captured_length: u32,
        original_length: u32,
        link_type: u16,
        data: Vec<u8>,
    ) -> Self {
        Self {
            frame_number,
            timestamp_us,
            captured_length,
            original_length,
            link_type,
            data,
        }
    }

    /// Build an Ethernet packet whose lengths match its data.
    pub fn ethernet(frame_number: u64, timestamp_us: i64, data: Vec<u8>) -> Self {
        let len = data.len() as u32;
        Self::new(frame_number, timestamp_us, len, len, LINKTYPE_ETHERNET, data)
    }

    /// Whether the snap length cut the frame short.
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.original_length
    }
}
