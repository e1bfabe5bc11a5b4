/// Direction of data flow in a traced connection.
///
/// Named after the side that sends the bytes: the frontend is the client,
/// the backend is the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Frontend,
    Backend,
}

impl Direction {
    /// Return a string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Frontend => "fe",
            Direction::Backend => "be",
        }
    }

    /// Single-letter sender tag used in trace records.
    pub fn tag(&self) -> u8 {
        match self {
            Direction::Frontend => b'f',
            Direction::Backend => b'b',
        }
    }

    /// The direction the peer sends in.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Frontend => Direction::Backend,
            Direction::Backend => Direction::Frontend,
        }
    }
}

/// Per-packet facts the message parsers need while consuming its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketContext {
    /// Capture timestamp in microseconds since epoch.
    pub timestamp_us: i64,
    /// Size of the TCP payload carrying the current byte.
    pub payload_len: usize,
}

impl PacketContext {
    pub fn new(timestamp_us: i64, payload_len: usize) -> Self {
        Self {
            timestamp_us,
            payload_len,
        }
    }
}
