//! Error types for pgtrace.

use thiserror::Error;

/// Main error type for pgtrace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error decoding a frame or a protocol invariant violation
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// Unsupported link type
    #[error("Unsupported link type: {link_type} (only Ethernet is supported)")]
    UnsupportedLinkType { link_type: u16 },
}

/// Errors related to protocol decoding.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Packet too short for protocol header
    #[error("{protocol}: packet too short (need {needed} bytes, have {have})")]
    PacketTooShort {
        protocol: &'static str,
        needed: usize,
        have: usize,
    },

    /// Invalid header field value
    #[error("{protocol}: invalid {field}: {reason}")]
    InvalidField {
        protocol: &'static str,
        field: &'static str,
        reason: String,
    },

    /// The backend accepted an SSLRequest, everything after it is ciphertext.
    #[error("backend accepted SSL on client port {port}; encrypted sessions cannot be traced")]
    EncryptedSession { port: u16 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
