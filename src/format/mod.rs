//! Trace output formatting.
//!
//! Provides the bounded [`TraceRecord`] line builder used by the message
//! framers, plus the byte sanitizer applied to every traced payload byte:
//! - printable ASCII and space are kept as-is
//! - everything else (control bytes, NUL, high bytes) becomes `.`

mod record;

pub use record::{
    sanitize_byte, TraceRecord, DEFAULT_RECORD_CAPACITY, MAX_RECORD_CAPACITY, MIN_RECORD_CAPACITY,
};
