//! pgtrace - trace PostgreSQL wire protocol messages from packet captures.
//!
//! Frames are decoded down to TCP, gated per connection on sequence
//! numbers, and fed byte by byte to frontend and backend parsers that
//! write one line per completed message.
//!
//! # Example
//!
//! ```no_run
//! use pgtrace::pcap::PcapReader;
//! use pgtrace::stream::{TraceConfig, TraceManager};
//!
//! fn main() -> pgtrace::Result<()> {
//!     let mut manager = TraceManager::new(TraceConfig::default());
//!     let mut out = std::io::stdout().lock();
//!     for packet in PcapReader::open("capture.pcap")? {
//!         manager.process_packet(&packet?, &mut out)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod format;
pub mod pcap;
pub mod postgres;
pub mod protocol;
pub mod stream;

pub use error::{Error, Result};
