//! PostgreSQL frontend/backend protocol message tracing.
//!
//! This module provides:
//! - [`Int32Accumulator`] for length fields split across packets
//! - [`MessageFramer`] / [`StartupFramer`] turning bytes into messages
//! - [`FrontendDispatcher`] / [`BackendDispatcher`] mapping type bytes to
//!   message names for each direction
//!
//! Parsing is strictly incremental: bytes arrive one at a time, already
//! filtered by the sequence gate, and a trace record is written the moment
//! a message's last byte is seen.

mod backend;
mod framer;
mod frontend;
mod int32;

pub use backend::{BackendDispatcher, BackendMessage, SslResponse};
pub use framer::{
    FrameAbort, FrameStatus, MessageFramer, StartupFramer, DEFAULT_MAX_MESSAGE_LENGTH,
};
pub use frontend::{FrontendDispatcher, FrontendMessage};
pub use int32::Int32Accumulator;

/// What a dispatcher did with one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Consumed by the message in progress, or started a new one.
    Pending,
    /// Completed a message and wrote its trace record.
    Traced,
    /// Matched no known message type and was dropped.
    Unrecognized,
    /// The message in progress was abandoned.
    Aborted(FrameAbort),
}

impl From<FrameStatus> for Dispatch {
    fn from(status: FrameStatus) -> Self {
        match status {
            FrameStatus::Pending => Dispatch::Pending,
            FrameStatus::Complete => Dispatch::Traced,
            FrameStatus::Aborted(reason) => Dispatch::Aborted(reason),
        }
    }
}
