//! Frontend (client to server) message dispatch.

use std::io::Write;

use tracing::warn;

use super::framer::{FrameStatus, MessageFramer, StartupFramer};
use super::Dispatch;
use crate::error::Result;
use crate::stream::{Direction, PacketContext};

/// Lead byte of a startup-phase message: the high byte of its length.
const STARTUP_TAG: u8 = 0;

/// Message types sent by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendMessage {
    Bind,
    Close,
    CopyData,
    CopyDone,
    CopyFail,
    Describe,
    Execute,
    Flush,
    FunctionCall,
    Parse,
    PasswordMessage,
    Query,
    Sync,
    Terminate,
}

impl FrontendMessage {
    pub const ALL: [FrontendMessage; 14] = [
        FrontendMessage::Bind,
        FrontendMessage::Close,
        FrontendMessage::CopyData,
        FrontendMessage::CopyDone,
        FrontendMessage::CopyFail,
        FrontendMessage::Describe,
        FrontendMessage::Execute,
        FrontendMessage::Flush,
        FrontendMessage::FunctionCall,
        FrontendMessage::Parse,
        FrontendMessage::PasswordMessage,
        FrontendMessage::Query,
        FrontendMessage::Sync,
        FrontendMessage::Terminate,
    ];

    /// Look up a message type by its tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'B' => Some(FrontendMessage::Bind),
            b'C' => Some(FrontendMessage::Close),
            b'd' => Some(FrontendMessage::CopyData),
            b'c' => Some(FrontendMessage::CopyDone),
            b'f' => Some(FrontendMessage::CopyFail),
            b'D' => Some(FrontendMessage::Describe),
            b'E' => Some(FrontendMessage::Execute),
            b'H' => Some(FrontendMessage::Flush),
            b'F' => Some(FrontendMessage::FunctionCall),
            b'P' => Some(FrontendMessage::Parse),
            b'p' => Some(FrontendMessage::PasswordMessage),
            b'Q' => Some(FrontendMessage::Query),
            b'S' => Some(FrontendMessage::Sync),
            b'X' => Some(FrontendMessage::Terminate),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            FrontendMessage::Bind => b'B',
            FrontendMessage::Close => b'C',
            FrontendMessage::CopyData => b'd',
            FrontendMessage::CopyDone => b'c',
            FrontendMessage::CopyFail => b'f',
            FrontendMessage::Describe => b'D',
            FrontendMessage::Execute => b'E',
            FrontendMessage::Flush => b'H',
            FrontendMessage::FunctionCall => b'F',
            FrontendMessage::Parse => b'P',
            FrontendMessage::PasswordMessage => b'p',
            FrontendMessage::Query => b'Q',
            FrontendMessage::Sync => b'S',
            FrontendMessage::Terminate => b'X',
        }
    }

    /// Name used in trace records.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Bind => "Bind",
            FrontendMessage::Close => "Close",
            FrontendMessage::CopyData => "CopyData",
            FrontendMessage::CopyDone => "CopyDone",
            FrontendMessage::CopyFail => "CopyFail",
            FrontendMessage::Describe => "Describe",
            FrontendMessage::Execute => "Execute",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::FunctionCall => "Call",
            FrontendMessage::Parse => "Parse",
            FrontendMessage::PasswordMessage => "PasswordMessage",
            FrontendMessage::Query => "Query",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Terminate => "Terminate",
        }
    }
}

/// Per-connection parser for the client's byte stream.
///
/// Owns one framer for tagged messages and one for startup-phase messages;
/// at most one of them is active at a time.
#[derive(Debug, Clone)]
pub struct FrontendDispatcher {
    framer: MessageFramer,
    startup: StartupFramer,
}

impl FrontendDispatcher {
    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        Self {
            framer: MessageFramer::new(max_length, record_capacity),
            startup: StartupFramer::new(max_length, record_capacity),
        }
    }

    /// Consume one byte of the client's stream.
    pub fn on_byte<W: Write>(
        &mut self,
        port: u16,
        byte: u8,
        ctx: &PacketContext,
        out: &mut W,
    ) -> Result<Dispatch> {
        let status = if self.startup.is_active() {
            self.startup.on_byte(byte, out)?
        } else if self.framer.is_active() {
            self.framer.on_byte(byte, out)?
        } else {
            return Ok(self.on_new_message(port, byte, ctx));
        };

        if let FrameStatus::Aborted(reason) = status {
            warn!(port, direction = "fe", %reason, "frontend message abandoned");
        }
        Ok(status.into())
    }

    fn on_new_message(&mut self, port: u16, byte: u8, ctx: &PacketContext) -> Dispatch {
        if byte == STARTUP_TAG {
            self.startup.begin(ctx, port, Direction::Frontend);
            return Dispatch::Pending;
        }

        match FrontendMessage::from_tag(byte) {
            Some(message) => {
                self.framer
                    .begin(ctx, port, Direction::Frontend, message.name());
                Dispatch::Pending
            }
            None => {
                warn!("Unexpected new-message byte 0x{byte:02x} sent by frontend on port {port}");
                Dispatch::Unrecognized
            }
        }
    }

    /// Whether the next byte will be read as a message type.
    pub fn is_awaiting_type(&self) -> bool {
        !self.startup.is_active() && !self.framer.is_active()
    }

    /// Name of the message in progress.
    pub fn current_message(&self) -> Option<&'static str> {
        self.startup
            .message_name()
            .or_else(|| self.framer.message_name())
    }

    /// Abandon whatever message is in progress.
    pub fn reset(&mut self) {
        self.framer.reset();
        self.startup.reset();
    }
}
