//! Byte-at-a-time message framing.
//!
//! Every PostgreSQL message after the startup phase is laid out as
//! `type:u8 length:i32 payload`, where `length` counts itself but not the
//! type byte. Startup-phase messages (StartupMessage, SSLRequest,
//! CancelRequest) have no type byte at all.
//!
//! Dispatchers consume the type byte themselves and hand every following
//! byte to a [`MessageFramer`], which reports when the message is complete
//! and writes its trace record.

use std::io::{self, Write};

use thiserror::Error;

use super::int32::Int32Accumulator;
use crate::format::TraceRecord;
use crate::stream::{Direction, PacketContext};

/// Largest message length accepted before the stream is assumed to be out
/// of sync (dropped packet or mid-message capture start).
pub const DEFAULT_MAX_MESSAGE_LENGTH: i32 = 1024 * 1024;

/// Size of the length field, which the declared length includes.
const LENGTH_FIELD_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    AwaitingType,
    ReadingLength {
        length: Int32Accumulator,
        consumed: u32,
    },
    ReadingPayload {
        consumed: u32,
        declared: u32,
    },
}

/// Outcome of feeding one byte to a framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// More bytes are needed.
    Pending,
    /// The message ended with this byte and its record was written.
    Complete,
    /// The message was abandoned; nothing was written.
    Aborted(FrameAbort),
}

/// Reason a message was abandoned mid-frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAbort {
    #[error("length high byte is set (byte=0x{byte:02x})")]
    ImplausibleLength { byte: u8 },

    #[error("max length exceeded (length={length}, max_length={max})")]
    LengthTooLarge { length: i32, max: i32 },

    #[error("byte arrived with no message in progress")]
    NotStarted,
}

/// Frames one message at a time from a byte stream.
#[derive(Debug, Clone)]
pub struct MessageFramer {
    state: FramerState,
    name: Option<&'static str>,
    record: TraceRecord,
    max_length: i32,
}

impl MessageFramer {
    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        Self {
            state: FramerState::AwaitingType,
            name: None,
            record: TraceRecord::with_capacity(record_capacity),
            max_length,
        }
    }

    /// Start a message whose type byte has just been read.
    ///
    /// The trace record is primed here, so the timestamp is that of the
    /// packet carrying the type byte.
    pub fn begin(
        &mut self,
        ctx: &PacketContext,
        port: u16,
        direction: Direction,
        name: &'static str,
    ) {
        self.record.start(ctx.timestamp_us, port, direction, name);
        self.name = Some(name);
        self.state = FramerState::ReadingLength {
            length: Int32Accumulator::new(),
            consumed: 0,
        };
    }

    /// Feed the next byte of the current message.
    pub fn on_byte<W: Write>(&mut self, byte: u8, out: &mut W) -> io::Result<FrameStatus> {
        match self.state {
            FramerState::AwaitingType => Ok(FrameStatus::Aborted(FrameAbort::NotStarted)),
            FramerState::ReadingLength {
                mut length,
                consumed,
            } => {
                let consumed = consumed + 1;
                if length.push(byte) {
                    return self.on_length_complete(length.value(), consumed, out);
                }
                if length.high_byte_set() {
                    self.reset();
                    return Ok(FrameStatus::Aborted(FrameAbort::ImplausibleLength { byte }));
                }
                self.state = FramerState::ReadingLength { length, consumed };
                Ok(FrameStatus::Pending)
            }
            FramerState::ReadingPayload { consumed, declared } => {
                self.record.append_byte(byte);
                let consumed = consumed + 1;
                if consumed >= declared {
                    return self.finish(out);
                }
                self.state = FramerState::ReadingPayload { consumed, declared };
                Ok(FrameStatus::Pending)
            }
        }
    }

    fn on_length_complete<W: Write>(
        &mut self,
        length: i32,
        consumed: u32,
        out: &mut W,
    ) -> io::Result<FrameStatus> {
        if length < 0 || length > self.max_length {
            self.reset();
            return Ok(FrameStatus::Aborted(FrameAbort::LengthTooLarge {
                length,
                max: self.max_length,
            }));
        }

        let declared = length as u32;
        self.record.append_length(declared);
        if declared <= LENGTH_FIELD_SIZE {
            return self.finish(out);
        }

        self.record.begin_payload();
        self.state = FramerState::ReadingPayload { consumed, declared };
        Ok(FrameStatus::Pending)
    }

    /// Push a length byte that never appeared on the wire.
    ///
    /// Only meaningful right after [`begin`](Self::begin); a single byte can
    /// neither complete the length nor, when zero, set its high byte.
    fn seed_length_byte(&mut self, byte: u8) {
        if let FramerState::ReadingLength {
            mut length,
            consumed,
        } = self.state
        {
            length.push(byte);
            self.state = FramerState::ReadingLength {
                length,
                consumed: consumed + 1,
            };
        }
    }

    fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<FrameStatus> {
        self.state = FramerState::AwaitingType;
        self.name = None;
        self.record.flush(out)?;
        Ok(FrameStatus::Complete)
    }

    /// Abandon the current message without writing anything.
    pub fn reset(&mut self) {
        self.state = FramerState::AwaitingType;
        self.name = None;
        self.record.clear();
    }

    /// Whether a message is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, FramerState::AwaitingType)
    }

    /// Name of the message in progress.
    pub fn message_name(&self) -> Option<&'static str> {
        self.name
    }

    /// Bytes of the current message consumed since its length field began.
    pub fn bytes_consumed(&self) -> u32 {
        match self.state {
            FramerState::AwaitingType => 0,
            FramerState::ReadingLength { consumed, .. }
            | FramerState::ReadingPayload { consumed, .. } => consumed,
        }
    }
}

/// Framer for startup-phase messages, which carry no type byte.
///
/// The dispatcher recognises these by a leading zero byte: the high byte
/// of the length field, which is always zero for such short messages. That
/// byte has already been consumed as a "type", so it is fed back into the
/// length here before any further network byte arrives.
#[derive(Debug, Clone)]
pub struct StartupFramer {
    framer: MessageFramer,
}

impl StartupFramer {
    /// Trace name for every startup-phase message.
    pub const NAME: &'static str = "[special]";

    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        Self {
            framer: MessageFramer::new(max_length, record_capacity),
        }
    }

    /// Start a message whose zero lead byte has just been read.
    pub fn begin(&mut self, ctx: &PacketContext, port: u16, direction: Direction) {
        self.framer.begin(ctx, port, direction, Self::NAME);
        self.framer.seed_length_byte(0);
    }

    pub fn on_byte<W: Write>(&mut self, byte: u8, out: &mut W) -> io::Result<FrameStatus> {
        self.framer.on_byte(byte, out)
    }

    pub fn reset(&mut self) {
        self.framer.reset();
    }

    pub fn is_active(&self) -> bool {
        self.framer.is_active()
    }

    pub fn message_name(&self) -> Option<&'static str> {
        self.framer.message_name()
    }

    pub fn bytes_consumed(&self) -> u32 {
        self.framer.bytes_consumed()
    }
}
