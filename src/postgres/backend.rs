//! Backend (server to client) message dispatch.

use std::io::Write;

use tracing::warn;

use super::framer::{FrameStatus, MessageFramer};
use super::Dispatch;
use crate::error::{ProtocolError, Result};
use crate::format::TraceRecord;
use crate::stream::{Direction, PacketContext};

/// Message types sent by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendMessage {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyData,
    CopyDone,
    CopyFail,
    CopyInResponse,
    CopyOutResponse,
    CopyBothResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    FunctionCallResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

impl BackendMessage {
    pub const ALL: [BackendMessage; 25] = [
        BackendMessage::Authentication,
        BackendMessage::BackendKeyData,
        BackendMessage::BindComplete,
        BackendMessage::CloseComplete,
        BackendMessage::CommandComplete,
        BackendMessage::CopyData,
        BackendMessage::CopyDone,
        BackendMessage::CopyFail,
        BackendMessage::CopyInResponse,
        BackendMessage::CopyOutResponse,
        BackendMessage::CopyBothResponse,
        BackendMessage::DataRow,
        BackendMessage::EmptyQueryResponse,
        BackendMessage::ErrorResponse,
        BackendMessage::FunctionCallResponse,
        BackendMessage::NegotiateProtocolVersion,
        BackendMessage::NoData,
        BackendMessage::NoticeResponse,
        BackendMessage::NotificationResponse,
        BackendMessage::ParameterDescription,
        BackendMessage::ParameterStatus,
        BackendMessage::ParseComplete,
        BackendMessage::PortalSuspended,
        BackendMessage::ReadyForQuery,
        BackendMessage::RowDescription,
    ];

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'R' => Some(BackendMessage::Authentication),
            b'K' => Some(BackendMessage::BackendKeyData),
            b'2' => Some(BackendMessage::BindComplete),
            b'3' => Some(BackendMessage::CloseComplete),
            b'C' => Some(BackendMessage::CommandComplete),
            b'd' => Some(BackendMessage::CopyData),
            b'c' => Some(BackendMessage::CopyDone),
            b'f' => Some(BackendMessage::CopyFail),
            b'G' => Some(BackendMessage::CopyInResponse),
            b'H' => Some(BackendMessage::CopyOutResponse),
            b'W' => Some(BackendMessage::CopyBothResponse),
            b'D' => Some(BackendMessage::DataRow),
            b'I' => Some(BackendMessage::EmptyQueryResponse),
            b'E' => Some(BackendMessage::ErrorResponse),
            b'V' => Some(BackendMessage::FunctionCallResponse),
            b'v' => Some(BackendMessage::NegotiateProtocolVersion),
            b'n' => Some(BackendMessage::NoData),
            b'N' => Some(BackendMessage::NoticeResponse),
            b'A' => Some(BackendMessage::NotificationResponse),
            b't' => Some(BackendMessage::ParameterDescription),
            b'S' => Some(BackendMessage::ParameterStatus),
            b'1' => Some(BackendMessage::ParseComplete),
            b's' => Some(BackendMessage::PortalSuspended),
            b'Z' => Some(BackendMessage::ReadyForQuery),
            b'T' => Some(BackendMessage::RowDescription),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            BackendMessage::Authentication => b'R',
            BackendMessage::BackendKeyData => b'K',
            BackendMessage::BindComplete => b'2',
            BackendMessage::CloseComplete => b'3',
            BackendMessage::CommandComplete => b'C',
            BackendMessage::CopyData => b'd',
            BackendMessage::CopyDone => b'c',
            BackendMessage::CopyFail => b'f',
            BackendMessage::CopyInResponse => b'G',
            BackendMessage::CopyOutResponse => b'H',
            BackendMessage::CopyBothResponse => b'W',
            BackendMessage::DataRow => b'D',
            BackendMessage::EmptyQueryResponse => b'I',
            BackendMessage::ErrorResponse => b'E',
            BackendMessage::FunctionCallResponse => b'V',
            BackendMessage::NegotiateProtocolVersion => b'v',
            BackendMessage::NoData => b'n',
            BackendMessage::NoticeResponse => b'N',
            BackendMessage::NotificationResponse => b'A',
            BackendMessage::ParameterDescription => b't',
            BackendMessage::ParameterStatus => b'S',
            BackendMessage::ParseComplete => b'1',
            BackendMessage::PortalSuspended => b's',
            BackendMessage::ReadyForQuery => b'Z',
            BackendMessage::RowDescription => b'T',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::Authentication => "Authentication",
            BackendMessage::BackendKeyData => "BackendKeyData",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::CommandComplete => "CommandComplete",
            BackendMessage::CopyData => "CopyData",
            BackendMessage::CopyDone => "CopyDone",
            BackendMessage::CopyFail => "CopyFail",
            BackendMessage::CopyInResponse => "CopyIn",
            BackendMessage::CopyOutResponse => "CopyOut",
            BackendMessage::CopyBothResponse => "CopyBoth",
            BackendMessage::DataRow => "DataRow",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse => "ErrorResponse",
            BackendMessage::FunctionCallResponse => "CallResponse",
            BackendMessage::NegotiateProtocolVersion => "NegotiateProtocolVersion",
            BackendMessage::NoData => "NoData",
            BackendMessage::NoticeResponse => "NoticeResponse",
            BackendMessage::NotificationResponse => "NotificationResponse",
            BackendMessage::ParameterDescription => "ParameterDescription",
            BackendMessage::ParameterStatus => "ParameterStatus",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::ReadyForQuery => "ReadyForQuery",
            BackendMessage::RowDescription => "RowDescription",
        }
    }
}

/// The server's one-byte answer to an SSLRequest.
///
/// It is the only backend message without a length field, and can only be
/// told apart from a tag byte by arriving alone in its packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslResponse {
    Refused,
    Accepted,
}

impl SslResponse {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'N' => Some(SslResponse::Refused),
            b'S' => Some(SslResponse::Accepted),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SslResponse::Refused => "SSLResponseNo",
            SslResponse::Accepted => "SSLResponseYes",
        }
    }
}

/// Per-connection parser for the server's byte stream.
#[derive(Debug, Clone)]
pub struct BackendDispatcher {
    framer: MessageFramer,
    // Used only for the fixed-text SSL response records.
    record: TraceRecord,
}

impl BackendDispatcher {
    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        Self {
            framer: MessageFramer::new(max_length, record_capacity),
            record: TraceRecord::with_capacity(record_capacity),
        }
    }

    /// Consume one byte of the server's stream.
    ///
    /// Returns [`ProtocolError::EncryptedSession`] when the server agrees to
    /// SSL: nothing after that point on the connection is readable.
    pub fn on_byte<W: Write>(
        &mut self,
        port: u16,
        byte: u8,
        ctx: &PacketContext,
        out: &mut W,
    ) -> Result<Dispatch> {
        if self.framer.is_active() {
            let status = self.framer.on_byte(byte, out)?;
            if let FrameStatus::Aborted(reason) = status {
                warn!(port, direction = "be", %reason, "backend message abandoned");
            }
            return Ok(status.into());
        }

        if ctx.payload_len == 1 {
            if let Some(response) = SslResponse::from_byte(byte) {
                self.record
                    .start(ctx.timestamp_us, port, Direction::Backend, response.name());
                self.record.flush(out)?;
                return match response {
                    SslResponse::Refused => Ok(Dispatch::Traced),
                    SslResponse::Accepted => Err(ProtocolError::EncryptedSession { port }.into()),
                };
            }
        }

        match BackendMessage::from_tag(byte) {
            Some(message) => {
                self.framer
                    .begin(ctx, port, Direction::Backend, message.name());
                Ok(Dispatch::Pending)
            }
            None => {
                warn!("Unexpected new-message byte 0x{byte:02x} sent by backend on port {port}");
                Ok(Dispatch::Unrecognized)
            }
        }
    }

    pub fn is_awaiting_type(&self) -> bool {
        !self.framer.is_active()
    }

    pub fn current_message(&self) -> Option<&'static str> {
        self.framer.message_name()
    }

    pub fn reset(&mut self) {
        self.framer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::format::DEFAULT_RECORD_CAPACITY;
    use crate::postgres::DEFAULT_MAX_MESSAGE_LENGTH;

    const PORT: u16 = 51000;

    fn dispatcher() -> BackendDispatcher {
        BackendDispatcher::new(DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_RECORD_CAPACITY)
    }

    fn feed_packet(d: &mut BackendDispatcher, packet: &[u8], out: &mut Vec<u8>) -> Result<Dispatch> {
        let ctx = PacketContext::new(9, packet.len());
        let mut last = Dispatch::Pending;
        for &byte in packet {
            last = d.on_byte(PORT, byte, &ctx, out)?;
        }
        Ok(last)
    }

    #[test]
    fn test_tag_table_round_trip() {
        for message in BackendMessage::ALL {
            assert_eq!(BackendMessage::from_tag(message.tag()), Some(message));
        }
        assert_eq!(BackendMessage::from_tag(0), None);
        assert_eq!(BackendMessage::from_tag(b'Q'), None);
    }

    #[test]
    fn test_ready_for_query() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        let last = feed_packet(&mut d, b"Z\x00\x00\x00\x05I", &mut out).unwrap();
        assert_eq!(last, Dispatch::Traced);
        assert_eq!(String::from_utf8(out).unwrap(), "9 51000 be ReadyForQuery 5 I\n");
    }

    #[test]
    fn test_response_sequence_in_one_packet() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        let mut packet = Vec::new();
        packet.extend_from_slice(b"1\x00\x00\x00\x04");
        packet.extend_from_slice(b"2\x00\x00\x00\x04");
        packet.extend_from_slice(b"n\x00\x00\x00\x04");
        packet.extend_from_slice(b"C\x00\x00\x00\x0dSELECT 1\x00");
        feed_packet(&mut d, &packet, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "9 51000 be ParseComplete 4\n\
             9 51000 be BindComplete 4\n\
             9 51000 be NoData 4\n\
             9 51000 be CommandComplete 13 SELECT 1.\n"
        );
    }

    #[test]
    fn test_ssl_refused() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        let last = feed_packet(&mut d, b"N", &mut out).unwrap();
        assert_eq!(last, Dispatch::Traced);
        assert_eq!(String::from_utf8(out).unwrap(), "9 51000 be SSLResponseNo\n");
        assert!(d.is_awaiting_type());
    }

    #[test]
    fn test_ssl_accepted_is_fatal() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        let err = feed_packet(&mut d, b"S", &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::EncryptedSession { port: PORT })
        ));
        assert_eq!(String::from_utf8(out).unwrap(), "9 51000 be SSLResponseYes\n");
    }

    #[test]
    fn test_lone_byte_mid_message_is_payload() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        feed_packet(&mut d, b"S\x00\x00\x00\x06", &mut out).unwrap();
        assert_eq!(d.current_message(), Some("ParameterStatus"));

        // A one-byte packet continuing a message is not an SSL response.
        feed_packet(&mut d, b"S", &mut out).unwrap();
        let last = feed_packet(&mut d, b"N", &mut out).unwrap();
        assert_eq!(last, Dispatch::Traced);
        assert_eq!(String::from_utf8(out).unwrap(), "9 51000 be ParameterStatus 6 SN\n");
    }

    #[test]
    fn test_notice_tag_in_longer_packet() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        feed_packet(&mut d, b"N\x00\x00\x00\x06SW", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "9 51000 be NoticeResponse 6 SW\n");
    }

    #[test]
    fn test_unknown_lone_byte_is_dropped() {
        let mut d = dispatcher();
        let mut out = Vec::new();
        let last = feed_packet(&mut d, b"?", &mut out).unwrap();
        assert_eq!(last, Dispatch::Unrecognized);
        assert!(out.is_empty());
    }
}
