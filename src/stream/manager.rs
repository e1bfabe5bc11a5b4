use std::io::Write;

use tracing::{debug, trace};

use super::{
    ConnectionRegistry, Direction, PacketContext, SequenceGate, SequenceVerdict,
};
use crate::error::{Error, PcapError, ProtocolError, Result};
use crate::format::DEFAULT_RECORD_CAPACITY;
use crate::pcap::RawPacket;
use crate::postgres::{Dispatch, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::protocol::{decode_segment, TcpSegment, LINKTYPE_ETHERNET};

/// PostgreSQL's registered port.
pub const DEFAULT_SERVER_PORT: u16 = 5432;

/// Configuration for the TraceManager.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Port the traced server listens on.
    pub server_port: u16,
    /// Longest message accepted before the stream is treated as desynchronized.
    pub max_message_length: i32,
    /// Maximum size of one output line, newline included.
    pub record_capacity: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            record_capacity: DEFAULT_RECORD_CAPACITY,
        }
    }
}

/// Running counters for a trace session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Frames handed to the manager.
    pub packets: u64,
    /// Frames that were not traced PostgreSQL TCP segments.
    pub skipped: u64,
    /// Segments that passed the sequence gate.
    pub accepted: u64,
    /// Segments rejected as retransmissions.
    pub duplicates: u64,
    /// Segments rejected as arriving past the window.
    pub out_of_order: u64,
    /// Payload bytes fed to dispatchers.
    pub bytes: u64,
    /// Trace lines written.
    pub records: u64,
    /// Type bytes that matched no message.
    pub unrecognized: u64,
    /// Messages abandoned mid-frame.
    pub aborted: u64,
}

/// Drives packets through the sequence gate into per-connection parsers.
pub struct TraceManager {
    config: TraceConfig,
    gate: SequenceGate,
    connections: ConnectionRegistry,
    stats: TraceStats,
}

impl TraceManager {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            gate: SequenceGate::new(),
            connections: ConnectionRegistry::new(config.max_message_length, config.record_capacity),
            stats: TraceStats::default(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TraceConfig::default())
    }

    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }

    /// Process one captured frame.
    ///
    /// Only Ethernet captures can be traced; any other link type is an
    /// error. Frames that do not decode to a TCP segment are skipped.
    pub fn process_packet<W: Write>(&mut self, packet: &RawPacket, out: &mut W) -> Result<()> {
        self.stats.packets += 1;

        if packet.link_type != LINKTYPE_ETHERNET {
            return Err(PcapError::UnsupportedLinkType {
                link_type: packet.link_type,
            }
            .into());
        }

        match decode_segment(&packet.data) {
            Ok(Some(segment)) => self.process_segment(&segment, packet.timestamp_us, out),
            Ok(None) => {
                self.stats.skipped += 1;
                Ok(())
            }
            Err(e) => {
                debug!(
                    frame = packet.frame_number,
                    truncated = packet.is_truncated(),
                    error = %e,
                    "skipping undecodable frame"
                );
                self.stats.skipped += 1;
                Ok(())
            }
        }
    }

    /// Process one TCP segment captured at `timestamp_us`.
    pub fn process_segment<W: Write>(
        &mut self,
        segment: &TcpSegment<'_>,
        timestamp_us: i64,
        out: &mut W,
    ) -> Result<()> {
        let Some((direction, port)) = self.classify(segment) else {
            self.stats.skipped += 1;
            return Ok(());
        };

        trace!(
            port,
            direction = direction.as_str(),
            seq = segment.seq,
            ack = segment.ack,
            window = segment.window,
            len = segment.payload.len(),
            syn = segment.flags.syn,
            "segment"
        );

        if segment.flags.syn {
            self.gate.observe_syn(port, direction, segment.seq);
        }

        let len = u32::try_from(segment.payload.len()).unwrap_or(u32::MAX);
        match self.gate.accept(port, direction, segment.seq, len) {
            SequenceVerdict::Accepted => {
                self.stats.accepted += 1;
                self.dispatch(port, direction, segment.payload, timestamp_us, out)?;
            }
            SequenceVerdict::Duplicate => self.stats.duplicates += 1,
            SequenceVerdict::OutOfOrder => self.stats.out_of_order += 1,
        }

        if segment.flags.ack {
            self.gate
                .observe_ack(port, direction, segment.ack, segment.window);
        }

        Ok(())
    }

    /// Work out who sent a segment, and which client port keys its state.
    fn classify(&self, segment: &TcpSegment<'_>) -> Option<(Direction, u16)> {
        if segment.src_port == self.config.server_port {
            Some((Direction::Backend, segment.dst_port))
        } else if segment.dst_port == self.config.server_port {
            Some((Direction::Frontend, segment.src_port))
        } else {
            None
        }
    }

    fn dispatch<W: Write>(
        &mut self,
        port: u16,
        direction: Direction,
        payload: &[u8],
        timestamp_us: i64,
        out: &mut W,
    ) -> Result<()> {
        let ctx = PacketContext::new(timestamp_us, payload.len());
        let connection = self.connections.get_mut(port);

        for &byte in payload {
            self.stats.bytes += 1;
            let result = connection.dispatch(port, direction, byte, &ctx, out);
            if let Err(Error::Protocol(ProtocolError::EncryptedSession { .. })) = result {
                // The SSLResponseYes record was written before the error.
                self.stats.records += 1;
            }
            match result? {
                Dispatch::Pending => {}
                Dispatch::Traced => self.stats.records += 1,
                Dispatch::Unrecognized => self.stats.unrecognized += 1,
                Dispatch::Aborted(_) => self.stats.aborted += 1,
            }
        }
        Ok(())
    }
}
