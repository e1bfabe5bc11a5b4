//! Per-connection TCP sequence gating.
//!
//! There is no reassembly here. Each direction of each connection keeps an
//! acceptance window `[min_seq, max_seq]`; a segment whose starting sequence
//! number falls inside it is passed through whole, anything else is dropped.
//! Acknowledgements seen in one direction reset the window of the other,
//! which is what lets a capture started mid-connection lock on.

use tracing::debug;

use super::connection::PORT_COUNT;
use super::Direction;

/// Result of checking a segment against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    Accepted,
    /// Starts before the window: a retransmission.
    Duplicate,
    /// Starts past the window: earlier data was missed or reordered.
    OutOfOrder,
}

/// Acceptance window for one direction of one connection.
///
/// A `min_seq` of zero means nothing has been observed yet and the next
/// segment is accepted unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceWindow {
    min_seq: u32,
    max_seq: u32,
}

impl SequenceWindow {
    pub const fn new(min_seq: u32, max_seq: u32) -> Self {
        Self { min_seq, max_seq }
    }

    pub fn min_seq(&self) -> u32 {
        self.min_seq
    }

    pub fn max_seq(&self) -> u32 {
        self.max_seq
    }

    pub fn is_initialized(&self) -> bool {
        self.min_seq != 0
    }

    /// Check a segment of `len` bytes starting at `seq`.
    ///
    /// On acceptance the window's lower edge moves to the end of the
    /// segment, and the upper edge is raised to meet it if needed.
    /// Rejections leave the window untouched.
    pub fn accept(&mut self, seq: u32, len: u32) -> SequenceVerdict {
        if !self.is_initialized() || (seq >= self.min_seq && seq <= self.max_seq) {
            self.min_seq = seq.wrapping_add(len);
            if self.max_seq < self.min_seq {
                self.max_seq = self.min_seq;
            }
            return SequenceVerdict::Accepted;
        }

        if seq < self.min_seq {
            SequenceVerdict::Duplicate
        } else {
            SequenceVerdict::OutOfOrder
        }
    }

    /// Replace the window with `[ack, ack + window]`.
    pub fn reset(&mut self, ack: u32, window: u16) {
        self.min_seq = ack;
        self.max_seq = ack.wrapping_add(u32::from(window));
    }
}

/// Sequence windows for both directions of every client port.
pub struct SequenceGate {
    frontend: Box<[SequenceWindow]>,
    backend: Box<[SequenceWindow]>,
}

impl Default for SequenceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGate {
    pub fn new() -> Self {
        Self {
            frontend: vec![SequenceWindow::default(); PORT_COUNT].into_boxed_slice(),
            backend: vec![SequenceWindow::default(); PORT_COUNT].into_boxed_slice(),
        }
    }

    /// Decide whether a segment's payload should be forwarded.
    pub fn accept(&mut self, port: u16, direction: Direction, seq: u32, len: u32) -> SequenceVerdict {
        let window = self.window_mut(port, direction);
        let (min_seq, max_seq) = (window.min_seq, window.max_seq);
        let verdict = window.accept(seq, len);
        match verdict {
            SequenceVerdict::Accepted => {}
            SequenceVerdict::Duplicate => debug!(
                port,
                direction = direction.as_str(),
                seq,
                min_seq,
                "duplicate packet"
            ),
            SequenceVerdict::OutOfOrder => debug!(
                port,
                direction = direction.as_str(),
                seq,
                max_seq,
                "out-of-order packet"
            ),
        }
        verdict
    }

    /// Record an acknowledgement sent in `direction`.
    ///
    /// It says what the sender expects next from its peer, so it resets the
    /// peer's window.
    pub fn observe_ack(&mut self, port: u16, direction: Direction, ack: u32, window: u16) {
        self.window_mut(port, direction.opposite()).reset(ack, window);
    }

    /// Record a SYN sent in `direction`, pinning that stream's window to
    /// its initial sequence number.
    pub fn observe_syn(&mut self, port: u16, direction: Direction, seq: u32) {
        self.window_mut(port, direction).reset(seq, 0);
    }

    pub fn window(&self, port: u16, direction: Direction) -> SequenceWindow {
        match direction {
            Direction::Frontend => self.frontend[usize::from(port)],
            Direction::Backend => self.backend[usize::from(port)],
        }
    }

    fn window_mut(&mut self, port: u16, direction: Direction) -> &mut SequenceWindow {
        match direction {
            Direction::Frontend => &mut self.frontend[usize::from(port)],
            Direction::Backend => &mut self.backend[usize::from(port)],
        }
    }
}
