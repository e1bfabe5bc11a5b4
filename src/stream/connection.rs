use std::io::Write;

use super::{Direction, PacketContext};
use crate::error::Result;
use crate::postgres::{BackendDispatcher, Dispatch, FrontendDispatcher};

/// Number of distinct TCP ports; every port has a slot.
pub const PORT_COUNT: usize = 1 << 16;

/// Parser state for both directions of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub frontend: FrontendDispatcher,
    pub backend: BackendDispatcher,
}

impl ConnectionRecord {
    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        Self {
            frontend: FrontendDispatcher::new(max_length, record_capacity),
            backend: BackendDispatcher::new(max_length, record_capacity),
        }
    }

    /// Route one payload byte to the dispatcher for `direction`.
    pub fn dispatch<W: Write>(
        &mut self,
        port: u16,
        direction: Direction,
        byte: u8,
        ctx: &PacketContext,
        out: &mut W,
    ) -> Result<Dispatch> {
        match direction {
            Direction::Frontend => self.frontend.on_byte(port, byte, ctx, out),
            Direction::Backend => self.backend.on_byte(port, byte, ctx, out),
        }
    }

    /// Abandon any partial message in either direction.
    pub fn reset(&mut self) {
        self.frontend.reset();
        self.backend.reset();
    }
}

/// Connection state keyed by client port.
///
/// Only one server is traced, so the client port alone identifies a
/// connection. Slots are created up front; lookups cannot miss.
pub struct ConnectionRegistry {
    records: Box<[ConnectionRecord]>,
}

impl ConnectionRegistry {
    pub fn new(max_length: i32, record_capacity: usize) -> Self {
        let template = ConnectionRecord::new(max_length, record_capacity);
        Self {
            records: vec![template; PORT_COUNT].into_boxed_slice(),
        }
    }

    pub fn get(&self, port: u16) -> &ConnectionRecord {
        &self.records[usize::from(port)]
    }

    pub fn get_mut(&mut self, port: u16) -> &mut ConnectionRecord {
        &mut self.records[usize::from(port)]
    }
}
