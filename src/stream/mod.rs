//! Per-connection TCP state and packet-level orchestration.

mod connection;
mod context;
mod manager;
mod sequence;

pub use connection::{ConnectionRecord, ConnectionRegistry, PORT_COUNT};
pub use context::{Direction, PacketContext};
pub use manager::{TraceConfig, TraceManager, TraceStats, DEFAULT_SERVER_PORT};
pub use sequence::{SequenceGate, SequenceVerdict, SequenceWindow};
