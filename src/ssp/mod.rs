//! State Synchronization Protocol: diff-based reliable delivery of a
//! user-input stream and a terminal-output stream on top of the datagram
//! and fragment layers.

pub mod engine;
pub mod state;

pub use engine::{Command, SspEngine, HEARTBEAT_THRESHOLD, RETRANSMIT_THRESHOLD, WAKE_INTERVAL};
pub use state::{Diffable, HostStream, ReceiverState, SenderState, UserStream};
