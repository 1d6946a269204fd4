//! Mosh client core: a roaming, latency-tolerant remote-terminal transport
//! (AES-128-OCB3 over UDP, the State Synchronization Protocol) paired with
//! a VT100/xterm escape-sequence state machine.
//!
//! Modules are layered bottom-up, matching the control-flow diagram in the
//! design spec:
//!
//! - [`block`] / [`ocb3`] — the AEAD primitive.
//! - [`transport`] — datagram, fragment, and protobuf codecs riding on it.
//! - [`ssp`] — diff-based reliable delivery of a user/host instruction
//!   stream over the transport.
//! - [`net`] — the roaming UDP endpoint abstraction.
//! - [`terminal`] — the VT parser and the cell-grid state it mutates.
//! - [`keys`] — the key-event-to-VT-bytes encoder.
//! - [`bootstrap`] — the SSH out-of-band bootstrap line parser.
//! - [`session`] — wires the above into one live session object.

pub mod block;
pub mod bootstrap;
pub mod error;
pub mod keys;
pub mod net;
pub mod ocb3;
pub mod session;
pub mod ssp;
pub mod terminal;
pub mod transport;

pub use bootstrap::{BootstrapInfo, IpResolutionPolicy};
pub use error::{BootstrapError, CryptoError};
pub use keys::{KeyCode, KeyEvent, KeyModifiers};
pub use ocb3::Ocb3;
pub use session::{MoshSession, SessionOptions};
pub use terminal::{Modes, TerminalParser, TerminalState};
