//! The datagram, fragment, and protobuf wire layers that sit between OCB3
//! and the SSP engine.
//!
//! `packet` builds the 12-byte nonce and seals/opens a single UDP datagram.
//! `fragment` frames, compresses, and reassembles instructions that don't
//! fit in one datagram. `wire` hand-rolls the varint protobuf codec for the
//! three SSP messages.

pub mod fragment;
pub mod packet;
pub mod wire;
