//! Wires the OCB3/packet/fragment/SSP/terminal layers into one session
//! object, the way `tunnel.rs`'s `TunnelManager` wires a websocket,
//! heartbeat timer, and notification queue together in the teacher crate.
//!
//! `SessionOptions` is runtime/tuning configuration (MTU, timer intervals,
//! scrollback capacity) — not the persistent on-disk credential
//! configuration the crate's scope excludes.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::ocb3::Ocb3;
use crate::ssp::{Diffable, HostStream, ReceiverState, SenderState, UserStream};
use crate::terminal::TerminalParser;
use crate::transport::fragment::{self, Assembler, Fragment, DEFAULT_MTU};
use crate::transport::packet::{self, Direction, MoshPacket};
use crate::transport::wire::{HostInstruction, TransportInstruction};

/// Runtime tuning knobs for a [`MoshSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Maximum datagram size; fragments are sized to fit under it.
    pub mtu: usize,
    /// Initial terminal row count.
    pub rows: usize,
    /// Initial terminal column count.
    pub columns: usize,
    /// How many scrolled-off lines the scrollback ring retains.
    pub scrollback_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            rows: 24,
            columns: 80,
            scrollback_capacity: 10_000,
        }
    }
}

fn now_timestamp() -> u16 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    (millis % 65536) as u16
}

/// One side of a live Mosh session: the cryptographic channel, SSP sender/
/// receiver state, fragment reassembly, and the driven terminal.
///
/// This is the client's view (`direction` sends as `ToServer`, receives as
/// `ToClient`); nothing here prevents reusing the type for a server by
/// flipping the directions, but the crate only exercises the client side.
pub struct MoshSession {
    cipher: Ocb3,
    outbound_seq: u64,
    next_instruction_id: u64,
    sender: SenderState<UserStream>,
    receiver: ReceiverState<HostStream>,
    assembler: Assembler,
    pub terminal: TerminalParser,
    epoch: Instant,
    last_remote_timestamp: u16,
    last_remote_timestamp_received_at: Option<Instant>,
    mtu: usize,
    /// The full outbound user stream built so far; `SenderState::update`
    /// always takes the complete next state, so this accumulates across
    /// `queue_keystrokes`/`queue_resize` calls rather than being
    /// reconstructed each time.
    pending_user_stream: UserStream,
    /// How many instructions of the reconstructed host stream have already
    /// been applied to `terminal` — `ReceiverState::current()` holds the
    /// full history, so only the suffix past this point is new.
    host_instructions_applied: usize,
    /// Raw bytes from `HostInstruction::HostBytes` applied so far, for a
    /// caller that wants pass-through display without its own VT renderer.
    pub raw_host_output: Vec<u8>,
}

impl MoshSession {
    /// Construct a session from a 16-byte OCB3 session key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `key` isn't 16 bytes.
    pub fn new(key: &[u8], options: &SessionOptions) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: Ocb3::new(key)?,
            outbound_seq: 0,
            next_instruction_id: 0,
            sender: SenderState::new(),
            receiver: ReceiverState::new(),
            assembler: Assembler::new(),
            terminal: TerminalParser::new(options.rows, options.columns, options.scrollback_capacity),
            epoch: Instant::now(),
            last_remote_timestamp: 0,
            last_remote_timestamp_received_at: None,
            mtu: options.mtu,
            pending_user_stream: UserStream::default(),
            host_instructions_applied: 0,
            raw_host_output: Vec::new(),
        })
    }

    fn timestamp_reply(&self) -> u16 {
        match self.last_remote_timestamp_received_at {
            None => 0,
            Some(received_at) => {
                let elapsed_ms = received_at.elapsed().as_millis() as u32;
                self.last_remote_timestamp.wrapping_add(elapsed_ms as u16)
            }
        }
    }

    /// Append keystroke bytes to the unacked outbound stream and build the
    /// datagram(s) to send immediately — more than one if the instruction
    /// doesn't fit under the configured MTU.
    pub fn queue_keystrokes(&mut self, bytes: Vec<u8>) -> Vec<Vec<u8>> {
        self.pending_user_stream.push_keystroke(bytes);
        self.sender.update(self.pending_user_stream.clone());
        self.build_outbound_datagrams()
    }

    /// Replace the pending resize and build the datagram(s) to send
    /// immediately.
    pub fn queue_resize(&mut self, columns: i32, rows: i32) -> Vec<Vec<u8>> {
        self.pending_user_stream.push_resize(columns, rows);
        self.sender.update(self.pending_user_stream.clone());
        self.build_outbound_datagrams()
    }

    /// Whether the 250ms wake should retransmit the latest unacked
    /// instruction (unacked state outstanding for over
    /// [`crate::ssp::RETRANSMIT_THRESHOLD`]) or send an empty heartbeat
    /// (nothing sent for over [`crate::ssp::HEARTBEAT_THRESHOLD`]).
    #[must_use]
    pub fn due_flags(&self) -> (bool, bool) {
        let should_retransmit = self.sender.has_unacked_state()
            && self
                .sender
                .time_since_last_sent()
                .map_or(true, |d| d >= crate::ssp::RETRANSMIT_THRESHOLD);
        let should_heartbeat = self
            .sender
            .time_since_last_sent()
            .map_or(true, |d| d >= crate::ssp::HEARTBEAT_THRESHOLD);
        (should_retransmit, should_heartbeat)
    }

    /// Build the heartbeat/retransmit datagram(s) the SSP timer wants sent,
    /// if any deadline has elapsed. Returns `None` when nothing is due.
    #[must_use]
    pub fn tick(&mut self, should_retransmit: bool, should_heartbeat: bool) -> Option<Vec<Vec<u8>>> {
        if !should_retransmit && !should_heartbeat {
            return None;
        }
        self.sender.record_heartbeat_sent();
        Some(self.build_outbound_datagrams())
    }

    fn seal_fragment(&mut self, fragment: &Fragment) -> Vec<u8> {
        let seq = self.outbound_seq;
        self.outbound_seq += 1;
        let packet = MoshPacket {
            sequence_number: seq,
            direction: Direction::ToServer,
            timestamp: now_timestamp(),
            timestamp_reply: self.timestamp_reply(),
            payload: fragment.encode(),
        };
        packet::seal(&self.cipher, &packet)
    }

    /// Seal every fragment of the next outbound instruction as its own
    /// datagram. Single-fragment instructions — the common case — yield a
    /// one-element vec.
    fn build_outbound_datagrams(&mut self) -> Vec<Vec<u8>> {
        let instruction = self.sender.build_instruction(
            self.receiver.current_num(),
            now_timestamp(),
            self.timestamp_reply(),
        );
        let encoded = instruction.encode();
        let compressed = fragment::deflate(&encoded);
        let instruction_id = self.next_instruction_id;
        self.next_instruction_id += 1;
        fragment::fragment_compressed(instruction_id, &compressed, self.mtu)
            .iter()
            .map(|f| self.seal_fragment(f))
            .collect()
    }

    /// Process one inbound datagram from the server.
    ///
    /// Feeds any delivered host bytes to `self.terminal` and returns the
    /// ack datagram(s) to send back, if the receiver's state advanced.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Option<Vec<Vec<u8>>> {
        let packet = packet::open(&self.cipher, datagram, Direction::ToClient)?;
        self.last_remote_timestamp = packet.timestamp;
        self.last_remote_timestamp_received_at = Some(Instant::now());

        let fragment = Fragment::parse(&packet.payload)?;
        let compressed = self.assembler.feed(fragment)?;
        let encoded = fragment::inflate(&compressed)?;
        let instruction = TransportInstruction::decode(&encoded);

        self.sender.process_ack(instruction.ack_num);
        if !self.receiver.receive(&instruction) {
            return None;
        }

        let all_instructions = &self.receiver.current().instructions;
        for item in &all_instructions[self.host_instructions_applied..] {
            match item {
                HostInstruction::HostBytes(bytes) => {
                    self.terminal.feed(bytes);
                    self.raw_host_output.extend_from_slice(bytes);
                }
                HostInstruction::Resize(resize) => {
                    if resize.width > 0 && resize.height > 0 {
                        self.terminal
                            .state
                            .resize(resize.height as usize, resize.width as usize);
                    }
                }
                HostInstruction::EchoAck(_) => {}
            }
        }
        self.host_instructions_applied = all_instructions.len();

        Some(self.build_outbound_datagrams())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 16] {
        [0x42; 16]
    }

    #[test]
    fn session_construction_rejects_bad_key_length() {
        let err = MoshSession::new(&[0u8; 8], &SessionOptions::default()).unwrap_err();
        assert_eq!(err, CryptoError::InvalidKeyLength(8));
    }

    #[test]
    fn heartbeat_is_suppressed_when_nothing_is_due() {
        let mut session = MoshSession::new(&key(), &SessionOptions::default()).unwrap();
        assert!(session.tick(false, false).is_none());
    }

    #[test]
    fn due_flags_are_quiet_immediately_after_a_send() {
        let mut session = MoshSession::new(&key(), &SessionOptions::default()).unwrap();
        let _ = session.queue_keystrokes(b"a".to_vec());
        let (should_retransmit, should_heartbeat) = session.due_flags();
        assert!(!should_retransmit, "just sent, retransmit threshold not elapsed");
        assert!(!should_heartbeat, "just sent, heartbeat threshold not elapsed");
    }

    #[test]
    fn due_flags_request_heartbeat_before_any_send() {
        let session = MoshSession::new(&key(), &SessionOptions::default()).unwrap();
        let (should_retransmit, should_heartbeat) = session.due_flags();
        assert!(!should_retransmit, "nothing unacked yet");
        assert!(should_heartbeat, "nothing ever sent, heartbeat is due immediately");
    }

    #[test]
    fn client_and_server_round_trip_a_host_message() {
        let opts = SessionOptions::default();
        let mut client = MoshSession::new(&key(), &opts).unwrap();

        // Simulate the server side by hand: same cipher, opposite direction.
        let server_cipher = Ocb3::new(&key()).unwrap();
        let mut host_state = HostStream::default();
        host_state.push_bytes(b"hello from server".to_vec());
        let mut server_sender = SenderState::<HostStream>::new();
        server_sender.update(host_state);
        let instruction = server_sender.build_instruction(0, 0, 0);
        let encoded = instruction.encode();
        let compressed = fragment::deflate(&encoded);
        let fragments = fragment::fragment_compressed(0, &compressed, opts.mtu);
        let packet = MoshPacket {
            sequence_number: 0,
            direction: Direction::ToClient,
            timestamp: 0,
            timestamp_reply: 0,
            payload: fragments[0].encode(),
        };
        let datagram = packet::seal(&server_cipher, &packet);

        let ack = client.handle_datagram(&datagram);
        assert!(ack.is_some());
        assert_eq!(client.terminal.state.active().cursor.row, 0);
    }
}
