//! Async wrapper driving a sender/receiver pair with heartbeat and
//! retransmit timing, in the style of `channel/reliable.rs`'s
//! `ReliableSession` but with a tokio task of its own rather than being
//! pumped by a caller loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::ssp::state::{Diffable, ReceiverState, SenderState};
use crate::transport::wire::TransportInstruction;

/// How often the engine wakes to check retransmit/heartbeat deadlines.
pub const WAKE_INTERVAL: Duration = Duration::from_millis(250);

/// How long without a peer ack before a sent instruction is retransmitted.
pub const RETRANSMIT_THRESHOLD: Duration = Duration::from_millis(1000);

/// How long without sending anything before an empty heartbeat goes out.
pub const HEARTBEAT_THRESHOLD: Duration = Duration::from_millis(3000);

fn now_timestamp() -> u16 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    (millis % 65536) as u16
}

/// Commands accepted by a running [`SspEngine`].
#[derive(Debug)]
pub enum Command<S> {
    /// Replace the local state with `S`, advancing the sender's sequence.
    UpdateState(S),
    /// An instruction received from the peer, with the peer's datagram
    /// timestamp (decoded at the packet layer, not carried by the
    /// instruction itself) for RTT echo.
    Inbound(TransportInstruction, u16),
    /// Stop the engine's task.
    Stop,
}

/// Handle to a running SSP engine: a command sink, an outbound instruction
/// source, and an applied-state source.
pub struct SspEngine<S> {
    commands: mpsc::Sender<Command<S>>,
    outbound: mpsc::Receiver<TransportInstruction>,
    delivered: mpsc::Receiver<S>,
    task: tokio::task::JoinHandle<()>,
}

impl<S> SspEngine<S>
where
    S: Diffable + Send + 'static,
{
    /// Spawn the engine's background task.
    #[must_use]
    pub fn spawn() -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<Command<S>>(64);
        let (outbound_tx, outbound_rx) = mpsc::channel::<TransportInstruction>(64);
        let (delivered_tx, delivered_rx) = mpsc::channel::<S>(64);

        let task = tokio::spawn(async move {
            let mut sender = SenderState::<S>::new();
            let mut receiver = ReceiverState::<S>::new();
            let mut ticker = interval(WAKE_INTERVAL);
            let mut last_timestamp_seen: u16 = 0;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let should_retransmit = sender
                            .time_since_last_sent()
                            .map_or(true, |d| d >= RETRANSMIT_THRESHOLD)
                            && sender.has_unacked_state();
                        let should_heartbeat = sender
                            .time_since_last_heartbeat()
                            .map_or(true, |d| d >= HEARTBEAT_THRESHOLD);

                        if should_retransmit || should_heartbeat {
                            let instruction = sender.build_instruction(
                                receiver.current_num(),
                                now_timestamp(),
                                last_timestamp_seen,
                            );
                            sender.record_heartbeat_sent();
                            if outbound_tx.send(instruction).await.is_err() {
                                break;
                            }
                        }
                    }
                    command = command_rx.recv() => {
                        match command {
                            Some(Command::UpdateState(state)) => {
                                sender.update(state);
                                let instruction = sender.build_instruction(
                                    receiver.current_num(),
                                    now_timestamp(),
                                    last_timestamp_seen,
                                );
                                if outbound_tx.send(instruction).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Inbound(instruction, peer_timestamp)) => {
                                last_timestamp_seen = peer_timestamp;
                                sender.process_ack(instruction.ack_num);
                                let advanced = receiver.receive(&instruction);
                                if advanced {
                                    let ack = sender.build_instruction(
                                        receiver.current_num(),
                                        now_timestamp(),
                                        last_timestamp_seen,
                                    );
                                    if outbound_tx.send(ack).await.is_err() {
                                        break;
                                    }
                                    if delivered_tx.send(receiver.current().clone()).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Command::Stop) | None => break,
                        }
                    }
                }
            }
        });

        Self {
            commands: command_tx,
            outbound: outbound_rx,
            delivered: delivered_rx,
            task,
        }
    }

    /// Queue a new local state for the sender half.
    pub async fn update_state(&self, state: S) {
        let _ = self.commands.send(Command::UpdateState(state)).await;
    }

    /// Feed an inbound instruction to the receiver half, along with the
    /// peer's datagram timestamp for RTT echo.
    pub async fn inbound(&self, instruction: TransportInstruction, peer_timestamp: u16) {
        let _ = self
            .commands
            .send(Command::Inbound(instruction, peer_timestamp))
            .await;
    }

    /// Receive the next instruction the engine wants transmitted.
    pub async fn next_outbound(&mut self) -> Option<TransportInstruction> {
        self.outbound.recv().await
    }

    /// Receive the next successfully applied remote state.
    pub async fn next_delivered(&mut self) -> Option<S> {
        self.delivered.recv().await
    }

    /// Stop the engine and wait for its task to finish.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop).await;
        let _ = self.task.await;
    }
}
