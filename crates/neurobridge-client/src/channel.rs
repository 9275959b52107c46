//! Realtime channel abstraction
//!
//! The sync loop needs exactly two things from a transport: "give me the next
//! inbound message, blocking with a bounded timeout" and "send this outbound
//! message without blocking, in order". [`RealtimeChannel`] captures that and
//! nothing else; the WebSocket transport in [`crate::ws`] and the in-process
//! pair used by tests both implement it.
//!
//! All transport concurrency lives behind this trait. The loop side is a
//! plain blocking receiver; whatever parallel I/O the transport does
//! internally, messages come out of a single ordered queue.

use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;

use crate::wire::{InboundMessage, OutboundMessage};

/// Channel-level failures, mapped onto the fault taxonomy.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No message arrived within the timeout. Not fatal; the loop retries.
    #[error("no inbound message within {0:?}")]
    Timeout(Duration),

    /// The transport shut down cleanly. Terminal for the loop.
    #[error("channel closed")]
    Closed,

    /// The transport failed unrecoverably (auth revoked, protocol violation).
    /// Terminal for the loop.
    #[error("transport failure: {0}")]
    Fatal(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Duplex realtime transport as seen by the sync loop.
pub trait RealtimeChannel: Send {
    /// Next inbound message, blocking at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Timeout`] if nothing arrived, [`ChannelError::Closed`]
    /// or [`ChannelError::Fatal`] if the transport is gone.
    fn recv_timeout(&mut self, timeout: Duration) -> ChannelResult<InboundMessage>;

    /// Queue one outbound message. Never blocks; ordering is preserved.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Closed`] if the transport is gone.
    fn send(&mut self, message: OutboundMessage) -> ChannelResult<()>;
}

// ============================================================================
// In-process pair
// ============================================================================

/// Item travelling on the inbound side of a pair: either a message or a
/// transport-fatal signal injected by the far end.
type InboundItem = Result<InboundMessage, String>;

/// Loop-side half of an in-process channel pair.
pub struct PairChannel {
    inbound: mpsc::Receiver<InboundItem>,
    outbound: mpsc::Sender<OutboundMessage>,
}

/// Test-side half: feeds inbound messages and observes outbound traffic.
pub struct PairRemote {
    inbound: mpsc::Sender<InboundItem>,
    outbound: mpsc::Receiver<OutboundMessage>,
}

/// Create a connected in-process channel pair.
///
/// Used by tests and by the CLI's fully local simulation mode; semantics
/// match the WebSocket transport (single ordered inbound queue, non-blocking
/// ordered sends, close-on-drop).
#[must_use]
pub fn channel_pair() -> (PairChannel, PairRemote) {
    let (in_tx, in_rx) = mpsc::channel();
    let (out_tx, out_rx) = mpsc::channel();
    (
        PairChannel {
            inbound: in_rx,
            outbound: out_tx,
        },
        PairRemote {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

impl RealtimeChannel for PairChannel {
    fn recv_timeout(&mut self, timeout: Duration) -> ChannelResult<InboundMessage> {
        match self.inbound.recv_timeout(timeout) {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(reason)) => Err(ChannelError::Fatal(reason)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ChannelError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    fn send(&mut self, message: OutboundMessage) -> ChannelResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| ChannelError::Closed)
    }
}

impl PairRemote {
    /// Deliver an inbound message to the loop side.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Closed`] if the loop side was dropped.
    pub fn push(&self, message: InboundMessage) -> ChannelResult<()> {
        self.inbound
            .send(Ok(message))
            .map_err(|_| ChannelError::Closed)
    }

    /// Inject a transport-fatal condition (e.g. auth revoked).
    ///
    /// # Errors
    ///
    /// [`ChannelError::Closed`] if the loop side was dropped.
    pub fn inject_fatal(&self, reason: impl Into<String>) -> ChannelResult<()> {
        self.inbound
            .send(Err(reason.into()))
            .map_err(|_| ChannelError::Closed)
    }

    /// Next outbound message from the loop, blocking at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Timeout`] or [`ChannelError::Closed`].
    pub fn recv_timeout(&self, timeout: Duration) -> ChannelResult<OutboundMessage> {
        match self.outbound.recv_timeout(timeout) {
            Ok(message) => Ok(message),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ChannelError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    /// Drain every outbound message currently queued.
    #[must_use]
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.outbound.try_iter().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_core::types::SpikeBatch;

    #[test]
    fn test_pair_round_trip() {
        let (mut channel, remote) = channel_pair();

        remote
            .push(InboundMessage::Batch(SpikeBatch::new(1)))
            .unwrap();
        let msg = channel.recv_timeout(Duration::from_millis(10)).unwrap();
        assert!(matches!(msg, InboundMessage::Batch(b) if b.t == 1));

        channel
            .send(OutboundMessage::Join { run_id: "r1".into() })
            .unwrap();
        let out = remote.recv_timeout(Duration::from_millis(10)).unwrap();
        assert!(matches!(out, OutboundMessage::Join { run_id } if run_id == "r1"));
    }

    #[test]
    fn test_timeout() {
        let (mut channel, _remote) = channel_pair();
        let err = channel.recv_timeout(Duration::from_millis(5));
        assert!(matches!(err, Err(ChannelError::Timeout(_))));
    }

    #[test]
    fn test_drop_is_closed() {
        let (mut channel, remote) = channel_pair();
        drop(remote);
        let err = channel.recv_timeout(Duration::from_millis(5));
        assert!(matches!(err, Err(ChannelError::Closed)));
    }

    #[test]
    fn test_fatal_injection() {
        let (mut channel, remote) = channel_pair();
        remote.inject_fatal("auth revoked").unwrap();
        let err = channel.recv_timeout(Duration::from_millis(5));
        assert!(matches!(err, Err(ChannelError::Fatal(reason)) if reason == "auth revoked"));
    }

    #[test]
    fn test_ordering_preserved() {
        let (mut channel, remote) = channel_pair();
        for t in 0..5 {
            remote
                .push(InboundMessage::Batch(SpikeBatch::new(t)))
                .unwrap();
        }
        for t in 0..5 {
            let msg = channel.recv_timeout(Duration::from_millis(10)).unwrap();
            assert!(matches!(msg, InboundMessage::Batch(b) if b.t == t));
        }
    }
}
