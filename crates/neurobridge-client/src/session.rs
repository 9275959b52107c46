//! Per-run session state
//!
//! A [`RunSession`] ties together everything scoped to one run: the run id,
//! the contract snapshot loaded at start (and kept for the whole run), the
//! parsed constants and the realtime channel. The emit helpers build the
//! outbound wire messages so callers never hand-assemble payloads.
//!
//! Sessions are created from a successful [`crate::http::ApiClient::start`]
//! plus a connected channel; they are consumed by the sync loop.

use std::collections::HashMap;

use tracing::info;

use neurobridge_core::contract::ContractSnapshot;
use neurobridge_core::types::{RewardReport, RobotState, RunConstants};

use crate::channel::{ChannelResult, RealtimeChannel};
use crate::wire::{IoChunk, OutboundMessage};

/// State and emit helpers for one running session.
pub struct RunSession {
    run_id: String,
    project_id: String,
    snapshot: ContractSnapshot,
    channel: Box<dyn RealtimeChannel>,
}

impl RunSession {
    /// Assemble a session from lifecycle output and a connected channel.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        project_id: impl Into<String>,
        snapshot: ContractSnapshot,
        channel: Box<dyn RealtimeChannel>,
    ) -> Self {
        let session = Self {
            run_id: run_id.into(),
            project_id: project_id.into(),
            snapshot,
            channel,
        };
        info!(
            run = %session.run_id,
            project = %session.project_id,
            layers = session.snapshot.contract.layer_ids.len(),
            feedback = session.snapshot.contract.feedback_ids.len(),
            "session created"
        );
        session
    }

    /// The server-issued run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The project this run belongs to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The contract snapshot loaded at run start.
    #[must_use]
    pub fn snapshot(&self) -> &ContractSnapshot {
        &self.snapshot
    }

    /// The run constants (`W`, `T`).
    #[must_use]
    pub fn constants(&self) -> RunConstants {
        self.snapshot.constants
    }

    /// Mutable access to the realtime channel, for the sync loop.
    pub fn channel_mut(&mut self) -> &mut dyn RealtimeChannel {
        self.channel.as_mut()
    }

    /// Emit the robot's observed state.
    ///
    /// # Errors
    ///
    /// [`crate::channel::ChannelError::Closed`] if the transport is gone.
    pub fn send_state(&mut self, state: RobotState) -> ChannelResult<()> {
        self.channel.send(OutboundMessage::RobotState {
            run_id: self.run_id.clone(),
            state,
        })
    }

    /// Emit one tick's feedback rasters.
    ///
    /// # Errors
    ///
    /// [`crate::channel::ChannelError::Closed`] if the transport is gone.
    pub fn send_feedback(
        &mut self,
        t: u64,
        feedback: HashMap<String, Vec<f64>>,
    ) -> ChannelResult<()> {
        self.channel.send(OutboundMessage::Feedback {
            run_id: self.run_id.clone(),
            t,
            feedback,
        })
    }

    /// Emit one tick's validated reward report.
    ///
    /// # Errors
    ///
    /// [`crate::channel::ChannelError::Closed`] if the transport is gone.
    pub fn send_reward(&mut self, t: u64, report: RewardReport) -> ChannelResult<()> {
        self.channel.send(OutboundMessage::Reward {
            run_id: self.run_id.clone(),
            t,
            report,
        })
    }

    /// Emit a sensor data chunk.
    ///
    /// # Errors
    ///
    /// [`crate::channel::ChannelError::Closed`] if the transport is gone.
    pub fn send_chunk(&mut self, chunk: IoChunk) -> ChannelResult<()> {
        self.channel.send(OutboundMessage::Chunk(chunk))
    }

    /// Tear the session down. The channel is dropped, which closes the
    /// transport; raster state belongs to the loop and dies with it.
    pub fn close(self) {
        info!(run = %self.run_id, "session closed");
        drop(self.channel);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use neurobridge_core::contract::Contract;

    use crate::channel::channel_pair;

    fn snapshot() -> ContractSnapshot {
        ContractSnapshot {
            constants: RunConstants {
                output_window: 4,
                feedback_window: 2,
            },
            contract: Contract::new(["l1"], ["fb0"]),
        }
    }

    #[test]
    fn test_send_helpers_stamp_run_id() {
        let (channel, remote) = channel_pair();
        let mut session = RunSession::new("r1", "proj", snapshot(), Box::new(channel));

        session.send_state(RobotState::default()).unwrap();
        session.send_feedback(3, HashMap::new()).unwrap();
        session.send_reward(3, RewardReport::default()).unwrap();

        let out = remote.drain();
        assert_eq!(out.len(), 3);
        assert!(matches!(
            &out[0],
            OutboundMessage::RobotState { run_id, .. } if run_id == "r1"
        ));
        assert!(matches!(
            &out[1],
            OutboundMessage::Feedback { run_id, t: 3, .. } if run_id == "r1"
        ));
        assert!(matches!(
            &out[2],
            OutboundMessage::Reward { run_id, t: 3, .. } if run_id == "r1"
        ));
    }

    #[test]
    fn test_close_drops_channel() {
        let (channel, remote) = channel_pair();
        let session = RunSession::new("r1", "proj", snapshot(), Box::new(channel));
        session.close();

        let err = remote.recv_timeout(Duration::from_millis(5));
        assert!(matches!(err, Err(crate::channel::ChannelError::Closed)));
    }
}
