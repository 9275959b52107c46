//! Realtime wire format
//!
//! The realtime channel speaks JSON envelopes over WebSocket:
//!
//! ```json
//! {"event": "cycle:update", "data": {"t": 190, "spikes": {"V2": [0, 1, 0]}}}
//! ```
//!
//! Event names are defined in one place here so the protocol surface is easy
//! to audit when the server changes. Unknown inbound events decode to `None`
//! and are dropped by the transport with a debug log; the server may add
//! events without breaking older clients.

use serde::{Deserialize, Serialize};

use neurobridge_core::contract::ContractSnapshot;
use neurobridge_core::types::{RewardReport, RobotState, SpikeBatch};
use std::collections::HashMap;

// ============================================================================
// Event Names
// ============================================================================

/// Client emits this to join the room for a run id.
pub const RUN_JOIN_EVENT: &str = "run:join";
/// Server emits this after each cycle with the output spike batch.
pub const CYCLE_UPDATE_EVENT: &str = "cycle:update";
/// Server emits this to request sensor inputs for the next cycle.
pub const IO_NEED_EVENT: &str = "io:need";
/// Client emits this with raw sensor input data.
pub const IO_CHUNK_EVENT: &str = "io:chunk";
/// Client emits this with the encoded feedback rasters.
pub const IO_FEEDBACK_EVENT: &str = "io:feedback";
/// Client emits this with the robot's observed state.
pub const ROBOT_STATE_EVENT: &str = "robot:state";
/// Legacy server-side command event. Logged and ignored.
pub const ROBOT_CMD_EVENT: &str = "robot:cmd";
/// Client emits this with the cycle's reward report.
pub const LEARN_REWARD_EVENT: &str = "learn:reward";
/// Server emits this when the project graph changed. A running loop keeps
/// its contract snapshot and ignores it.
pub const CONTRACT_UPDATE_EVENT: &str = "contract:update";

// ============================================================================
// Envelope
// ============================================================================

/// The frame wrapper every message travels in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, see the constants above.
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Wire decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Frame was not a valid envelope, or a known event carried a payload
    /// that does not match its schema.
    #[error("malformed {event} payload: {source}")]
    Malformed {
        /// Event the payload claimed to be.
        event: String,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// Frame was not valid JSON at all.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}

// ============================================================================
// Inbound
// ============================================================================

/// One entry of an `io:need` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedEntry {
    /// Input id the server wants data for.
    pub id: String,
    /// Input kind ("Image", "Audio", ...), used for kind-level providers.
    #[serde(default)]
    pub kind: String,
}

/// Server request for sensor inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoNeed {
    /// Cycle the inputs are for.
    #[serde(default)]
    pub cycle: u64,
    /// Requested inputs.
    #[serde(default)]
    pub needs: Vec<NeedEntry>,
    /// Soft deadline hint from the server, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Messages the transport delivers to the sync loop, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// A timestep's spike batch.
    Batch(SpikeBatch),
    /// Sensor input request.
    IoNeed(IoNeed),
    /// Legacy direct command. The loop logs and ignores it.
    RobotCmd(serde_json::Value),
    /// Mid-run contract regeneration. The loop logs and ignores it.
    ContractUpdate(ContractSnapshot),
}

/// Decode one inbound frame. Unknown events yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`WireError`] if the frame is not JSON or a known event's payload
/// does not match its schema.
pub fn decode_inbound(text: &str) -> Result<Option<InboundMessage>, WireError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let malformed = |source| WireError::Malformed {
        event: envelope.event.clone(),
        source,
    };

    match envelope.event.as_str() {
        CYCLE_UPDATE_EVENT => serde_json::from_value(envelope.data)
            .map(|batch| Some(InboundMessage::Batch(batch)))
            .map_err(malformed),
        IO_NEED_EVENT => serde_json::from_value(envelope.data)
            .map(|need| Some(InboundMessage::IoNeed(need)))
            .map_err(malformed),
        ROBOT_CMD_EVENT => Ok(Some(InboundMessage::RobotCmd(envelope.data))),
        CONTRACT_UPDATE_EVENT => serde_json::from_value(envelope.data)
            .map(|snapshot| Some(InboundMessage::ContractUpdate(snapshot)))
            .map_err(malformed),
        _ => Ok(None),
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One sensor data chunk, emitted in response to `io:need`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoChunk {
    /// Run the chunk belongs to.
    pub run_id: String,
    /// Input id being answered.
    pub input_id: String,
    /// Input kind.
    pub kind: String,
    /// Per-input monotonically increasing sequence number.
    pub seq: u64,
    /// Cycle the chunk answers.
    pub cycle: u64,
    /// Payload format tag ("jpeg", "pcm16", ...).
    pub format: String,
    /// Provider-defined metadata.
    pub meta: serde_json::Value,
    /// Raw payload, hex-encoded for the JSON wire.
    pub data: String,
}

/// Messages the loop (and streamer) push to the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// Join the run room. Sent once after connect.
    Join {
        /// Run id to join.
        run_id: String,
    },
    /// Observed robot state for this tick.
    RobotState {
        /// Run id.
        run_id: String,
        /// The state sample.
        state: RobotState,
    },
    /// Encoded feedback rasters for this tick.
    Feedback {
        /// Run id.
        run_id: String,
        /// Timestep the rasters belong to.
        t: u64,
        /// Raster per feedback id, each of length `T`.
        feedback: HashMap<String, Vec<f64>>,
    },
    /// Validated reward report for this tick.
    Reward {
        /// Run id.
        run_id: String,
        /// Timestep the report belongs to.
        t: u64,
        /// The report.
        report: RewardReport,
    },
    /// Sensor data chunk.
    Chunk(IoChunk),
}

impl OutboundMessage {
    /// Encode into the JSON envelope the server expects.
    #[must_use]
    pub fn encode(&self) -> String {
        let (event, data) = match self {
            Self::Join { run_id } => (
                RUN_JOIN_EVENT,
                serde_json::json!({ "runId": run_id }),
            ),
            Self::RobotState { run_id, state } => (
                ROBOT_STATE_EVENT,
                serde_json::json!({ "runId": run_id, "state": state }),
            ),
            Self::Feedback { run_id, t, feedback } => (
                IO_FEEDBACK_EVENT,
                serde_json::json!({ "runId": run_id, "t": t, "feedback": feedback }),
            ),
            Self::Reward { run_id, t, report } => (
                LEARN_REWARD_EVENT,
                serde_json::json!({ "runId": run_id, "t": t, "reward": report }),
            ),
            Self::Chunk(chunk) => (
                IO_CHUNK_EVENT,
                serde_json::to_value(chunk).expect("chunk serialization cannot fail"),
            ),
        };
        let envelope = Envelope {
            event: event.to_string(),
            data,
        };
        serde_json::to_string(&envelope).expect("envelope serialization cannot fail")
    }
}

// ============================================================================
// Tests
// ============================================================================
