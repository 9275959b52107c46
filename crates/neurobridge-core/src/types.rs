//! Core data types for the decode/feedback/reward pipeline
//!
//! Everything here is a plain data carrier: owned, serde-serializable and
//! free of behavior beyond small accessors. The pipeline stages in
//! [`crate::decode`], [`crate::feedback`] and [`crate::reward`] operate on
//! these types and nothing else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Run Constants
// ============================================================================

/// Fixed per-run dimensions, parsed from the contract at run start.
///
/// Both values are immutable for the lifetime of a run; a batch or deviation
/// series of any other length is a data fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConstants {
    /// Spike window length `W`: bins per output population per timestep.
    pub output_window: usize,
    /// Feedback window length `T`: sub-steps per deviation series / raster.
    pub feedback_window: usize,
}

impl Default for RunConstants {
    fn default() -> Self {
        Self {
            output_window: 32,
            feedback_window: 64,
        }
    }
}

// ============================================================================
// Spikes
// ============================================================================

/// One timestep of output spike activity, keyed by population.
///
/// Each vector holds per-bin spike counts and must have the run's configured
/// window length `W`. Populations may be absent (silent or dropped upstream);
/// absence is not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpikeBatch {
    /// Timestep index. Batches are processed in strictly increasing order.
    pub t: u64,
    /// Per-population spike vectors.
    pub spikes: HashMap<String, Vec<u32>>,
}

impl SpikeBatch {
    /// Create an empty batch for timestep `t`.
    #[must_use]
    pub fn new(t: u64) -> Self {
        Self {
            t,
            spikes: HashMap::new(),
        }
    }

    /// Total spike count for one population, 0 if absent.
    #[must_use]
    pub fn total(&self, node_id: &str) -> u64 {
        self.spikes
            .get(node_id)
            .map(|v| v.iter().map(|&b| u64::from(b)).sum())
            .unwrap_or(0)
    }
}

// ============================================================================
// Actuator Deltas
// ============================================================================

/// Accumulated, clamped per-channel deltas for one timestep.
///
/// A delta is a dimensionless step; how it is applied to hardware is the
/// caller's business. Channels never observed in the mapping simply do not
/// appear.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorDelta {
    /// Timestep this delta was decoded from.
    pub t: u64,
    /// Channel name to accumulated delta.
    pub deltas: HashMap<String, f64>,
}

impl ActuatorDelta {
    /// Create an empty delta set for timestep `t`.
    #[must_use]
    pub fn new(t: u64) -> Self {
        Self {
            t,
            deltas: HashMap::new(),
        }
    }

    /// Delta for a channel, 0.0 if the channel produced nothing this tick.
    #[must_use]
    pub fn get(&self, channel: &str) -> f64 {
        self.deltas.get(channel).copied().unwrap_or(0.0)
    }

    /// True if every channel decoded to exactly zero (or none decoded).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.deltas.values().all(|&v| v == 0.0)
    }
}

// ============================================================================
// Feedback
// ============================================================================

/// Per-sub-step deviation signal for one feedback channel.
///
/// Values are expected in `[-1, 1]`; out-of-range values are clamped by the
/// raster encoder. Length must equal the run's feedback window `T`.
pub type DeviationSeries = Vec<f64>;

/// Encoded feedback raster for one feedback channel, length `T`.
///
/// Entries are signed spike values: `+1.0` excitatory, `-1.0` inhibitory,
/// `0.0` silent. Encoders may emit intermediate analog values; the transport
/// does not care.
pub type FeedbackRaster = Vec<f64>;

// ============================================================================
// Reward
// ============================================================================

/// Validated, clamped reward for one cycle.
///
/// Produced fresh each tick by [`crate::reward::aggregate`]; never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardReport {
    /// Global reward, clamped to the configured safe range.
    pub global: f64,
    /// Per-layer rewards. Every layer in the contract is present; layers the
    /// policy did not mention carry the global value.
    pub by_layer: HashMap<String, f64>,
}

// ============================================================================
// Robot State
// ============================================================================

/// Snapshot of the controlled robot, as supplied by the state provider.
///
/// All fields are optional in spirit: an empty vector or `None` is simply
/// omitted from the wire payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotState {
    /// Joint positions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub q: Vec<f64>,
    /// Joint velocities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dq: Vec<f64>,
    /// Gripper position, if the robot has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gripper: Option<f64>,
    /// Seconds since the previous state sample.
    #[serde(default)]
    pub dt: f64,
}

/// Per-cycle summary handed to the reward policy.
///
/// Carries what a policy typically scores on: the decoded deltas and the raw
/// spike totals per population.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    /// Timestep index of this cycle.
    pub t: u64,
    /// Decoded actuator deltas for the cycle.
    pub deltas: HashMap<String, f64>,
    /// Total spike count per output population.
    pub spike_totals: HashMap<String, u64>,
}

// ============================================================================
// Tests
// ============================================================================
