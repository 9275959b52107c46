//! Reward aggregation and validation
//!
//! Combines a reward policy's global and per-layer outputs into a clamped
//! [`RewardReport`] validated against the run contract. Aggregation never
//! fails: out-of-range values are clamped, layer ids the contract does not
//! know are dropped with a warning, and layers the policy did not mention
//! receive the (clamped) global value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contract::Contract;
use crate::types::RewardReport;

/// Safe range rewards are clamped to.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardLimits {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl RewardLimits {
    /// Symmetric range `[-1, 1]`.
    #[must_use]
    pub const fn symmetric() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
        }
    }

    /// Unit range `[0, 1]`, for servers trained on non-negative reward.
    #[must_use]
    pub const fn unit() -> Self {
        Self { min: 0.0, max: 1.0 }
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            // A NaN reward is meaningless either way; neutral midpoint.
            return (self.min + self.max) / 2.0;
        }
        value.clamp(self.min, self.max)
    }
}

impl Default for RewardLimits {
    fn default() -> Self {
        Self::symmetric()
    }
}

/// Aggregate one cycle's reward outputs into a validated report.
///
/// `by_layer` keys must be a subset of the contract's layer ids; unknown ids
/// are dropped (warned, not fatal). Every contract layer appears in the
/// output — missing entries default to the clamped global reward.
#[must_use]
pub fn aggregate(
    global: f64,
    by_layer: &HashMap<String, f64>,
    contract: &Contract,
    limits: RewardLimits,
) -> RewardReport {
    let global = limits.clamp(global);

    for layer in by_layer.keys() {
        if !contract.layer_ids.contains(layer) {
            warn!(layer = %layer, "reward for layer not in contract; dropped");
        }
    }

    let layers = contract
        .layer_ids
        .iter()
        .map(|layer| {
            let value = by_layer.get(layer).map_or(global, |&v| limits.clamp(v));
            (layer.clone(), value)
        })
        .collect();

    RewardReport {
        global,
        by_layer: layers,
    }
}

// ============================================================================
// Tests
// ============================================================================
