//! User policy interfaces
//!
//! The four collaborator callbacks the sync loop invokes each tick, as narrow
//! traits. Policies supply values; they never touch pipeline state. Failure
//! is reported through `Result` — the loop logs it, substitutes a no-op and
//! carries on, so a broken policy degrades a tick, never the run.
//!
//! The shipped defaults ([`ZeroDeviation`], [`NeutralReward`]) are the "let
//! the brain run open-loop" choices: no correction, neutral reinforcement.

use std::collections::HashMap;

use crate::error::PolicyResult;
use crate::types::{ActuatorDelta, CycleSummary, DeviationSeries, RobotState};

// ============================================================================
// Collaborator Callbacks
// ============================================================================

/// Supplies the robot's observed state once per tick.
pub trait StateProvider: Send {
    /// Current robot state. Must return promptly; the loop measures a
    /// deadline around this call.
    fn state(&mut self) -> PolicyResult<RobotState>;
}

/// Applies a decoded command to the robot.
pub trait CommandExecutor: Send {
    /// Apply one tick's actuator deltas.
    fn execute(&mut self, delta: &ActuatorDelta) -> PolicyResult<()>;
}

/// Produces per-feedback-channel deviation signals.
pub trait DeviationPolicy: Send {
    /// Deviations for one feedback channel over a `steps`-long window.
    /// Values are expected in `[-1, 1]`.
    fn deviations(&mut self, feedback_id: &str, steps: usize) -> PolicyResult<DeviationSeries>;
}

/// Scores one cycle, globally and optionally per learning layer.
pub trait RewardPolicy: Send {
    /// `(global, by_layer)` reward for the cycle. Layers omitted from the map
    /// default to the global value during aggregation.
    fn reward(&mut self, summary: &CycleSummary)
        -> PolicyResult<(f64, HashMap<String, f64>)>;
}

// ============================================================================
// Defaults
// ============================================================================

/// Deviation policy that reports zero deviation everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroDeviation;

impl DeviationPolicy for ZeroDeviation {
    fn deviations(&mut self, _feedback_id: &str, steps: usize) -> PolicyResult<DeviationSeries> {
        Ok(vec![0.0; steps])
    }
}

/// Reward policy that returns a fixed neutral reward and no layer detail.
#[derive(Clone, Copy, Debug)]
pub struct NeutralReward {
    /// The global value reported every cycle.
    pub value: f64,
}

impl Default for NeutralReward {
    fn default() -> Self {
        Self { value: 0.0 }
    }
}

impl RewardPolicy for NeutralReward {
    fn reward(
        &mut self,
        _summary: &CycleSummary,
    ) -> PolicyResult<(f64, HashMap<String, f64>)> {
        Ok((self.value, HashMap::new()))
    }
}

// Closures are accepted wherever a full impl would be ceremony.

impl<F> StateProvider for F
where
    F: FnMut() -> PolicyResult<RobotState> + Send,
{
    fn state(&mut self) -> PolicyResult<RobotState> {
        self()
    }
}

impl<F> CommandExecutor for F
where
    F: FnMut(&ActuatorDelta) -> PolicyResult<()> + Send,
{
    fn execute(&mut self, delta: &ActuatorDelta) -> PolicyResult<()> {
        self(delta)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_deviation_length() {
        let mut policy = ZeroDeviation;
        let devs = policy.deviations("fb0", 16).unwrap();
        assert_eq!(devs, vec![0.0; 16]);
    }

    #[test]
    fn test_neutral_reward() {
        let mut policy = NeutralReward { value: 0.5 };
        let (global, by_layer) = policy.reward(&CycleSummary::default()).unwrap();
        assert!((global - 0.5).abs() < 1e-12);
        assert!(by_layer.is_empty());
    }

    #[test]
    fn test_closure_callbacks() {
        let mut applied = Vec::new();
        {
            let mut exec = |delta: &ActuatorDelta| -> PolicyResult<()> {
                applied.push(delta.t);
                Ok(())
            };
            CommandExecutor::execute(&mut exec, &ActuatorDelta::new(4)).unwrap();
        }
        assert_eq!(applied, vec![4]);
    }
}
