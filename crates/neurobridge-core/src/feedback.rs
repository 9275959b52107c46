//! Feedback raster generation
//!
//! Converts a per-feedback-channel deviation series into a spike-like raster,
//! using the previous cycle's raster for the same channel as baseline. The
//! raster store is the only cross-cycle state in the pipeline: one slot per
//! feedback id, created all-zero on first reference, committed only after the
//! encoder succeeds, and cleared when the run ends.
//!
//! The encoding itself is a policy. [`DifferentialEncoder`] is the shipped
//! default; integrators with other training setups can supply their own
//! [`RasterEncoder`]. Whatever the encoder does, the store guarantees:
//!
//! 1. Every committed raster has the configured window length `T`.
//! 2. Commit is atomic — a failed encode leaves the previous raster intact.
//! 3. Rasters are a deterministic function of `(deviations_t, raster_{t-1})`,
//!    so replaying a deviation history from a fresh store reproduces the
//!    identical raster sequence.

use std::collections::HashMap;

use crate::error::{RasterError, RasterResult};
use crate::types::{DeviationSeries, FeedbackRaster};

// ============================================================================
// Encoder Policy
// ============================================================================

/// Deviation-to-raster encoding policy.
///
/// Implementations must be deterministic and must return a raster with the
/// same length as `previous` (the store rejects anything else).
pub trait RasterEncoder: Send {
    /// Encode one cycle's deviations against the previous raster.
    fn encode(&self, deviations: &[f64], previous: &[f64]) -> FeedbackRaster;
}

/// Default encoder: differential thresholding against the prior raster.
///
/// For each sub-step `i`, blend the carried-over previous spike with the new
/// deviation, then emit a ternary spike:
///
/// ```text
/// blend = carry * prev[i] + clamp(dev[i], -1, 1)
/// out[i] = +1 if blend >  dead_zone
///          -1 if blend < -dead_zone
///           0 otherwise
/// ```
///
/// The carry keeps a persistent deviation pushing in one direction from
/// flickering off when a single sub-step dips inside the dead zone; the dead
/// zone itself suppresses noise-level corrections.
#[derive(Clone, Copy, Debug)]
pub struct DifferentialEncoder {
    /// Weight of the previous raster in the blend. 0 disables history.
    pub carry: f64,
    /// Deviations (after blending) at or below this magnitude emit no spike.
    pub dead_zone: f64,
}

impl Default for DifferentialEncoder {
    fn default() -> Self {
        Self {
            carry: 0.5,
            dead_zone: 0.08,
        }
    }
}

impl RasterEncoder for DifferentialEncoder {
    fn encode(&self, deviations: &[f64], previous: &[f64]) -> FeedbackRaster {
        deviations
            .iter()
            .zip(previous)
            .map(|(&dev, &prev)| {
                let blend = self.carry * prev + dev.clamp(-1.0, 1.0);
                if blend > self.dead_zone {
                    1.0
                } else if blend < -self.dead_zone {
                    -1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

// ============================================================================
// Raster Store
// ============================================================================

/// Run-scoped raster state, keyed by feedback id.
///
/// Owned exclusively by the sync loop; policies supply deviations but never
/// touch the store directly.
#[derive(Debug)]
pub struct RasterStore {
    window: usize,
    rasters: HashMap<String, FeedbackRaster>,
}

impl RasterStore {
    /// Create an empty store for feedback window length `T`.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window,
            rasters: HashMap::new(),
        }
    }

    /// Feedback window length `T`.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// The last committed raster for a feedback id, if any cycle committed one.
    #[must_use]
    pub fn last(&self, feedback_id: &str) -> Option<&FeedbackRaster> {
        self.rasters.get(feedback_id)
    }

    /// An all-zero raster of the configured length. The baseline for a
    /// feedback id's first cycle, and the degraded substitute on encode
    /// failure.
    #[must_use]
    pub fn zero(&self) -> FeedbackRaster {
        vec![0.0; self.window]
    }

    /// Encode one cycle's deviations for `feedback_id` and commit the result.
    ///
    /// The slot is created (all-zero) on first reference. On success the new
    /// raster is committed and a copy returned. On failure nothing is
    /// committed: the previous raster stays in place and the caller should
    /// publish an all-zero raster for this cycle.
    ///
    /// # Errors
    ///
    /// [`RasterError::DeviationLength`] if the series is not `T` long;
    /// [`RasterError::EncoderLength`] if the encoder violates its contract.
    pub fn generate(
        &mut self,
        feedback_id: &str,
        deviations: &DeviationSeries,
        encoder: &dyn RasterEncoder,
    ) -> RasterResult<FeedbackRaster> {
        if deviations.len() != self.window {
            return Err(RasterError::DeviationLength {
                feedback_id: feedback_id.to_string(),
                expected: self.window,
                got: deviations.len(),
            });
        }

        let previous = self
            .rasters
            .entry(feedback_id.to_string())
            .or_insert_with(|| vec![0.0; self.window]);

        let raster = encoder.encode(deviations, previous);
        if raster.len() != self.window {
            return Err(RasterError::EncoderLength {
                feedback_id: feedback_id.to_string(),
                expected: self.window,
                got: raster.len(),
            });
        }

        *previous = raster.clone();
        Ok(raster)
    }

    /// Drop all raster state. Called when the run ends.
    pub fn clear(&mut self) {
        self.rasters.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_baseline_is_zero() {
        let mut store = RasterStore::new(4);
        let enc = DifferentialEncoder::default();

        let raster = store
            .generate("fb0", &vec![0.5, -0.5, 0.01, 0.0], &enc)
            .unwrap();
        assert_eq!(raster, vec![1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_carry_holds_spike_through_dead_zone_dip() {
        let mut store = RasterStore::new(2);
        let enc = DifferentialEncoder::default();

        store.generate("fb0", &vec![0.9, 0.9], &enc).unwrap();
        // Next cycle's deviation is inside the dead zone on its own, but the
        // carried +1 keeps the spike alive: 0.5*1.0 + 0.05 > 0.08.
        let raster = store.generate("fb0", &vec![0.05, 0.05], &enc).unwrap();
        assert_eq!(raster, vec![1.0, 1.0]);
    }

    #[test]
    fn test_replay_reproduces_identical_sequence() {
        let enc = DifferentialEncoder::default();
        let history: Vec<Vec<f64>> = vec![
            vec![0.3, -0.9, 0.0],
            vec![0.0, 0.2, -0.5],
            vec![-0.1, -0.1, -0.1],
            vec![1.5, 0.0, 0.04],
        ];

        let run = |history: &[Vec<f64>]| -> Vec<FeedbackRaster> {
            let mut store = RasterStore::new(3);
            history
                .iter()
                .map(|d| store.generate("fb0", d, &enc).unwrap())
                .collect()
        };

        assert_eq!(run(&history), run(&history));
    }

    #[test]
    fn test_failed_encode_retains_previous_raster() {
        let mut store = RasterStore::new(3);
        let enc = DifferentialEncoder::default();

        let committed = store.generate("fb0", &vec![0.9, 0.9, 0.9], &enc).unwrap();

        // Wrong-length deviations must not disturb the committed raster.
        let err = store.generate("fb0", &vec![0.9], &enc);
        assert!(matches!(err, Err(RasterError::DeviationLength { .. })));
        assert_eq!(store.last("fb0"), Some(&committed));
    }

    #[test]
    fn test_slots_are_independent() {
        let mut store = RasterStore::new(2);
        let enc = DifferentialEncoder::default();

        store.generate("fb0", &vec![0.9, 0.9], &enc).unwrap();
        let other = store.generate("fb1", &vec![0.0, 0.0], &enc).unwrap();

        assert_eq!(other, vec![0.0, 0.0]);
        assert_eq!(store.last("fb0"), Some(&vec![1.0, 1.0]));
    }

    #[test]
    fn test_clear_resets_lifecycle() {
        let mut store = RasterStore::new(2);
        let enc = DifferentialEncoder::default();

        store.generate("fb0", &vec![0.9, 0.9], &enc).unwrap();
        store.clear();
        assert!(store.last("fb0").is_none());

        // After clear, the channel starts from the all-zero baseline again.
        let raster = store.generate("fb0", &vec![0.05, 0.05], &enc).unwrap();
        assert_eq!(raster, vec![0.0, 0.0]);
    }
}
