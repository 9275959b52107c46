//! Spike-vector to scalar evaluators
//!
//! Each scheme converts one population's spike window into one scalar
//! contribution. Evaluators are pure: no state, no side effects, identical
//! input always yields identical output. Reward reproducibility depends on
//! this, so keep it that way.
//!
//! Window split rule: for an odd window the extra bin goes to the second
//! half, i.e. `H1 = v[..W/2]`, `H2 = v[W/2..]`.

use crate::mapping::SchemeKind;

/// Evaluate one scheme over one spike vector.
///
/// The vector is assumed to already have the run's window length; length
/// handling happens in the decode engine, not here.
#[must_use]
pub fn evaluate(scheme: SchemeKind, spikes: &[u32], gain: f64) -> f64 {
    match scheme {
        SchemeKind::BipolarSplit => {
            let (h1, h2) = split(spikes);
            gain * (f64::from(sum(h1)) - f64::from(sum(h2)))
        }
        SchemeKind::Addition => gain * f64::from(sum(spikes)),
        SchemeKind::BooleanThreshold => {
            // Threshold floor(W/2), but never below one spike: an all-zero
            // window must always decode to zero.
            let threshold = (spikes.len() as u32 / 2).max(1);
            if sum(spikes) >= threshold {
                gain
            } else {
                0.0
            }
        }
        SchemeKind::BipolarScalar => {
            let (h1, h2) = split(spikes);
            match sum(h1).cmp(&sum(h2)) {
                std::cmp::Ordering::Greater => gain,
                std::cmp::Ordering::Less => -gain,
                std::cmp::Ordering::Equal => 0.0,
            }
        }
    }
}

fn split(spikes: &[u32]) -> (&[u32], &[u32]) {
    spikes.split_at(spikes.len() / 2)
}

fn sum(bins: &[u32]) -> u32 {
    bins.iter().sum()
}

// ============================================================================
// Tests
// ============================================================================
