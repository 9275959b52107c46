//! Run contract: stable identifiers shared with user policies
//!
//! A contract is the run-scoped set of layer and feedback ids that both the
//! mapping table and user policies reference. The server regenerates it when
//! the project graph changes, but a run loads exactly one snapshot at start
//! and keeps it — a mid-run update must never silently invalidate loaded
//! mappings.
//!
//! The digest over the stable view (constants + sorted id sets, canonical
//! JSON) is what tooling compares to detect graph changes between runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::RunConstants;

/// Immutable identifier sets for one run.
///
/// `BTreeSet` keeps iteration (and therefore the digest) independent of
/// insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Learning layer ids a reward policy may address.
    pub layer_ids: BTreeSet<String>,
    /// Feedback channel ids a deviation policy must cover.
    pub feedback_ids: BTreeSet<String>,
}

impl Contract {
    /// Build a contract from id iterators.
    pub fn new<L, F>(layers: L, feedback: F) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            layer_ids: layers.into_iter().map(Into::into).collect(),
            feedback_ids: feedback.into_iter().map(Into::into).collect(),
        }
    }
}

/// Contract plus the run constants it was issued with.
///
/// This is the whole policy-facing surface: everything a policy author needs
/// and nothing run-specific.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSnapshot {
    /// Fixed per-run dimensions.
    pub constants: RunConstants,
    /// Identifier sets.
    pub contract: Contract,
}

impl ContractSnapshot {
    /// Canonical JSON of the stable view. Field order is fixed by the struct
    /// and the sets are sorted, so equal snapshots serialize identically.
    #[must_use]
    pub fn stable_json(&self) -> String {
        serde_json::to_string(self).expect("snapshot serialization cannot fail")
    }

    /// Hex blake3 digest of the stable view.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(blake3::hash(self.stable_json().as_bytes()).as_bytes())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_ignores_insertion_order() {
        let a = ContractSnapshot {
            constants: RunConstants::default(),
            contract: Contract::new(["l2", "l1"], ["fb1", "fb0"]),
        };
        let b = ContractSnapshot {
            constants: RunConstants::default(),
            contract: Contract::new(["l1", "l2"], ["fb0", "fb1"]),
        };

        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_tracks_content() {
        let base = ContractSnapshot {
            constants: RunConstants::default(),
            contract: Contract::new(["l1"], ["fb0"]),
        };
        let mut grown = base.clone();
        grown.contract.feedback_ids.insert("fb1".to_string());

        assert_ne!(base.digest(), grown.digest());

        let mut resized = base.clone();
        resized.constants.feedback_window = 128;
        assert_ne!(base.digest(), resized.digest());
    }

    #[test]
    fn test_wire_shape() {
        let snapshot = ContractSnapshot {
            constants: RunConstants {
                output_window: 32,
                feedback_window: 64,
            },
            contract: Contract::new(["l1"], ["fb0"]),
        };
        let json: serde_json::Value =
            serde_json::from_str(&snapshot.stable_json()).unwrap();

        assert_eq!(json["constants"]["outputWindow"], 32);
        assert_eq!(json["contract"]["layerIds"][0], "l1");
    }
}
