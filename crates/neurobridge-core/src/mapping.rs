//! Mapping table: output populations to actuator channels
//!
//! A mapping entry connects one output population (`node_id`) to one actuator
//! channel under a decoding scheme. Channel names are arbitrary strings chosen
//! by the integrator ("joint:0", "wheel:left", "gripper"); this crate never
//! validates them against any hardware schema.
//!
//! Multiple entries may target the same channel; their contributions are
//! summed by the decode engine and the channel total is clamped to the sum of
//! the entries' `per_step_max` limits.
//!
//! Wire format (JSON, camelCase, matching the server):
//!
//! ```json
//! [
//!   {"nodeId": "V2", "channel": "joint:3", "scheme": "bipolarSplit",
//!    "perStepMax": 0.003, "gain": 0.5}
//! ]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};

// ============================================================================
// Scheme Kinds
// ============================================================================

/// Closed set of spike-to-scalar decoding schemes.
///
/// Wire names are the server's camelCase identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeKind {
    /// `gain * (sum(first half) - sum(second half))`.
    #[serde(rename = "bipolarSplit")]
    BipolarSplit,
    /// `gain * sum(window)`.
    #[serde(rename = "addition")]
    Addition,
    /// `gain` if the window total reaches half the window, else 0.
    #[serde(rename = "booleanThreshold")]
    BooleanThreshold,
    /// Sign comparison of the two halves: `+gain`, `-gain` or 0 on a tie.
    #[serde(rename = "bipolarScalar")]
    BipolarScalar,
}

// ============================================================================
// Mapping Entries
// ============================================================================

/// One population-to-channel mapping record. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    /// Output population this entry decodes.
    pub node_id: String,
    /// Actuator channel the decoded delta feeds.
    pub channel: String,
    /// Decoding scheme.
    pub scheme: SchemeKind,
    /// Scale applied by the scheme evaluator.
    pub gain: f64,
    /// Per-timestep magnitude budget this entry contributes to its channel's
    /// clamp bound. Must be finite and non-negative.
    pub per_step_max: f64,
}

// ============================================================================
// Mapping Table
// ============================================================================

/// Validated, immutable mapping table for one run.
///
/// Holds the entries in load order (decoding iterates them in this order so
/// float accumulation is reproducible) plus the per-channel clamp bounds.
#[derive(Clone, Debug)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
    window: usize,
    channel_limits: HashMap<String, f64>,
}

impl MappingTable {
    /// Build a table from entries, validating every record.
    ///
    /// `window` is the run's spike window length `W`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] if the table is empty, the window is zero, or
    /// any entry has an empty id, a non-finite gain, or a negative or
    /// non-finite `per_step_max`.
    pub fn new(entries: Vec<MappingEntry>, window: usize) -> MappingResult<Self> {
        if window == 0 {
            return Err(MappingError::InvalidWindow { window });
        }
        if entries.is_empty() {
            return Err(MappingError::Empty);
        }

        for (index, entry) in entries.iter().enumerate() {
            let reject = |reason: &str| MappingError::InvalidEntry {
                index,
                node_id: entry.node_id.clone(),
                channel: entry.channel.clone(),
                reason: reason.to_string(),
            };

            if entry.node_id.is_empty() {
                return Err(reject("empty node id"));
            }
            if entry.channel.is_empty() {
                return Err(reject("empty channel"));
            }
            if !entry.gain.is_finite() {
                return Err(reject("gain is not finite"));
            }
            if !entry.per_step_max.is_finite() || entry.per_step_max < 0.0 {
                return Err(reject("perStepMax must be finite and >= 0"));
            }
        }

        let mut channel_limits: HashMap<String, f64> = HashMap::new();
        for entry in &entries {
            *channel_limits.entry(entry.channel.clone()).or_insert(0.0) += entry.per_step_max;
        }

        Ok(Self {
            entries,
            window,
            channel_limits,
        })
    }

    /// Parse a table from the server's JSON list form.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] on malformed JSON or invalid entries.
    pub fn from_json(json: &str, window: usize) -> MappingResult<Self> {
        let entries: Vec<MappingEntry> = serde_json::from_str(json)?;
        Self::new(entries, window)
    }

    /// Entries in load order.
    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// The run's spike window length `W`.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Clamp bound for a channel: the sum of `per_step_max` over every entry
    /// targeting it. 0.0 for channels no entry targets.
    #[must_use]
    pub fn channel_limit(&self, channel: &str) -> f64 {
        self.channel_limits.get(channel).copied().unwrap_or(0.0)
    }

    /// All channels any entry targets.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channel_limits.keys().map(String::as_str)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: &str, channel: &str, limit: f64) -> MappingEntry {
        MappingEntry {
            node_id: node.into(),
            channel: channel.into(),
            scheme: SchemeKind::Addition,
            gain: 1.0,
            per_step_max: limit,
        }
    }

    #[test]
    fn test_channel_limit_sums_entries() {
        let table = MappingTable::new(
            vec![
                entry("V1", "gripper", 0.001),
                entry("V2", "gripper", 0.001),
                entry("V3", "joint:0", 0.004),
            ],
            4,
        )
        .unwrap();

        assert!((table.channel_limit("gripper") - 0.002).abs() < 1e-12);
        assert!((table.channel_limit("joint:0") - 0.004).abs() < 1e-12);
        assert_eq!(table.channel_limit("unknown"), 0.0);
    }

    #[test]
    fn test_rejects_negative_limit() {
        let result = MappingTable::new(vec![entry("V1", "joint:0", -0.1)], 4);
        assert!(matches!(result, Err(MappingError::InvalidEntry { .. })));
    }

    #[test]
    fn test_rejects_empty_table_and_zero_window() {
        assert!(matches!(
            MappingTable::new(vec![], 4),
            Err(MappingError::Empty)
        ));
        assert!(matches!(
            MappingTable::new(vec![entry("V1", "joint:0", 0.1)], 0),
            Err(MappingError::InvalidWindow { window: 0 })
        ));
    }

    #[test]
    fn test_json_wire_names() {
        let json = r#"[
            {"nodeId": "V2", "channel": "joint:3", "scheme": "bipolarSplit",
             "perStepMax": 0.003, "gain": 0.5}
        ]"#;
        let table = MappingTable::from_json(json, 32).unwrap();

        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.entries()[0].scheme, SchemeKind::BipolarSplit);
        assert!((table.entries()[0].per_step_max - 0.003).abs() < 1e-12);
    }
}
