//! Decode engine: spike batch to actuator deltas
//!
//! Applies the mapping table to one timestep's spike batch:
//!
//! 1. For every mapping entry whose population appears in the batch, evaluate
//!    its scheme and accumulate the result into the entry's channel.
//! 2. Clamp each channel's total to the sum of `per_step_max` over the
//!    entries targeting it.
//!
//! Absent populations are silent, not erroneous: they contribute zero. A
//! spike vector of the wrong length is a data fault — it is reported in the
//! outcome, treated as all-zero for the tick, and decoding continues
//! (fail-open, never fail-closed on a single tick).
//!
//! Entries are accumulated in mapping load order, so a given table and batch
//! always reproduce the identical float result.

use crate::error::DataFault;
use crate::mapping::MappingTable;
use crate::scheme::evaluate;
use crate::types::{ActuatorDelta, SpikeBatch};

/// Result of decoding one batch: the clamped deltas plus any data faults
/// observed on the way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeOutcome {
    /// Accumulated, clamped per-channel deltas.
    pub delta: ActuatorDelta,
    /// Wrong-length vectors encountered (zero-filled). One entry per bad
    /// population, regardless of how many mapping entries reference it.
    pub faults: Vec<DataFault>,
}

/// Decode one spike batch against a mapping table.
#[must_use]
pub fn decode(table: &MappingTable, batch: &SpikeBatch) -> DecodeOutcome {
    let window = table.window();
    let mut delta = ActuatorDelta::new(batch.t);
    let mut faults: Vec<DataFault> = Vec::new();

    for entry in table.entries() {
        let spikes = match batch.spikes.get(&entry.node_id) {
            // Silent population: evaluate as all-zero, which is always 0.
            None => continue,
            Some(v) if v.len() != window => {
                let fault = DataFault::WrongLength {
                    node_id: entry.node_id.clone(),
                    expected: window,
                    got: v.len(),
                };
                if !faults.contains(&fault) {
                    faults.push(fault);
                }
                continue;
            }
            Some(v) => v,
        };

        let value = evaluate(entry.scheme, spikes, entry.gain);
        if value != 0.0 {
            *delta.deltas.entry(entry.channel.clone()).or_insert(0.0) += value;
        }
    }

    for (channel, value) in &mut delta.deltas {
        let limit = table.channel_limit(channel);
        *value = value.clamp(-limit, limit);
    }

    DecodeOutcome { delta, faults }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingEntry, SchemeKind};

    fn entry(node: &str, channel: &str, scheme: SchemeKind, gain: f64, limit: f64) -> MappingEntry {
        MappingEntry {
            node_id: node.into(),
            channel: channel.into(),
            scheme,
            gain,
            per_step_max: limit,
        }
    }

    fn batch(t: u64, rows: &[(&str, &[u32])]) -> SpikeBatch {
        let mut b = SpikeBatch::new(t);
        for (id, bits) in rows {
            b.spikes.insert((*id).into(), bits.to_vec());
        }
        b
    }

    #[test]
    fn test_bipolar_split_clamped_scenario() {
        // Raw 0.5*(2-0)=1.0, clamped to 0.004.
        let table = MappingTable::new(
            vec![entry("V1", "joint:0", SchemeKind::BipolarSplit, 0.5, 0.004)],
            4,
        )
        .unwrap();

        let out = decode(&table, &batch(1, &[("V1", &[1, 1, 0, 0])]));
        assert!((out.delta.get("joint:0") - 0.004).abs() < 1e-12);
        assert!(out.faults.is_empty());
    }

    #[test]
    fn test_silent_population_decodes_to_zero() {
        let table = MappingTable::new(
            vec![entry("V1", "joint:0", SchemeKind::BipolarSplit, 0.5, 0.004)],
            4,
        )
        .unwrap();

        let out = decode(&table, &batch(1, &[("V1", &[0, 0, 0, 0])]));
        assert_eq!(out.delta.get("joint:0"), 0.0);

        // Fully absent population is also fine.
        let out = decode(&table, &batch(2, &[]));
        assert_eq!(out.delta.get("joint:0"), 0.0);
        assert!(out.faults.is_empty());
    }

    #[test]
    fn test_shared_channel_accumulates_then_clamps() {
        // Raw 1.0*3 + 0.5*2 = 4.0, clamped to 0.001+0.001.
        let table = MappingTable::new(
            vec![
                entry("A", "gripper", SchemeKind::Addition, 1.0, 0.001),
                entry("B", "gripper", SchemeKind::Addition, 0.5, 0.001),
            ],
            4,
        )
        .unwrap();

        let out = decode(
            &table,
            &batch(1, &[("A", &[1, 1, 1, 0]), ("B", &[2, 0, 0, 0])]),
        );
        assert!((out.delta.get("gripper") - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_gain_accumulation_pre_clamp() {
        // Two entries with gains g1, g2 on identical scheme/input behave like
        // one entry with gain g1+g2, before clamping.
        let single = MappingTable::new(
            vec![entry("V1", "c", SchemeKind::Addition, 0.7, 100.0)],
            4,
        )
        .unwrap();
        let double = MappingTable::new(
            vec![
                entry("V1", "c", SchemeKind::Addition, 0.3, 100.0),
                entry("V1", "c", SchemeKind::Addition, 0.4, 100.0),
            ],
            4,
        )
        .unwrap();

        let b = batch(1, &[("V1", &[1, 2, 0, 1])]);
        let lhs = decode(&single, &b).delta.get("c");
        let rhs = decode(&double, &b).delta.get("c");
        assert!((lhs - rhs).abs() < 1e-12);
    }

    #[test]
    fn test_negative_delta_clamped_symmetrically() {
        let table = MappingTable::new(
            vec![entry("V1", "joint:0", SchemeKind::BipolarSplit, 1.0, 0.002)],
            4,
        )
        .unwrap();

        let out = decode(&table, &batch(1, &[("V1", &[0, 0, 3, 3])]));
        assert!((out.delta.get("joint:0") + 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_idempotent_decode() {
        let table = MappingTable::new(
            vec![
                entry("V1", "joint:0", SchemeKind::BipolarSplit, 0.5, 0.004),
                entry("V2", "gripper", SchemeKind::Addition, 1.0, 0.01),
            ],
            4,
        )
        .unwrap();
        let b = batch(9, &[("V1", &[1, 1, 0, 0]), ("V2", &[0, 1, 1, 0])]);

        let first = decode(&table, &b);
        let second = decode(&table, &b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_length_is_contained() {
        let table = MappingTable::new(
            vec![
                entry("BAD", "joint:0", SchemeKind::Addition, 1.0, 0.01),
                entry("OK", "gripper", SchemeKind::Addition, 1.0, 0.01),
            ],
            4,
        )
        .unwrap();

        let out = decode(
            &table,
            &batch(1, &[("BAD", &[1, 1]), ("OK", &[1, 1, 0, 0])]),
        );

        // Malformed vector zero-filled, unrelated channel unaffected.
        assert_eq!(out.delta.get("joint:0"), 0.0);
        assert!((out.delta.get("gripper") - 0.01).abs() < 1e-12);
        assert_eq!(
            out.faults,
            vec![DataFault::WrongLength {
                node_id: "BAD".into(),
                expected: 4,
                got: 2,
            }]
        );
    }
}
