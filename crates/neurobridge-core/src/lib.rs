//! Neurobridge Core - deterministic decode/feedback/reward pipeline
//!
//! This crate contains the synchronous heart of the SDK: everything that runs
//! once per control timestep between "a spike batch arrived" and "feedback and
//! reward are ready to publish". It has no I/O and no clock; identical inputs
//! always produce identical outputs.
//!
//! # Modules
//!
//! - [`types`]: Data carriers (spike batches, actuator deltas, rasters, rewards)
//! - [`error`]: Error types for mapping, rasters and policies
//! - [`mapping`]: Validated table mapping output populations to actuator channels
//! - [`scheme`]: Spike-vector to scalar evaluators
//! - [`decode`]: Batch decoding with accumulation and per-channel clamping
//! - [`feedback`]: Stateful deviation-to-raster encoding
//! - [`reward`]: Reward validation and clamping against the run contract
//! - [`contract`]: Run-scoped identifier snapshot with a stable digest
//! - [`policy`]: User-supplied policy interfaces and the shipped defaults
//!
//! # Example
//!
//! ```rust
//! use neurobridge_core::mapping::{MappingEntry, MappingTable, SchemeKind};
//! use neurobridge_core::types::SpikeBatch;
//! use neurobridge_core::decode::decode;
//!
//! let table = MappingTable::new(vec![MappingEntry {
//!     node_id: "V1".into(),
//!     channel: "joint:0".into(),
//!     scheme: SchemeKind::BipolarSplit,
//!     gain: 0.5,
//!     per_step_max: 0.004,
//! }], 4).unwrap();
//!
//! let mut batch = SpikeBatch::new(0);
//! batch.spikes.insert("V1".into(), vec![1, 1, 0, 0]);
//!
//! let outcome = decode(&table, &batch);
//! assert_eq!(outcome.delta.get("joint:0"), 0.004);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod contract;
pub mod decode;
pub mod error;
pub mod feedback;
pub mod mapping;
pub mod policy;
pub mod reward;
pub mod scheme;
pub mod types;

// Re-export commonly used types at crate root
pub use contract::Contract;
pub use decode::{decode, DecodeOutcome};
pub use error::{DataFault, MappingError, PolicyError, RasterError};
pub use feedback::{DifferentialEncoder, RasterEncoder, RasterStore};
pub use mapping::{MappingEntry, MappingTable, SchemeKind};
pub use reward::{aggregate, RewardLimits};
pub use types::{
    ActuatorDelta, DeviationSeries, FeedbackRaster, RewardReport, RobotState, RunConstants,
    SpikeBatch,
};
