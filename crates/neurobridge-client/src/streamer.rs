//! Sensor input streaming
//!
//! Answers the server's `io:need` requests by invoking user-registered
//! providers and packaging what they return as `io:chunk` messages. Providers
//! are registered for a specific input id or for a whole kind ("Image",
//! "Audio"); an id-level provider wins over a kind-level one.
//!
//! A missing provider is a warning, not an error — the server falls back to a
//! default assignment for that input. A provider failure is caught, logged
//! and skipped; input streaming must never take the loop down.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use neurobridge_core::error::PolicyResult;

use crate::wire::{IoChunk, IoNeed};

/// One sensor reading as returned by a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSample {
    /// Payload format tag ("jpeg", "pcm16", ...).
    pub format: String,
    /// Free-form metadata forwarded to the server.
    pub meta: Value,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

/// Supplies one input's data on demand.
pub trait InputProvider: Send {
    /// Capture a sample. Called once per `io:need` entry.
    fn sample(&mut self) -> PolicyResult<InputSample>;
}

impl<F> InputProvider for F
where
    F: FnMut() -> PolicyResult<InputSample> + Send,
{
    fn sample(&mut self) -> PolicyResult<InputSample> {
        self()
    }
}

/// Provider registry with per-input sequence counters.
#[derive(Default)]
pub struct InputStreamer {
    by_id: HashMap<String, Box<dyn InputProvider>>,
    by_kind: HashMap<String, Box<dyn InputProvider>>,
    seq: HashMap<String, u64>,
}

impl InputStreamer {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a specific input id. Replaces any previous
    /// provider for that id.
    pub fn register_input(&mut self, input_id: impl Into<String>, provider: Box<dyn InputProvider>) {
        let input_id = input_id.into();
        debug!(input = %input_id, "registered input provider");
        self.by_id.insert(input_id, provider);
    }

    /// Register a provider for every input of a kind. Id-level providers
    /// take precedence.
    pub fn register_kind(&mut self, kind: impl Into<String>, provider: Box<dyn InputProvider>) {
        let kind = kind.into();
        debug!(kind = %kind, "registered kind provider");
        self.by_kind.insert(kind, provider);
    }

    fn next_seq(&mut self, input_id: &str) -> u64 {
        let seq = self.seq.entry(input_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Answer one `io:need` request. Returns the chunks to publish, in
    /// request order.
    pub fn respond(&mut self, run_id: &str, need: &IoNeed) -> Vec<IoChunk> {
        let mut chunks = Vec::new();

        for entry in &need.needs {
            if entry.id.is_empty() {
                continue;
            }

            let provider = match self.by_id.get_mut(&entry.id) {
                Some(provider) => provider,
                None => match self.by_kind.get_mut(&entry.kind) {
                    Some(provider) => provider,
                    None => {
                        warn!(
                            input = %entry.id,
                            kind = %entry.kind,
                            "no provider registered; skipping"
                        );
                        continue;
                    }
                },
            };

            let sample = match provider.sample() {
                Ok(sample) => sample,
                Err(err) => {
                    warn!(input = %entry.id, error = %err, "input provider failed; skipping");
                    continue;
                }
            };

            let seq = self.next_seq(&entry.id);
            chunks.push(IoChunk {
                run_id: run_id.to_string(),
                input_id: entry.id.clone(),
                kind: entry.kind.clone(),
                seq,
                cycle: need.cycle,
                format: sample.format,
                meta: sample.meta,
                data: hex::encode(sample.data),
            });
        }

        chunks
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::NeedEntry;
    use neurobridge_core::error::PolicyError;

    fn need(entries: &[(&str, &str)]) -> IoNeed {
        IoNeed {
            cycle: 5,
            needs: entries
                .iter()
                .map(|(id, kind)| NeedEntry {
                    id: (*id).to_string(),
                    kind: (*kind).to_string(),
                })
                .collect(),
            deadline_ms: None,
        }
    }

    fn fixed_provider(bytes: &'static [u8]) -> Box<dyn InputProvider> {
        Box::new(move || -> PolicyResult<InputSample> {
            Ok(InputSample {
                format: "jpeg".to_string(),
                meta: serde_json::json!({"width": 2}),
                data: bytes.to_vec(),
            })
        })
    }

    #[test]
    fn test_id_provider_wins_over_kind() {
        let mut streamer = InputStreamer::new();
        streamer.register_kind("Image", fixed_provider(b"kind"));
        streamer.register_input("cam_rgb", fixed_provider(b"id"));

        let chunks = streamer.respond("r1", &need(&[("cam_rgb", "Image")]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, hex::encode(b"id"));
        assert_eq!(chunks[0].cycle, 5);
    }

    #[test]
    fn test_missing_provider_skipped() {
        let mut streamer = InputStreamer::new();
        let chunks = streamer.respond("r1", &need(&[("mic", "Audio")]));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_failing_provider_contained() {
        let mut streamer = InputStreamer::new();
        streamer.register_input(
            "cam_rgb",
            Box::new(|| -> PolicyResult<InputSample> {
                Err(PolicyError::failure("lens cap on"))
            }),
        );
        streamer.register_input("depth", fixed_provider(b"ok"));

        let chunks = streamer.respond("r1", &need(&[("cam_rgb", "Image"), ("depth", "Image")]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].input_id, "depth");
    }

    #[test]
    fn test_sequence_numbers_increment_per_input() {
        let mut streamer = InputStreamer::new();
        streamer.register_input("cam_rgb", fixed_provider(b"a"));

        let first = streamer.respond("r1", &need(&[("cam_rgb", "Image")]));
        let second = streamer.respond("r1", &need(&[("cam_rgb", "Image")]));
        assert_eq!(first[0].seq, 1);
        assert_eq!(second[0].seq, 2);
    }
}
