//! Timestep sync loop
//!
//! The coordinator that runs once per control timestep: pull the next spike
//! batch from the transport, decode it, hand the command to the robot, build
//! feedback rasters and the reward report, publish everything, repeat.
//!
//! ```text
//! Idle -> AwaitingBatch -> Decoding -> ApplyingCommand
//!             ^                             |
//!             |                             v
//!        Publishing <- AggregatingReward <- GeneratingFeedback
//! ```
//!
//! `Stopped` is reached only on an explicit shutdown request, observed at
//! state boundaries (never mid-decode), so no partial delta or half-updated
//! raster is ever published. `Faulted` is reached only when the transport
//! itself fails unrecoverably; everything else degrades per tick and the
//! loop keeps going:
//!
//! - receive timeout: log, count, retry the same state
//! - malformed spike vector: zero-filled, unrelated channels unaffected
//! - callback error or deadline overrun: log with context, no-op, continue
//! - raster failure: previous raster retained, all-zero published
//! - publish failure: log, count, never retried mid-cycle
//!
//! The loop is the sole owner of the raster store and the sole reader of the
//! mapping table; user policies only supply values, so the pipeline itself
//! needs no locking. All transport concurrency sits behind the
//! [`RealtimeChannel`] queue boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use neurobridge_core::decode::decode;
use neurobridge_core::error::PolicyResult;
use neurobridge_core::feedback::{DifferentialEncoder, RasterEncoder, RasterStore};
use neurobridge_core::mapping::MappingTable;
use neurobridge_core::policy::{CommandExecutor, DeviationPolicy, RewardPolicy, StateProvider};
use neurobridge_core::reward::{aggregate, RewardLimits};
use neurobridge_core::types::{CycleSummary, SpikeBatch};

use crate::channel::ChannelError;
use crate::session::RunSession;
use crate::streamer::InputStreamer;
use crate::wire::InboundMessage;

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for the loop.
#[derive(Clone, Copy, Debug)]
pub struct LoopConfig {
    /// Upper bound on one `AwaitingBatch` wait. A timeout is not fatal.
    pub batch_timeout: Duration,
    /// Budget for each user callback. Overruns are counted and the result
    /// discarded, same as a callback error.
    pub callback_deadline: Duration,
    /// Safe range for reward clamping.
    pub reward_limits: RewardLimits,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_millis(500),
            callback_deadline: Duration::from_millis(50),
            reward_limits: RewardLimits::symmetric(),
        }
    }
}

// ============================================================================
// States & Metrics
// ============================================================================

/// The loop's state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, not yet running.
    Idle,
    /// Blocking on the transport (bounded).
    AwaitingBatch,
    /// Running the decode engine.
    Decoding,
    /// Invoking state provider and command executor.
    ApplyingCommand,
    /// Building feedback rasters.
    GeneratingFeedback,
    /// Building the reward report.
    AggregatingReward,
    /// Pushing results to the transport.
    Publishing,
    /// Terminal: explicit shutdown.
    Stopped,
    /// Terminal: unrecoverable transport failure.
    Faulted,
}

/// Why the loop exited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested.
    Stopped,
    /// The transport failed unrecoverably.
    Faulted(String),
}

/// Counters observable while the loop runs. All loads/stores are relaxed;
/// these are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct LoopMetrics {
    ticks: AtomicU64,
    timeouts: AtomicU64,
    rejected_batches: AtomicU64,
    data_faults: AtomicU64,
    callback_faults: AtomicU64,
    publish_errors: AtomicU64,
}

/// Plain-value copy of the counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Completed ticks.
    pub ticks: u64,
    /// `AwaitingBatch` timeouts.
    pub timeouts: u64,
    /// Out-of-order or duplicate batches dropped.
    pub rejected_batches: u64,
    /// Malformed spike vectors and raster failures.
    pub data_faults: u64,
    /// Callback errors and deadline overruns.
    pub callback_faults: u64,
    /// Best-effort publishes that failed.
    pub publish_errors: u64,
}

impl LoopMetrics {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
            data_faults: self.data_faults.load(Ordering::Relaxed),
            callback_faults: self.callback_faults.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
        }
    }
}

/// Remote control for a running loop: request shutdown, read metrics.
#[derive(Clone)]
pub struct LoopHandle {
    stop: Arc<AtomicBool>,
    metrics: Arc<LoopMetrics>,
}

impl LoopHandle {
    /// Request shutdown. Honored at the next state boundary.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Current metric values.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// The four user-supplied collaborators the loop drives each tick.
pub struct PipelineCallbacks {
    /// Supplies the observed robot state.
    pub state_provider: Box<dyn StateProvider>,
    /// Applies decoded deltas to the robot.
    pub command_executor: Box<dyn CommandExecutor>,
    /// Supplies per-feedback-channel deviations.
    pub deviation: Box<dyn DeviationPolicy>,
    /// Scores each cycle.
    pub reward: Box<dyn RewardPolicy>,
}

// ============================================================================
// Sync Loop
// ============================================================================

/// The timestep coordinator. See the module docs for the state machine.
pub struct SyncLoop {
    session: RunSession,
    table: Arc<MappingTable>,
    callbacks: PipelineCallbacks,
    store: RasterStore,
    encoder: Box<dyn RasterEncoder>,
    streamer: Option<InputStreamer>,
    config: LoopConfig,
    feedback_ids: Vec<String>,
    state: LoopState,
    last_t: Option<u64>,
    stop: Arc<AtomicBool>,
    metrics: Arc<LoopMetrics>,
}

impl SyncLoop {
    /// Build a loop for a session. The raster store is created here and dies
    /// with the run.
    #[must_use]
    pub fn new(
        session: RunSession,
        table: Arc<MappingTable>,
        callbacks: PipelineCallbacks,
    ) -> Self {
        let constants = session.constants();
        let feedback_ids = session
            .snapshot()
            .contract
            .feedback_ids
            .iter()
            .cloned()
            .collect();

        Self {
            session,
            table,
            callbacks,
            store: RasterStore::new(constants.feedback_window),
            encoder: Box::new(DifferentialEncoder::default()),
            streamer: None,
            config: LoopConfig::default(),
            feedback_ids,
            state: LoopState::Idle,
            last_t: None,
            stop: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(LoopMetrics::default()),
        }
    }

    /// Replace the loop configuration.
    #[must_use]
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the raster encoding policy.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Box<dyn RasterEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Attach an input streamer to answer `io:need` requests.
    #[must_use]
    pub fn with_streamer(mut self, streamer: InputStreamer) -> Self {
        self.streamer = Some(streamer);
        self
    }

    /// Control handle, clonable across threads.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            stop: Arc::clone(&self.stop),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Run until shutdown or transport failure. Consumes the loop; the
    /// session is closed and raster state dropped on the way out.
    pub fn run(mut self) -> LoopExit {
        info!(run = %self.session.run_id(), "sync loop started");
        self.state = LoopState::AwaitingBatch;

        let exit = loop {
            if self.stop.load(Ordering::Relaxed) {
                self.state = LoopState::Stopped;
                info!(run = %self.session.run_id(), "sync loop stopped");
                break LoopExit::Stopped;
            }

            match self
                .session
                .channel_mut()
                .recv_timeout(self.config.batch_timeout)
            {
                Ok(InboundMessage::Batch(batch)) => self.tick(batch),
                Ok(InboundMessage::IoNeed(need)) => {
                    let chunks = self
                        .streamer
                        .as_mut()
                        .map(|s| s.respond(self.session.run_id(), &need))
                        .unwrap_or_default();
                    for chunk in chunks {
                        if let Err(err) = self.session.send_chunk(chunk) {
                            warn!(error = %err, "input chunk publish failed");
                            LoopMetrics::add(&self.metrics.publish_errors, 1);
                        }
                    }
                }
                Ok(InboundMessage::RobotCmd(_)) => {
                    debug!("legacy robot:cmd ignored; decoding happens client-side");
                }
                Ok(InboundMessage::ContractUpdate(snapshot)) => {
                    warn!(
                        digest = %snapshot.digest(),
                        "contract regenerated mid-run; keeping the loaded snapshot"
                    );
                }
                Err(ChannelError::Timeout(timeout)) => {
                    debug!(?timeout, "no batch within timeout; retrying");
                    LoopMetrics::add(&self.metrics.timeouts, 1);
                }
                Err(err @ (ChannelError::Closed | ChannelError::Fatal(_))) => {
                    self.state = LoopState::Faulted;
                    error!(error = %err, "transport failed; sync loop faulted");
                    break LoopExit::Faulted(err.to_string());
                }
            }
        };

        self.store.clear();
        self.session.close();
        exit
    }

    /// One complete timestep. Every fault path inside ends in a degraded
    /// substitute; nothing escapes the tick.
    fn tick(&mut self, batch: SpikeBatch) {
        // Causality guard: a stale batch would corrupt the previous-cycle
        // raster baseline.
        if let Some(last) = self.last_t {
            if batch.t <= last {
                warn!(t = batch.t, last_t = last, "out-of-order batch dropped");
                LoopMetrics::add(&self.metrics.rejected_batches, 1);
                return;
            }
        }
        self.last_t = Some(batch.t);
        let deadline = self.config.callback_deadline;

        self.state = LoopState::Decoding;
        let outcome = decode(&self.table, &batch);
        for fault in &outcome.faults {
            warn!(t = batch.t, %fault, "data fault during decode");
        }
        LoopMetrics::add(&self.metrics.data_faults, outcome.faults.len() as u64);
        let delta = outcome.delta;

        self.state = LoopState::ApplyingCommand;
        let state = guarded(deadline, &self.metrics, "state_provider", || {
            self.callbacks.state_provider.state()
        });
        if let Some(state) = state {
            if let Err(err) = self.session.send_state(state) {
                warn!(error = %err, "robot state publish failed");
                LoopMetrics::add(&self.metrics.publish_errors, 1);
            }
        }
        guarded(deadline, &self.metrics, "command_executor", || {
            self.callbacks.command_executor.execute(&delta)
        });

        self.state = LoopState::GeneratingFeedback;
        let steps = self.store.window();
        let mut feedback = HashMap::with_capacity(self.feedback_ids.len());
        for feedback_id in &self.feedback_ids {
            let deviations = guarded(deadline, &self.metrics, "deviation_policy", || {
                self.callbacks.deviation.deviations(feedback_id, steps)
            });
            let raster = match deviations {
                Some(devs) => match self.store.generate(feedback_id, &devs, self.encoder.as_ref()) {
                    Ok(raster) => raster,
                    Err(err) => {
                        warn!(error = %err, "raster rejected; previous retained, zero published");
                        LoopMetrics::add(&self.metrics.data_faults, 1);
                        self.store.zero()
                    }
                },
                // Policy fault: store untouched, zero published.
                None => self.store.zero(),
            };
            feedback.insert(feedback_id.clone(), raster);
        }

        self.state = LoopState::AggregatingReward;
        let summary = CycleSummary {
            t: batch.t,
            deltas: delta.deltas.clone(),
            spike_totals: batch
                .spikes
                .keys()
                .map(|id| (id.clone(), batch.total(id)))
                .collect(),
        };
        let report = guarded(deadline, &self.metrics, "reward_policy", || {
            self.callbacks.reward.reward(&summary)
        })
        .map(|(global, by_layer)| {
            aggregate(
                global,
                &by_layer,
                &self.session.snapshot().contract,
                self.config.reward_limits,
            )
        });

        self.state = LoopState::Publishing;
        if !feedback.is_empty() {
            if let Err(err) = self.session.send_feedback(batch.t, feedback) {
                warn!(error = %err, "feedback publish failed");
                LoopMetrics::add(&self.metrics.publish_errors, 1);
            }
        }
        // A reward callback fault drops the report for this tick entirely.
        if let Some(report) = report {
            if let Err(err) = self.session.send_reward(batch.t, report) {
                warn!(error = %err, "reward publish failed");
                LoopMetrics::add(&self.metrics.publish_errors, 1);
            }
        }

        LoopMetrics::add(&self.metrics.ticks, 1);
        self.state = LoopState::AwaitingBatch;
    }

    /// Current state. Exposed for diagnostics.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }
}

/// Run one user callback under the deadline. Returns `None` (and counts a
/// callback fault) on error or overrun; the caller substitutes a no-op.
fn guarded<T>(
    deadline: Duration,
    metrics: &LoopMetrics,
    what: &'static str,
    call: impl FnOnce() -> PolicyResult<T>,
) -> Option<T> {
    let started = Instant::now();
    let result = call();
    let elapsed = started.elapsed();

    match result {
        Ok(value) if elapsed <= deadline => Some(value),
        Ok(_) => {
            warn!(callback = what, ?elapsed, ?deadline, "callback deadline overrun; result discarded");
            LoopMetrics::add(&metrics.callback_faults, 1);
            None
        }
        Err(err) => {
            warn!(callback = what, error = %err, "callback failed; no-op substituted");
            LoopMetrics::add(&metrics.callback_faults, 1);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
