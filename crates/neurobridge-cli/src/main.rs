//! Neurobridge CLI
//!
//! Operator entry point for the neurobridge SDK.
//!
//! # Usage
//!
//! ```bash
//! # Fetch the contract and write the policy scaffold
//! neurobridge contract --base-url http://localhost:3000 --project my_project
//!
//! # Start a run and drive the loop with the default (open-loop) policies
//! neurobridge run --base-url http://localhost:3000 --project my_project \
//!     --mapping mapping.json
//!
//! # Fully local pipeline over an in-process channel, no server needed
//! neurobridge simulate --ticks 200
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use neurobridge_client::channel::channel_pair;
use neurobridge_client::http::ApiClient;
use neurobridge_client::scaffold::sync_contract;
use neurobridge_client::session::RunSession;
use neurobridge_client::sync_loop::{LoopConfig, PipelineCallbacks, SyncLoop};
use neurobridge_client::wire::InboundMessage;
use neurobridge_client::ws::{WsChannel, WsConfig};

use neurobridge_core::contract::{Contract, ContractSnapshot};
use neurobridge_core::error::PolicyResult;
use neurobridge_core::mapping::{MappingEntry, MappingTable, SchemeKind};
use neurobridge_core::policy::{CommandExecutor, NeutralReward, StateProvider, ZeroDeviation};
use neurobridge_core::types::{ActuatorDelta, RobotState, RunConstants, SpikeBatch};

/// Neurobridge operator CLI
#[derive(Parser, Debug)]
#[command(name = "neurobridge")]
#[command(author, version, about = "Spike-to-actuator SDK operator tool", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the project contract and write the policy scaffold
    Contract {
        /// Server base URL (host root or .../api)
        #[arg(long)]
        base_url: String,

        /// Machine API key
        #[arg(long)]
        api_key: Option<String>,

        /// Project identifier
        #[arg(long)]
        project: String,

        /// Directory for the scaffold artifacts
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Start a run and drive the sync loop against the live server
    Run {
        /// Server base URL (host root or .../api)
        #[arg(long)]
        base_url: String,

        /// Machine API key
        #[arg(long)]
        api_key: Option<String>,

        /// Project identifier
        #[arg(long)]
        project: String,

        /// Path to the mapping table JSON
        #[arg(long)]
        mapping: PathBuf,
    },

    /// Run the full pipeline locally over an in-process channel
    Simulate {
        /// Number of timesteps to feed
        #[arg(long, default_value = "100")]
        ticks: u64,

        /// Spike window length W
        #[arg(long, default_value = "8")]
        window: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("neurobridge v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Contract {
            base_url,
            api_key,
            project,
            out_dir,
        } => run_contract(&base_url, api_key.as_deref(), &project, &out_dir),
        Commands::Run {
            base_url,
            api_key,
            project,
            mapping,
        } => run_live(&base_url, api_key.as_deref(), &project, &mapping),
        Commands::Simulate { ticks, window } => run_simulated(ticks, window),
    }
}

/// Command executor that logs decoded deltas instead of moving hardware.
struct LoggingExecutor;

impl CommandExecutor for LoggingExecutor {
    fn execute(&mut self, delta: &ActuatorDelta) -> PolicyResult<()> {
        if delta.is_zero() {
            tracing::debug!(t = delta.t, "all channels zero");
        } else {
            for (channel, value) in &delta.deltas {
                tracing::debug!(t = delta.t, channel = %channel, value, "delta");
            }
        }
        Ok(())
    }
}

/// State provider for robots that do not exist: everything at rest.
struct RestingState;

impl StateProvider for RestingState {
    fn state(&mut self) -> PolicyResult<RobotState> {
        Ok(RobotState {
            dt: 0.05,
            ..RobotState::default()
        })
    }
}

fn default_callbacks() -> PipelineCallbacks {
    PipelineCallbacks {
        state_provider: Box::new(RestingState),
        command_executor: Box::new(LoggingExecutor),
        deviation: Box::new(ZeroDeviation),
        reward: Box::new(NeutralReward::default()),
    }
}

fn run_contract(
    base_url: &str,
    api_key: Option<&str>,
    project: &str,
    out_dir: &std::path::Path,
) -> anyhow::Result<()> {
    let api = ApiClient::new(base_url, api_key, Duration::from_secs(10))?;
    let document = api.contract(project)?;
    let snapshot = document.snapshot();

    let outcome = sync_contract(out_dir, &snapshot)?;
    if outcome.wrote {
        info!(dir = %out_dir.display(), digest = %outcome.digest, "scaffold written");
    } else {
        info!(digest = %outcome.digest, "contract unchanged");
    }
    Ok(())
}

fn run_live(
    base_url: &str,
    api_key: Option<&str>,
    project: &str,
    mapping_path: &std::path::Path,
) -> anyhow::Result<()> {
    let api = ApiClient::new(base_url, api_key, Duration::from_secs(10))?;
    let started = api.start(project)?;
    let snapshot = started.contract.snapshot();

    let mapping_json = std::fs::read_to_string(mapping_path)?;
    let table = Arc::new(MappingTable::from_json(
        &mapping_json,
        snapshot.constants.output_window,
    )?);

    let ws_url = started.realtime.url.clone().ok_or_else(|| {
        anyhow::anyhow!("server did not return a realtime URL; cannot connect")
    })?;
    let channel = WsChannel::connect(&WsConfig {
        url: ws_url,
        api_key: api_key.map(str::to_string),
        run_id: started.run_id.clone(),
    })?;

    let session = RunSession::new(
        started.run_id.clone(),
        project,
        snapshot,
        Box::new(channel),
    );
    let sync = SyncLoop::new(session, table, default_callbacks());

    info!(run = %started.run_id, "loop running; stop the run server-side to exit");
    let exit = sync.run();
    warn!(?exit, "loop exited");

    api.stop(project, Some(&started.run_id))?;
    Ok(())
}

fn run_simulated(ticks: u64, window: usize) -> anyhow::Result<()> {
    let snapshot = ContractSnapshot {
        constants: RunConstants {
            output_window: window,
            feedback_window: 16,
        },
        contract: Contract::new(["motor"], ["fb0"]),
    };

    let table = Arc::new(MappingTable::new(
        vec![
            MappingEntry {
                node_id: "V1".into(),
                channel: "joint:0".into(),
                scheme: SchemeKind::BipolarSplit,
                gain: 0.5,
                per_step_max: 0.004,
            },
            MappingEntry {
                node_id: "V2".into(),
                channel: "gripper".into(),
                scheme: SchemeKind::Addition,
                gain: 0.1,
                per_step_max: 0.01,
            },
        ],
        window,
    )?);

    let (channel, remote) = channel_pair();
    let session = RunSession::new("simulated", "local", snapshot, Box::new(channel));
    let sync = SyncLoop::new(session, table, default_callbacks()).with_config(LoopConfig {
        batch_timeout: Duration::from_millis(50),
        ..LoopConfig::default()
    });
    let handle = sync.handle();

    // Deterministic spike source standing in for the server.
    let feeder = std::thread::spawn(move || {
        for t in 1..=ticks {
            let mut batch = SpikeBatch::new(t);
            let phase = |i: u64| u32::from((t + i) % 3 == 0);
            batch
                .spikes
                .insert("V1".into(), (0..window as u64).map(phase).collect());
            batch
                .spikes
                .insert("V2".into(), (0..window as u64).map(|i| phase(i + 1)).collect());
            if remote.push(InboundMessage::Batch(batch)).is_err() {
                return remote;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        remote
    });

    let runner = std::thread::spawn(move || sync.run());

    let remote = feeder.join().expect("feeder panicked");
    // Give the loop time to drain, then stop at a state boundary.
    while handle.metrics().ticks < ticks {
        std::thread::sleep(Duration::from_millis(10));
    }
    handle.shutdown();
    let exit = runner.join().expect("loop panicked");

    let published: HashMap<&str, usize> =
        remote
            .drain()
            .iter()
            .fold(HashMap::new(), |mut acc, msg| {
                let key = match msg {
                    neurobridge_client::OutboundMessage::RobotState { .. } => "state",
                    neurobridge_client::OutboundMessage::Feedback { .. } => "feedback",
                    neurobridge_client::OutboundMessage::Reward { .. } => "reward",
                    _ => "other",
                };
                *acc.entry(key).or_insert(0) += 1;
                acc
            });

    let metrics = handle.metrics();
    info!(?exit, ?metrics, "simulation finished");
    info!(
        states = published.get("state").copied().unwrap_or(0),
        feedback = published.get("feedback").copied().unwrap_or(0),
        rewards = published.get("reward").copied().unwrap_or(0),
        "published messages"
    );
    Ok(())
}
