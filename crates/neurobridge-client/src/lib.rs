//! Neurobridge Client - run lifecycle and realtime plumbing
//!
//! Everything between the server and the deterministic core: the HTTP
//! lifecycle client, the WebSocket realtime channel, per-run session state,
//! sensor input streaming, contract scaffolding, and the timestep sync loop
//! that drives the whole pipeline.
//!
//! # Modules
//!
//! - [`wire`]: JSON envelope protocol (event names, payload shapes)
//! - [`channel`]: The duplex transport abstraction the loop consumes
//! - [`ws`]: WebSocket implementation of the channel
//! - [`http`]: Run start/stop/contract REST client
//! - [`session`]: Per-run state and emit helpers
//! - [`sync_loop`]: The timestep state machine
//! - [`streamer`]: `io:need` driven sensor input providers
//! - [`scaffold`]: Machine-owned contract artifacts for policy authors
//!
//! # Typical wiring
//!
//! ```rust,ignore
//! use neurobridge_client::{http::ApiClient, session::RunSession, sync_loop::SyncLoop};
//! use neurobridge_client::ws::{WsChannel, WsConfig};
//!
//! let api = ApiClient::new("https://brains.example.com", Some("key"), timeout)?;
//! let started = api.start("my_project")?;
//! let channel = WsChannel::connect(&WsConfig {
//!     url: started.realtime.url.clone().unwrap(),
//!     api_key: Some("key".into()),
//!     run_id: started.run_id.clone(),
//! })?;
//!
//! let session = RunSession::new(
//!     started.run_id.clone(),
//!     "my_project",
//!     started.contract.snapshot(),
//!     Box::new(channel),
//! );
//! let sync = SyncLoop::new(session, mapping, callbacks);
//! let handle = sync.handle();
//! std::thread::spawn(move || sync.run());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod channel;
pub mod http;
pub mod scaffold;
pub mod session;
pub mod streamer;
pub mod sync_loop;
pub mod wire;
pub mod ws;

// Re-export the working set
pub use channel::{channel_pair, ChannelError, PairChannel, PairRemote, RealtimeChannel};
pub use http::{ApiClient, ApiError, StartResponse};
pub use session::RunSession;
pub use streamer::{InputProvider, InputSample, InputStreamer};
pub use sync_loop::{
    LoopConfig, LoopExit, LoopHandle, LoopState, MetricsSnapshot, PipelineCallbacks, SyncLoop,
};
pub use wire::{InboundMessage, OutboundMessage};
pub use ws::{WsChannel, WsConfig, WsError};
