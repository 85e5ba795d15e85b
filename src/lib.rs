//! # simrelay - Simulation episode-loop orchestrator
//!
//! simrelay runs a stateful simulation episode loop on a background thread
//! and keeps a request/response surface responsive while the loop runs.
//! Each step, the runner observes the environment, asks a remote agent for
//! an action, applies it and records the result in shared state that callers
//! can read at any time.
//!
//! ## Core Concepts
//!
//! - **SimStatus**: Immutable status snapshot; every transition builds a new one
//! - **SharedSimulationState**: The single record shared by runner and callers
//! - **AgentBridge**: Synchronous remote calls to the decision-making agent
//! - **EpisodeRunner**: The episode/step loop on its own OS thread
//! - **RequestDispatcher**: `run`, `stop`, `sim_status`, `observe`, `list_maps`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use simrelay::{Mode, OrchestratorConfig, PlayerConfig, RequestDispatcher, SimConfig};
//!
//! let dispatcher = RequestDispatcher::with_config(OrchestratorConfig::default())?;
//! let status = dispatcher.run(SimConfig::new(
//!     "Corridor",
//!     Mode::Training,
//!     vec![PlayerConfig::agent(1, "http://127.0.0.1:4000/graphql")],
//! ))?;
//!
//! let observation = dispatcher.observe();
//! let final_status = dispatcher.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod runner;
pub mod state;
pub mod status;
pub mod testing;

#[cfg(feature = "transport-grpc")]
pub mod transport;

pub use agent::{AgentBridge, AgentClient, AgentConnector, HttpAgentClient, HttpConnector};
pub use config::{OrchestratorConfig, PlayerConfig, SimConfig};
pub use dispatcher::RequestDispatcher;
pub use environment::{Environment, EnvironmentHandle, MapCatalog, RawObservation, Transition};
pub use error::{ErrorKind, SimError, SimResult};
pub use runner::{EpisodeRunner, RunnerHandle};
pub use state::{Observation, SharedSimulationState};
pub use status::{Mode, SimStatus, StatusCode, StatusId};
