//! Request dispatcher.
//!
//! The request/response surface of the orchestrator. Reads go straight to the
//! shared record; `run` and `stop` are serialized by a control mutex so that
//! two callers never race each other on runner handles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::agent::{AgentConnector, HttpConnector};
use crate::config::{OrchestratorConfig, SimConfig};
use crate::environment::{EnvironmentHandle, MapCatalog};
use crate::error::{ConfigError, SimError, SimResult};
use crate::runner::{EpisodeRunner, RunnerHandle};
use crate::state::{Observation, SharedSimulationState};
use crate::status::{SimStatus, StatusCode};

/// Entry point for callers of the orchestrator.
pub struct RequestDispatcher {
    state: Arc<SharedSimulationState>,
    catalog: MapCatalog,
    connector: Arc<dyn AgentConnector>,
    config: OrchestratorConfig,
    control: Mutex<()>,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("state", &self.state)
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    /// Dispatcher over `catalog`, connecting agents with `connector`.
    pub fn new(
        catalog: MapCatalog,
        connector: Arc<dyn AgentConnector>,
        config: OrchestratorConfig,
    ) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(SharedSimulationState::new()),
            catalog,
            connector,
            config,
            control: Mutex::new(()),
        })
    }

    /// Built-in maps and HTTP agents.
    pub fn with_config(config: OrchestratorConfig) -> SimResult<Self> {
        let connector = Arc::new(HttpConnector::new(config.agent_timeout));
        Self::new(MapCatalog::builtin(), connector, config)
    }

    /// The shared record behind this dispatcher.
    #[must_use]
    pub fn state(&self) -> &Arc<SharedSimulationState> {
        &self.state
    }

    /// Process-level settings.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Available map identifiers, sorted.
    #[must_use]
    pub fn list_maps(&self) -> Vec<String> {
        self.catalog.list()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn sim_status(&self) -> SimStatus {
        self.state.status()
    }

    /// Latest observation with the current status.
    #[must_use]
    pub fn observe(&self) -> Observation {
        self.state.observation()
    }

    /// Starts a run and returns the `Starting` status without waiting for it.
    ///
    /// Rejected with [`SimError::RunRejected`] while a run is active.
    /// Configuration errors are returned before any state change.
    pub fn run(&self, config: SimConfig) -> SimResult<SimStatus> {
        let _control = self.control();

        let current = self.state.code();
        if current.is_active() {
            tracing::warn!(status = ?current, "run rejected; simulation already active");
            return Err(SimError::RunRejected { code: current });
        }
        self.join_finished_runner();

        config.validate()?;
        let factory = self.catalog.factory(&config.map)?;
        let (_, player) = config.agent_player().ok_or(ConfigError::NoAgent)?;
        let agent = self.connector.connect(player)?;
        let environment = EnvironmentHandle::new(factory.create()?);

        let runner = EpisodeRunner::new(
            Arc::clone(&self.state),
            environment.clone(),
            self.config.max_episodes,
        );
        let thread_name = self.config.runner_thread_name.clone();
        let map = config.map.clone();
        let mode = config.mode;

        let status = self.state.begin_run(Arc::new(config), agent, environment, move || {
            RunnerHandle::start(runner, thread_name)
        })?;
        tracing::info!(%map, ?mode, id = %status.id, "run started");
        Ok(status)
    }

    /// Stops the active run and waits for its runner to exit.
    ///
    /// When nothing is running the current status is returned unchanged.
    pub fn stop(&self) -> SimStatus {
        let _control = self.control();

        let current = self.state.status();
        if !current.code.is_active() {
            self.join_finished_runner();
            return current;
        }

        if let Err(err) = self.state.set_status(StatusCode::Stopped, Vec::new()) {
            // The runner finished between the read and the write.
            tracing::debug!(error = %err, "stop lost the race to the runner");
        }
        self.state.release_environment();

        if let Some(runner) = self.state.take_runner() {
            runner.signal_stop();
            if let Err(err) = runner.join() {
                tracing::warn!(error = %err, "runner did not exit cleanly");
            }
        }

        let status = self.state.status();
        let map = self.state.config().map(|c| c.map.clone()).unwrap_or_default();
        tracing::info!(%map, status = ?status.code, id = %status.id, "run stopped");
        status
    }

    /// Process-exit hook.
    pub fn shutdown(&self) -> SimStatus {
        tracing::info!("shutting down simulation");
        self.stop()
    }

    fn join_finished_runner(&self) {
        if let Some(runner) = self.state.take_runner() {
            if !runner.is_finished() {
                tracing::debug!("waiting for the previous runner to exit");
            }
            runner.signal_stop();
            if let Err(err) = runner.join() {
                tracing::warn!(error = %err, "previous runner did not exit cleanly");
            }
        }
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
