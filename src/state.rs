//! Shared simulation record.
//!
//! The single synchronization boundary between the runner thread and the
//! request frontend. Every operation takes the record lock exactly once, so a
//! reader always sees a status, its error list and the counters as one
//! consistent snapshot.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::agent::AgentClient;
use crate::config::SimConfig;
use crate::environment::EnvironmentHandle;
use crate::error::{ErrorKind, SimError, SimResult};
use crate::runner::RunnerHandle;
use crate::status::{SimStatus, StatusCode};

/// Observation snapshot served to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Episode index, 0-based.
    pub episode: u64,
    /// Step within the episode, 0-based.
    pub step: u64,
    /// Observations recorded since the run started, across episodes.
    pub game_loop: u64,
    /// Last normalized observation.
    pub data: Vec<f64>,
    /// Cumulative reward for the run.
    pub reward: f64,
    /// Status read together with the counters.
    pub sim_status: SimStatus,
}

struct SimRecord {
    agent: Option<Arc<dyn AgentClient>>,
    config: Option<Arc<SimConfig>>,
    runner: Option<RunnerHandle>,
    environment: Option<EnvironmentHandle>,
    episode: u64,
    step: u64,
    game_loop: u64,
    observation: Vec<f64>,
    reward: f64,
    status: SimStatus,
}

impl SimRecord {
    fn clear_run_data(&mut self, width: usize) {
        self.episode = 0;
        self.step = 0;
        self.game_loop = 0;
        self.observation = vec![0.0; width.max(1)];
        self.reward = 0.0;
    }

    fn transition(
        &mut self,
        code: StatusCode,
        failure: Option<(ErrorKind, Vec<String>)>,
    ) -> SimResult<SimStatus> {
        let from = self.status.code;
        let next = self.status.transition(code, self.status.mode, failure)?;
        tracing::info!(from = ?from, to = ?code, id = %next.id, "status transition");
        self.status = next.clone();
        Ok(next)
    }
}

/// Process-lifetime simulation record.
pub struct SharedSimulationState {
    record: RwLock<SimRecord>,
}

impl std::fmt::Debug for SharedSimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.read();
        f.debug_struct("SharedSimulationState")
            .field("status", &record.status)
            .field("episode", &record.episode)
            .field("step", &record.step)
            .field("runner", &record.runner.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SharedSimulationState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSimulationState {
    /// Creates the record in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        let mut record = SimRecord {
            agent: None,
            config: None,
            runner: None,
            environment: None,
            episode: 0,
            step: 0,
            game_loop: 0,
            observation: Vec::new(),
            reward: 0.0,
            status: SimStatus::idle(),
        };
        record.clear_run_data(1);
        Self {
            record: RwLock::new(record),
        }
    }

    // Writers leave the record consistent before any call that can panic, so
    // a poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, SimRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SimRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SimStatus {
        self.read().status.clone()
    }

    /// Current status code.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.read().status.code
    }

    /// Transitions to `code`. `errors` must be non-empty iff `code` is `Error`.
    ///
    /// Errors recorded this way are classified as internal; use
    /// [`set_error`](Self::set_error) to classify them.
    pub fn set_status(&self, code: StatusCode, errors: Vec<String>) -> SimResult<SimStatus> {
        let failure = (!errors.is_empty()).then_some((ErrorKind::Internal, errors));
        self.write().transition(code, failure)
    }

    /// Transitions to `Error` with classified messages.
    pub fn set_error(&self, kind: ErrorKind, messages: Vec<String>) -> SimResult<SimStatus> {
        self.write()
            .transition(StatusCode::Error, Some((kind, messages)))
    }

    /// Records `err` as the run's failure.
    pub fn fail(&self, err: &SimError) -> SimResult<SimStatus> {
        self.set_error(err.kind(), err.messages())
    }

    /// Records one observation and advances the game loop.
    pub fn set_observation(&self, episode: u64, step: u64, data: Vec<f64>) {
        let mut record = self.write();
        record.episode = episode;
        record.step = step;
        record.game_loop += 1;
        record.observation = data;
    }

    /// Adds `reward` to the run's cumulative reward.
    pub fn add_reward(&self, reward: f64) {
        self.write().reward += reward;
    }

    /// Observation snapshot including the current status.
    #[must_use]
    pub fn observation(&self) -> Observation {
        let record = self.read();
        Observation {
            episode: record.episode,
            step: record.step,
            game_loop: record.game_loop,
            data: record.observation.clone(),
            reward: record.reward,
            sim_status: record.status.clone(),
        }
    }

    /// Attaches run handles; previously attached ones are replaced.
    pub fn attach_handles(
        &self,
        agent: Option<Arc<dyn AgentClient>>,
        environment: Option<EnvironmentHandle>,
        runner: Option<RunnerHandle>,
    ) {
        let mut record = self.write();
        record.agent = agent;
        record.environment = environment;
        record.runner = runner;
    }

    /// Clears counters, reward, last observation and handles. Status is kept.
    ///
    /// The environment is released; a recorded runner is detached, so join it
    /// first with [`take_runner`](Self::take_runner).
    pub fn reset(&self) {
        let environment = {
            let mut record = self.write();
            record.clear_run_data(1);
            record.agent = None;
            record.config = None;
            record.runner = None;
            record.environment.take()
        };
        if let Some(env) = environment {
            env.release();
        }
    }

    /// The whole `run` critical section under one write lock.
    ///
    /// Rejects while a run is active, otherwise resets the record, moves to
    /// `Starting`, calls `spawn` and attaches every handle. The spawned runner
    /// cannot observe the record until this returns.
    pub fn begin_run(
        &self,
        config: Arc<SimConfig>,
        agent: Arc<dyn AgentClient>,
        environment: EnvironmentHandle,
        spawn: impl FnOnce() -> SimResult<RunnerHandle>,
    ) -> SimResult<SimStatus> {
        let mut record = self.write();

        let current = record.status.code;
        if current.is_active() {
            drop(record);
            environment.release();
            return Err(SimError::RunRejected { code: current });
        }
        if record.runner.is_some() {
            drop(record);
            environment.release();
            return Err(SimError::internal("previous runner has not been joined"));
        }

        let starting = match record.status.transition(StatusCode::Starting, config.mode, None) {
            Ok(status) => status,
            Err(err) => {
                drop(record);
                environment.release();
                return Err(err);
            }
        };

        let runner = match spawn() {
            Ok(runner) => runner,
            Err(err) => {
                drop(record);
                environment.release();
                return Err(err);
            }
        };

        let stale = record.environment.take();
        record.clear_run_data(environment.observation_width());
        record.agent = Some(agent);
        record.config = Some(config);
        record.environment = Some(environment);
        record.runner = Some(runner);
        tracing::info!(from = ?current, to = ?StatusCode::Starting, id = %starting.id, "status transition");
        record.status = starting.clone();
        drop(record);

        if let Some(env) = stale {
            env.release();
        }
        Ok(starting)
    }

    /// Detaches and releases the environment. Idempotent.
    ///
    /// Returns true if an environment was attached.
    pub fn release_environment(&self) -> bool {
        let environment = self.write().environment.take();
        match environment {
            Some(env) => {
                env.release();
                true
            }
            None => false,
        }
    }

    /// Detaches the runner handle so it can be joined outside the lock.
    pub fn take_runner(&self) -> Option<RunnerHandle> {
        self.write().runner.take()
    }

    /// Returns true while a runner handle is recorded.
    #[must_use]
    pub fn has_runner(&self) -> bool {
        self.read().runner.is_some()
    }

    /// Agent client for the active session, if any.
    #[must_use]
    pub fn agent_client(&self) -> Option<Arc<dyn AgentClient>> {
        self.read().agent.clone()
    }

    /// Configuration of the current (or last) run.
    #[must_use]
    pub fn config(&self) -> Option<Arc<SimConfig>> {
        self.read().config.clone()
    }
}
