//! Episode runner.
//!
//! One dedicated OS thread per run. The thread owns the episode loop and
//! talks to the rest of the process only through `SharedSimulationState`
//! and a stop channel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::agent::AgentBridge;
use crate::environment::{normalize, EnvironmentHandle};
use crate::error::{SimError, SimResult};
use crate::state::SharedSimulationState;
use crate::status::StatusCode;

/// Handle to a started runner thread.
#[derive(Debug)]
pub struct RunnerHandle {
    thread: JoinHandle<()>,
    stop_tx: Sender<()>,
}

impl RunnerHandle {
    /// Spawns `runner` on a new thread called `thread_name`.
    pub fn start(runner: EpisodeRunner, thread_name: impl Into<String>) -> SimResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || runner.run(&stop_rx))
            .map_err(|e| SimError::internal(format!("failed to spawn runner thread: {e}")))?;
        Ok(Self { thread, stop_tx })
    }

    /// Asks the runner to exit at its next step boundary. Never blocks.
    pub fn signal_stop(&self) {
        // Full means a stop is already pending; disconnected means it exited.
        let _ = self.stop_tx.try_send(());
    }

    /// Returns true once the thread body has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Blocks until the runner thread has terminated.
    pub fn join(self) -> SimResult<()> {
        let name = self.thread.thread().name().unwrap_or("runner").to_string();
        self.thread
            .join()
            .map_err(|payload| SimError::internal(format!("{name} panicked: {}", panic_message(&*payload))))
    }
}

/// The episode loop for one run.
#[derive(Debug)]
pub struct EpisodeRunner {
    state: Arc<SharedSimulationState>,
    bridge: AgentBridge,
    environment: EnvironmentHandle,
    max_episodes: u64,
}

impl EpisodeRunner {
    /// Runner driving `environment` for up to `max_episodes` episodes.
    #[must_use]
    pub fn new(
        state: Arc<SharedSimulationState>,
        environment: EnvironmentHandle,
        max_episodes: u64,
    ) -> Self {
        let bridge = AgentBridge::new(Arc::clone(&state));
        Self {
            state,
            bridge,
            environment,
            max_episodes,
        }
    }

    /// Thread body. Nothing escapes: errors and panics become an `Error` status.
    fn run(self, stop_rx: &Receiver<()>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive(stop_rx)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report(&err),
            Err(payload) => self.report(&SimError::internal(format!(
                "runner panicked: {}",
                panic_message(&*payload)
            ))),
        }

        self.environment.release();
        self.state.release_environment();
        tracing::debug!(status = ?self.state.code(), "runner exited");
    }

    fn drive(&self, stop_rx: &Receiver<()>) -> SimResult<()> {
        // Launch before leaving Starting; a failure is reported once Running.
        let launched = self.environment.launch();
        if let Err(err) = self.state.set_status(StatusCode::Running, Vec::new()) {
            tracing::debug!(error = %err, "run stopped before the loop began");
            return Ok(());
        }
        launched?;

        let width = self.environment.observation_width();
        for episode in 0..self.max_episodes {
            if !self.should_continue(stop_rx) {
                return Ok(());
            }

            let raw = self.environment.reset()?;
            let Some(reset) = self.bridge.on_reset() else {
                return Ok(());
            };
            tracing::debug!(episode, "episode started");

            let mut context = reset.context;
            let mut observation = normalize(raw, width)?;
            let mut last_reward = 0.0;
            let mut last_action = 0;
            let mut step = 0_u64;

            loop {
                if !self.should_continue(stop_rx) {
                    return Ok(());
                }
                self.state.set_observation(episode, step, observation.clone());

                let Some(reply) =
                    self.bridge
                        .on_step(&observation, last_reward, last_action, false, context.as_deref())
                else {
                    return Ok(());
                };
                context = reply.context;

                let transition = self.environment.step(reply.action)?;
                tracing::trace!(episode, step, action = reply.action, reward = transition.reward, "step");
                self.state.add_reward(transition.reward);
                last_reward = transition.reward;
                last_action = reply.action;
                observation = normalize(transition.observation, width)?;
                step += 1;

                if transition.done {
                    self.state.set_observation(episode, step, observation.clone());
                    if self
                        .bridge
                        .on_step(&observation, last_reward, last_action, true, context.as_deref())
                        .is_none()
                    {
                        return Ok(());
                    }
                    tracing::debug!(episode, steps = step, "episode finished");
                    break;
                }
            }
        }

        if let Err(err) = self.state.set_status(StatusCode::Ended, Vec::new()) {
            tracing::debug!(error = %err, "episode budget exhausted after the run left Running");
        }
        Ok(())
    }

    fn should_continue(&self, stop_rx: &Receiver<()>) -> bool {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return false,
            Err(TryRecvError::Empty) => {}
        }
        self.state.code() == StatusCode::Running
    }

    fn report(&self, err: &SimError) {
        if self.state.code() == StatusCode::Stopped {
            tracing::debug!(error = %err, "runner failure after stop ignored");
            return;
        }
        tracing::error!(kind = ?err.kind(), error = %err, "runner failed");
        if let Err(not_recorded) = self.state.fail(err) {
            tracing::warn!(error = %not_recorded, "runner failure not recorded");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
