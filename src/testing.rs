//! Scripted agents and environments.
//!
//! Deterministic stand-ins for a remote agent and a simulator backend, used by
//! the integration tests and benchmarks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::{json, Value};

use crate::agent::{AgentClient, AgentConnector, AgentReply, AgentRequest};
use crate::config::PlayerConfig;
use crate::environment::{Environment, MapCatalog, RawObservation, ScriptedEnvironment, Transition};
use crate::error::{EnvironmentError, SimResult, TransportError};

/// One call received by a [`ScriptedAgent`].
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCall {
    /// An `onReset` query.
    Reset,
    /// An `onStep` mutation with its variables.
    Step {
        /// Observation sent.
        state: Vec<f64>,
        /// Reward of the previous action.
        last_reward: f64,
        /// Previous action, 0 on the first step.
        last_action: i64,
        /// True on the terminal call of an episode.
        done: bool,
        /// Context echoed back from the previous reply.
        context: Option<String>,
    },
}

/// Agent that answers every step with a fixed action unless a queued reply
/// overrides it.
#[derive(Debug)]
pub struct ScriptedAgent {
    action: i64,
    queued: Mutex<VecDeque<Result<AgentReply, TransportError>>>,
    calls: Mutex<Vec<AgentCall>>,
}

impl ScriptedAgent {
    /// Agent replying to every step with `action`.
    #[must_use]
    pub fn new(action: i64) -> Self {
        Self {
            action,
            queued: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a raw reply for the next step call.
    #[must_use]
    pub fn then_reply(self, reply: Result<AgentReply, TransportError>) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    /// Queues an error-list reply for the next step call.
    #[must_use]
    pub fn then_fail<I, S>(self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.then_reply(Ok(AgentReply::errors(messages)))
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, call: AgentCall) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.push(call);
        calls.len()
    }
}

impl AgentClient for ScriptedAgent {
    fn execute(&self, request: &AgentRequest) -> Result<AgentReply, TransportError> {
        if request.query.contains("onReset") {
            self.record(AgentCall::Reset);
            return Ok(AgentReply::data(json!({ "onReset": Value::Null })));
        }

        let vars = &request.variables;
        let call = AgentCall::Step {
            state: serde_json::from_value(vars["state"].clone()).unwrap_or_default(),
            last_reward: vars["lastReward"].as_f64().unwrap_or_default(),
            last_action: vars["lastAction"].as_i64().unwrap_or_default(),
            done: vars["isDone"].as_bool().unwrap_or_default(),
            context: vars["context"].as_str().map(str::to_string),
        };
        let seq = self.record(call);

        if let Some(reply) = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return reply;
        }
        Ok(AgentReply::data(json!({
            "onStep": { "id": seq.to_string(), "action": self.action, "context": format!("step-{seq}") }
        })))
    }
}

/// Connector that hands out one shared [`ScriptedAgent`].
#[derive(Debug)]
pub struct ScriptedConnector {
    agent: Arc<ScriptedAgent>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    /// Hands out `agent` on every connect.
    #[must_use]
    pub fn new(agent: Arc<ScriptedAgent>) -> Self {
        Self {
            agent,
            connects: AtomicUsize::new(0),
        }
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl AgentConnector for ScriptedConnector {
    fn connect(&self, _player: &PlayerConfig) -> SimResult<Arc<dyn AgentClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.agent) as Arc<dyn AgentClient>)
    }
}

/// Environment that never finishes an episode.
///
/// Observation is the step index within the episode; every step pays `reward`.
#[derive(Debug, Clone)]
pub struct Endless {
    width: usize,
    reward: f64,
    step: u32,
}

impl Endless {
    /// Id used by [`test_catalog`].
    pub const MAP_ID: &'static str = "Endless";

    /// Observations of `width` values; every step pays `reward`.
    #[must_use]
    pub fn new(width: usize, reward: f64) -> Self {
        Self {
            width: width.max(1),
            reward,
            step: 0,
        }
    }

    fn observe(&self) -> RawObservation {
        RawObservation::Vector(vec![f64::from(self.step); self.width])
    }
}

impl Environment for Endless {
    fn observation_width(&self) -> usize {
        self.width
    }

    fn reset(&mut self) -> Result<RawObservation, EnvironmentError> {
        self.step = 0;
        Ok(self.observe())
    }

    fn step(&mut self, _action: i64) -> Result<Transition, EnvironmentError> {
        self.step = self.step.saturating_add(1);
        Ok(Transition {
            observation: self.observe(),
            reward: self.reward,
            done: false,
        })
    }
}

/// Holds `"Gated"` environments in `launch` until opened or dropped.
#[derive(Debug)]
pub struct Gate {
    tx: Sender<()>,
}

impl Gate {
    /// Lets every waiting (and future) launch proceed.
    pub fn open(self) {
        drop(self.tx);
    }
}

struct Gated {
    inner: Box<dyn Environment>,
    gate: Receiver<()>,
}

impl Environment for Gated {
    fn observation_width(&self) -> usize {
        self.inner.observation_width()
    }

    fn launch(&mut self) -> Result<(), EnvironmentError> {
        // Returns once the sender is gone.
        let _ = self.gate.recv();
        self.inner.launch()
    }

    fn reset(&mut self) -> Result<RawObservation, EnvironmentError> {
        self.inner.reset()
    }

    fn step(&mut self, action: i64) -> Result<Transition, EnvironmentError> {
        self.inner.step(action)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Built-in catalog plus [`Endless`] and a `"Gated"` scripted map whose
/// launches wait on the returned gate.
#[must_use]
pub fn test_catalog(rewards: Vec<f64>) -> (MapCatalog, Gate) {
    let mut catalog = MapCatalog::builtin();
    catalog.register(
        Endless::MAP_ID,
        || -> Result<Box<dyn Environment>, EnvironmentError> { Ok(Box::new(Endless::new(3, 0.5))) },
    );
    catalog.register(
        ScriptedEnvironment::MAP_ID,
        move || -> Result<Box<dyn Environment>, EnvironmentError> {
            Ok(Box::new(ScriptedEnvironment::new(rewards.clone())))
        },
    );

    let (tx, rx) = bounded::<()>(0);
    catalog.register(
        "Gated",
        move || -> Result<Box<dyn Environment>, EnvironmentError> {
            Ok(Box::new(Gated {
                inner: Box::new(Endless::new(2, 1.0)),
                gate: rx.clone(),
            }))
        },
    );
    (catalog, Gate { tx })
}
