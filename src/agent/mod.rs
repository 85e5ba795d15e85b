//! Agent bridge.
//!
//! Synchronous remote calls to the external decision-making agent. The wire
//! shape is GraphQL-over-HTTP: a request carries a query document plus
//! variables, a reply carries `data` and/or a list of `errors`.
//!
//! The bridge never raises past its own boundary: any failure is recorded on
//! the shared state as an `Error` status and the call returns `None`, which
//! callers treat as "abort the episode loop now".

mod http;

pub use http::{HttpAgentClient, HttpConnector};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PlayerConfig;
use crate::error::{ProtocolError, SimError, SimResult, TransportError};
use crate::state::SharedSimulationState;

const ON_RESET_QUERY: &str = r"
{
    onReset
}
";

const ON_STEP_MUTATION: &str = r"
mutation onStep($state: [Float!]!, $lastReward: Float!, $lastAction: Int!, $isDone: Boolean!, $context: String) {
    onStep(state: $state, lastReward: $lastReward, lastAction: $lastAction, isDone: $isDone, context: $context) {
        id
        action
        context
    }
}
";

/// Request sent to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// GraphQL document.
    pub query: String,
    /// Variables for the document.
    #[serde(default)]
    pub variables: Value,
}

/// One entry of a reply's error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentErrorEntry {
    /// Message exactly as the agent sent it.
    pub message: String,
}

/// Raw reply envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Result object, absent on failure.
    #[serde(default)]
    pub data: Option<Value>,
    /// Error list; non-empty means the call failed.
    #[serde(default)]
    pub errors: Option<Vec<AgentErrorEntry>>,
}

impl AgentReply {
    /// A successful reply.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// A failed reply carrying `messages`.
    #[must_use]
    pub fn errors<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: None,
            errors: Some(
                messages
                    .into_iter()
                    .map(|m| AgentErrorEntry { message: m.into() })
                    .collect(),
            ),
        }
    }
}

/// Transport to one agent endpoint.
pub trait AgentClient: Send + Sync {
    /// Performs one blocking request/response exchange.
    fn execute(&self, request: &AgentRequest) -> Result<AgentReply, TransportError>;
}

/// Turns the agent-bearing player of a run into a client.
pub trait AgentConnector: Send + Sync {
    /// Builds a client for `player`, who must have a uri.
    fn connect(&self, player: &PlayerConfig) -> SimResult<Arc<dyn AgentClient>>;
}

impl<F> AgentConnector for F
where
    F: Fn(&PlayerConfig) -> SimResult<Arc<dyn AgentClient>> + Send + Sync,
{
    fn connect(&self, player: &PlayerConfig) -> SimResult<Arc<dyn AgentClient>> {
        self(player)
    }
}

/// Reply to `onReset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReply {
    /// Opaque agent state to send with the first step.
    pub context: Option<String>,
}

/// Reply to `onStep`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepReply {
    /// Agent-assigned step id.
    pub id: String,
    /// Action to apply.
    pub action: i64,
    /// Opaque agent state to send with the next step.
    #[serde(default)]
    pub context: Option<String>,
}

/// Bridge between the episode loop and the attached agent client.
#[derive(Debug, Clone)]
pub struct AgentBridge {
    state: Arc<SharedSimulationState>,
}

impl AgentBridge {
    /// Bridge reading its client from `state`.
    #[must_use]
    pub fn new(state: Arc<SharedSimulationState>) -> Self {
        Self { state }
    }

    /// Asks the agent to start a new episode.
    pub fn on_reset(&self) -> Option<ResetReply> {
        let request = AgentRequest {
            query: ON_RESET_QUERY.to_string(),
            variables: Value::Null,
        };
        let value = self.request(&request, "onReset")?;
        let context = self.decode::<Option<String>>(value, "onReset")?;
        Some(ResetReply { context })
    }

    /// Reports the current state and asks for the next action.
    pub fn on_step(
        &self,
        state: &[f64],
        last_reward: f64,
        last_action: i64,
        done: bool,
        context: Option<&str>,
    ) -> Option<StepReply> {
        let request = AgentRequest {
            query: ON_STEP_MUTATION.to_string(),
            variables: json!({
                "state": state,
                "lastReward": last_reward,
                "lastAction": last_action,
                "isDone": done,
                "context": context,
            }),
        };
        let value = self.request(&request, "onStep")?;
        self.decode::<StepReply>(value, "onStep")
    }

    fn request(&self, request: &AgentRequest, field: &str) -> Option<Value> {
        self.try_request(request, field)
            .map_err(|err| self.report(&err))
            .ok()
    }

    fn try_request(&self, request: &AgentRequest, field: &str) -> SimResult<Value> {
        let client = self.state.agent_client().ok_or(TransportError::NoClient)?;
        let reply = client.execute(request)?;

        if let Some(errors) = reply.errors.filter(|e| !e.is_empty()) {
            return Err(ProtocolError {
                messages: errors.into_iter().map(|e| e.message).collect(),
            }
            .into());
        }

        let mut data = reply.data.ok_or_else(|| TransportError::MalformedReply {
            message: "reply has neither data nor errors".to_string(),
        })?;
        data.get_mut(field)
            .map(Value::take)
            .ok_or_else(|| {
                TransportError::MalformedReply {
                    message: format!("reply data has no '{field}' field"),
                }
                .into()
            })
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, value: Value, field: &str) -> Option<T> {
        serde_json::from_value(value)
            .map_err(|e| {
                self.report(&SimError::from(TransportError::MalformedReply {
                    message: format!("'{field}': {e}"),
                }));
            })
            .ok()
    }

    fn report(&self, err: &SimError) {
        tracing::error!(kind = ?err.kind(), error = %err, "agent call failed");
        if let Err(not_recorded) = self.state.fail(err) {
            tracing::warn!(error = %not_recorded, "agent failure not recorded; status already final");
        }
    }
}
