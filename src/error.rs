//! Error types for simrelay.
//!
//! All errors are strongly typed using thiserror. Every failure that reaches
//! the episode loop is funnelled into the single `Error` status code; the
//! taxonomy here exists so the messages stay precise and so callers (and
//! tests) can classify what went wrong.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::StatusCode;

/// Classification of a failure recorded in a `SimStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Invalid map, player, or orchestrator configuration.
    Config,
    /// Agent endpoint unreachable or reply malformed.
    Transport,
    /// Agent reply carried a non-empty error list.
    Protocol,
    /// Environment failed to launch, reset, or step.
    Environment,
    /// Anything else that went wrong inside the runner.
    Internal,
}

/// Configuration errors, surfaced from `run` before any state change.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The map is not in the catalog.
    #[error("Map '{map}' is not available")]
    UnknownMap {
        /// Requested map id.
        map: String,
    },

    /// The map id is empty, too long, or has illegal characters.
    #[error("Invalid map identifier '{map}'")]
    InvalidMapId {
        /// Requested map id.
        map: String,
    },

    /// A required field was absent or empty.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the offending field.
        field: String,
    },

    /// A token was given to a player without an agent.
    #[error("Player {index} has a token but no agent uri")]
    TokenWithoutUri {
        /// Position of the player in the run config.
        index: usize,
    },

    /// The agent uri is not a usable URL.
    #[error("Player {index} has an invalid agent uri '{uri}': {reason}")]
    InvalidAgentUri {
        /// Position of the player in the run config.
        index: usize,
        /// The uri as given.
        uri: String,
        /// Why it was refused.
        reason: String,
    },

    /// No player has an agent uri.
    #[error("No player is bound to an agent")]
    NoAgent,

    /// An orchestrator setting is out of range.
    #[error("Invalid orchestrator setting '{field}': {reason}")]
    InvalidSetting {
        /// Name of the offending field.
        field: String,
        /// Why it was refused.
        reason: String,
    },

    /// A configuration file could not be read or parsed.
    #[error("Failed to read configuration: {message}")]
    Load {
        /// Underlying error text.
        message: String,
    },
}

/// Transport errors for the agent bridge.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bridge was called with no client attached.
    #[error("No agent client attached. Running?")]
    NoClient,

    /// The request never got an HTTP response.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Underlying error text.
        message: String,
    },

    /// The agent answered with a non-success status.
    #[error("Agent returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request body could not be encoded.
    #[error("Failed to serialize request: {message}")]
    SerializationFailed {
        /// Underlying error text.
        message: String,
    },

    /// The reply was not the expected JSON shape.
    #[error("Malformed agent reply: {message}")]
    MalformedReply {
        /// Underlying error text.
        message: String,
    },
}

/// The agent answered, but with a non-empty error list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Agent reported errors: {}", messages.join("; "))]
pub struct ProtocolError {
    /// Messages exactly as the agent sent them.
    pub messages: Vec<String>,
}

/// Environment failures.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// `launch` failed.
    #[error("Environment failed to launch: {message}")]
    Launch {
        /// Underlying error text.
        message: String,
    },

    /// `reset` failed.
    #[error("Environment reset failed: {message}")]
    Reset {
        /// Underlying error text.
        message: String,
    },

    /// `step` failed or refused the action.
    #[error("Environment step failed: {message}")]
    Step {
        /// Underlying error text.
        message: String,
    },

    /// An observation did not match the declared width.
    #[error("Observation has {actual} values, expected {expected}")]
    WidthMismatch {
        /// Declared width.
        expected: usize,
        /// Values received.
        actual: usize,
    },

    /// An observation contained NaN or an infinity.
    #[error("Observation value at index {index} is not finite")]
    NonFinite {
        /// Index of the offending value.
        index: usize,
    },

    /// The environment was used after release.
    #[error("Environment has been closed")]
    Closed,
}

/// Top-level error type for simrelay.
#[derive(Debug, Error)]
pub enum SimError {
    /// See [`ConfigError`].
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// See [`TransportError`].
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// See [`ProtocolError`].
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// See [`EnvironmentError`].
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// `run` was called while a run is active.
    #[error("Simulation is already {code:?}; run rejected")]
    RunRejected {
        /// Status code at the time.
        code: StatusCode,
    },

    /// The edge is not in the status graph.
    #[error("Illegal status transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current code.
        from: StatusCode,
        /// Requested code.
        to: StatusCode,
    },

    /// Error messages on a non-`Error` status, or none on `Error`.
    #[error("Status {code:?} cannot carry {error_count} error message(s)")]
    InvalidStatus {
        /// Status code at the time.
        code: StatusCode,
        /// Messages supplied.
        error_count: usize,
    },

    /// Anything else, including runner panics.
    #[error("Internal error: {message}")]
    Internal {
        /// Underlying error text.
        message: String,
    },
}

impl SimError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Environment(_) => ErrorKind::Environment,
            Self::RunRejected { .. }
            | Self::InvalidTransition { .. }
            | Self::InvalidStatus { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Human-readable messages to record in `SimStatus::errors`.
    ///
    /// Protocol errors keep the agent's messages verbatim; everything else
    /// contributes its own display string.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Protocol(p) if !p.messages.is_empty() => p.messages.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if `run` was rejected because a runner is active.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::RunRejected { .. })
    }
}

/// Result type alias for simrelay operations.
pub type SimResult<T> = Result<T, SimError>;
