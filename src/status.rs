//! Run lifecycle status.
//!
//! `StatusCode` carries the legal edge set; `SimStatus` is the immutable
//! snapshot handed to callers. A new `SimStatus` (with a fresh id) is built for
//! every accepted transition.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SimError, SimResult};

/// Identifier of a single status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(uuid::Uuid);

impl StatusId {
    /// Creates a new random status ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for StatusId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Nothing has been run yet.
    Idle,
    /// `run` accepted; the runner is launching.
    Starting,
    /// The runner is stepping episodes.
    Running,
    /// Halted by `stop`.
    Stopped,
    /// Episode budget exhausted without error or stop.
    Ended,
    /// A bridge or environment failure ended the run.
    Error,
}

impl StatusCode {
    /// All codes, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::Starting,
        Self::Running,
        Self::Stopped,
        Self::Ended,
        Self::Error,
    ];

    /// Returns true if `self -> next` is a legal edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Stopped | Self::Ended | Self::Error, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting | Self::Running, Self::Stopped)
                | (Self::Running, Self::Error | Self::Ended)
        )
    }

    /// Returns true while a runner owns the simulation.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

/// Whether the agent is learning or just acting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// The agent may update its policy between steps.
    #[default]
    Training,
    /// The agent acts with a fixed policy.
    Performing,
}

/// Immutable status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimStatus {
    /// Fresh for every transition.
    pub id: StatusId,
    /// Lifecycle state.
    pub code: StatusCode,
    /// Mode requested by the run that set this status.
    pub mode: Mode,
    /// Non-empty iff `code == Error`.
    pub errors: Vec<String>,
    /// `Some` iff `code == Error`.
    pub error_kind: Option<ErrorKind>,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl SimStatus {
    /// The status every process starts with.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            id: StatusId::new(),
            code: StatusCode::Idle,
            mode: Mode::default(),
            errors: Vec::new(),
            error_kind: None,
            at: Utc::now(),
        }
    }

    /// Builds the successor of `self`, enforcing the edge set and the
    /// errors/code pairing.
    pub fn transition(
        &self,
        code: StatusCode,
        mode: Mode,
        failure: Option<(ErrorKind, Vec<String>)>,
    ) -> SimResult<Self> {
        if !self.code.can_transition_to(code) {
            return Err(SimError::InvalidTransition {
                from: self.code,
                to: code,
            });
        }

        let (error_kind, errors) = match failure {
            Some((kind, messages)) => (Some(kind), messages),
            None => (None, Vec::new()),
        };
        if (code == StatusCode::Error) == errors.is_empty() {
            return Err(SimError::InvalidStatus {
                code,
                error_count: errors.len(),
            });
        }

        Ok(Self {
            id: StatusId::new(),
            code,
            mode,
            errors,
            error_kind,
            at: Utc::now(),
        })
    }

    /// Returns true if this status records a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code == StatusCode::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> Vec<(StatusCode, StatusCode)> {
        use StatusCode::*;
        vec![
            (Idle, Starting),
            (Stopped, Starting),
            (Ended, Starting),
            (Error, Starting),
            (Starting, Running),
            (Starting, Stopped),
            (Running, Stopped),
            (Running, Error),
            (Running, Ended),
        ]
    }

    #[test]
    fn edge_set_is_exact() {
        let allowed = edges();
        for from in StatusCode::ALL {
            for to in StatusCode::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn transition_builds_fresh_id() {
        let idle = SimStatus::idle();
        let starting = idle
            .transition(StatusCode::Starting, Mode::Performing, None)
            .unwrap();
        assert_ne!(idle.id, starting.id);
        assert_eq!(starting.code, StatusCode::Starting);
        assert_eq!(starting.mode, Mode::Performing);
        assert!(starting.errors.is_empty());
        // The original snapshot is untouched.
        assert_eq!(idle.code, StatusCode::Idle);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let idle = SimStatus::idle();
        let err = idle
            .transition(StatusCode::Running, Mode::Training, None)
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidTransition {
                from: StatusCode::Idle,
                to: StatusCode::Running
            }
        ));
    }

    #[test]
    fn error_requires_messages_and_only_error_has_them() {
        let running = SimStatus::idle()
            .transition(StatusCode::Starting, Mode::Training, None)
            .and_then(|s| s.transition(StatusCode::Running, Mode::Training, None))
            .unwrap();

        assert!(running
            .transition(StatusCode::Error, Mode::Training, None)
            .is_err());
        assert!(running
            .transition(
                StatusCode::Ended,
                Mode::Training,
                Some((ErrorKind::Internal, vec!["x".into()]))
            )
            .is_err());

        let failed = running
            .transition(
                StatusCode::Error,
                Mode::Training,
                Some((ErrorKind::Protocol, vec!["boom".into()])),
            )
            .unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.errors, vec!["boom".to_string()]);
        assert_eq!(failed.error_kind, Some(ErrorKind::Protocol));
    }

    #[test]
    fn status_serializes_camel_case() {
        let v = serde_json::to_value(SimStatus::idle()).unwrap();
        assert_eq!(v["code"], "Idle");
        assert_eq!(v["mode"], "Training");
        assert!(v["errors"].as_array().unwrap().is_empty());
        assert!(v.get("errorKind").is_some());
    }
}
