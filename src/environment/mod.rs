//! Environment capability.
//!
//! The orchestrator never knows what it is simulating. A backend implements
//! [`Environment`] and is produced by a factory registered in a
//! [`MapCatalog`] under a map identifier.

mod builtin;
mod catalog;
mod handle;

pub use builtin::{Corridor, ScriptedEnvironment};
pub use catalog::{EnvironmentFactory, MapCatalog};
pub use handle::EnvironmentHandle;

use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

/// Raw observation as produced by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawObservation {
    /// A single continuous value.
    Scalar(f64),
    /// A single discrete value (e.g. a state index).
    Discrete(i64),
    /// A vector of values.
    Vector(Vec<f64>),
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation after the action.
    pub observation: RawObservation,
    /// Reward for this action alone.
    pub reward: f64,
    /// True when the episode is over.
    pub done: bool,
}

/// A simulated system driven by the episode loop.
pub trait Environment: Send {
    /// Number of values in every normalized observation.
    fn observation_width(&self) -> usize;

    /// One-time startup work (loading a map, spawning a game process).
    ///
    /// Runs on the runner thread while the run is still `Starting`.
    fn launch(&mut self) -> Result<(), EnvironmentError> {
        Ok(())
    }

    /// Starts a new episode and returns its initial observation.
    fn reset(&mut self) -> Result<RawObservation, EnvironmentError>;

    /// Applies `action`.
    fn step(&mut self, action: i64) -> Result<Transition, EnvironmentError>;

    /// Releases backend resources. Called at most once.
    fn close(&mut self) {}
}

/// Normalizes a raw observation into a vector of exactly `width` finite values.
///
/// Scalars and discrete values are lifted to a single-element vector.
pub fn normalize(raw: RawObservation, width: usize) -> Result<Vec<f64>, EnvironmentError> {
    let data = match raw {
        RawObservation::Scalar(v) => vec![v],
        #[allow(clippy::cast_precision_loss)]
        RawObservation::Discrete(v) => vec![v as f64],
        RawObservation::Vector(v) => v,
    };
    if data.len() != width {
        return Err(EnvironmentError::WidthMismatch {
            expected: width,
            actual: data.len(),
        });
    }
    if let Some(index) = data.iter().position(|v| !v.is_finite()) {
        return Err(EnvironmentError::NonFinite { index });
    }
    Ok(data)
}
