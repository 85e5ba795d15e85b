//! Small deterministic environments shipped with the crate.

use crate::error::EnvironmentError;

use super::{Environment, RawObservation, Transition};

/// Replays a fixed reward schedule.
///
/// Observation is the step index as a discrete value. The episode is done
/// after the last reward; every reset replays the schedule from the start.
#[derive(Debug, Clone)]
pub struct ScriptedEnvironment {
    rewards: Vec<f64>,
    cursor: usize,
}

impl ScriptedEnvironment {
    /// Catalog id.
    pub const MAP_ID: &'static str = "Scripted";

    /// Environment paying `rewards` in order, one per step.
    #[must_use]
    pub fn new(rewards: Vec<f64>) -> Self {
        Self { rewards, cursor: 0 }
    }
}

impl Environment for ScriptedEnvironment {
    fn observation_width(&self) -> usize {
        1
    }

    fn reset(&mut self) -> Result<RawObservation, EnvironmentError> {
        if self.rewards.is_empty() {
            return Err(EnvironmentError::Reset {
                message: "empty reward schedule".to_string(),
            });
        }
        self.cursor = 0;
        Ok(RawObservation::Discrete(0))
    }

    fn step(&mut self, _action: i64) -> Result<Transition, EnvironmentError> {
        let reward = *self.rewards.get(self.cursor).ok_or_else(|| EnvironmentError::Step {
            message: "episode already finished".to_string(),
        })?;
        self.cursor += 1;
        Ok(Transition {
            observation: RawObservation::Discrete(i64::try_from(self.cursor).unwrap_or(i64::MAX)),
            reward,
            done: self.cursor == self.rewards.len(),
        })
    }
}

/// One-dimensional corridor: start at cell 0, reach the last cell.
///
/// Actions: `0` moves left, `1` moves right, anything else is rejected.
/// Each move costs `0.01`; reaching the goal pays `1.0` and ends the episode.
#[derive(Debug, Clone)]
pub struct Corridor {
    length: u32,
    position: u32,
}

impl Corridor {
    /// Catalog id.
    pub const MAP_ID: &'static str = "Corridor";
    /// Length used by the built-in catalog entry.
    pub const DEFAULT_LENGTH: u32 = 8;

    const MOVE_COST: f64 = 0.01;
    const GOAL_REWARD: f64 = 1.0;

    /// Corridor of `length` cells. Shorter than 2 is raised to 2.
    #[must_use]
    pub fn new(length: u32) -> Self {
        Self {
            length: length.max(2),
            position: 0,
        }
    }

    fn goal(&self) -> u32 {
        self.length - 1
    }

    fn observe(&self) -> RawObservation {
        RawObservation::Vector(vec![f64::from(self.position), f64::from(self.goal())])
    }
}

impl Environment for Corridor {
    fn observation_width(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<RawObservation, EnvironmentError> {
        self.position = 0;
        Ok(self.observe())
    }

    fn step(&mut self, action: i64) -> Result<Transition, EnvironmentError> {
        match action {
            0 => self.position = self.position.saturating_sub(1),
            1 => self.position = (self.position + 1).min(self.goal()),
            other => {
                return Err(EnvironmentError::Step {
                    message: format!("invalid action {other}; expected 0 (left) or 1 (right)"),
                })
            }
        }

        let done = self.position == self.goal();
        let reward = if done { Self::GOAL_REWARD } else { -Self::MOVE_COST };
        Ok(Transition {
            observation: self.observe(),
            reward,
            done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_replays_schedule() {
        let mut env = ScriptedEnvironment::new(vec![1.0, 2.0, 3.0]);
        for _ in 0..2 {
            assert_eq!(env.reset().unwrap(), RawObservation::Discrete(0));
            let rewards: Vec<f64> = (0..3).map(|_| env.step(0).unwrap().reward).collect();
            assert_eq!(rewards, vec![1.0, 2.0, 3.0]);
        }
        assert!(env.step(0).is_err());
    }

    #[test]
    fn scripted_done_on_last_reward() {
        let mut env = ScriptedEnvironment::new(vec![5.0, 5.0]);
        env.reset().unwrap();
        assert!(!env.step(0).unwrap().done);
        assert!(env.step(0).unwrap().done);
    }

    #[test]
    fn corridor_walks_to_goal() {
        let mut env = Corridor::new(4);
        assert_eq!(env.reset().unwrap(), RawObservation::Vector(vec![0.0, 3.0]));

        // Bumping the left wall stays put.
        let t = env.step(0).unwrap();
        assert_eq!(t.observation, RawObservation::Vector(vec![0.0, 3.0]));
        assert!(!t.done);

        env.step(1).unwrap();
        env.step(1).unwrap();
        let last = env.step(1).unwrap();
        assert!(last.done);
        assert!((last.reward - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn corridor_rejects_unknown_actions() {
        let mut env = Corridor::new(4);
        env.reset().unwrap();
        assert!(matches!(env.step(7), Err(EnvironmentError::Step { .. })));
    }
}
