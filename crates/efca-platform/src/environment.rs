//! Environment interface and the bundled meta-RL toy task

use efca_core::EpisodeError;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Deserialize;

pub type Observation = Vec<f64>;
pub type Action = usize;

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
}

/// Episodic environment driven by the foreground loop.
pub trait Environment: Send {
    fn obs_dim(&self) -> usize;
    fn action_dim(&self) -> usize;
    /// Start a new episode and return the first observation.
    fn reset(&mut self) -> Result<Observation, EpisodeError>;
    fn step(&mut self, action: Action) -> Result<Transition, EpisodeError>;
}

/// `[environment]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub max_steps: u32,
    pub step_size: f64,
    pub goal_tolerance: f64,
    pub goal_bonus: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            step_size: 0.05,
            goal_tolerance: 0.05,
            goal_bonus: 1.0,
        }
    }
}

const LEFT: Action = 0;
const STAY: Action = 1;
const RIGHT: Action = 2;

/// 1-D goal reaching over a family of tasks.
///
/// Every reset samples a new goal in `[-1, 1]`; the agent starts at 0 and
/// moves left, stays, or moves right. Reward is the negative distance to the
/// goal plus `goal_bonus` on arrival, which ends the episode. Observations
/// are `[position, previous_goal, last_reward]`: the previous task's goal is
/// the only cross-episode context the agent gets.
pub struct MetaRlToyEnv {
    config: EnvironmentConfig,
    rng: StdRng,
    position: f64,
    goal: f64,
    prev_goal: f64,
    last_reward: f64,
    steps: u32,
    done: bool,
}

impl MetaRlToyEnv {
    pub fn new(config: EnvironmentConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            position: 0.0,
            goal: 0.0,
            prev_goal: 0.0,
            last_reward: 0.0,
            steps: 0,
            // step before the first reset is an error
            done: true,
        }
    }

    pub fn goal(&self) -> f64 {
        self.goal
    }

    fn observation(&self) -> Observation {
        vec![self.position, self.prev_goal, self.last_reward]
    }
}

impl Environment for MetaRlToyEnv {
    fn obs_dim(&self) -> usize {
        3
    }

    fn action_dim(&self) -> usize {
        3
    }

    fn reset(&mut self) -> Result<Observation, EpisodeError> {
        self.prev_goal = self.goal;
        self.goal = self.rng.gen_range(-1.0..=1.0);
        self.position = 0.0;
        self.last_reward = 0.0;
        self.steps = 0;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: Action) -> Result<Transition, EpisodeError> {
        if self.done {
            return Err(EpisodeError::step("step called on a finished episode"));
        }
        let delta = match action {
            LEFT => -self.config.step_size,
            STAY => 0.0,
            RIGHT => self.config.step_size,
            other => {
                return Err(EpisodeError::step(format!(
                    "action {other} out of range 0..{}",
                    self.action_dim()
                )));
            }
        };

        self.position = (self.position + delta).clamp(-1.0, 1.0);
        self.steps += 1;

        let distance = (self.position - self.goal).abs();
        let reached = distance <= self.config.goal_tolerance;
        let mut reward = -distance;
        if reached {
            reward += self.config.goal_bonus;
        }
        self.last_reward = reward;
        self.done = reached || self.steps >= self.config.max_steps;

        Ok(Transition {
            observation: self.observation(),
            reward,
            done: self.done,
        })
    }
}
