//! Agent interface and the bundled linear Q-learning agent

use std::path::{Path, PathBuf};

use efca_core::EpisodeError;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{self, CheckpointError};
use crate::environment::Action;

/// One observed transition handed to [`Agent::learn`].
#[derive(Debug, Clone, Copy)]
pub struct Experience<'a> {
    pub obs: &'a [f64],
    pub action: Action,
    pub reward: f64,
    pub next_obs: &'a [f64],
    pub done: bool,
}

/// Learning agent driven by the foreground loop.
///
/// Weight persistence is owned by the agent; the coordinator only asks it to
/// save or load.
pub trait Agent: Send {
    /// Pick an action. `deterministic` disables exploration (evaluation).
    fn act(&mut self, obs: &[f64], deterministic: bool) -> Result<Action, EpisodeError>;
    fn learn(&mut self, exp: &Experience<'_>) -> Result<(), EpisodeError>;
    fn save_weights(&self) -> Result<(), CheckpointError>;
    /// [`CheckpointError::NotFound`] means there is nothing to resume from.
    fn load_weights(&mut self) -> Result<(), CheckpointError>;
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            gamma: 0.99,
            epsilon: 0.1,
        }
    }
}

/// Serialized weight file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentWeights {
    obs_dim: usize,
    action_dim: usize,
    /// Row per action: `obs_dim` coefficients then the bias.
    weights: Vec<Vec<f64>>,
}

/// Linear action-value agent with epsilon-greedy exploration and TD(0) updates.
pub struct MetaAgent {
    config: AgentConfig,
    obs_dim: usize,
    action_dim: usize,
    weights: Vec<Vec<f64>>,
    weights_path: PathBuf,
    rng: StdRng,
}

impl MetaAgent {
    pub fn new(
        config: AgentConfig,
        obs_dim: usize,
        action_dim: usize,
        weights_path: PathBuf,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            obs_dim,
            action_dim,
            weights: vec![vec![0.0; obs_dim + 1]; action_dim],
            weights_path,
            rng,
        }
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    fn q_value(&self, obs: &[f64], action: Action) -> f64 {
        let row = &self.weights[action];
        row[..self.obs_dim]
            .iter()
            .zip(obs)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + row[self.obs_dim]
    }

    fn greedy(&self, obs: &[f64]) -> (Action, f64) {
        (0..self.action_dim)
            .map(|a| (a, self.q_value(obs, a)))
            .fold((0, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            })
    }
}

impl Agent for MetaAgent {
    fn act(&mut self, obs: &[f64], deterministic: bool) -> Result<Action, EpisodeError> {
        EpisodeError::check_shape("observation", self.obs_dim, obs.len())?;
        if !deterministic && self.rng.gen::<f64>() < self.config.epsilon {
            return Ok(self.rng.gen_range(0..self.action_dim));
        }
        Ok(self.greedy(obs).0)
    }

    fn learn(&mut self, exp: &Experience<'_>) -> Result<(), EpisodeError> {
        EpisodeError::check_shape("observation", self.obs_dim, exp.obs.len())?;
        EpisodeError::check_shape("observation", self.obs_dim, exp.next_obs.len())?;
        if exp.action >= self.action_dim {
            return Err(EpisodeError::step(format!(
                "action {} out of range 0..{}",
                exp.action, self.action_dim
            )));
        }

        let bootstrap = if exp.done {
            0.0
        } else {
            self.greedy(exp.next_obs).1
        };
        let target = exp.reward + self.config.gamma * bootstrap;
        let td_error = target - self.q_value(exp.obs, exp.action);
        if !td_error.is_finite() {
            return Err(EpisodeError::step(format!("non-finite TD error {td_error}")));
        }

        let lr = self.config.learning_rate;
        let obs_dim = self.obs_dim;
        let row = &mut self.weights[exp.action];
        for (w, x) in row[..obs_dim].iter_mut().zip(exp.obs) {
            *w += lr * td_error * x;
        }
        row[obs_dim] += lr * td_error;
        Ok(())
    }

    fn save_weights(&self) -> Result<(), CheckpointError> {
        let payload = AgentWeights {
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
            weights: self.weights.clone(),
        };
        checkpoint::save_json(&self.weights_path, &payload)?;
        log::info!("Saved agent weights to {}", self.weights_path.display());
        Ok(())
    }

    fn load_weights(&mut self) -> Result<(), CheckpointError> {
        let loaded: AgentWeights = checkpoint::load_json(&self.weights_path)?;
        let rows_ok = loaded.weights.len() == self.action_dim
            && loaded.weights.iter().all(|r| r.len() == self.obs_dim + 1);
        if loaded.obs_dim != self.obs_dim || loaded.action_dim != self.action_dim || !rows_ok {
            return Err(CheckpointError::Corrupt {
                path: self.weights_path.clone(),
                reason: format!(
                    "weights are {}x{}, agent expects {}x{}",
                    loaded.obs_dim, loaded.action_dim, self.obs_dim, self.action_dim
                ),
            });
        }
        self.weights = loaded.weights;
        Ok(())
    }
}
