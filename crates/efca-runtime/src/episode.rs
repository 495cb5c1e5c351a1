//! Foreground episode loops: training and evaluation

use efca_core::{EpisodeError, EpisodeSummary, RunStatus, ShutdownToken};
use efca_platform::{Agent, Environment, Experience, Monitor};
use indicatif::ProgressBar;

/// Loop knobs taken from `[operational]`.
#[derive(Debug, Clone, Copy)]
pub struct TrainSettings {
    pub save_interval: u64,
    pub save_weights_interval: u64,
    pub log_interval: u64,
    pub max_episodes: Option<u64>,
}

/// Result of running one episode to termination (or until shutdown).
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub total_reward: f64,
    pub steps: u64,
    /// `false` when the episode was cut short by a shutdown request.
    pub completed: bool,
}

/// Totals reported when the training loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainReport {
    pub episodes: u64,
    pub failed: u64,
    pub checkpoints: u64,
}

/// Reset `env` and step it with `agent` until the episode ends.
///
/// The shutdown token is checked between steps; a step in flight always
/// completes. `learn = false` runs inference only.
pub fn run_episode(
    env: &mut dyn Environment,
    agent: &mut dyn Agent,
    shutdown: &ShutdownToken,
    deterministic: bool,
    learn: bool,
    log_interval: u64,
) -> Result<EpisodeOutcome, EpisodeError> {
    let mut obs = env.reset()?;
    EpisodeError::check_shape("observation", env.obs_dim(), obs.len())?;

    let mut total_reward = 0.0;
    let mut steps = 0u64;
    let mut done = false;

    while !done && !shutdown.is_requested() {
        steps += 1;
        let action = agent.act(&obs, deterministic)?;
        let t = env.step(action)?;
        EpisodeError::check_shape("observation", env.obs_dim(), t.observation.len())?;
        if learn {
            agent.learn(&Experience {
                obs: &obs,
                action,
                reward: t.reward,
                next_obs: &t.observation,
                done: t.done,
            })?;
        }
        total_reward += t.reward;
        done = t.done;
        obs = t.observation;

        if log_interval > 0 && steps % log_interval == 0 {
            log::debug!("Step {steps}: reward={:.4}", t.reward);
        }
    }

    Ok(EpisodeOutcome {
        total_reward,
        steps,
        completed: done,
    })
}

/// Save weights and/or metrics when `episode` lands on an interval.
///
/// Returns `true` if anything was written. Failures are logged only.
fn checkpoint_on_interval(
    episode: u64,
    settings: &TrainSettings,
    agent: &dyn Agent,
    monitor: &mut dyn Monitor,
) -> bool {
    let weights_due = episode % settings.save_weights_interval == 0;
    let metrics_due = episode % settings.save_interval == 0;
    if !weights_due && !metrics_due {
        return false;
    }

    log::info!("Saving checkpoint (episode {episode})...");
    if weights_due {
        if let Err(e) = agent.save_weights() {
            log::error!("Checkpoint at episode {episode}: saving weights failed: {e}");
        }
    }
    if metrics_due {
        if let Err(e) = monitor.save_metrics() {
            log::error!("Checkpoint at episode {episode}: saving metrics failed: {e}");
        }
    }
    true
}

/// Train until shutdown is requested or `max_episodes` is reached.
///
/// Recoverable episode errors are logged and the loop moves on to the next
/// episode. [`EpisodeError::Interrupted`] ends the loop normally; any other
/// unrecoverable error is returned.
pub fn run_training_loop(
    env: &mut dyn Environment,
    agent: &mut dyn Agent,
    monitor: &mut dyn Monitor,
    settings: &TrainSettings,
    shutdown: &ShutdownToken,
    status: &RunStatus,
    pb: &ProgressBar,
) -> Result<TrainReport, EpisodeError> {
    log::info!("Starting training loop...");
    let mut report = TrainReport::default();
    let mut episode = 0u64;

    while !shutdown.is_requested() {
        if settings.max_episodes.is_some_and(|max| episode >= max) {
            log::info!("Reached max_episodes ({episode})");
            break;
        }
        episode += 1;
        report.episodes = episode;
        log::debug!("Episode {episode} starting");

        let outcome = match run_episode(
            env,
            agent,
            shutdown,
            false,
            true,
            settings.log_interval,
        ) {
            Ok(outcome) => outcome,
            Err(EpisodeError::Interrupted) => {
                log::info!("Training interrupted during episode {episode}");
                break;
            }
            Err(e) if e.is_recoverable() => {
                log::error!("Error in training loop (episode {episode}): {e}");
                report.failed += 1;
                status.set_episodes(episode);
                continue;
            }
            Err(e) => {
                log::error!("Unrecoverable error in episode {episode}: {e}");
                status.set_episodes(episode);
                return Err(e);
            }
        };

        if outcome.completed {
            log::info!(
                "Episode {episode} finished: total_reward={:.4}, steps={}",
                outcome.total_reward,
                outcome.steps
            );
        } else {
            log::info!(
                "Episode {episode} cut short by shutdown: total_reward={:.4}, steps={}",
                outcome.total_reward,
                outcome.steps
            );
        }
        monitor.log_metric("episode_reward", outcome.total_reward, episode);
        monitor.log_metric("episode_length", outcome.steps as f64, episode);
        status.record_episode(EpisodeSummary {
            episode,
            total_reward: outcome.total_reward,
            steps: outcome.steps,
        });
        pb.set_message(format!(
            "episode {episode}  reward {:.3}  steps {}",
            outcome.total_reward, outcome.steps
        ));

        if checkpoint_on_interval(episode, settings, agent, monitor) {
            report.checkpoints += 1;
        }
    }

    log::info!(
        "Training loop exiting after {} episodes ({} failed)",
        report.episodes,
        report.failed
    );
    Ok(report)
}

/// Run one deterministic episode without learning.
///
/// Errors are logged and reported as `None`; nothing is retried or saved.
pub fn run_eval_loop(
    env: &mut dyn Environment,
    agent: &mut dyn Agent,
    shutdown: &ShutdownToken,
    status: &RunStatus,
    log_interval: u64,
) -> Option<EpisodeOutcome> {
    log::info!("Starting evaluation loop...");
    match run_episode(env, agent, shutdown, true, false, log_interval) {
        Ok(outcome) => {
            log::info!(
                "Eval completed: total_reward={:.4}, steps={}",
                outcome.total_reward,
                outcome.steps
            );
            status.record_episode(EpisodeSummary {
                episode: 1,
                total_reward: outcome.total_reward,
                steps: outcome.steps,
            });
            Some(outcome)
        }
        Err(e) => {
            log::error!("Evaluation error: {e}");
            None
        }
    }
}
