//! Process-level run status shared between the foreground loop and the web API

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;

/// Process lifecycle phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Initializing = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Running => write!(f, "RUNNING"),
            Self::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Foreground loop selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    #[serde(rename = "server")]
    Serve,
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "eval")]
    Evaluate,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serve => "server",
            Self::Train => "train",
            Self::Evaluate => "eval",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub episode: u64,
    pub total_reward: f64,
    pub steps: u64,
}

/// Point-in-time view served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub mode: Mode,
    pub episodes: u64,
    pub last_reward: Option<f64>,
    pub uptime_secs: f64,
}

/// Shared run status. Written by the coordinator, read by API handlers.
#[derive(Debug)]
pub struct RunStatus {
    mode: Mode,
    phase: AtomicU8,
    episodes: AtomicU64,
    started: Instant,
    recent: Mutex<VecDeque<EpisodeSummary>>,
    history: usize,
}

impl RunStatus {
    /// `history` bounds how many recent episodes are kept for the API.
    pub fn new(mode: Mode, history: usize) -> Self {
        Self {
            mode,
            phase: AtomicU8::new(Phase::Initializing as u8),
            episodes: AtomicU64::new(0),
            started: Instant::now(),
            recent: Mutex::new(VecDeque::with_capacity(history.min(1024))),
            history,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to `to` unless already past it. Returns the previous phase.
    pub fn advance(&self, to: Phase) -> Phase {
        Phase::from_u8(self.phase.fetch_max(to as u8, Ordering::AcqRel))
    }

    /// Episodes finished so far (including ones that failed).
    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::Acquire)
    }

    pub fn set_episodes(&self, n: u64) {
        self.episodes.store(n, Ordering::Release);
    }

    pub fn record_episode(&self, summary: EpisodeSummary) {
        self.episodes.fetch_max(summary.episode, Ordering::AcqRel);
        if self.history == 0 {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == self.history {
            recent.pop_front();
        }
        recent.push_back(summary);
    }

    /// Recent episodes, oldest first.
    pub fn recent(&self) -> Vec<EpisodeSummary> {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let last_reward = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .map(|s| s.total_reward);
        StatusSnapshot {
            phase: self.phase(),
            mode: self.mode,
            episodes: self.episodes(),
            last_reward,
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(episode: u64, reward: f64) -> EpisodeSummary {
        EpisodeSummary {
            episode,
            total_reward: reward,
            steps: 10,
        }
    }

    #[test]
    fn phase_starts_initializing() {
        let status = RunStatus::new(Mode::Train, 4);
        assert_eq!(status.phase(), Phase::Initializing);
    }

    #[test]
    fn phase_never_moves_backwards() {
        let status = RunStatus::new(Mode::Train, 4);
        assert_eq!(status.advance(Phase::Running), Phase::Initializing);
        assert_eq!(status.advance(Phase::ShuttingDown), Phase::Running);
        assert_eq!(status.advance(Phase::Running), Phase::ShuttingDown);
        assert_eq!(status.phase(), Phase::ShuttingDown);
    }

    #[test]
    fn history_is_bounded() {
        let status = RunStatus::new(Mode::Train, 2);
        for i in 1..=3 {
            status.record_episode(summary(i, i as f64));
        }
        let recent = status.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].episode, 2);
        assert_eq!(status.episodes(), 3);
        assert_eq!(status.snapshot().last_reward, Some(3.0));
    }

    #[test]
    fn zero_history_still_counts() {
        let status = RunStatus::new(Mode::Evaluate, 0);
        status.record_episode(summary(1, 0.5));
        assert!(status.recent().is_empty());
        assert_eq!(status.episodes(), 1);
    }

    #[test]
    fn snapshot_serializes_names() {
        let status = RunStatus::new(Mode::Serve, 1);
        status.advance(Phase::ShuttingDown);
        let json = serde_json::to_string(&status.snapshot()).unwrap();
        assert!(json.contains(r#""phase":"SHUTTING_DOWN""#));
        assert!(json.contains(r#""mode":"server""#));
    }
}
