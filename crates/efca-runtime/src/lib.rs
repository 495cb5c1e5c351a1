//! Run lifecycle for the EFCA-ADAPT runner
//!
//! - [`config`]: TOML loading and validation
//! - [`episode`]: training and evaluation loops
//! - [`coordinator`]: startup, foreground loop, shutdown and persistence

pub mod config;
pub mod coordinator;
pub mod episode;

pub use config::{Config, ConfigError, RawConfig};
pub use coordinator::{Components, Coordinator, WeightsLoad};
pub use episode::{EpisodeOutcome, TrainReport, TrainSettings, run_episode, run_eval_loop, run_training_loop};
