//! EFCA-ADAPT Platform - Environment, agent and metrics collaborators
//!
//! The lifecycle coordinator only talks to these through the
//! [`Environment`], [`Agent`] and [`Monitor`] traits. The bundled
//! implementations are a small meta-RL toy task, a linear Q-learning agent
//! and a JSON-lines metrics recorder.

pub mod agent;
pub mod checkpoint;
pub mod environment;
pub mod monitor;

// Re-exports
pub use agent::{Agent, AgentConfig, Experience, MetaAgent};
pub use checkpoint::CheckpointError;
pub use environment::{Action, Environment, EnvironmentConfig, MetaRlToyEnv, Observation, Transition};
pub use monitor::{METRICS_FILE, MetricPoint, MlopsMonitor, Monitor, MonitoringConfig, read_metrics};
