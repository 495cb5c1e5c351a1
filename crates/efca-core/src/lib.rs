//! EFCA-ADAPT Core - Shared infrastructure for the agent runner
//!
//! Cooperative shutdown, logging, progress display, the process-level run
//! status shared with the web API, and the error taxonomy used by the
//! episode loops.

pub mod device;
pub mod error;
pub mod logging;
pub mod progress;
pub mod shutdown;
pub mod status;

// Re-exports for convenience
pub use device::{Device, seeded_rng};
pub use error::EpisodeError;
pub use logging::{IndicatifLogger, init_logging, parse_log_level, set_log_level};
pub use progress::{ProgressContext, SharedProgress};
pub use shutdown::ShutdownToken;
pub use status::{EpisodeSummary, Mode, Phase, RunStatus, StatusSnapshot};
