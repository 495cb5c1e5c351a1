//! Error taxonomy for a single episode of agent/environment interaction

/// Error raised while running one episode.
///
/// The training loop survives [`EpisodeError::Step`] (logged, next episode),
/// stops on [`EpisodeError::Interrupted`], and treats
/// [`EpisodeError::Shape`] as unrecoverable: retrying cannot fix a
/// dimension mismatch between the agent and the environment.
#[derive(Debug)]
pub enum EpisodeError {
    /// Transient failure inside a reset/act/step/learn call.
    Step(String),
    /// Observation or action shape disagrees with what was configured.
    Shape {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Explicit interruption request.
    Interrupted,
}

impl std::fmt::Display for EpisodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(msg) => write!(f, "step failed: {msg}"),
            Self::Shape {
                what,
                expected,
                actual,
            } => write!(f, "{what} shape mismatch: expected {expected}, got {actual}"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for EpisodeError {}

impl EpisodeError {
    pub fn step(msg: impl Into<String>) -> Self {
        Self::Step(msg.into())
    }

    /// Whether the training loop may continue with the next episode.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Check `actual` against `expected`, producing a [`EpisodeError::Shape`].
    pub fn check_shape(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::Shape {
                what,
                expected,
                actual,
            })
        }
    }
}
