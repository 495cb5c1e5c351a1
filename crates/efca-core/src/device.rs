//! Compute device selection and seeding

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Compute device named in `system.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "cpu" => Some(Self::Cpu),
            "cuda" | "gpu" => Some(Self::Cuda),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }

    /// Device the runner actually computes on.
    ///
    /// The bundled agent is CPU-only; a CUDA request falls back with a warning.
    pub fn resolve(self) -> Self {
        match self {
            Self::Cpu | Self::Auto => Self::Cpu,
            Self::Cuda => {
                log::warn!("CUDA requested but no GPU backend is built in, falling back to cpu");
                Self::Cpu
            }
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic RNG for `system.seed`.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
