//! Configuration loading and validation from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use efca_core::{Device, parse_log_level};
use efca_platform::{AgentConfig, EnvironmentConfig, MonitoringConfig};
use log::LevelFilter;
use serde::Deserialize;

pub const DEFAULT_SAVE_INTERVAL: u64 = 10;
pub const DEFAULT_LOG_INTERVAL: u64 = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 3000;

/// Sections every configuration must have.
pub const REQUIRED_SECTIONS: [&str; 5] = ["operational", "system", "environment", "monitoring", "api"];

/// Validation failure. Always names the offending section or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingSection(&'static str),
    MissingField(&'static str),
    InvalidValue { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSection(s) => write!(f, "config missing required section: {s}"),
            Self::MissingField(name) => write!(f, "config missing required field: {name}"),
            Self::InvalidValue { field, reason } => write!(f, "invalid value for {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// File shape before validation: everything optional so that a missing
/// item is reported by name rather than as a serde parse error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    pub operational: Option<RawOperational>,
    pub system: Option<RawSystem>,
    pub api: Option<RawApi>,
    pub environment: Option<EnvironmentConfig>,
    pub monitoring: Option<MonitoringConfig>,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawOperational {
    pub log_level: Option<String>,
    pub save_interval: Option<u64>,
    pub save_weights_interval: Option<u64>,
    pub log_interval: Option<u64>,
    pub max_episodes: Option<u64>,
    pub checkpoint_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSystem {
    pub seed: Option<u64>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawApi {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shutdown_timeout_ms: Option<u64>,
}

/// `[operational]` after validation.
#[derive(Debug, Clone)]
pub struct OperationalConfig {
    pub log_level: LevelFilter,
    /// Episodes between metrics checkpoints (and weights, unless overridden).
    pub save_interval: u64,
    /// Episodes between weight checkpoints.
    pub save_weights_interval: u64,
    /// Steps between debug step logs.
    pub log_interval: u64,
    pub max_episodes: Option<u64>,
    pub checkpoint_dir: PathBuf,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub seed: u64,
    pub device: Device,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Bound on joining the API thread at shutdown.
    pub shutdown_timeout: Duration,
}

/// Validated runner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub operational: OperationalConfig,
    pub system: SystemConfig,
    pub api: ApiConfig,
    pub environment: EnvironmentConfig,
    pub monitoring: MonitoringConfig,
    pub agent: AgentConfig,
}

fn positive(field: &'static str, value: Option<u64>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue {
            field,
            reason: "must be at least 1".into(),
        }),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

impl RawConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(raw)
    }

    /// Check required sections and fields, apply defaults.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let Self {
            operational,
            system,
            api,
            environment,
            monitoring,
            agent,
        } = self;

        // Report the first missing section in the documented order
        let operational = operational.ok_or(ConfigError::MissingSection("operational"))?;
        let system = system.ok_or(ConfigError::MissingSection("system"))?;
        let environment = environment.ok_or(ConfigError::MissingSection("environment"))?;
        let monitoring = monitoring.ok_or(ConfigError::MissingSection("monitoring"))?;
        let api = api.ok_or(ConfigError::MissingSection("api"))?;

        let seed = system.seed.ok_or(ConfigError::MissingField("system.seed"))?;
        let device_name = system
            .device
            .ok_or(ConfigError::MissingField("system.device"))?;
        let device = Device::from_name(&device_name).ok_or_else(|| ConfigError::InvalidValue {
            field: "system.device",
            reason: format!("unknown device {device_name:?} (expected cpu, cuda or auto)"),
        })?;

        let host = api.host.ok_or(ConfigError::MissingField("api.host"))?;
        let port = api.port.ok_or(ConfigError::MissingField("api.port"))?;

        let level_name = operational
            .log_level
            .ok_or(ConfigError::MissingField("operational.log_level"))?;
        let log_level = parse_log_level(&level_name).ok_or_else(|| ConfigError::InvalidValue {
            field: "operational.log_level",
            reason: format!("unknown level {level_name:?}"),
        })?;

        let save_interval = positive(
            "operational.save_interval",
            operational.save_interval,
            DEFAULT_SAVE_INTERVAL,
        )?;
        let save_weights_interval = positive(
            "operational.save_weights_interval",
            operational.save_weights_interval,
            save_interval,
        )?;
        let log_interval = positive(
            "operational.log_interval",
            operational.log_interval,
            DEFAULT_LOG_INTERVAL,
        )?;
        let poll_ms = positive(
            "operational.poll_interval_ms",
            operational.poll_interval_ms,
            DEFAULT_POLL_INTERVAL_MS,
        )?;

        if environment.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "environment.max_steps",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Config {
            operational: OperationalConfig {
                log_level,
                save_interval,
                save_weights_interval,
                log_interval,
                max_episodes: operational.max_episodes,
                checkpoint_dir: operational
                    .checkpoint_dir
                    .unwrap_or_else(|| PathBuf::from("./checkpoints")),
                poll_interval: Duration::from_millis(poll_ms),
            },
            system: SystemConfig { seed, device },
            api: ApiConfig {
                host,
                port,
                shutdown_timeout: Duration::from_millis(
                    api.shutdown_timeout_ms
                        .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
                ),
            },
            environment,
            monitoring,
            agent,
        })
    }
}

/// Candidate config locations, in search order.
///
/// 1. ./efca.toml (current directory)
/// 2. ~/.config/efca-adapt/config.toml
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("efca.toml")];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "efca-adapt") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

impl Config {
    /// Load and validate from `path`, or from the first discovered file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let raw = match path {
            Some(p) => RawConfig::from_file(p)?,
            None => {
                let candidates = search_paths();
                let found = candidates.iter().find(|p| p.exists()).with_context(|| {
                    let tried: Vec<String> =
                        candidates.iter().map(|p| p.display().to_string()).collect();
                    format!("no config file found (looked in: {})", tried.join(", "))
                })?;
                RawConfig::from_file(found)?
            }
        };
        Ok(raw.validate()?)
    }

    /// Apply `--port`.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api.port = port;
        }
        self
    }

    pub fn weights_path(&self) -> PathBuf {
        self.operational.checkpoint_dir.join("agent_weights.json")
    }

    pub fn metrics_dir(&self) -> &Path {
        self.monitoring
            .metrics_dir
            .as_deref()
            .unwrap_or(&self.operational.checkpoint_dir)
    }

    /// Effective configuration as a table, for the startup banner.
    pub fn display_table(&self) -> comfy_table::Table {
        use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Setting").fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        let op = &self.operational;
        table.add_row(vec!["Log level", &op.log_level.to_string()]);
        table.add_row(vec!["Save interval", &format!("{} episodes", op.save_interval)]);
        table.add_row(vec![
            "Weights interval",
            &format!("{} episodes", op.save_weights_interval),
        ]);
        table.add_row(vec![
            "Max episodes",
            &op.max_episodes
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
        ]);
        table.add_row(vec!["Checkpoint dir", &op.checkpoint_dir.display().to_string()]);
        table.add_row(vec!["Metrics dir", &self.metrics_dir().display().to_string()]);
        table.add_row(vec!["Seed", &self.system.seed.to_string()]);
        table.add_row(vec!["Device", self.system.device.as_str()]);
        table.add_row(vec!["API", &format!("{}:{}", self.api.host, self.api.port)]);
        table.add_row(vec![
            "Env max steps",
            &self.environment.max_steps.to_string(),
        ]);
        table.add_row(vec![
            "Agent lr / gamma / eps",
            &format!(
                "{} / {} / {}",
                self.agent.learning_rate, self.agent.gamma, self.agent.epsilon
            ),
        ]);
        table
    }
}
