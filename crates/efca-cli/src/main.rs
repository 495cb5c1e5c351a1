//! efca-adapt - meta-RL runner
//!
//! Trains, evaluates or just serves the status API for the EFCA-ADAPT
//! agent, shutting down cleanly on SIGINT, SIGTERM or `POST /shutdown`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use efca_core::{Mode, ProgressContext, ShutdownToken};
use efca_runtime::{Components, Config, Coordinator};
use log::LevelFilter;

mod signals;

#[derive(Parser)]
#[command(name = "efca-adapt")]
#[command(about = "EFCA-ADAPT meta-RL runner")]
#[command(version)]
struct Cli {
    /// What to run in the foreground
    #[arg(long, value_enum, default_value_t = RunMode::Server)]
    mode: RunMode,

    /// Config file path (default: ./efca.toml or ~/.config/efca-adapt/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override api.port
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging (overrides operational.log_level and RUST_LOG)
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RunMode {
    /// Serve the API until shutdown
    Server,
    Train,
    Eval,
}

impl From<RunMode> for Mode {
    fn from(m: RunMode) -> Self {
        match m {
            RunMode::Server => Mode::Serve,
            RunMode::Train => Mode::Train,
            RunMode::Eval => Mode::Evaluate,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = Arc::new(ProgressContext::new());
    let multi = progress.is_tty().then(|| progress.multi());
    let forced = cli.debug.then_some(LevelFilter::Debug);
    if let Err(e) = efca_core::init_logging(multi, forced) {
        eprintln!("failed to initialize logging: {e}");
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c.with_port(cli.port),
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let level = if cli.debug {
        LevelFilter::Debug
    } else {
        config.operational.log_level
    };
    efca_core::set_log_level(level);
    log::info!("Configuration:\n{}", config.display_table());

    let token = ShutdownToken::new();
    if let Err(e) = signals::install(&token) {
        log::error!("{e:#}");
        return ExitCode::FAILURE;
    }

    let components = Components::from_config(&config);
    let coordinator = Coordinator::new(config, cli.mode.into(), components, token, progress);
    match coordinator.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
