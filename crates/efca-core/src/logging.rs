//! Process logger: env_logger formatting, routed around indicatif bars on a TTY

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::MultiProgress;
use log::{Level, LevelFilter, Log, Metadata, Record};

fn label(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn ansi(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[35m",
    }
}

/// Prints above the live spinner so log lines and progress never interleave.
pub struct IndicatifLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { filter, multi }
    }
}

impl Log for IndicatifLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        let level = record.level();
        let line = format!(
            "[{}{}\x1b[0m] {}",
            ansi(level),
            label(level),
            record.args()
        );
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.filter.flush();
    }
}

/// Set when `RUST_LOG` controls filtering and the configured level is ignored.
static ENV_FILTER_WINS: AtomicBool = AtomicBool::new(false);

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

/// Max level at startup: a forced level, else the `RUST_LOG` filter, else `info`.
fn startup_level(force: Option<LevelFilter>, env_filter: Option<LevelFilter>) -> LevelFilter {
    force.or(env_filter).unwrap_or(LevelFilter::Info)
}

/// Install the process logger.
///
/// With `multi`, records go through [`IndicatifLogger`]; otherwise plain
/// uncolored lines go to stderr. The env_logger filter admits everything
/// unless `RUST_LOG` is set, so the effective level is the global max level,
/// which [`set_log_level`] adjusts once the configuration has been read.
///
/// `force` (from `--debug`) ignores `RUST_LOG` entirely and pins the level.
pub fn init_logging(
    multi: Option<&MultiProgress>,
    force: Option<LevelFilter>,
) -> Result<(), log::SetLoggerError> {
    use std::io::Write;

    let mut builder = match force {
        Some(_) => {
            let mut b = env_logger::Builder::new();
            b.filter_level(LevelFilter::Trace);
            b
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")),
    };
    let env_filter = match multi {
        Some(multi) => {
            let filter = builder.build();
            let max = filter.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(filter, multi.clone())))?;
            max
        }
        None => {
            let logger = builder
                .format(|buf, record| writeln!(buf, "[{}] {}", label(record.level()), record.args()))
                .build();
            let max = logger.filter();
            log::set_boxed_logger(Box::new(logger))?;
            max
        }
    };

    let env_wins = force.is_none() && rust_log_set();
    ENV_FILTER_WINS.store(env_wins, Ordering::Relaxed);
    log::set_max_level(startup_level(force, env_wins.then_some(env_filter)));
    Ok(())
}

/// Apply the configured level. `RUST_LOG` wins unless a level was forced.
pub fn set_log_level(level: LevelFilter) {
    if !ENV_FILTER_WINS.load(Ordering::Relaxed) {
        log::set_max_level(level);
    }
}

/// Parse a configured log level name (case-insensitive).
///
/// Accepts the `log` crate names plus `warning` and `critical`.
pub fn parse_log_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::Warn),
        "critical" | "fatal" => Some(LevelFilter::Error),
        other => other.parse().ok(),
    }
}
