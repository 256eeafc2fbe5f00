//! Logging setup
//!
//! Console output plus an optional append-only log file, filtered by a
//! numeric verbosity unless `RUST_LOG` says otherwise.

use crate::error::{SpycraftError, SpycraftResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 0 error, 1 warn, 2 info, 3 debug, 4 and up trace
    pub verbose: u8,
    /// Append log lines here as well as to the console
    pub logfile: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: 2,
            logfile: None,
        }
    }
}

impl LoggingConfig {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    /// Set the log file; `none`, `no` and empty paths disable it
    pub fn with_logfile(mut self, path: impl AsRef<Path>) -> Self {
        self.logfile = logfile_path(path.as_ref());
        self
    }

    pub fn level(&self) -> Level {
        level_for_verbosity(self.verbose)
    }
}

/// Map numeric verbosity to a tracing level
pub fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn logfile_path(path: &Path) -> Option<PathBuf> {
    match path.to_str().map(str::trim) {
        Some("" | "none" | "no" | "/dev/null") => None,
        _ => Some(path.to_path_buf()),
    }
}

/// Install the global subscriber
pub fn setup_logging(config: &LoggingConfig) -> SpycraftResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(config.level()).into()));

    let file_layer = match &config.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SpycraftError::config(format!("{}: {}", path.display(), e)))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| SpycraftError::config(format!("logging: {}", e)))
}
