//! Configuration file and command line
//!
//! The TOML file supplies defaults; command line arguments override them.
//! A missing file at the default location is not an error.

use crate::error::{SpycraftError, SpycraftResult};
use crate::filter::{build_filter, extract_host, extract_port, inject_host};
use crate::limits::*;
use crate::logging::LoggingConfig;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/spycraft.conf";

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Capture filter expression, source of the host and port
    pub filter: String,
    /// Name of this call node in reports
    pub name: Option<String>,
    /// Bytes of each frame to decode
    pub snapshot: u32,
    pub verbose: Option<u8>,
    pub logfile: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            filter: format!("udp port {}", DEFAULT_SIP_PORT),
            name: None,
            snapshot: DEFAULT_SNAPSHOT,
            verbose: None,
            logfile: None,
        }
    }
}

/// `[pipelines]` section: queue capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinesConfig {
    /// Packet queue for live sources
    pub capture: usize,
    /// Packet queue for capture files
    pub scan: usize,
    pub message: usize,
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            capture: DEFAULT_CAPTURE_QUEUE,
            scan: DEFAULT_SCAN_QUEUE,
            message: DEFAULT_MESSAGE_QUEUE,
        }
    }
}

/// `[legs]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegsConfig {
    /// Header carrying the collation hint
    pub collate_header: String,
    /// Seconds a finished leg is kept, 0 keeps it forever
    pub linger: u64,
}

impl Default for LegsConfig {
    fn default() -> Self {
        Self {
            collate_header: DEFAULT_COLLATE_HEADER.to_string(),
            linger: DEFAULT_LEG_LINGER_SECS,
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipelines: PipelinesConfig,
    pub legs: LegsConfig,
}

impl Config {
    /// Parse and validate configuration text
    pub fn from_toml(text: &str) -> SpycraftResult<Self> {
        let config: Config = toml::from_str(text).map_err(|e| SpycraftError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    ///
    /// When `required` is false a missing file yields the defaults.
    pub fn load(path: &Path, required: bool) -> SpycraftResult<Self> {
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| SpycraftError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> SpycraftResult<()> {
        let queues = [
            ("capture", self.pipelines.capture),
            ("scan", self.pipelines.scan),
            ("message", self.pipelines.message),
        ];
        if let Some((name, _)) = queues.iter().find(|(_, size)| *size == 0) {
            return Err(SpycraftError::config(format!("{} queue must not be empty", name)));
        }
        if self.legs.linger > MAX_LEG_LINGER_SECS {
            return Err(SpycraftError::config(format!(
                "linger {} exceeds {} seconds",
                self.legs.linger, MAX_LEG_LINGER_SECS
            )));
        }
        if self.legs.collate_header.trim().is_empty() {
            return Err(SpycraftError::config("collate_header must not be empty"));
        }
        Ok(())
    }
}

/// SIP call analysis from captured traffic
#[derive(Debug, Parser)]
#[command(name = "spycraft", author, version, about = "SIP call analysis", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, ...)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log file, "none" to disable
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Trace call legs for a monitored host
    Trace(EndpointArgs),
    /// Print SIP payloads exchanged with a monitored host
    Dump(EndpointArgs),
    /// List the SIP stacks seen in capture files
    Find(FindArgs),
}

/// Monitored endpoint and capture file
#[derive(Debug, Clone, Args)]
pub struct EndpointArgs {
    /// Host to reference
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to reference
    #[arg(long)]
    pub port: Option<u16>,

    /// Capture filter expression
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Name of the call node
    #[arg(short, long)]
    pub name: Option<String>,

    /// Capture file (.pcap)
    pub path: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct FindArgs {
    /// Capture files (.pcap)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl Cli {
    /// Configuration file to read and whether it must exist
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Logging settings: command line first, then the file, then verbosity 2
    pub fn logging(&self, server: &ServerConfig) -> LoggingConfig {
        let verbose = match self.verbose {
            0 => server.verbose.unwrap_or(2),
            n => n,
        };
        let logging = LoggingConfig::new(verbose);
        match self.logfile.as_ref().or(server.logfile.as_ref()) {
            Some(path) => logging.with_logfile(path),
            None => logging,
        }
    }
}

/// Resolved monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
    pub name: String,
    /// Filter describing exactly what is monitored
    pub filter: String,
}

impl Endpoint {
    /// Resolve host, port and name from arguments and configuration
    ///
    /// The port comes from `--port`, then the filter, then 5060. The host
    /// comes from `--host`, then the filter; without one there is nothing
    /// to monitor.
    pub fn resolve(args: &EndpointArgs, server: &ServerConfig) -> SpycraftResult<Self> {
        let filter = args.filter.as_deref().unwrap_or(&server.filter);
        let port = args
            .port
            .filter(|&port| port != 0)
            .or_else(|| extract_port(filter))
            .unwrap_or(DEFAULT_SIP_PORT);
        let host = args
            .host
            .or_else(|| extract_host(filter))
            .ok_or_else(|| SpycraftError::config("no host to reference"))?;
        let name = args
            .name
            .clone()
            .or_else(|| server.name.clone())
            .unwrap_or_else(|| format!("{}/{}", host, port));

        // a filter that already picks the port only needs the host added
        let filter = if args.port.is_none() && extract_port(filter).is_some() {
            inject_host(filter, host)
        } else {
            build_filter(host, port)
        };

        Ok(Self {
            host,
            port,
            name,
            filter,
        })
    }
}
