//! CLI entrypoint for portscan-synth.
//!
//! Parses arguments, loads the statistics database and port table, resolves
//! the attack parameters, writes the capture and formats the report.

pub mod output;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::capture::PcapCaptureWriter;
use crate::engine::{EngineConfig, PortscanAttack};
use crate::error::AttackError;
use crate::params::{AttackParameters, ParameterOverrides, DEFAULT_MAX_ADDRESS_ATTEMPTS};
use crate::{AttackReport, MacAddr, PortSpec};

pub use output::{format_json, format_pretty};

// ─────────────────────────────────────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────────────────────────────────────

/// portscan-synth: TCP SYN port-scan traffic synthesized from capture statistics.
#[derive(Parser, Debug)]
#[command(name = "portscan-synth", version, about)]
#[command(
    long_about = "Synthesizes a TCP SYN port scan whose addresses, MAC bindings, TTL, MSS \
    and packet rate are drawn from statistics of an existing background capture, and \
    writes it as a pcap ready to be merged into that capture. Parameters not given on \
    the command line or in a --params file are derived from the statistics."
)]
pub struct Cli {
    /// Statistics database of the background capture [env: PORTSCAN_SYNTH_STATS_DB]
    #[arg(long)]
    pub stats_db: Option<PathBuf>,

    /// Port popularity table (CSV, most popular first) [env: PORTSCAN_SYNTH_PORT_TABLE]
    #[arg(long)]
    pub port_table: Option<PathBuf>,

    /// Capture file to write
    #[arg(long, short = 'o', default_value = "portscan.pcap")]
    pub output: PathBuf,

    /// JSON file with parameter overrides; flags below take precedence
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Report format
    #[arg(long, default_value = "pretty", value_enum)]
    pub format: OutputFmt,

    /// Random destination addresses tried before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ADDRESS_ATTEMPTS)]
    pub max_address_attempts: usize,

    #[command(flatten)]
    pub attack: AttackArgs,
}

/// Per-parameter overrides.
#[derive(clap::Args, Debug, Default)]
pub struct AttackArgs {
    /// Scanner address(es), comma separated
    #[arg(long = "ip-src", value_delimiter = ',')]
    pub ip_source: Vec<Ipv4Addr>,

    /// Target address
    #[arg(long = "ip-dst")]
    pub ip_destination: Option<Ipv4Addr>,

    /// Scanner MAC address
    #[arg(long = "mac-src")]
    pub mac_source: Option<MacAddr>,

    /// Target MAC address
    #[arg(long = "mac-dst")]
    pub mac_destination: Option<MacAddr>,

    /// Scanner source port
    #[arg(long = "port-src")]
    pub port_source: Option<u16>,

    /// Destination ports: "80", "1-1024", "80,443,8080", "22,80-90"
    #[arg(long = "port-dst", value_parser = PortSpec::parse)]
    pub port_destination: Option<PortSpec>,

    /// Ports the target answers on
    #[arg(long = "port-open", value_parser = PortSpec::parse)]
    pub port_open: Option<PortSpec>,

    /// Shuffle destination ports
    #[arg(long)]
    pub shuffle: bool,

    /// Scan destination ports in reverse order
    #[arg(long)]
    pub descending: bool,

    /// Pick the scanner address per port from --ip-src
    #[arg(long)]
    pub randomize_ip_src: bool,

    /// Draw a new source port for every probe
    #[arg(long)]
    pub randomize_port_src: bool,

    /// Target packet rate
    #[arg(long)]
    pub pps: Option<f64>,

    /// Timestamp of the first packet (seconds)
    #[arg(long)]
    pub inject_at: Option<f64>,

    /// Background packet index to inject after
    #[arg(long)]
    pub inject_after: Option<u64>,
}

impl AttackArgs {
    /// Only the flags that were given; unset switches stay `None` so they do
    /// not mask values from a parameter file.
    pub fn overrides(&self) -> ParameterOverrides {
        let flag = |set: bool| set.then_some(true);
        ParameterOverrides {
            ip_source: (!self.ip_source.is_empty()).then(|| self.ip_source.clone()),
            ip_destination: self.ip_destination,
            mac_source: self.mac_source,
            mac_destination: self.mac_destination,
            port_source: self.port_source,
            port_destination: self.port_destination.clone(),
            port_open: self.port_open.clone(),
            port_dest_shuffle: flag(self.shuffle),
            port_dest_order_desc: flag(self.descending),
            ip_source_randomize: flag(self.randomize_ip_src),
            port_source_randomize: flag(self.randomize_port_src),
            packets_per_second: self.pps,
            inject_at_timestamp: self.inject_at,
            inject_after_packet: self.inject_after,
        }
    }
}

/// Output format argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFmt {
    Pretty,
    Json,
}

/// Error from a CLI run.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot read parameter file {}: {source}", path.display())]
    ParamsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid parameter file {}: {source}", path.display())]
    ParamsJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Attack(#[from] AttackError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

impl Cli {
    /// Engine configuration: environment defaults overridden by flags.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(path) = &self.stats_db {
            config.stats_db = path.clone();
        }
        if let Some(path) = &self.port_table {
            config.port_table = path.clone();
        }
        config.output = self.output.clone();
        config.seed = self.seed;
        config.max_address_attempts = self.max_address_attempts;
        config
    }

    /// Overrides from `--params` with individual flags layered on top.
    pub fn overrides(&self) -> Result<ParameterOverrides, CliError> {
        let file = match &self.params {
            Some(path) => load_overrides(path)?,
            None => ParameterOverrides::default(),
        };
        Ok(file.merge(self.attack.overrides()))
    }
}

/// Read a JSON parameter file.
pub fn load_overrides(path: &std::path::Path) -> Result<ParameterOverrides, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ParamsFile {
        path: path.to_path_buf(),
        source,
    })?;
    ParameterOverrides::from_json(&text).map_err(|source| CliError::ParamsJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Generate one attack capture as described by `cli`.
pub fn run(cli: &Cli) -> Result<(AttackParameters, AttackReport), CliError> {
    let config = cli.engine_config();
    let overrides = cli.overrides()?;

    let ports = Arc::new(config.load_port_table().map_err(AttackError::from)?);
    let store = config.open_statistics().map_err(AttackError::from)?;
    tracing::info!(
        stats_db = %config.stats_db.display(),
        port_table = %config.port_table.display(),
        ranked_ports = ports.len(),
        "inputs loaded"
    );

    let mut attack = PortscanAttack::new(&store, ports, &overrides, &config)?;
    let report = attack.generate(&mut PcapCaptureWriter::new())?;
    Ok((attack.parameters().clone(), report))
}
