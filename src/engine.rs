//! Attack engine: resolves parameters once and generates captures.
//!
//! Ties the components together: the parameter resolver and the traffic
//! profile run at construction, the timing model, exchange synthesizer and
//! capture writer run on every [`PortscanAttack::generate`] call.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::capture::{self, CaptureWriter};
use crate::error::AttackError;
use crate::params::{AttackParameters, ParameterOverrides, ParameterResolver, DEFAULT_MAX_ADDRESS_ATTEMPTS};
use crate::ports::{PortTable, PortTableError};
use crate::stats::{SqliteStatistics, StatisticsStore, StatsError, TrafficProfile};
use crate::synth::ExchangeSynthesizer;
use crate::timing::{self, TimingModel};
use crate::AttackReport;

/// Environment variable naming the port popularity table.
pub const PORT_TABLE_ENV: &str = "PORTSCAN_SYNTH_PORT_TABLE";
/// Environment variable naming the statistics database.
pub const STATS_DB_ENV: &str = "PORTSCAN_SYNTH_STATS_DB";

const DEFAULT_PORT_TABLE: &str = "nmap-services-tcp.csv";
const DEFAULT_STATS_DB: &str = "statistics.db";
const DEFAULT_OUTPUT: &str = "portscan.pcap";

/// Configuration for creating a [`PortscanAttack`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// CSV table of ports ranked by popularity.
    pub port_table: PathBuf,
    /// SQLite statistics of the background capture.
    pub stats_db: PathBuf,
    /// Capture file to write.
    pub output: PathBuf,
    /// Seed for every random draw; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Random destination addresses drawn before giving up.
    pub max_address_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port_table: PathBuf::from(DEFAULT_PORT_TABLE),
            stats_db: PathBuf::from(DEFAULT_STATS_DB),
            output: PathBuf::from(DEFAULT_OUTPUT),
            seed: None,
            max_address_attempts: DEFAULT_MAX_ADDRESS_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Defaults, with input paths taken from the environment when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port_table: std::env::var(PORT_TABLE_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.port_table),
            stats_db: std::env::var(STATS_DB_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.stats_db),
            ..defaults
        }
    }

    pub fn load_port_table(&self) -> Result<PortTable, PortTableError> {
        PortTable::load(&self.port_table)
    }

    pub fn open_statistics(&self) -> Result<SqliteStatistics, StatsError> {
        SqliteStatistics::open(&self.stats_db)
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// One SYN port-scan attack against a background capture.
pub struct PortscanAttack {
    ports: Arc<PortTable>,
    params: AttackParameters,
    profile: TrafficProfile,
    rng: StdRng,
    output: PathBuf,
}

impl PortscanAttack {
    /// Resolve parameters and snapshot the statistics the scan needs.
    ///
    /// Fails before any packet is built when a parameter cannot be derived.
    pub fn new(
        store: &dyn StatisticsStore,
        ports: Arc<PortTable>,
        overrides: &ParameterOverrides,
        config: &EngineConfig,
    ) -> Result<Self, AttackError> {
        let mut rng = config.rng();
        let params = ParameterResolver::new(store, &ports)
            .with_max_address_attempts(config.max_address_attempts)
            .resolve(overrides, &mut rng)?;
        let profile = TrafficProfile::collect(store, params.primary_source(), params.ip_destination)?;

        tracing::info!(
            source = %params.primary_source(),
            destination = %params.ip_destination,
            dst_ports = params.port_destination.len(),
            pps = params.packets_per_second,
            seed = ?config.seed,
            "port scan attack prepared"
        );

        Ok(Self {
            ports,
            params,
            profile,
            rng,
            output: config.output.clone(),
        })
    }

    pub fn parameters(&self) -> &AttackParameters {
        &self.params
    }

    pub fn profile(&self) -> &TrafficProfile {
        &self.profile
    }

    /// Synthesize the scan and hand it to `writer`.
    ///
    /// Nothing reaches the writer unless synthesis completes.
    pub fn generate(&mut self, writer: &mut dyn CaptureWriter) -> Result<AttackReport, AttackError> {
        let open_ports = self
            .params
            .port_open
            .resolve(&self.profile, &self.ports, &mut self.rng)?;
        let mut timing = TimingModel::new(
            self.params.packets_per_second,
            self.params.inject_at_timestamp,
            &mut self.rng,
        )?;
        tracing::info!(
            dst_ports = self.params.port_destination.len(),
            open_ports = open_ports.len(),
            max_delay = timing.max_delay(),
            "synthesizing port scan"
        );

        let synthesis = ExchangeSynthesizer::new(&self.params, &self.profile, &open_ports)
            .synthesize(&mut timing, &mut self.rng)?;
        let (packet_count, capture_path) = capture::assemble(&synthesis.packets, writer, &self.output)?;

        Ok(AttackReport {
            attack_id: Uuid::new_v4(),
            packet_count,
            capture_path,
            attack_start: synthesis.attack_start,
            attack_end: synthesis.attack_end,
            ports_probed: synthesis.exchanges.len(),
            ports_open: synthesis.ports_open(),
            delay_stats: timing::delay_stats(&synthesis.timestamps()),
            generated_at: Utc::now(),
        })
    }
}
