//! Traffic statistics of the background capture.
//!
//! The synthesizer never looks at background packets directly. Everything it
//! needs to blend in (busiest host, MAC bindings, packet rates, MSS, TTL
//! histogram, ports already seen open) comes through [`StatisticsStore`].

pub mod memory;
pub mod sqlite;

use std::net::Ipv4Addr;

use rand::RngCore;

use crate::MacAddr;

pub use memory::MemoryStatistics;
pub use sqlite::SqliteStatistics;

/// Error from a statistics backend.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("statistics database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed statistic {what}: '{value}'")]
    Malformed { what: &'static str, value: String },
}

/// Read-only aggregates over the background capture.
///
/// Lookups for unknown addresses return `None` or an empty collection rather
/// than an error; errors are reserved for backend failures.
pub trait StatisticsStore {
    /// Addresses with the highest sent + received packet count, ties in store order.
    fn most_used_addresses(&self) -> Result<Vec<String>, StatsError>;

    /// MAC address observed for `ip`.
    fn mac_address(&self, ip: Ipv4Addr) -> Result<Option<MacAddr>, StatsError>;

    /// A uniformly chosen address seen in the capture, unvalidated.
    fn random_address(&self, rng: &mut dyn RngCore) -> Result<Option<String>, StatsError>;

    /// Packets per second sent by `ip`.
    fn pps_sent(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError>;

    /// Packets per second received by `ip`.
    fn pps_received(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError>;

    /// Most frequent TCP MSS option value announced by `ip`.
    fn mss(&self, ip: Ipv4Addr) -> Result<Option<u16>, StatsError>;

    /// `(ttl, packet count)` pairs for packets sent by `ip`.
    fn ttl_distribution(&self, ip: Ipv4Addr) -> Result<Vec<(u8, u64)>, StatsError>;

    /// Most common TTL across the whole capture.
    fn most_common_ttl(&self) -> Result<Option<u8>, StatsError>;

    /// Total number of packets in the capture.
    fn packet_count(&self) -> Result<u64, StatsError>;

    /// Ports on which `ip` was observed receiving traffic.
    fn inbound_ports(&self, ip: Ipv4Addr) -> Result<Vec<u16>, StatsError>;

    /// Timestamp in seconds of the packet at `index` (0-based).
    fn packet_timestamp(&self, index: u64) -> Result<Option<f64>, StatsError>;
}

/// Per-attack snapshot of the statistics the exchange synthesizer consumes.
///
/// Collected once after parameter resolution and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficProfile {
    /// MSS announced by the scanning host, if it ever sent one.
    pub source_mss: Option<u16>,
    /// MSS announced by the target host.
    pub destination_mss: Option<u16>,
    /// TTL histogram of the scanning host.
    pub ttl_distribution: Vec<(u8, u64)>,
    /// Capture-wide most common TTL, queried only when the histogram is empty.
    pub most_common_ttl: Option<u8>,
    /// Ports already seen open on the target, deduplicated in store order.
    pub inbound_ports: Vec<u16>,
}

impl TrafficProfile {
    /// Query every aggregate the synthesizer needs for one source/target pair.
    pub fn collect(
        store: &dyn StatisticsStore,
        source: Ipv4Addr,
        destination: Ipv4Addr,
    ) -> Result<Self, StatsError> {
        let ttl_distribution = store.ttl_distribution(source)?;
        let most_common_ttl = if ttl_distribution.is_empty() {
            store.most_common_ttl()?
        } else {
            None
        };

        let mut inbound_ports = store.inbound_ports(destination)?;
        let mut seen = std::collections::HashSet::new();
        inbound_ports.retain(|p| seen.insert(*p));

        let profile = Self {
            source_mss: store.mss(source)?,
            destination_mss: store.mss(destination)?,
            ttl_distribution,
            most_common_ttl,
            inbound_ports,
        };
        tracing::debug!(
            source = %source,
            destination = %destination,
            source_mss = ?profile.source_mss,
            destination_mss = ?profile.destination_mss,
            ttl_values = profile.ttl_distribution.len(),
            inbound_ports = profile.inbound_ports.len(),
            "traffic profile collected"
        );
        Ok(profile)
    }
}
