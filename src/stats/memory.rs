//! In-memory statistics store.
//!
//! Used by tests and by callers that compute capture statistics themselves.
//! Built with chained `with_*` calls.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::RngCore;

use super::{StatisticsStore, StatsError};
use crate::MacAddr;

#[derive(Debug, Clone)]
struct HostStats {
    address: String,
    packets: u64,
    pps_sent: f64,
    pps_received: f64,
}

/// Statistics held in plain collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatistics {
    hosts: Vec<HostStats>,
    macs: HashMap<Ipv4Addr, MacAddr>,
    mss: HashMap<Ipv4Addr, u16>,
    ttl: HashMap<Ipv4Addr, Vec<(u8, u64)>>,
    global_ttl: Option<u8>,
    packet_count: Option<u64>,
    inbound: HashMap<Ipv4Addr, Vec<u16>>,
    timestamps: Vec<f64>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host with its total packet count and send/receive rates.
    ///
    /// `address` is kept verbatim so tests can plant non-IPv4 entries.
    pub fn with_host(mut self, address: &str, packets: u64, pps_sent: f64, pps_received: f64) -> Self {
        self.hosts.push(HostStats {
            address: address.to_string(),
            packets,
            pps_sent,
            pps_received,
        });
        self
    }

    pub fn with_mac(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.macs.insert(ip, mac);
        self
    }

    pub fn with_mss(mut self, ip: Ipv4Addr, mss: u16) -> Self {
        self.mss.insert(ip, mss);
        self
    }

    /// Record `count` packets sent by `ip` with `ttl`.
    pub fn with_ttl(mut self, ip: Ipv4Addr, ttl: u8, count: u64) -> Self {
        self.ttl.entry(ip).or_default().push((ttl, count));
        self
    }

    pub fn with_global_ttl(mut self, ttl: u8) -> Self {
        self.global_ttl = Some(ttl);
        self
    }

    pub fn with_packet_count(mut self, count: u64) -> Self {
        self.packet_count = Some(count);
        self
    }

    pub fn with_inbound_ports(mut self, ip: Ipv4Addr, ports: impl IntoIterator<Item = u16>) -> Self {
        self.inbound.entry(ip).or_default().extend(ports);
        self
    }

    /// Background packet timestamps in capture order.
    pub fn with_timestamps(mut self, timestamps: impl IntoIterator<Item = f64>) -> Self {
        self.timestamps.extend(timestamps);
        self
    }

    fn host(&self, ip: Ipv4Addr) -> Option<&HostStats> {
        let key = ip.to_string();
        self.hosts.iter().find(|h| h.address == key)
    }
}

impl StatisticsStore for MemoryStatistics {
    fn most_used_addresses(&self) -> Result<Vec<String>, StatsError> {
        let max = match self.hosts.iter().map(|h| h.packets).max() {
            Some(max) => max,
            None => return Ok(Vec::new()),
        };
        Ok(self
            .hosts
            .iter()
            .filter(|h| h.packets == max)
            .map(|h| h.address.clone())
            .collect())
    }

    fn mac_address(&self, ip: Ipv4Addr) -> Result<Option<MacAddr>, StatsError> {
        Ok(self.macs.get(&ip).copied())
    }

    fn random_address(&self, rng: &mut dyn RngCore) -> Result<Option<String>, StatsError> {
        Ok(self.hosts.choose(rng).map(|h| h.address.clone()))
    }

    fn pps_sent(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError> {
        Ok(self.host(ip).map(|h| h.pps_sent))
    }

    fn pps_received(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError> {
        Ok(self.host(ip).map(|h| h.pps_received))
    }

    fn mss(&self, ip: Ipv4Addr) -> Result<Option<u16>, StatsError> {
        Ok(self.mss.get(&ip).copied())
    }

    fn ttl_distribution(&self, ip: Ipv4Addr) -> Result<Vec<(u8, u64)>, StatsError> {
        Ok(self.ttl.get(&ip).cloned().unwrap_or_default())
    }

    fn most_common_ttl(&self) -> Result<Option<u8>, StatsError> {
        Ok(self.global_ttl)
    }

    fn packet_count(&self) -> Result<u64, StatsError> {
        Ok(self
            .packet_count
            .unwrap_or(self.timestamps.len() as u64))
    }

    fn inbound_ports(&self, ip: Ipv4Addr) -> Result<Vec<u16>, StatsError> {
        Ok(self.inbound.get(&ip).cloned().unwrap_or_default())
    }

    fn packet_timestamp(&self, index: u64) -> Result<Option<f64>, StatsError> {
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| self.timestamps.get(i))
            .copied())
    }
}
