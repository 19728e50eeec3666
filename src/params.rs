//! Attack parameters: caller overrides and statistically derived defaults.
//!
//! Every parameter a caller leaves unset is filled in from the background
//! capture statistics, so that an attack with no overrides at all still
//! blends into the busiest conversation of the capture.

use std::fmt;
use std::net::Ipv4Addr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use crate::capture::MAX_CAPTURE_TIMESTAMP;
use crate::error::AttackError;
use crate::ports::{PortTable, PortTableError, TOP_PORTS};
use crate::stats::{StatisticsStore, TrafficProfile};
use crate::{MacAddr, PortSpec};

/// Default bound on destination-address draws before giving up.
pub const DEFAULT_MAX_ADDRESS_ATTEMPTS: usize = 100;

/// Lowest source port drawn when none is given.
pub const EPHEMERAL_PORT_MIN: u16 = 1024;

/// Upper bound (inclusive) of the open-port sample drawn when the target has
/// no observed inbound ports.
pub const OPEN_PORT_SAMPLE_MAX: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied parameter values. Unset fields are derived from statistics.
///
/// Deserialized from JSON parameter files; `ip_source` accepts a single
/// address or a list, port fields accept `80`, `[80, 443]` or `"22,80-90"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterOverrides {
    #[serde(deserialize_with = "one_or_many")]
    pub ip_source: Option<Vec<Ipv4Addr>>,
    pub ip_destination: Option<Ipv4Addr>,
    pub mac_source: Option<MacAddr>,
    pub mac_destination: Option<MacAddr>,
    pub port_source: Option<u16>,
    pub port_destination: Option<PortSpec>,
    pub port_open: Option<PortSpec>,
    pub port_dest_shuffle: Option<bool>,
    pub port_dest_order_desc: Option<bool>,
    pub ip_source_randomize: Option<bool>,
    pub port_source_randomize: Option<bool>,
    pub packets_per_second: Option<f64>,
    pub inject_at_timestamp: Option<f64>,
    pub inject_after_packet: Option<u64>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<Ipv4Addr>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Ipv4Addr),
        Many(Vec<Ipv4Addr>),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
        OneOrMany::One(addr) => vec![addr],
        OneOrMany::Many(addrs) => addrs,
    }))
}

impl ParameterOverrides {
    /// Read overrides from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: ParameterOverrides) -> Self {
        Self {
            ip_source: other.ip_source.or(self.ip_source),
            ip_destination: other.ip_destination.or(self.ip_destination),
            mac_source: other.mac_source.or(self.mac_source),
            mac_destination: other.mac_destination.or(self.mac_destination),
            port_source: other.port_source.or(self.port_source),
            port_destination: other.port_destination.or(self.port_destination),
            port_open: other.port_open.or(self.port_open),
            port_dest_shuffle: other.port_dest_shuffle.or(self.port_dest_shuffle),
            port_dest_order_desc: other.port_dest_order_desc.or(self.port_dest_order_desc),
            ip_source_randomize: other.ip_source_randomize.or(self.ip_source_randomize),
            port_source_randomize: other.port_source_randomize.or(self.port_source_randomize),
            packets_per_second: other.packets_per_second.or(self.packets_per_second),
            inject_at_timestamp: other.inject_at_timestamp.or(self.inject_at_timestamp),
            inject_after_packet: other.inject_after_packet.or(self.inject_after_packet),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Source port used by the probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePort {
    /// The same port for every probe.
    Fixed(u16),
    /// A fresh port in `1..=65535` for every probe.
    RandomPerPacket,
}

impl SourcePort {
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u16 {
        match self {
            Self::Fixed(port) => *port,
            Self::RandomPerPacket => rng.gen_range(1..=u16::MAX),
        }
    }
}

impl fmt::Display for SourcePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(port) => write!(f, "{port}"),
            Self::RandomPerPacket => write!(f, "random"),
        }
    }
}

/// Ports the synthesized target answers on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenPorts {
    /// Decided at synthesis time from the target's observed inbound ports.
    Unresolved,
    /// Given by the caller.
    Explicit(PortSpec),
}

impl OpenPorts {
    /// The concrete open-port set for one attack.
    ///
    /// An unresolved set becomes the ports the target was already seen
    /// receiving on, or, if there are none, a random sample of at most
    /// [`OPEN_PORT_SAMPLE_MAX`] of the most popular ports.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        profile: &TrafficProfile,
        ports: &PortTable,
        rng: &mut R,
    ) -> Result<Vec<u16>, PortTableError> {
        match self {
            Self::Explicit(spec) => Ok(spec.expand()),
            Self::Unresolved if !profile.inbound_ports.is_empty() => Ok(profile.inbound_ports.clone()),
            Self::Unresolved => {
                let n = rng.gen_range(0..=OPEN_PORT_SAMPLE_MAX.min(ports.len()));
                tracing::debug!(sample = n, "no inbound ports observed, sampling open ports");
                ports.rank(n, rng)
            }
        }
    }
}

impl fmt::Display for OpenPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "observed"),
            Self::Explicit(spec) => write!(f, "{spec}"),
        }
    }
}

/// Fully resolved parameters of one port-scan attack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackParameters {
    /// Scanning addresses; never empty. The first one is used unless
    /// `ip_source_randomize` is set.
    pub ip_source: Vec<Ipv4Addr>,
    pub ip_source_randomize: bool,
    pub mac_source: MacAddr,
    pub ip_destination: Ipv4Addr,
    pub mac_destination: MacAddr,
    pub port_source: SourcePort,
    /// Destination ports in scan order before reversing or shuffling.
    pub port_destination: Vec<u16>,
    pub port_open: OpenPorts,
    pub port_dest_shuffle: bool,
    pub port_dest_order_desc: bool,
    pub packets_per_second: f64,
    /// Timestamp of the first synthesized packet.
    pub inject_at_timestamp: f64,
    /// Background packet the attack is injected after.
    pub inject_after_packet: u64,
}

impl AttackParameters {
    /// The address probes are sent from when source randomization is off.
    pub fn primary_source(&self) -> Ipv4Addr {
        self.ip_source.first().copied().unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Derives [`AttackParameters`] from overrides and capture statistics.
pub struct ParameterResolver<'a> {
    store: &'a dyn StatisticsStore,
    ports: &'a PortTable,
    max_address_attempts: usize,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(store: &'a dyn StatisticsStore, ports: &'a PortTable) -> Self {
        Self {
            store,
            ports,
            max_address_attempts: DEFAULT_MAX_ADDRESS_ATTEMPTS,
        }
    }

    /// Bound the number of random destination addresses drawn.
    pub fn with_max_address_attempts(mut self, attempts: usize) -> Self {
        self.max_address_attempts = attempts;
        self
    }

    /// Resolve every parameter, taking overrides as given and deriving the
    /// rest. Fails before anything is synthesized.
    pub fn resolve<R: Rng>(
        &self,
        overrides: &ParameterOverrides,
        rng: &mut R,
    ) -> Result<AttackParameters, AttackError> {
        let ip_source = match &overrides.ip_source {
            Some(addrs) if addrs.is_empty() => {
                return Err(AttackError::invalid("ip_source", "[]", "at least one address required"))
            }
            Some(addrs) => addrs.clone(),
            None => vec![self.most_used_address()?],
        };
        let primary = ip_source[0];

        let mac_source = match overrides.mac_source {
            Some(mac) => mac,
            None => self.mac_or_random(primary, "source", rng)?,
        };

        let ip_destination = match overrides.ip_destination {
            Some(addr) => addr,
            None => self.random_destination(rng)?,
        };
        let mac_destination = match overrides.mac_destination {
            Some(mac) => mac,
            None => self.mac_or_random(ip_destination, "destination", rng)?,
        };

        let port_destination = match &overrides.port_destination {
            Some(spec) => spec.expand(),
            None => {
                let ports = self.ports.rank(TOP_PORTS, rng)?;
                tracing::debug!(count = ports.len(), "destination ports from port table");
                ports
            }
        };

        let port_source = if overrides.port_source_randomize.unwrap_or(false) {
            SourcePort::RandomPerPacket
        } else {
            match overrides.port_source {
                Some(port) => SourcePort::Fixed(port),
                None => SourcePort::Fixed(rng.gen_range(EPHEMERAL_PORT_MIN..=u16::MAX)),
            }
        };

        let packets_per_second = match overrides.packets_per_second {
            Some(rate) => rate,
            None => self.observed_rate(primary)?,
        };
        if !(packets_per_second.is_finite() && packets_per_second > 0.0) {
            return Err(AttackError::invalid(
                "packets_per_second",
                packets_per_second,
                "must be a positive number",
            ));
        }

        let inject_after_packet = match overrides.inject_after_packet {
            Some(index) => index,
            None => {
                let count = self.store.packet_count()?;
                if count == 0 {
                    0
                } else {
                    rng.gen_range(0..count)
                }
            }
        };
        let inject_at_timestamp = match overrides.inject_at_timestamp {
            Some(ts) => ts,
            None => self.injection_timestamp(inject_after_packet)?,
        };
        if !(inject_at_timestamp.is_finite() && inject_at_timestamp >= 0.0) {
            return Err(AttackError::invalid(
                "inject_at_timestamp",
                inject_at_timestamp,
                "must be a non-negative number",
            ));
        }
        if inject_at_timestamp > MAX_CAPTURE_TIMESTAMP {
            return Err(AttackError::invalid(
                "inject_at_timestamp",
                inject_at_timestamp,
                "beyond the largest pcap timestamp",
            ));
        }

        let params = AttackParameters {
            ip_source,
            ip_source_randomize: overrides.ip_source_randomize.unwrap_or(false),
            mac_source,
            ip_destination,
            mac_destination,
            port_source,
            port_destination,
            port_open: overrides
                .port_open
                .clone()
                .map_or(OpenPorts::Unresolved, OpenPorts::Explicit),
            port_dest_shuffle: overrides.port_dest_shuffle.unwrap_or(false),
            port_dest_order_desc: overrides.port_dest_order_desc.unwrap_or(false),
            packets_per_second,
            inject_at_timestamp,
            inject_after_packet,
        };
        tracing::debug!(
            source = %params.primary_source(),
            destination = %params.ip_destination,
            dst_ports = params.port_destination.len(),
            pps = params.packets_per_second,
            inject_at = params.inject_at_timestamp,
            "parameters resolved"
        );
        Ok(params)
    }

    fn most_used_address(&self) -> Result<Ipv4Addr, AttackError> {
        let candidates = self.store.most_used_addresses()?;
        let first = candidates.first().ok_or_else(|| AttackError::MissingStatistic {
            what: "most used address".to_string(),
        })?;
        let addr = parse_ipv4_literal(first)
            .ok_or_else(|| AttackError::invalid("ip_source", first, "most used address is not IPv4"))?;
        tracing::debug!(source = %addr, ties = candidates.len(), "source address from statistics");
        Ok(addr)
    }

    fn mac_or_random<R: Rng>(
        &self,
        ip: Ipv4Addr,
        role: &'static str,
        rng: &mut R,
    ) -> Result<MacAddr, AttackError> {
        if let Some(mac) = self.store.mac_address(ip)? {
            return Ok(mac);
        }
        let mac = MacAddr::random_local(rng);
        tracing::warn!(%ip, %mac, role, "no MAC address recorded, using a random one");
        Ok(mac)
    }

    /// Draw store addresses until one is an IPv4 literal, at most
    /// `max_address_attempts` times.
    fn random_destination<R: Rng>(&self, rng: &mut R) -> Result<Ipv4Addr, AttackError> {
        let mut last = String::new();
        let mut attempts = 0;
        for attempt in 1..=self.max_address_attempts {
            let Some(candidate) = self.store.random_address(rng)? else {
                break;
            };
            attempts = attempt;
            if let Some(addr) = parse_ipv4_literal(&candidate) {
                tracing::debug!(destination = %addr, attempt, "destination address from statistics");
                return Ok(addr);
            }
            tracing::trace!(candidate = %candidate, attempt, "rejected destination candidate");
            last = candidate;
        }
        Err(AttackError::InvalidAddress { attempts, last })
    }

    fn observed_rate(&self, ip: Ipv4Addr) -> Result<f64, AttackError> {
        let missing = || AttackError::MissingStatistic {
            what: format!("packet rate of {ip}"),
        };
        let sent = self.store.pps_sent(ip)?.ok_or_else(missing)?;
        let received = self.store.pps_received(ip)?.ok_or_else(missing)?;
        let rate = (sent + received) / 2.0;
        tracing::debug!(%ip, sent, received, rate, "packet rate from statistics");
        Ok(rate)
    }

    fn injection_timestamp(&self, index: u64) -> Result<f64, AttackError> {
        match self.store.packet_timestamp(index)? {
            Some(ts) => Ok(ts),
            None => {
                tracing::warn!(index, "no timestamp for injection packet, starting at 0");
                Ok(0.0)
            }
        }
    }
}

/// Parse a dotted-quad IPv4 literal: exactly four decimal octets, each 0–255.
///
/// Shorthand forms like `"10.1"` and anything IPv6 are rejected.
pub fn parse_ipv4_literal(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStatistics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const BUSY: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const QUIET: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn table() -> PortTable {
        PortTable::from_ranked((1..=1200).collect()).unwrap()
    }

    fn store() -> MemoryStatistics {
        MemoryStatistics::new()
            .with_host("10.0.0.1", 500, 4.0, 6.0)
            .with_host("10.0.0.2", 20, 1.0, 1.0)
            .with_mac(BUSY, MacAddr([0x00, 0x1b, 0x21, 0x00, 0x00, 0x01]))
            .with_timestamps([100.0, 100.5, 101.0, 101.5])
    }

    #[test]
    fn test_defaults_from_statistics() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(7);
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&ParameterOverrides::default(), &mut rng)
            .unwrap();

        assert_eq!(params.ip_source, vec![BUSY]);
        assert_eq!(params.mac_source, MacAddr([0x00, 0x1b, 0x21, 0x00, 0x00, 0x01]));
        assert!(params.ip_destination == BUSY || params.ip_destination == QUIET);
        assert_eq!(params.packets_per_second, 5.0, "average of sent and received");
        assert_eq!(params.port_destination.len(), TOP_PORTS);
        assert_eq!(params.port_open, OpenPorts::Unresolved);
        assert!(!params.port_dest_shuffle && !params.port_dest_order_desc);
        match params.port_source {
            SourcePort::Fixed(p) => assert!(p >= EPHEMERAL_PORT_MIN, "source port {p}"),
            other => panic!("expected fixed source port, got {other:?}"),
        }
        assert!(params.inject_after_packet < 4);
        let expected = [100.0, 100.5, 101.0, 101.5][params.inject_after_packet as usize];
        assert_eq!(params.inject_at_timestamp, expected);
    }

    #[test]
    fn test_overrides_are_taken_verbatim() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(7);
        let overrides = ParameterOverrides {
            ip_source: Some(vec![Ipv4Addr::new(192, 168, 1, 1)]),
            ip_destination: Some(Ipv4Addr::new(192, 168, 1, 2)),
            mac_source: Some(MacAddr([2, 0, 0, 0, 0, 1])),
            mac_destination: Some(MacAddr([2, 0, 0, 0, 0, 2])),
            port_source: Some(40000),
            port_destination: Some(PortSpec::parse("22,80-82").unwrap()),
            port_open: Some(PortSpec::Single(80)),
            packets_per_second: Some(10.0),
            inject_at_timestamp: Some(0.0),
            ..Default::default()
        };
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&overrides, &mut rng)
            .unwrap();

        assert_eq!(params.port_destination, vec![22, 80, 81, 82]);
        assert_eq!(params.port_source, SourcePort::Fixed(40000));
        assert_eq!(params.port_open, OpenPorts::Explicit(PortSpec::Single(80)));
        assert_eq!(params.packets_per_second, 10.0);
        assert_eq!(params.inject_at_timestamp, 0.0);
        assert_eq!(params.ip_destination, Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn test_source_port_randomize_wins() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(1);
        let overrides = ParameterOverrides {
            port_source: Some(40000),
            port_source_randomize: Some(true),
            ..Default::default()
        };
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&overrides, &mut rng)
            .unwrap();
        assert_eq!(params.port_source, SourcePort::RandomPerPacket);
    }

    #[test]
    fn test_destination_retry_skips_non_ipv4() {
        let store = MemoryStatistics::new()
            .with_host("10.0.0.1", 500, 4.0, 6.0)
            .with_host("fe80::1", 10, 1.0, 1.0)
            .with_host("not-an-address", 10, 1.0, 1.0);
        let ports = table();
        let mut rng = StdRng::seed_from_u64(3);
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&ParameterOverrides::default(), &mut rng)
            .unwrap();
        assert_eq!(params.ip_destination, BUSY, "only IPv4 candidate");
    }

    #[test]
    fn test_destination_retry_is_bounded() {
        let store = MemoryStatistics::new().with_host("fe80::1", 10, 1.0, 1.0);
        let ports = table();
        let mut rng = StdRng::seed_from_u64(3);
        let overrides = ParameterOverrides {
            ip_source: Some(vec![BUSY]),
            packets_per_second: Some(1.0),
            ..Default::default()
        };
        let err = ParameterResolver::new(&store, &ports)
            .with_max_address_attempts(5)
            .resolve(&overrides, &mut rng)
            .unwrap_err();
        match err {
            AttackError::InvalidAddress { attempts, last } => {
                assert_eq!(attempts, 5);
                assert_eq!(last, "fe80::1");
            }
            other => panic!("expected InvalidAddress, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_store_is_missing_statistic() {
        let store = MemoryStatistics::new();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(0);
        let err = ParameterResolver::new(&store, &ports)
            .resolve(&ParameterOverrides::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, AttackError::MissingStatistic { .. }), "got {err:?}");
    }

    #[test]
    fn test_unknown_source_has_no_rate() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(0);
        let overrides = ParameterOverrides {
            ip_source: Some(vec![Ipv4Addr::new(172, 16, 0, 1)]),
            ..Default::default()
        };
        let err = ParameterResolver::new(&store, &ports)
            .resolve(&overrides, &mut rng)
            .unwrap_err();
        match err {
            AttackError::MissingStatistic { what } => assert!(what.contains("172.16.0.1"), "{what}"),
            other => panic!("expected MissingStatistic, got {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(0);
        for rate in [0.0, -2.0, f64::NAN] {
            let overrides = ParameterOverrides {
                packets_per_second: Some(rate),
                ..Default::default()
            };
            let err = ParameterResolver::new(&store, &ports)
                .resolve(&overrides, &mut rng)
                .unwrap_err();
            assert!(
                matches!(err, AttackError::InvalidParameter { name: "packets_per_second", .. }),
                "rate {rate}: got {err:?}"
            );
        }
    }

    #[test]
    fn test_injection_timestamp_bounds() {
        let store = store();
        let ports = table();
        let mut rng = StdRng::seed_from_u64(0);
        for ts in [-1.0, f64::INFINITY, 4.3e9] {
            let overrides = ParameterOverrides {
                inject_at_timestamp: Some(ts),
                ..Default::default()
            };
            let err = ParameterResolver::new(&store, &ports)
                .resolve(&overrides, &mut rng)
                .unwrap_err();
            assert!(
                matches!(err, AttackError::InvalidParameter { name: "inject_at_timestamp", .. }),
                "timestamp {ts}: got {err:?}"
            );
        }

        let overrides = ParameterOverrides {
            inject_at_timestamp: Some(MAX_CAPTURE_TIMESTAMP),
            ..Default::default()
        };
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&overrides, &mut rng)
            .unwrap();
        assert_eq!(params.inject_at_timestamp, MAX_CAPTURE_TIMESTAMP);
    }

    #[test]
    fn test_missing_macs_are_random_local() {
        let store = MemoryStatistics::new()
            .with_host("10.0.0.1", 500, 4.0, 6.0)
            .with_host("10.0.0.2", 20, 1.0, 1.0);
        let ports = table();
        let mut rng = StdRng::seed_from_u64(11);
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&ParameterOverrides::default(), &mut rng)
            .unwrap();
        assert!(params.mac_source.is_local());
        assert!(!params.mac_source.is_multicast());
        assert!(params.mac_destination.is_local());
    }

    #[test]
    fn test_injection_without_timestamps_starts_at_zero() {
        let store = MemoryStatistics::new()
            .with_host("10.0.0.1", 500, 4.0, 6.0)
            .with_packet_count(50);
        let ports = table();
        let mut rng = StdRng::seed_from_u64(5);
        let params = ParameterResolver::new(&store, &ports)
            .resolve(&ParameterOverrides::default(), &mut rng)
            .unwrap();
        assert!(params.inject_after_packet < 50);
        assert_eq!(params.inject_at_timestamp, 0.0);
    }

    #[test]
    fn test_overrides_from_json() {
        let json = r#"{
            "ip_source": "10.1.1.1",
            "port_destination": "1-3",
            "port_open": [2, 3],
            "port_dest_order_desc": true,
            "packets_per_second": 25.5
        }"#;
        let o = ParameterOverrides::from_json(json).unwrap();
        assert_eq!(o.ip_source, Some(vec![Ipv4Addr::new(10, 1, 1, 1)]));
        assert_eq!(o.port_destination, Some(PortSpec::Range { start: 1, end: 3 }));
        assert_eq!(o.port_open, Some(PortSpec::List(vec![2, 3])));
        assert_eq!(o.port_dest_order_desc, Some(true));
        assert_eq!(o.packets_per_second, Some(25.5));
        assert_eq!(o.ip_destination, None);

        let many = ParameterOverrides::from_json(r#"{"ip_source": ["10.0.0.1", "10.0.0.2"]}"#).unwrap();
        assert_eq!(many.ip_source, Some(vec![BUSY, QUIET]));
    }

    #[test]
    fn test_overrides_reject_unknown_fields() {
        assert!(ParameterOverrides::from_json(r#"{"pps": 10}"#).is_err());
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let file = ParameterOverrides {
            packets_per_second: Some(5.0),
            port_source: Some(1234),
            ..Default::default()
        };
        let flags = ParameterOverrides {
            packets_per_second: Some(50.0),
            ..Default::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.packets_per_second, Some(50.0));
        assert_eq!(merged.port_source, Some(1234), "unset flag keeps file value");
    }

    #[test]
    fn test_open_ports_resolution() {
        let ports = table();
        let mut rng = StdRng::seed_from_u64(9);

        let explicit = OpenPorts::Explicit(PortSpec::parse("80,443").unwrap());
        let profile = TrafficProfile::default();
        assert_eq!(explicit.resolve(&profile, &ports, &mut rng).unwrap(), vec![80, 443]);

        let observed = TrafficProfile {
            inbound_ports: vec![22, 8080],
            ..Default::default()
        };
        assert_eq!(
            OpenPorts::Unresolved.resolve(&observed, &ports, &mut rng).unwrap(),
            vec![22, 8080]
        );

        for _ in 0..20 {
            let sample = OpenPorts::Unresolved.resolve(&profile, &ports, &mut rng).unwrap();
            assert!(sample.len() <= OPEN_PORT_SAMPLE_MAX);
            assert!(sample.iter().all(|p| (1..=OPEN_PORT_SAMPLE_MAX as u16).contains(p)));
        }
    }

    #[test]
    fn test_open_port_sample_fits_short_table() {
        let ports = PortTable::from_ranked(vec![80, 443, 22]).unwrap();
        let profile = TrafficProfile::default();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = OpenPorts::Unresolved.resolve(&profile, &ports, &mut rng).unwrap();
            assert!(sample.len() <= 3, "seed {seed}: {sample:?}");
            assert!(sample.iter().all(|p| [80, 443, 22].contains(p)));
        }
    }

    #[test]
    fn test_source_port_pick() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(SourcePort::Fixed(5555).pick(&mut rng), 5555);
        for _ in 0..100 {
            assert_ne!(SourcePort::RandomPerPacket.pick(&mut rng), 0);
        }
    }

    #[test]
    fn test_parse_ipv4_literal() {
        assert_eq!(parse_ipv4_literal("192.168.0.1"), Some(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(parse_ipv4_literal("0.0.0.0"), Some(Ipv4Addr::UNSPECIFIED));
        for bad in ["256.0.0.1", "10.1", "10.0.0.1.5", "fe80::1", "", "1..2.3", "a.b.c.d", "1234.0.0.1", "+1.0.0.1"] {
            assert_eq!(parse_ipv4_literal(bad), None, "accepted {bad:?}");
        }
    }
}
