//! portscan-synth: synthesizes TCP SYN port-scan traffic for capture injection.
//!
//! Builds Ethernet/IPv4/TCP frames that look like a SYN scan against one
//! destination, with addresses, MAC bindings, MSS, TTL and packet rate taken
//! from statistics of an existing background capture. Usable as a library or
//! via the CLI.

pub mod capture;
pub mod cli;
pub mod engine;
pub mod error;
pub mod params;
pub mod ports;
pub mod stats;
pub mod synth;
pub mod timing;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export key types for library users.
pub use capture::{CaptureWriter, MemoryCaptureWriter, PcapCaptureWriter};
pub use engine::{EngineConfig, PortscanAttack};
pub use error::AttackError;
pub use params::{AttackParameters, OpenPorts, ParameterOverrides, SourcePort};
pub use ports::PortTable;
pub use stats::{MemoryStatistics, SqliteStatistics, StatisticsStore, TrafficProfile};
pub use synth::packet::{SynthesizedPacket, TcpFlags};
pub use timing::TimingModel;

// ─────────────────────────────────────────────────────────────────────────────
// Exchange outcome
// ─────────────────────────────────────────────────────────────────────────────

/// How a synthesized target reacts to a probe on one destination port.
///
/// `Closed` is modeled as silence (a filtered host that never answers), not
/// as the RST a real closed port would send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// Probe only, no reply.
    Closed,
    /// Probe, SYN-ACK from the target, then RST from the scanner.
    Open,
}

impl ExchangeOutcome {
    /// Number of frames this outcome contributes to the capture.
    pub fn packet_count(&self) -> usize {
        match self {
            Self::Closed => 1,
            Self::Open => 3,
        }
    }
}

impl fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MAC address
// ─────────────────────────────────────────────────────────────────────────────

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Random unicast, locally administered address (`x2:…`, `x6:…`, `xA:…`, `xE:…`).
    pub fn random_local<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut octets: [u8; 6] = rng.gen();
        octets[0] = (octets[0] & 0xFC) | 0x02;
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Locally administered bit set.
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl FromStr for MacAddr {
    type Err = String;

    /// Parse `aa:bb:cc:dd:ee:ff` (colon or dash separated, any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(format!("invalid MAC address: '{s}'"));
        }
        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(format!("invalid MAC address: '{s}'"));
            }
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| format!("invalid MAC address: '{s}'"))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Port specification (parsed from CLI or parameter files)
// ─────────────────────────────────────────────────────────────────────────────

/// Port specification: a single port, a range, or an ordered list.
///
/// Parsed from strings like "80", "1-1024", "80,443,8080" or "22,80-90".
/// List entries may themselves be ranges; order is preserved because the
/// destination list is also the scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PortSpecRepr", into = "String")]
pub enum PortSpec {
    /// Exactly one port.
    Single(u16),
    /// Contiguous port range (inclusive).
    Range { start: u16, end: u16 },
    /// Ordered list of ports.
    List(Vec<u16>),
}

/// Accepted shapes in JSON parameter files: `80`, `[80, 443]` or `"80-90"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortSpecRepr {
    Single(u16),
    List(Vec<u16>),
    Text(String),
}

impl TryFrom<PortSpecRepr> for PortSpec {
    type Error = String;

    fn try_from(repr: PortSpecRepr) -> Result<Self, Self::Error> {
        match repr {
            PortSpecRepr::Single(p) => Ok(Self::Single(p)),
            PortSpecRepr::List(ports) => Ok(Self::List(ports)),
            PortSpecRepr::Text(s) => Self::parse(&s),
        }
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid port: '{}'", s.trim()))
}

fn parse_range(s: &str) -> Result<(u16, u16), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("invalid port range: '{s}'"))?;
    let start = parse_port(start).map_err(|_| format!("invalid port range start: '{start}'"))?;
    let end = parse_port(end).map_err(|_| format!("invalid port range end: '{end}'"))?;
    if end < start {
        return Err(format!("invalid range: {} > {}", start, end));
    }
    Ok((start, end))
}

impl PortSpec {
    /// Parse a port spec string ("80", "1-1024", "80,443,8080", "22,80-90").
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty port specification".to_string());
        }
        if !s.contains(',') {
            if s.contains('-') {
                let (start, end) = parse_range(s)?;
                return Ok(Self::Range { start, end });
            }
            return Ok(Self::Single(parse_port(s)?));
        }
        let mut ports = Vec::new();
        for item in s.split(',') {
            let item = item.trim();
            if item.contains('-') {
                let (start, end) = parse_range(item)?;
                ports.extend(start..=end);
            } else {
                ports.push(parse_port(item)?);
            }
        }
        Ok(Self::List(ports))
    }

    /// Expand to port numbers in listed order. Repeated ports are kept and
    /// are probed once per occurrence.
    pub fn expand(&self) -> Vec<u16> {
        match self {
            Self::Single(p) => vec![*p],
            Self::Range { start, end } => (*start..=*end).collect(),
            Self::List(ports) => ports.clone(),
        }
    }

    /// Return the count of ports covered.
    pub fn count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Range { start, end } => (*end as usize - *start as usize) + 1,
            Self::List(ports) => ports.len(),
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        match self {
            Self::Single(p) => *p == port,
            Self::Range { start, end } => (*start..=*end).contains(&port),
            Self::List(ports) => ports.contains(&port),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(p) => write!(f, "{p}"),
            Self::Range { start, end } => write!(f, "{}-{}", start, end),
            Self::List(ports) => {
                let s: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attack report
// ─────────────────────────────────────────────────────────────────────────────

/// Statistical summary of inter-packet delays, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub p50: f64,
    pub p90: f64,
}

impl DelayStats {
    /// Creates an empty DelayStats with all zeros.
    pub fn empty() -> Self {
        Self {
            mean: 0.0,
            std: 0.0,
            p50: 0.0,
            p90: 0.0,
        }
    }
}

/// Result of one attack synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackReport {
    /// Unique identifier of this run.
    pub attack_id: Uuid,
    /// Number of frames written to the capture.
    pub packet_count: usize,
    /// Path the capture writer reported.
    pub capture_path: PathBuf,
    /// Timestamp of the first synthesized packet (seconds).
    pub attack_start: f64,
    /// Timestamp of the last synthesized packet (seconds).
    pub attack_end: f64,
    /// Destination ports probed, in emission order.
    pub ports_probed: usize,
    /// Destination ports that produced a full handshake exchange.
    pub ports_open: usize,
    /// Inter-packet delay summary.
    pub delay_stats: DelayStats,
    /// Wall-clock time the capture was produced.
    pub generated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
