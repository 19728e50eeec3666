//! Exchange synthesizer: turns resolved parameters into the scan's frames.
//!
//! One exchange per destination port. A closed port yields the probe alone;
//! an open port yields the probe, the target's SYN-ACK and the scanner's RST
//! tearing the half-open connection down.

pub mod packet;

use std::collections::HashSet;
use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::AttackError;
use crate::params::AttackParameters;
use crate::stats::TrafficProfile;
use crate::timing::{TimingModel, WeightedDistribution};
use crate::ExchangeOutcome;

use packet::{EthernetHeader, Ipv4Header, SynthesizedPacket, TcpFlags, TcpHeader};

pub use packet::{DEFAULT_TTL, DEFAULT_WINDOW};

/// Window the synthesized target advertises in its SYN-ACK.
pub const SYN_ACK_WINDOW: u16 = 29200;

/// Initial sequence number of probes and replies.
const INITIAL_SEQ: u32 = 0;

/// Outcome of one destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortExchange {
    pub port: u16,
    pub outcome: ExchangeOutcome,
}

/// Frames of one attack, ascending by timestamp.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub packets: Vec<SynthesizedPacket>,
    /// Timestamp of the first emitted frame.
    pub attack_start: f64,
    /// Timestamp of the last emitted frame.
    pub attack_end: f64,
    /// Per-port outcomes in emission order.
    pub exchanges: Vec<PortExchange>,
}

impl Synthesis {
    pub fn ports_open(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|e| e.outcome == ExchangeOutcome::Open)
            .count()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.packets.iter().map(|p| p.timestamp()).collect()
    }
}

/// Builds the frame sequence of one attack instance.
pub struct ExchangeSynthesizer<'a> {
    params: &'a AttackParameters,
    profile: &'a TrafficProfile,
    open_ports: HashSet<u16>,
}

impl<'a> ExchangeSynthesizer<'a> {
    pub fn new(params: &'a AttackParameters, profile: &'a TrafficProfile, open_ports: &[u16]) -> Self {
        Self {
            params,
            profile,
            open_ports: open_ports.iter().copied().collect(),
        }
    }

    /// Destination ports in emission order: reversed when descending order
    /// is requested, otherwise shuffled when shuffling is requested.
    pub fn port_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u16> {
        let mut ports = self.params.port_destination.clone();
        if self.params.port_dest_order_desc {
            ports.reverse();
        } else if self.params.port_dest_shuffle {
            ports.shuffle(rng);
        }
        ports
    }

    /// TTL used by every probe of this instance.
    ///
    /// Drawn from the source's TTL histogram, else the capture-wide most
    /// common TTL, else [`DEFAULT_TTL`].
    pub fn probe_ttl<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        if !self.profile.ttl_distribution.is_empty() {
            match WeightedDistribution::new(self.profile.ttl_distribution.iter().copied()) {
                Ok(dist) => return dist.sample(rng),
                Err(e) => tracing::warn!(error = %e, "unusable TTL histogram"),
            }
        }
        match self.profile.most_common_ttl {
            Some(ttl) => ttl,
            None => {
                tracing::warn!(ttl = DEFAULT_TTL, "no TTL statistics, using default");
                DEFAULT_TTL
            }
        }
    }

    /// Run the scan, stamping every frame with the next timing-model timestamp.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        timing: &mut TimingModel,
        rng: &mut R,
    ) -> Result<Synthesis, AttackError> {
        let ports = self.port_order(rng);
        let ttl = self.probe_ttl(rng);
        let primary = self.params.primary_source();

        let mut packets = Vec::with_capacity(ports.len() * 3);
        let mut exchanges = Vec::with_capacity(ports.len());

        for dport in ports {
            let sport = self.params.port_source.pick(rng);
            let src = if self.params.ip_source_randomize {
                self.params.ip_source.choose(rng).copied().unwrap_or(primary)
            } else {
                primary
            };

            let probe = self.probe(src, ttl, sport, dport, timing.next_timestamp(rng));
            let outcome = if self.open_ports.contains(&dport) {
                let reply = self.syn_ack(&probe, timing.next_timestamp(rng));
                let reset = self.reset(&probe, timing.next_timestamp(rng));
                packets.extend([probe, reply, reset]);
                ExchangeOutcome::Open
            } else {
                packets.push(probe);
                ExchangeOutcome::Closed
            };
            exchanges.push(PortExchange {
                port: dport,
                outcome,
            });
        }

        let (attack_start, attack_end) = match (packets.first(), packets.last()) {
            (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
            _ => return Err(AttackError::EmptyResult),
        };
        packets.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let synthesis = Synthesis {
            packets,
            attack_start,
            attack_end,
            exchanges,
        };
        tracing::info!(
            packets = synthesis.packets.len(),
            ports = synthesis.exchanges.len(),
            open = synthesis.ports_open(),
            ttl,
            start = attack_start,
            end = attack_end,
            "exchanges synthesized"
        );
        Ok(synthesis)
    }

    fn probe(&self, src: Ipv4Addr, ttl: u8, sport: u16, dport: u16, timestamp: f64) -> SynthesizedPacket {
        SynthesizedPacket::new(
            timestamp,
            EthernetHeader {
                src: self.params.mac_source,
                dst: self.params.mac_destination,
            },
            Ipv4Header {
                src,
                dst: self.params.ip_destination,
                ttl,
                dont_fragment: false,
            },
            TcpHeader {
                src_port: sport,
                dst_port: dport,
                seq: INITIAL_SEQ,
                ack: 0,
                flags: TcpFlags::SYN,
                window: DEFAULT_WINDOW,
                mss: self.profile.source_mss,
            },
        )
    }

    fn syn_ack(&self, probe: &SynthesizedPacket, timestamp: f64) -> SynthesizedPacket {
        SynthesizedPacket::new(
            timestamp,
            probe.ethernet().reversed(),
            Ipv4Header {
                src: probe.ip().dst,
                dst: probe.ip().src,
                ttl: DEFAULT_TTL,
                dont_fragment: true,
            },
            TcpHeader {
                src_port: probe.tcp().dst_port,
                dst_port: probe.tcp().src_port,
                seq: INITIAL_SEQ,
                ack: probe.tcp().seq.wrapping_add(1),
                flags: TcpFlags::SYN_ACK,
                window: SYN_ACK_WINDOW,
                mss: self.profile.destination_mss,
            },
        )
    }

    fn reset(&self, probe: &SynthesizedPacket, timestamp: f64) -> SynthesizedPacket {
        SynthesizedPacket::new(
            timestamp,
            *probe.ethernet(),
            *probe.ip(),
            TcpHeader {
                src_port: probe.tcp().src_port,
                dst_port: probe.tcp().dst_port,
                seq: probe.tcp().seq.wrapping_add(1),
                ack: 0,
                flags: TcpFlags::RST,
                window: 0,
                mss: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{OpenPorts, SourcePort};
    use crate::MacAddr;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 10);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 20);

    fn params(ports: Vec<u16>) -> AttackParameters {
        AttackParameters {
            ip_source: vec![SRC],
            ip_source_randomize: false,
            mac_source: MacAddr([0x02, 0, 0, 0, 0, 0x0a]),
            ip_destination: DST,
            mac_destination: MacAddr([0x02, 0, 0, 0, 0, 0x14]),
            port_source: SourcePort::Fixed(40000),
            port_destination: ports,
            port_open: OpenPorts::Unresolved,
            port_dest_shuffle: false,
            port_dest_order_desc: false,
            packets_per_second: 10.0,
            inject_at_timestamp: 0.0,
            inject_after_packet: 0,
        }
    }

    fn run(params: &AttackParameters, profile: &TrafficProfile, open: &[u16], seed: u64) -> Synthesis {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut timing = TimingModel::new(params.packets_per_second, params.inject_at_timestamp, &mut rng).unwrap();
        ExchangeSynthesizer::new(params, profile, open)
            .synthesize(&mut timing, &mut rng)
            .unwrap()
    }

    fn assert_strictly_increasing(s: &Synthesis) {
        for w in s.packets.windows(2) {
            assert!(
                w[0].timestamp() < w[1].timestamp(),
                "{} !< {}",
                w[0].timestamp(),
                w[1].timestamp()
            );
        }
    }

    #[test]
    fn test_all_closed_ports_emit_probes_only() {
        let p = params(vec![22, 80, 443]);
        let s = run(&p, &TrafficProfile::default(), &[], 1);

        assert_eq!(s.packets.len(), 3);
        assert!(s.packets.iter().all(|pkt| pkt.tcp().flags == TcpFlags::SYN));
        assert_eq!(s.packets[0].timestamp(), 0.0, "first packet keeps the start timestamp");
        assert_strictly_increasing(&s);
        assert_eq!(s.ports_open(), 0);
    }

    #[test]
    fn test_open_and_closed_port() {
        let p = params(vec![80, 443]);
        let s = run(&p, &TrafficProfile::default(), &[80], 2);

        assert_eq!(s.packets.len(), 4);
        let summary: Vec<(TcpFlags, Ipv4Addr, u16)> = s
            .packets
            .iter()
            .map(|pkt| (pkt.tcp().flags, pkt.ip().dst, pkt.tcp().dst_port))
            .collect();
        assert_eq!(
            summary,
            vec![
                (TcpFlags::SYN, DST, 80),
                (TcpFlags::SYN_ACK, SRC, 40000),
                (TcpFlags::RST, DST, 80),
                (TcpFlags::SYN, DST, 443),
            ]
        );
        assert_eq!(s.packets[1].tcp().ack, 1);
        assert_eq!(
            s.exchanges,
            vec![
                PortExchange { port: 80, outcome: ExchangeOutcome::Open },
                PortExchange { port: 443, outcome: ExchangeOutcome::Closed },
            ]
        );
        assert_eq!(s.attack_start, s.packets[0].timestamp());
        assert_eq!(s.attack_end, s.packets[3].timestamp());
    }

    #[test]
    fn test_packet_count_formula() {
        let ports: Vec<u16> = (1000..1020).collect();
        let open = [1001, 1005, 1010, 1015, 1019, 9999];
        let s = run(&params(ports.clone()), &TrafficProfile::default(), &open, 3);

        let k = ports.len();
        let o = open.iter().filter(|p| ports.contains(p)).count();
        assert_eq!(s.packets.len(), (k - o) + 3 * o);
        assert_eq!(s.ports_open(), o);
        assert_strictly_increasing(&s);
    }

    #[test]
    fn test_repeated_port_scanned_each_time() {
        let ports = vec![80, 443, 80];
        let s = run(&params(ports), &TrafficProfile::default(), &[80], 4);

        assert_eq!(s.exchanges.len(), 3);
        assert_eq!(s.ports_open(), 2);
        assert_eq!(s.packets.len(), 1 + 3 * 2);
        let probes = s
            .packets
            .iter()
            .filter(|pkt| pkt.tcp().flags == TcpFlags::SYN && pkt.tcp().dst_port == 80)
            .count();
        assert_eq!(probes, 2);
    }

    #[test]
    fn test_handshake_round_trip() {
        let profile = TrafficProfile {
            source_mss: Some(1460),
            destination_mss: Some(1380),
            ..Default::default()
        };
        let s = run(&params(vec![8080]), &profile, &[8080], 4);
        let [probe, reply, reset] = &s.packets[..] else {
            panic!("expected 3 packets, got {}", s.packets.len());
        };

        assert_eq!(probe.tcp().flags, TcpFlags::SYN);
        assert_eq!(probe.tcp().window, DEFAULT_WINDOW);
        assert_eq!(probe.tcp().mss, Some(1460));
        assert!(!probe.ip().dont_fragment);

        assert_eq!(reply.tcp().flags, TcpFlags::SYN_ACK);
        assert_eq!(reply.tcp().ack, probe.tcp().seq + 1);
        assert_eq!(reply.tcp().seq, 0);
        assert_eq!(reply.tcp().window, SYN_ACK_WINDOW);
        assert_eq!(reply.tcp().mss, Some(1380));
        assert_eq!(reply.tcp().src_port, probe.tcp().dst_port);
        assert_eq!(reply.tcp().dst_port, probe.tcp().src_port);
        assert_eq!(reply.ethernet().src, probe.ethernet().dst);
        assert_eq!(reply.ip().ttl, DEFAULT_TTL);
        assert!(reply.ip().dont_fragment);

        assert_eq!(reset.tcp().flags, TcpFlags::RST);
        assert_eq!(reset.tcp().seq, 1);
        assert_eq!(reset.tcp().window, 0);
        assert_eq!(reset.ethernet(), probe.ethernet(), "reset reuses the probe's link header");
        assert_eq!(reset.ip(), probe.ip(), "reset reuses the probe's IP header");

        assert!(reply.timestamp() > probe.timestamp());
        assert!(reset.timestamp() > reply.timestamp());
    }

    #[test]
    fn test_no_mss_without_statistics() {
        let s = run(&params(vec![80]), &TrafficProfile::default(), &[80], 5);
        assert!(s.packets.iter().all(|p| p.tcp().mss.is_none()));
    }

    #[test]
    fn test_descending_order_reverses() {
        let mut p = params(vec![1, 2, 3, 4]);
        p.port_dest_order_desc = true;
        p.port_dest_shuffle = true;
        let s = run(&p, &TrafficProfile::default(), &[], 6);
        let order: Vec<u16> = s.packets.iter().map(|pkt| pkt.tcp().dst_port).collect();
        assert_eq!(order, vec![4, 3, 2, 1], "descending takes precedence over shuffle");
    }

    #[test]
    fn test_shuffle_keeps_port_set() {
        let mut p = params((1..=50).collect());
        p.port_dest_shuffle = true;
        let s = run(&p, &TrafficProfile::default(), &[], 7);
        let mut seen: Vec<u16> = s.packets.iter().map(|pkt| pkt.tcp().dst_port).collect();
        assert_ne!(seen, (1..=50).collect::<Vec<u16>>(), "seeded shuffle changes order");
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<u16>>());
    }

    #[test]
    fn test_probe_ttl_sources() {
        let p = params(vec![80]);
        let mut rng = StdRng::seed_from_u64(8);

        let histogram = TrafficProfile {
            ttl_distribution: vec![(128, 5)],
            most_common_ttl: Some(255),
            ..Default::default()
        };
        assert_eq!(ExchangeSynthesizer::new(&p, &histogram, &[]).probe_ttl(&mut rng), 128);

        let global = TrafficProfile {
            most_common_ttl: Some(255),
            ..Default::default()
        };
        assert_eq!(ExchangeSynthesizer::new(&p, &global, &[]).probe_ttl(&mut rng), 255);

        let none = TrafficProfile::default();
        assert_eq!(ExchangeSynthesizer::new(&p, &none, &[]).probe_ttl(&mut rng), DEFAULT_TTL);
    }

    #[test]
    fn test_ttl_sampled_once_per_instance() {
        let profile = TrafficProfile {
            ttl_distribution: vec![(64, 1), (128, 1)],
            ..Default::default()
        };
        let s = run(&params((1..=40).collect()), &profile, &[], 9);
        let first = s.packets[0].ip().ttl;
        assert!(s.packets.iter().all(|pkt| pkt.ip().ttl == first));
    }

    #[test]
    fn test_source_randomization() {
        let mut p = params((1..=60).collect());
        let pool = [SRC, Ipv4Addr::new(192, 168, 0, 11), Ipv4Addr::new(192, 168, 0, 12)];
        p.ip_source = pool.to_vec();
        p.ip_source_randomize = true;
        p.port_source = SourcePort::RandomPerPacket;
        let s = run(&p, &TrafficProfile::default(), &[], 10);

        let sources: HashSet<Ipv4Addr> = s.packets.iter().map(|pkt| pkt.ip().src).collect();
        assert!(sources.iter().all(|a| pool.contains(a)));
        assert!(sources.len() > 1, "60 draws from 3 addresses hit more than one");
        let sports: HashSet<u16> = s.packets.iter().map(|pkt| pkt.tcp().src_port).collect();
        assert!(sports.len() > 1, "source port redrawn per probe");
    }

    #[test]
    fn test_no_ports_is_empty_result() {
        let p = params(Vec::new());
        let mut rng = StdRng::seed_from_u64(0);
        let mut timing = TimingModel::new(10.0, 0.0, &mut rng).unwrap();
        let err = ExchangeSynthesizer::new(&p, &TrafficProfile::default(), &[])
            .synthesize(&mut timing, &mut rng)
            .unwrap_err();
        assert!(matches!(err, AttackError::EmptyResult));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let mut p = params((1..=30).collect());
        p.port_dest_shuffle = true;
        let a = run(&p, &TrafficProfile::default(), &[3, 7], 42);
        let b = run(&p, &TrafficProfile::default(), &[3, 7], 42);
        assert_eq!(a.packets, b.packets);
    }
}
