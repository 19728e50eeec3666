//! Synthesized Ethernet/IPv4/TCP frames and their wire encoding.
//!
//! Frames are kept as header values so the synthesizer and its tests can
//! inspect flags and sequence numbers directly; [`SynthesizedPacket::to_bytes`]
//! produces the checksummed bytes written to the capture.

use std::fmt;
use std::net::Ipv4Addr;

use crate::MacAddr;

/// Ethernet II header length.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// IPv4 header length without options.
pub const IPV4_HEADER_LEN: usize = 20;
/// TCP header length without options.
pub const TCP_HEADER_LEN: usize = 20;
/// Length of the MSS option (kind 2, length 4).
pub const TCP_MSS_OPTION_LEN: usize = 4;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IP_PROTO_TCP: u8 = 6;
/// Identification used for every synthesized datagram.
const IP_IDENTIFICATION: u16 = 1;

/// Default IP TTL for frames without an explicit TTL.
pub const DEFAULT_TTL: u8 = 64;
/// Default TCP window for frames without an explicit window.
pub const DEFAULT_WINDOW: u16 = 8192;

/// TCP control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: Self = Self(0x01);
    pub const SYN: Self = Self(0x02);
    pub const RST: Self = Self(0x04);
    pub const PSH: Self = Self(0x08);
    pub const ACK: Self = Self(0x10);
    pub const URG: Self = Self(0x20);
    pub const SYN_ACK: Self = Self(0x12);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    /// Letter notation: `S`, `SA`, `R`, `FPA`, ….
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(TcpFlags, char); 6] = [
            (TcpFlags::FIN, 'F'),
            (TcpFlags::SYN, 'S'),
            (TcpFlags::RST, 'R'),
            (TcpFlags::PSH, 'P'),
            (TcpFlags::ACK, 'A'),
            (TcpFlags::URG, 'U'),
        ];
        for (flag, letter) in LETTERS {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub src: MacAddr,
    pub dst: MacAddr,
}

impl EthernetHeader {
    /// Same link, opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub dont_fragment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    /// MSS option value; `None` sends no options.
    pub mss: Option<u16>,
}

impl TcpHeader {
    /// Header length including options (always a multiple of 4).
    pub fn header_len(&self) -> usize {
        TCP_HEADER_LEN + self.mss.map_or(0, |_| TCP_MSS_OPTION_LEN)
    }
}

/// One frame of the synthesized attack with its capture timestamp.
///
/// Immutable once built; the timestamp is in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedPacket {
    timestamp: f64,
    ethernet: EthernetHeader,
    ip: Ipv4Header,
    tcp: TcpHeader,
}

impl SynthesizedPacket {
    pub fn new(timestamp: f64, ethernet: EthernetHeader, ip: Ipv4Header, tcp: TcpHeader) -> Self {
        Self {
            timestamp,
            ethernet,
            ip,
            tcp,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn ethernet(&self) -> &EthernetHeader {
        &self.ethernet
    }

    pub fn ip(&self) -> &Ipv4Header {
        &self.ip
    }

    pub fn tcp(&self) -> &TcpHeader {
        &self.tcp
    }

    /// Total frame length on the wire.
    pub fn wire_len(&self) -> usize {
        ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + self.tcp.header_len()
    }

    /// Encode the frame: Ethernet II, IPv4 (no options) and TCP with
    /// optional MSS, both checksums filled in.
    pub fn to_bytes(&self) -> Vec<u8> {
        let tcp_len = self.tcp.header_len();
        let ip_total_len = IPV4_HEADER_LEN + tcp_len;
        let mut frame = vec![0u8; ETHERNET_HEADER_LEN + ip_total_len];

        // --- Ethernet II (bytes 0–13) ---
        frame[0..6].copy_from_slice(&self.ethernet.dst.octets());
        frame[6..12].copy_from_slice(&self.ethernet.src.octets());
        frame[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        // --- IPv4 header ---
        let ip = &mut frame[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + IPV4_HEADER_LEN];
        ip[0] = 0x45; // Version=4, IHL=5
        ip[2..4].copy_from_slice(&(ip_total_len as u16).to_be_bytes());
        ip[4..6].copy_from_slice(&IP_IDENTIFICATION.to_be_bytes());
        if self.ip.dont_fragment {
            ip[6] = 0x40; // DF=1, MF=0, frag_offset=0
        }
        ip[8] = self.ip.ttl;
        ip[9] = IP_PROTO_TCP;
        ip[12..16].copy_from_slice(&self.ip.src.octets());
        ip[16..20].copy_from_slice(&self.ip.dst.octets());
        let ip_checksum = compute_ip_checksum(ip);
        ip[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

        // --- TCP header ---
        let tcp_start = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;
        let tcp = &mut frame[tcp_start..];
        tcp[0..2].copy_from_slice(&self.tcp.src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&self.tcp.dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&self.tcp.seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&self.tcp.ack.to_be_bytes());
        tcp[12] = ((tcp_len / 4) as u8) << 4;
        tcp[13] = self.tcp.flags.bits();
        tcp[14..16].copy_from_slice(&self.tcp.window.to_be_bytes());
        if let Some(mss) = self.tcp.mss {
            tcp[20] = 2; // kind: MSS
            tcp[21] = 4; // length
            tcp[22..24].copy_from_slice(&mss.to_be_bytes());
        }
        let tcp_checksum = compute_tcp_checksum(tcp, &self.ip.src, &self.ip.dst);
        tcp[16..18].copy_from_slice(&tcp_checksum.to_be_bytes());

        frame
    }
}

impl fmt::Display for SynthesizedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6} {}:{} > {}:{} {} seq={} ack={} win={}",
            self.timestamp,
            self.ip.src,
            self.tcp.src_port,
            self.ip.dst,
            self.tcp.dst_port,
            self.tcp.flags,
            self.tcp.seq,
            self.tcp.ack,
            self.tcp.window
        )
    }
}

// =============================================================================
// Checksum utilities
// =============================================================================

/// One's complement of the one's complement sum of 16-bit words.
fn ones_complement_sum(chunks: &[&[u8]]) -> u16 {
    let mut sum: u32 = 0;
    for data in chunks {
        let mut words = data.chunks_exact(2);
        for word in &mut words {
            sum += u16::from_be_bytes([word[0], word[1]]) as u32;
        }
        // Odd trailing byte, zero padded
        if let [last] = words.remainder() {
            sum += (*last as u32) << 8;
        }
    }
    // Fold 32-bit carry into 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Compute the IPv4 header checksum, ignoring whatever bytes 10–11 hold.
pub fn compute_ip_checksum(header: &[u8]) -> u16 {
    if header.len() < 12 {
        return ones_complement_sum(&[header]);
    }
    ones_complement_sum(&[&header[..10], &[0, 0], &header[12..]])
}

/// Compute the TCP checksum over the IPv4 pseudo-header and `segment`,
/// ignoring whatever bytes 16–17 of the segment hold.
pub fn compute_tcp_checksum(segment: &[u8], src_ip: &Ipv4Addr, dst_ip: &Ipv4Addr) -> u16 {
    let tcp_len = (segment.len() as u16).to_be_bytes();
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src_ip.octets());
    pseudo[4..8].copy_from_slice(&dst_ip.octets());
    pseudo[9] = IP_PROTO_TCP;
    pseudo[10..12].copy_from_slice(&tcp_len);

    if segment.len() < 18 {
        return ones_complement_sum(&[&pseudo, segment]);
    }
    ones_complement_sum(&[&pseudo, &segment[..16], &[0, 0], &segment[18..]])
}
