//! Output formatters for attack reports.
//!
//! Supports pretty (human-readable) and JSON output formats.

use crate::params::AttackParameters;
use crate::AttackReport;

/// Format a report and the parameters it was generated with as text.
pub fn format_pretty(report: &AttackReport, params: &AttackParameters) -> String {
    let mut out = String::new();

    let version = env!("CARGO_PKG_VERSION");
    out.push_str(&format!("portscan-synth {version} attack {}\n", report.attack_id));

    let sources: Vec<String> = params.ip_source.iter().map(|ip| ip.to_string()).collect();
    let source_label = if params.ip_source_randomize && sources.len() > 1 {
        format!("{{{}}}", sources.join(", "))
    } else {
        params.primary_source().to_string()
    };
    out.push_str(&format!(
        "Scanner {source_label} ({}) -> target {} ({})\n",
        params.mac_source, params.ip_destination, params.mac_destination
    ));

    let order = if params.port_dest_order_desc {
        "descending"
    } else if params.port_dest_shuffle {
        "shuffled"
    } else {
        "ranked"
    };
    out.push_str(&format!(
        "Source port {}, {} destination ports ({order}), open: {}\n",
        params.port_source,
        params.port_destination.len(),
        params.port_open
    ));
    out.push_str(&format!(
        "Rate {:.2} pkt/s, injected after packet {}\n",
        params.packets_per_second, params.inject_after_packet
    ));
    out.push('\n');

    out.push_str(&format!(
        "{:<12}{}\n",
        "PACKETS",
        format!(
            "{} ({} ports probed, {} open)",
            report.packet_count, report.ports_probed, report.ports_open
        )
    ));
    out.push_str(&format!(
        "{:<12}{:.6} - {:.6} ({})\n",
        "WINDOW",
        report.attack_start,
        report.attack_end,
        format_duration_s(report.attack_end - report.attack_start)
    ));
    out.push_str(&format!(
        "{:<12}mean {} std {} p50 {} p90 {}\n",
        "DELAY",
        format_duration_s(report.delay_stats.mean),
        format_duration_s(report.delay_stats.std),
        format_duration_s(report.delay_stats.p50),
        format_duration_s(report.delay_stats.p90)
    ));
    out.push_str(&format!("{:<12}{}\n", "CAPTURE", report.capture_path.display()));

    out
}

/// Format a report as JSON.
pub fn format_json(report: &AttackReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

/// Format a duration in seconds to a human-readable string.
pub fn format_duration_s(secs: f64) -> String {
    let abs = secs.abs();
    if abs >= 1.0 {
        format!("{secs:.2}s")
    } else if abs >= 1e-3 {
        format!("{:.1}ms", secs * 1e3)
    } else if abs >= 1e-6 {
        format!("{:.1}µs", secs * 1e6)
    } else {
        format!("{:.0}ns", secs * 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{OpenPorts, SourcePort};
    use crate::{DelayStats, MacAddr};
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn make_report() -> AttackReport {
        AttackReport {
            attack_id: Uuid::new_v4(),
            packet_count: 12,
            capture_path: PathBuf::from("/tmp/scan.pcap"),
            attack_start: 100.0,
            attack_end: 101.5,
            ports_probed: 8,
            ports_open: 2,
            delay_stats: DelayStats {
                mean: 0.125,
                std: 0.02,
                p50: 0.12,
                p90: 0.15,
            },
            generated_at: Utc::now(),
        }
    }

    fn make_params() -> AttackParameters {
        AttackParameters {
            ip_source: vec![Ipv4Addr::new(10, 0, 0, 1)],
            ip_source_randomize: false,
            mac_source: MacAddr([2, 0, 0, 0, 0, 1]),
            ip_destination: Ipv4Addr::new(10, 0, 0, 2),
            mac_destination: MacAddr([2, 0, 0, 0, 0, 2]),
            port_source: SourcePort::Fixed(40000),
            port_destination: vec![22, 80, 443],
            port_open: OpenPorts::Unresolved,
            port_dest_shuffle: true,
            port_dest_order_desc: false,
            packets_per_second: 8.0,
            inject_at_timestamp: 100.0,
            inject_after_packet: 17,
        }
    }

    #[test]
    fn test_format_duration_s() {
        assert_eq!(format_duration_s(1.5), "1.50s");
        assert_eq!(format_duration_s(0.0125), "12.5ms");
        assert_eq!(format_duration_s(0.0000015), "1.5µs");
        assert_eq!(format_duration_s(0.0), "0ns");
    }

    #[test]
    fn test_format_pretty_header() {
        let output = format_pretty(&make_report(), &make_params());
        assert!(output.contains("portscan-synth"));
        assert!(output.contains("Scanner 10.0.0.1 (02:00:00:00:00:01) -> target 10.0.0.2"));
        assert!(output.contains("3 destination ports (shuffled)"));
        assert!(output.contains("open: observed"));
    }

    #[test]
    fn test_format_pretty_summary() {
        let output = format_pretty(&make_report(), &make_params());
        assert!(output.contains("12 (8 ports probed, 2 open)"));
        assert!(output.contains("(1.50s)"));
        assert!(output.contains("mean 125.0ms"));
        assert!(output.contains("/tmp/scan.pcap"));
    }

    #[test]
    fn test_format_pretty_randomized_sources() {
        let mut params = make_params();
        params.ip_source.push(Ipv4Addr::new(10, 0, 0, 9));
        params.ip_source_randomize = true;
        let output = format_pretty(&make_report(), &params);
        assert!(output.contains("Scanner {10.0.0.1, 10.0.0.9}"));
    }

    #[test]
    fn test_format_json_structure() {
        let report = make_report();
        let json = format_json(&report);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["packet_count"], 12);
        assert_eq!(parsed["ports_open"], 2);
        assert_eq!(parsed["attack_start"], 100.0);
        assert_eq!(parsed["capture_path"], "/tmp/scan.pcap");
        assert_eq!(parsed["delay_stats"]["p90"], 0.15);
        assert_eq!(parsed["attack_id"], report.attack_id.to_string());
    }
}
