//! portscan-synth: synthesize a TCP SYN port scan as a pcap.
//!
//! Usage:
//!   portscan-synth --stats-db <DB> --port-table <CSV> -o <PCAP> [--params <JSON>] [--seed N]
//!   portscan-synth --ip-dst 10.0.0.2 --port-dst 1-1024 --port-open 22,80 --format json

use clap::Parser;
use portscan_synth::cli::{self, Cli, OutputFmt};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialise logging (RUST_LOG=debug etc.)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli::run(&cli) {
        Ok((params, report)) => match cli.format {
            OutputFmt::Pretty => print!("{}", cli::format_pretty(&report, &params)),
            OutputFmt::Json => println!("{}", cli::format_json(&report)),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
