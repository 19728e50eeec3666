//! Capture output: writing synthesized frames to disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pcap_file::pcap::{PcapPacket, PcapWriter};

use crate::error::AttackError;
use crate::synth::packet::SynthesizedPacket;

/// Error from a capture writer.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("pcap encoding: {0}")]
    Pcap(#[from] pcap_file::PcapError),

    #[error("timestamp {0} cannot be stored in a capture")]
    InvalidTimestamp(f64),
}

/// Serializes an ordered frame sequence to `path`.
pub trait CaptureWriter {
    /// Write `packets` in the given order and return the path written.
    fn write(&mut self, packets: &[SynthesizedPacket], path: &Path) -> Result<PathBuf, CaptureError>;
}

/// Classic libpcap writer: Ethernet link type, microsecond timestamps.
#[derive(Debug, Default)]
pub struct PcapCaptureWriter;

impl PcapCaptureWriter {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureWriter for PcapCaptureWriter {
    fn write(&mut self, packets: &[SynthesizedPacket], path: &Path) -> Result<PathBuf, CaptureError> {
        let timestamps = packets
            .iter()
            .map(|packet| pcap_timestamp(packet.timestamp()))
            .collect::<Result<Vec<_>, _>>()?;

        let file = File::create(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(e) = write_records(file, packets, &timestamps, path) {
            if let Err(remove) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %remove, "partial capture not removed");
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), packets = packets.len(), "capture written");
        Ok(path.to_path_buf())
    }
}

/// Largest timestamp, in seconds, a classic pcap record header can hold.
pub const MAX_CAPTURE_TIMESTAMP: f64 = u32::MAX as f64;

/// Convert a frame timestamp to a pcap record time.
pub fn pcap_timestamp(ts: f64) -> Result<Duration, CaptureError> {
    let timestamp = Duration::try_from_secs_f64(ts).map_err(|_| CaptureError::InvalidTimestamp(ts))?;
    if timestamp.as_secs() > u64::from(u32::MAX) {
        return Err(CaptureError::InvalidTimestamp(ts));
    }
    Ok(timestamp)
}

fn write_records(
    file: File,
    packets: &[SynthesizedPacket],
    timestamps: &[Duration],
    path: &Path,
) -> Result<(), CaptureError> {
    let mut pcap = PcapWriter::new(BufWriter::new(file))?;
    for (packet, timestamp) in packets.iter().zip(timestamps) {
        let data = packet.to_bytes();
        pcap.write_packet(&PcapPacket::new(*timestamp, data.len() as u32, &data))?;
    }
    pcap.into_writer().flush().map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Keeps every sequence it is handed instead of writing files.
#[derive(Debug, Default)]
pub struct MemoryCaptureWriter {
    pub captures: Vec<(PathBuf, Vec<SynthesizedPacket>)>,
}

impl MemoryCaptureWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames of the most recent write.
    pub fn last(&self) -> Option<&[SynthesizedPacket]> {
        self.captures.last().map(|(_, packets)| packets.as_slice())
    }
}

impl CaptureWriter for MemoryCaptureWriter {
    fn write(&mut self, packets: &[SynthesizedPacket], path: &Path) -> Result<PathBuf, CaptureError> {
        self.captures.push((path.to_path_buf(), packets.to_vec()));
        Ok(path.to_path_buf())
    }
}

/// Hand the finished sequence to `writer`.
///
/// Returns the number of frames written and the path the writer reports.
pub fn assemble(
    packets: &[SynthesizedPacket],
    writer: &mut dyn CaptureWriter,
    path: &Path,
) -> Result<(usize, PathBuf), AttackError> {
    if packets.is_empty() {
        return Err(AttackError::EmptyResult);
    }
    let written = writer.write(packets, path)?;
    Ok((packets.len(), written))
}
