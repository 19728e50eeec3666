//! Destination-port ranking from a static port-popularity table.
//!
//! The table is a CSV of `(port, frequency)` rows with one header row,
//! ordered by descending frequency (the layout of an nmap services export).
//! It is loaded once into an immutable [`PortTable`] and shared read-only.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

/// Request size that switches [`PortTable::rank`] to tiered shuffling.
pub const TOP_PORTS: usize = 1000;

/// Width of one frequency tier in a tiered ranking.
pub const TIER_SIZE: usize = 100;

/// Error from loading or slicing the port reference table.
#[derive(Debug, thiserror::Error)]
pub enum PortTableError {
    #[error("cannot open port table {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("port table: {0}")]
    Csv(#[from] csv::Error),

    #[error("port table row {row}: invalid port '{value}'")]
    InvalidPort { row: usize, value: String },

    #[error("port table row {row}: duplicate port {port}")]
    Duplicate { row: usize, port: u16 },

    #[error("malformed reference table: requested {requested} ports, table has {available}")]
    Malformed { requested: usize, available: usize },
}

/// Ports ordered by observed popularity, most popular first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTable {
    ports: Vec<u16>,
}

impl PortTable {
    /// Load a table from a CSV file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PortTableError> {
        let path = path.as_ref();
        let reader = csv_builder()
            .from_path(path)
            .map_err(|source| PortTableError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let table = Self::from_csv(reader)?;
        tracing::debug!(path = %path.display(), ports = table.len(), "port table loaded");
        Ok(table)
    }

    /// Load a table from any CSV source (header row first).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortTableError> {
        Self::from_csv(csv_builder().from_reader(reader))
    }

    /// Build a table from ports already in ranked order.
    pub fn from_ranked(ports: Vec<u16>) -> Result<Self, PortTableError> {
        let mut seen = HashSet::with_capacity(ports.len());
        for (i, &port) in ports.iter().enumerate() {
            if !seen.insert(port) {
                return Err(PortTableError::Duplicate { row: i + 1, port });
            }
        }
        Ok(Self { ports })
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, PortTableError> {
        let mut rows: Vec<(u16, Option<f64>)> = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            // Row numbers count the header as row 1.
            let row = i + 2;
            let field = record.get(0).unwrap_or_default();
            let port = parse_port_field(field).ok_or_else(|| PortTableError::InvalidPort {
                row,
                value: field.to_string(),
            })?;
            let frequency = record.get(1).and_then(|f| f.parse::<f64>().ok());
            rows.push((port, frequency));
        }

        // Trust file order unless every row carries a frequency.
        if !rows.is_empty() && rows.iter().all(|(_, f)| f.is_some()) {
            rows.sort_by(|a, b| {
                let (fa, fb) = (a.1.unwrap_or_default(), b.1.unwrap_or_default());
                fb.total_cmp(&fa)
            });
        }

        Self::from_ranked(rows.into_iter().map(|(port, _)| port).collect())
    }

    /// Number of ports in the table.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// All ports in ranked order.
    pub fn ranked(&self) -> &[u16] {
        &self.ports
    }

    /// The `n` most popular ports, unshuffled.
    pub fn prefix(&self, n: usize) -> Result<&[u16], PortTableError> {
        self.ports.get(..n).ok_or(PortTableError::Malformed {
            requested: n,
            available: self.ports.len(),
        })
    }

    /// The `n` most popular ports in randomized order.
    ///
    /// For `n == TOP_PORTS` the prefix is split into consecutive tiers of
    /// `TIER_SIZE` ports, each shuffled on its own, so the output still moves
    /// from popular to rare ports. Any other `n` is shuffled as one sequence.
    pub fn rank<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<u16>, PortTableError> {
        let mut ports = self.prefix(n)?.to_vec();
        if n == TOP_PORTS {
            for tier in ports.chunks_mut(TIER_SIZE) {
                tier.shuffle(rng);
            }
        } else {
            ports.shuffle(rng);
        }
        Ok(ports)
    }
}

fn csv_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}

/// Accepts `80` as well as nmap's `80/tcp`.
fn parse_port_field(field: &str) -> Option<u16> {
    let number = field.split('/').next()?.trim();
    number.parse::<u16>().ok()
}
