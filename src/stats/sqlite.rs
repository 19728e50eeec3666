//! SQLite-backed statistics store.
//!
//! Reads the statistics database written by the capture-statistics collector.
//! Only the tables listed in [`SCHEMA`] are used. Every lookup is a
//! parameterised statement.

use std::net::Ipv4Addr;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::RngCore;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::{StatisticsStore, StatsError};
use crate::MacAddr;

/// Tables read by [`SqliteStatistics`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ip_statistics (
    ipAddress TEXT PRIMARY KEY,
    pktsSent INTEGER NOT NULL DEFAULT 0,
    pktsReceived INTEGER NOT NULL DEFAULT 0,
    ppsSent REAL,
    ppsReceived REAL
);
CREATE TABLE IF NOT EXISTS ip_mac (
    ipAddress TEXT NOT NULL,
    macAddress TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ip_ttl (
    ipAddress TEXT NOT NULL,
    ttlValue INTEGER NOT NULL,
    ttlCount INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tcp_mss (
    ipAddress TEXT NOT NULL,
    mssValue INTEGER NOT NULL,
    mssCount INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS ip_ports (
    ipAddress TEXT NOT NULL,
    portDirection TEXT NOT NULL,
    portNumber INTEGER NOT NULL,
    portCount INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS file_statistics (
    packetCount INTEGER NOT NULL,
    captureDuration REAL
);
CREATE TABLE IF NOT EXISTS packet_timestamps (
    packetIndex INTEGER PRIMARY KEY,
    timestamp REAL NOT NULL
);
"#;

/// Statistics read from a SQLite database.
pub struct SqliteStatistics {
    conn: Connection,
}

impl SqliteStatistics {
    /// Open an existing statistics database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StatsError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %path.as_ref().display(), "statistics database opened");
        Ok(Self { conn })
    }

    /// Create (or open) a database and ensure the schema exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StatsError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory database with the schema applied (for testing).
    pub fn open_memory() -> Result<Self, StatsError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run an arbitrary read query and return every cell as text.
    ///
    /// NULL becomes an empty string, blobs are hex encoded.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, StatsError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            (0..columns)
                .map(|i| row.get_ref(i).map(value_to_string))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
    }
}

fn narrow<T: TryFrom<i64>>(what: &'static str, value: i64) -> Result<T, StatsError> {
    T::try_from(value).map_err(|_| StatsError::Malformed {
        what,
        value: value.to_string(),
    })
}

impl StatisticsStore for SqliteStatistics {
    fn most_used_addresses(&self) -> Result<Vec<String>, StatsError> {
        let mut stmt = self.conn.prepare(
            "SELECT ipAddress FROM ip_statistics \
             WHERE pktsSent + pktsReceived = \
                   (SELECT MAX(pktsSent + pktsReceived) FROM ip_statistics) \
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mac_address(&self, ip: Ipv4Addr) -> Result<Option<MacAddr>, StatsError> {
        let mac: Option<String> = self
            .conn
            .query_row(
                "SELECT macAddress FROM ip_mac WHERE ipAddress = ?1 ORDER BY rowid LIMIT 1",
                params![ip.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        mac.map(|m| {
            m.parse::<MacAddr>().map_err(|_| StatsError::Malformed {
                what: "mac address",
                value: m,
            })
        })
        .transpose()
    }

    fn random_address(&self, rng: &mut dyn RngCore) -> Result<Option<String>, StatsError> {
        let mut stmt = self
            .conn
            .prepare("SELECT ipAddress FROM ip_statistics ORDER BY rowid")?;
        let addresses = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(addresses.choose(rng).cloned())
    }

    fn pps_sent(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError> {
        let rate: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT ppsSent FROM ip_statistics WHERE ipAddress = ?1",
                params![ip.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rate.flatten())
    }

    fn pps_received(&self, ip: Ipv4Addr) -> Result<Option<f64>, StatsError> {
        let rate: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT ppsReceived FROM ip_statistics WHERE ipAddress = ?1",
                params![ip.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rate.flatten())
    }

    fn mss(&self, ip: Ipv4Addr) -> Result<Option<u16>, StatsError> {
        let mss: Option<i64> = self
            .conn
            .query_row(
                "SELECT mssValue FROM tcp_mss WHERE ipAddress = ?1 \
                 ORDER BY mssCount DESC, rowid LIMIT 1",
                params![ip.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        mss.map(|v| narrow("mss", v)).transpose()
    }

    fn ttl_distribution(&self, ip: Ipv4Addr) -> Result<Vec<(u8, u64)>, StatsError> {
        let mut stmt = self.conn.prepare(
            "SELECT ttlValue, SUM(ttlCount) FROM ip_ttl WHERE ipAddress = ?1 \
             GROUP BY ttlValue ORDER BY ttlValue",
        )?;
        let rows = stmt
            .query_map(params![ip.to_string()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(ttl, count)| Ok((narrow("ttl", ttl)?, narrow("ttl count", count)?)))
            .collect()
    }

    fn most_common_ttl(&self) -> Result<Option<u8>, StatsError> {
        let ttl: Option<i64> = self
            .conn
            .query_row(
                "SELECT ttlValue FROM ip_ttl GROUP BY ttlValue \
                 ORDER BY SUM(ttlCount) DESC, ttlValue LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        ttl.map(|v| narrow("ttl", v)).transpose()
    }

    fn packet_count(&self) -> Result<u64, StatsError> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT packetCount FROM file_statistics LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        narrow("packet count", count.unwrap_or(0))
    }

    fn inbound_ports(&self, ip: Ipv4Addr) -> Result<Vec<u16>, StatsError> {
        let mut stmt = self.conn.prepare(
            "SELECT portNumber FROM ip_ports \
             WHERE portDirection = 'in' AND ipAddress = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![ip.to_string()], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|p| narrow("port", p)).collect()
    }

    fn packet_timestamp(&self, index: u64) -> Result<Option<f64>, StatsError> {
        let index = match i64::try_from(index) {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        Ok(self
            .conn
            .query_row(
                "SELECT timestamp FROM packet_timestamps WHERE packetIndex = ?1",
                params![index],
                |row| row.get(0),
            )
            .optional()?)
    }
}
