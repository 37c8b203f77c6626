// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Database module for persistent storage

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::{Reading, ReadingSink};
use crate::detection::QualityLabel;
use crate::sensors::{ChannelCalibration, SamplingMode, SensorChannel};

const READING_COLUMNS: &str = "id, timestamp, sequence, mode, mq135, mq2, mq4, mq7, quality";

/// Database manager
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#)?;

        let db = Self::with_connection(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn: Mutex::new(conn) };
        db.create_tables()?;
        Ok(db)
    }

    /// Create database tables
    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            -- One row per sampling tick; NULL channels were inactive
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                mode TEXT NOT NULL,
                mq135 REAL,
                mq2 REAL,
                mq4 REAL,
                mq7 REAL,
                quality TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);

            -- Startup calibration results
            CREATE TABLE IF NOT EXISTS calibrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                channel TEXT NOT NULL,
                gas TEXT NOT NULL,
                ro REAL NOT NULL,
                valid_samples INTEGER NOT NULL
            );
        "#)?;

        Ok(())
    }

    /// Store a labelled reading
    pub fn store_reading(&self, reading: &Reading) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO readings (timestamp, sequence, mode, mq135, mq2, mq4, mq7, quality)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                timestamp_text(&reading.timestamp),
                reading.sequence as i64,
                reading.mode.key(),
                reading.value(SensorChannel::Mq135),
                reading.value(SensorChannel::Mq2),
                reading.value(SensorChannel::Mq4),
                reading.value(SensorChannel::Mq7),
                reading.quality.as_str(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Store a channel calibration result
    pub fn store_calibration(&self, calibration: &ChannelCalibration) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO calibrations (timestamp, channel, gas, ro, valid_samples) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                timestamp_text(&calibration.timestamp),
                calibration.channel.name(),
                calibration.profile.gas,
                calibration.ro,
                calibration.valid_samples as i64,
            ],
        )?;

        Ok(())
    }

    /// Most recently stored reading
    pub fn latest_reading(&self) -> Result<Option<StoredReading>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                &format!("SELECT {} FROM readings ORDER BY timestamp DESC, id DESC LIMIT 1", READING_COLUMNS),
                [],
                RawReading::from_row,
            )
            .optional()?;

        row.map(RawReading::into_stored).transpose()
    }

    /// Readings at or after `since`, oldest first
    pub fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<StoredReading>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM readings WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
            READING_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![timestamp_text(&since)], RawReading::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Fetched {} readings since {}", rows.len(), since);
        rows.into_iter().map(RawReading::into_stored).collect()
    }

    pub fn count_readings(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every stored reading, returning how many were removed
    pub fn delete_all_readings(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM readings", [])?;
        info!("Deleted {} sensor readings", deleted);
        Ok(deleted)
    }
}

#[async_trait]
impl ReadingSink for Database {
    async fn store(&self, reading: &Reading) -> Result<()> {
        self.store_reading(reading).map(|_| ())
    }
}

/// A reading read back from storage
#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: i64,
    pub reading: Reading,
}

// Fixed width so that text ordering matches time ordering
fn timestamp_text(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

struct RawReading {
    id: i64,
    timestamp: String,
    sequence: i64,
    mode: String,
    values: [Option<f64>; 4],
    quality: String,
}

impl RawReading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            sequence: row.get(2)?,
            mode: row.get(3)?,
            values: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            quality: row.get(8)?,
        })
    }

    fn into_stored(self) -> Result<StoredReading> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)?.with_timezone(&Utc);
        let mode: SamplingMode = self.mode.parse()?;
        let quality = QualityLabel::parse(&self.quality)
            .ok_or_else(|| anyhow!("unknown quality label '{}' in row {}", self.quality, self.id))?;

        let values: BTreeMap<SensorChannel, f64> = SensorChannel::ALL
            .into_iter()
            .filter_map(|channel| self.values[channel.index()].map(|v| (channel, v)))
            .collect();

        Ok(StoredReading {
            id: self.id,
            reading: Reading {
                timestamp,
                sequence: self.sequence as u64,
                mode,
                values,
                quality,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::sensors::CalibrationTable;

    fn reading(sequence: u64, age_secs: i64, values: &[(SensorChannel, f64)]) -> Reading {
        Reading {
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            sequence,
            mode: SamplingMode::All,
            values: values.iter().copied().collect(),
            quality: QualityLabel::Medium,
        }
    }

    #[test]
    fn test_store_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_reading().unwrap().is_none());

        let original = reading(7, 0, &[(SensorChannel::Mq2, 1.25), (SensorChannel::Mq7, 3.5)]);
        db.store_reading(&original).unwrap();

        let stored = db.latest_reading().unwrap().unwrap();
        assert_eq!(stored.reading.sequence, 7);
        assert_eq!(stored.reading.values, original.values);
        assert_eq!(stored.reading.value(SensorChannel::Mq135), None);
        assert_eq!(stored.reading.quality, QualityLabel::Medium);
        assert_eq!(stored.reading.mode, SamplingMode::All);
    }

    #[test]
    fn test_readings_since_window() {
        let db = Database::open_in_memory().unwrap();
        db.store_reading(&reading(1, 120, &[(SensorChannel::Mq4, 1.0)])).unwrap();
        db.store_reading(&reading(2, 20, &[(SensorChannel::Mq4, 2.0)])).unwrap();
        db.store_reading(&reading(3, 5, &[(SensorChannel::Mq4, 3.0)])).unwrap();

        let recent = db.readings_since(Utc::now() - chrono::Duration::seconds(30)).unwrap();
        let sequences: Vec<u64> = recent.iter().map(|r| r.reading.sequence).collect();
        assert_eq!(sequences, vec![2, 3]);
        assert_eq!(db.latest_reading().unwrap().unwrap().reading.sequence, 3);
    }

    #[test]
    fn test_delete_all() {
        let db = Database::open_in_memory().unwrap();
        db.store_reading(&reading(1, 0, &[])).unwrap();
        db.store_reading(&reading(2, 0, &[])).unwrap();

        assert_eq!(db.count_readings().unwrap(), 2);
        assert_eq!(db.delete_all_readings().unwrap(), 2);
        assert_eq!(db.count_readings().unwrap(), 0);
        assert_eq!(db.delete_all_readings().unwrap(), 0);
    }

    #[test]
    fn test_store_calibration() {
        let db = Database::open_in_memory().unwrap();
        let table = CalibrationTable::from_ro(&SensorConfig::default(), [1.5, 2.0, 2.5, 3.0], 1.0);
        for cal in table.iter() {
            db.store_calibration(cal).unwrap();
        }

        let conn = db.conn.lock();
        let (count, ro): (i64, f64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(ro) FROM calibrations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(ro, 3.0);
    }

    #[tokio::test]
    async fn test_acts_as_reading_sink() {
        let db = Database::open_in_memory().unwrap();
        let sink: &dyn ReadingSink = &db;
        sink.store(&reading(1, 0, &[(SensorChannel::Mq135, 0.4)])).await.unwrap();
        assert_eq!(db.count_readings().unwrap(), 1);
    }
}
