// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream checkpoint: the high-water mark of event timestamps and its SQLite store.
//!
//! The ingestion client owns the only [`Checkpoint`] value. It is threaded through
//! message decoding and written to the store every few thousand events so that a
//! restart can ask the stream to replay from where it left off.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::constants::{
    CHECKPOINT_KEY, REPLAY_THRESHOLD_SECS, TIMESTAMP_FORMAT, TIMESTAMP_PARSE_FORMAT,
};
use crate::errors::CheckpointError;

/// 1899-01-01T00:00:00Z, used before any event has been seen.
const SENTINEL_UNIX_SECS: i64 = -2_240_524_800;

/// Parses a vendor event timestamp (`%Y-%m-%dT%H:%M:%S.%f%z`, RFC 3339 accepted too).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Latest event timestamp seen on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(DateTime<Utc>);

impl Checkpoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    /// The first-run value, older than any real event.
    #[must_use]
    pub fn sentinel() -> Self {
        Self(DateTime::from_timestamp(SENTINEL_UNIX_SECS, 0).unwrap_or(DateTime::UNIX_EPOCH))
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0.timestamp() <= SENTINEL_UNIX_SECS
    }

    /// Moves the checkpoint forward to `timestamp`, never backwards.
    #[must_use]
    pub fn advance(self, timestamp: DateTime<Utc>) -> Self {
        Self(self.0.max(timestamp))
    }

    /// Whether a reconnect at `now` should request a replay from this checkpoint.
    #[must_use]
    pub fn needs_replay(&self, now: DateTime<Utc>) -> bool {
        !self.is_sentinel() && now - self.0 > TimeDelta::seconds(REPLAY_THRESHOLD_SECS)
    }

    /// Formats the checkpoint as the stream's `sinceTime` query value.
    #[must_use]
    pub fn since_time(&self) -> String {
        self.0.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Unix seconds, as persisted in the store.
    #[must_use]
    pub fn to_unix_string(&self) -> String {
        self.0.timestamp().to_string()
    }

    /// Reads a persisted value. A fractional part (`1704067200.0`) is ignored.
    pub fn from_unix_string(value: &str) -> Result<Self, CheckpointError> {
        let seconds = value
            .trim()
            .split('.')
            .next()
            .and_then(|whole| whole.parse::<i64>().ok())
            .ok_or_else(|| CheckpointError::InvalidValue(value.to_string()))?;
        DateTime::from_timestamp(seconds, 0)
            .map(Self)
            .ok_or_else(|| CheckpointError::InvalidValue(value.to_string()))
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.since_time())
    }
}

/// Durable storage for the single checkpoint row.
pub trait CheckpointStore: Send + Sync {
    /// Returns the persisted checkpoint, or [`Checkpoint::sentinel`] on first run.
    fn load(&self) -> Result<Checkpoint, CheckpointError>;

    /// Upserts the checkpoint row.
    fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;
}

/// [`CheckpointStore`] backed by a local SQLite file.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache (name TEXT, value TEXT, PRIMARY KEY (name))",
            [],
        )?;
        debug!("Checkpoint schema initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let conn = self.conn.lock().map_err(|_| CheckpointError::Poisoned)?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM cache WHERE name = ?1",
                params![CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(value) => {
                let checkpoint = Checkpoint::from_unix_string(&value)?;
                info!("Restored previous timestamp: {checkpoint}");
                Ok(checkpoint)
            }
            None => Ok(Checkpoint::sentinel()),
        }
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let conn = self.conn.lock().map_err(|_| CheckpointError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO cache (name, value) VALUES (?1, ?2)",
            params![CHECKPOINT_KEY, checkpoint.to_unix_string()],
        )?;
        debug!("Saved checkpoint {checkpoint}");
        Ok(())
    }
}
