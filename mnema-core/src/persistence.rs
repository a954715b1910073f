//! SQLite snapshots of agent minds.
//!
//! Each agent's [`MindSnapshot`] is serialised to JSON and upserted into one
//! table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS minds (
//!     agent_id   INTEGER PRIMARY KEY,
//!     tick       INTEGER NOT NULL,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! Snapshots are best-effort: there is no transaction across agents and a
//! checksum mismatch is logged, not rejected. WAL mode keeps reads cheap
//! while a save is in flight; backups go through SQLite's online-backup API.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::agent::MindSnapshot;
use crate::config::PersistenceConfig;
use crate::error::{MnemaError, Result};
use crate::types::{AgentId, Tick};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS minds (
    agent_id   INTEGER PRIMARY KEY,
    tick       INTEGER NOT NULL,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// CRC-32
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 polynomial, reflected).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to the snapshot database.
///
/// ```no_run
/// # use mnema_core::persistence::PersistenceEngine;
/// # use mnema_core::config::{MnemaConfig, PersistenceConfig};
/// # use mnema_core::agent::AgentMind;
/// # use mnema_core::types::AgentId;
/// let engine = PersistenceEngine::open("world.db", &PersistenceConfig::default())?;
/// let mind = AgentMind::new(AgentId(1), &MnemaConfig::default());
/// engine.save(&mind.snapshot(0))?;
/// let restored = engine.load(AgentId(1))?;
/// # Ok::<(), mnema_core::error::MnemaError>(())
/// ```
pub struct PersistenceEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Snapshot store opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Upsert an agent's snapshot.
    ///
    /// # Errors
    /// Returns [`MnemaError::Serialization`] if JSON encoding fails, or
    /// [`MnemaError::Database`] on SQLite failures.
    pub fn save(&self, snapshot: &MindSnapshot) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec(snapshot).map_err(|e| MnemaError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let tick = i64::try_from(snapshot.tick).map_err(|e| MnemaError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO minds (agent_id, tick, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(agent_id) DO UPDATE SET
                tick = excluded.tick,
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![snapshot.agent.0, tick, json, Utc::now().to_rfc3339(), checksum],
        )?;

        debug!(
            agent = %snapshot.agent,
            tick = snapshot.tick,
            records = snapshot.long_term.len(),
            knowledge = snapshot.knowledge_len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved mind snapshot"
        );
        Ok(())
    }

    /// Save every snapshot in one transaction.
    ///
    /// # Errors
    /// Fails on the first snapshot that cannot be written; nothing is
    /// committed in that case.
    pub fn save_all<'a, I>(&mut self, snapshots: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a MindSnapshot>,
    {
        let tx = self.conn.transaction()?;
        let mut saved = 0;
        for snapshot in snapshots {
            let json = serde_json::to_vec(snapshot).map_err(|e| MnemaError::Serialization(e.to_string()))?;
            let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
            let tick = i64::try_from(snapshot.tick).map_err(|e| MnemaError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO minds (agent_id, tick, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![snapshot.agent.0, tick, json, Utc::now().to_rfc3339(), checksum],
            )?;
            saved += 1;
        }
        tx.commit()?;
        info!(saved, "Saved mind snapshots");
        Ok(saved)
    }

    /// Load an agent's snapshot; `None` if it was never saved.
    ///
    /// # Errors
    /// Returns [`MnemaError::Serialization`] if the stored JSON is invalid,
    /// or [`MnemaError::Database`] on SQLite failures.
    pub fn load(&self, agent: AgentId) -> Result<Option<MindSnapshot>> {
        let start = Instant::now();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM minds WHERE agent_id = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![agent.0], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(agent = %agent, expected = %expected, actual = %actual, "Snapshot checksum mismatch");
                }
            }
        }

        let snapshot: MindSnapshot =
            serde_json::from_slice(&data).map_err(|e| MnemaError::Serialization(e.to_string()))?;
        debug!(
            agent = %agent,
            tick = snapshot.tick,
            elapsed_us = start.elapsed().as_micros(),
            "Loaded mind snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Delete an agent's snapshot. Returns `true` if a row was removed.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn delete(&self, agent: AgentId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM minds WHERE agent_id = ?1", params![agent.0])?;
        Ok(deleted > 0)
    }

    /// Agents with a stored snapshot and the tick it was taken at.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn list(&self) -> Result<Vec<(AgentId, Tick)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT agent_id, tick FROM minds ORDER BY agent_id")?;
        let rows = stmt.query_map([], |row| {
            let agent: u32 = row.get(0)?;
            let tick: i64 = row.get(1)?;
            Ok((AgentId(agent), Tick::try_from(tick).unwrap_or_default()))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(MnemaError::from)
    }

    /// Number of stored snapshots.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM minds", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with the online-backup API.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Snapshot backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count`. No-op for in-memory databases.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] or [`MnemaError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if max == 0 || self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension().map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Database path (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// Returns [`MnemaError::Database`] if the pragma itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self.conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}
