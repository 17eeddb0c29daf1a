//! SQLite-backed [`SessionStore`].
//!
//! Each session's [`SessionState`] is serialised to JSON and stored as one
//! row:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sessions (
//!     session_id TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - JSON keeps the schema stable when stat fields are added.
//! - An optional CRC-32 of the blob detects damaged saves. A mismatch is
//!   logged and the data is still returned.
//! - [`SessionStore::update`] runs inside a transaction.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, UmiError};
use crate::store::{SessionState, SessionStore};
use crate::types::SessionId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// SqliteSessionStore
// ---------------------------------------------------------------------------

/// Session store persisted to an SQLite file.
///
/// ```no_run
/// # use umi_core::persistence::SqliteSessionStore;
/// # use umi_core::config::SessionConfig;
/// # use umi_core::{SessionId, SessionStore};
/// let config = SessionConfig::default();
/// let store = SqliteSessionStore::open("umi_sessions.db", &config)?;
/// let state = store.load(&SessionId::from("player-1"))?;
/// # Ok::<(), umi_core::UmiError>(())
/// ```
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    template: SessionState,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("db_path", &self.db_path)
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    /// Returns [`UmiError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &SessionConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Session database opened");
        Ok(Self::with_connection(conn, config, db_path))
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// Returns [`UmiError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &SessionConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::with_connection(conn, config, PathBuf::from(":memory:")))
    }

    fn with_connection(conn: Connection, config: &SessionConfig, db_path: PathBuf) -> Self {
        Self {
            conn: Mutex::new(conn),
            template: config.template(),
            checksum_enabled: config.checksum_enabled,
            db_path,
        }
    }

    fn read(&self, conn: &Connection, session: &SessionId) -> Result<Option<SessionState>> {
        let mut stmt = conn.prepare_cached("SELECT data, checksum FROM sessions WHERE session_id = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![session.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        session = %session,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, session save may be damaged"
                    );
                }
            }
        }

        let state = serde_json::from_slice(&data).map_err(|e| UmiError::Serialization(e.to_string()))?;
        Ok(Some(state))
    }

    fn write(&self, conn: &Connection, session: &SessionId, state: &SessionState) -> Result<usize> {
        let json = serde_json::to_vec(state).map_err(|e| UmiError::Serialization(e.to_string()))?;
        let checksum = self.checksum_enabled.then(|| crc32_hex(&json));
        conn.execute(
            "INSERT INTO sessions (session_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![session.as_str(), json, Utc::now().to_rfc3339(), checksum],
        )?;
        Ok(json.len())
    }

    /// Number of stored sessions.
    ///
    /// # Errors
    /// Returns [`UmiError::Database`] on SQLite failures.
    pub fn session_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Run `PRAGMA integrity_check`; `Ok(false)` means the file is damaged.
    ///
    /// # Errors
    /// Returns [`UmiError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Path of the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, session: &SessionId) -> Result<SessionState> {
        let conn = self.conn.lock();
        Ok(self.read(&conn, session)?.unwrap_or_else(|| self.template.clone()))
    }

    fn update(&self, session: &SessionId, f: &mut dyn FnMut(&mut SessionState)) -> Result<SessionState> {
        let start = Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut state = self.read(&tx, session)?.unwrap_or_else(|| self.template.clone());
        f(&mut state);
        let bytes = self.write(&tx, session, &state)?;
        tx.commit()?;

        debug!(
            session = %session,
            npcs = state.npcs.len(),
            bytes,
            elapsed_us = start.elapsed().as_micros(),
            "Saved session"
        );
        Ok(state)
    }

    fn reset(&self, session: &SessionId) -> Result<()> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session.as_str()])?;
        debug!(session = %session, deleted, "Session reset");
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<SessionId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT session_id FROM sessions ORDER BY session_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(SessionId(row?));
        }
        Ok(ids)
    }
}

/// Extension trait that adds an `.optional()` combinator to `rusqlite::Result`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
