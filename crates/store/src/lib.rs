//! Durable single-file storage for agents, sessions, transcripts, and
//! workshop analyses.
//!
//! One SQLite database in WAL mode: writes are serialized behind a mutex,
//! readers proceed during writes.  The file lives next to the installed
//! executable (not the session workspace) so agent XP and history survive
//! workspace changes.

mod agents;
mod analyses;
mod schema;
mod sessions;
mod timers;
mod transcripts;

pub use agents::AgentFilter;
pub use analyses::{AnalysisRecord, AnalysisStatus, ToolStats};
pub use sessions::SessionRecord;
pub use timers::TimerRecord;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;

use axe_domain::error::{Error, Result};

/// How many times a busy write is retried before surfacing the error.
const WRITE_RETRIES: u32 = 3;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("opening '{}': {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Open the database at the process-level default location.
    ///
    /// The file sits next to the installed executable so state persists
    /// across workspaces; `AXE_DB` overrides the location for operators
    /// and tests.
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(&default_db_path()?)?)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::Store(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL lets readers proceed while a write is in flight; the busy
        // timeout absorbs short lock contention from other processes.
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| Error::Store(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| Error::Store(e.to_string()))?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a write closure, retrying on `SQLITE_BUSY`.
    pub(crate) fn with_write<T>(
        &self,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        let mut last_err = None;
        for _ in 0..WRITE_RETRIES {
            match f(&conn) {
                Ok(v) => return Ok(v),
                Err(e) if is_busy(&e) => {
                    last_err = Some(e);
                    std::thread::sleep(std::time::Duration::from_millis(25));
                }
                Err(e) => return Err(map_db(e)),
            }
        }
        Err(map_db(last_err.expect("retry loop ran at least once")))
    }

    pub(crate) fn with_read<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(map_db)
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

pub(crate) fn map_db(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseCorrupt
                || err.code == rusqlite::ErrorCode::NotADatabase =>
        {
            Error::StoreCorrupt(e.to_string())
        }
        _ => Error::Store(e.to_string()),
    }
}

/// Resolve the default database file: next to the installed executable,
/// never the current working directory.
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(overridden) = std::env::var("AXE_DB") {
        return Ok(PathBuf::from(overridden));
    }
    let exe = std::env::current_exe()?;
    let install_dir = exe
        .parent()
        .ok_or_else(|| Error::Store("executable has no parent directory".into()))?;
    Ok(install_dir.join("axe.db3"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_idempotent_on_the_same_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("axe.db3");
        {
            let _store = Store::open(&path).unwrap();
        }
        // Re-opening re-runs schema creation without error.
        let _store = Store::open(&path).unwrap();
    }

    #[test]
    fn newer_schema_version_fails_to_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("axe.db3");
        {
            let _store = Store::open(&path).unwrap();
        }
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("PRAGMA user_version = 999", []).unwrap();
        }
        let err = Store::open(&path).err().unwrap();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn default_path_honors_env_override() {
        std::env::set_var("AXE_DB", "/tmp/axe-test-override.db3");
        let p = default_db_path().unwrap();
        assert_eq!(p, PathBuf::from("/tmp/axe-test-override.db3"));
        std::env::remove_var("AXE_DB");
        // Without the override the path is anchored at the executable,
        // not the CWD.
        let p = default_db_path().unwrap();
        assert!(p.is_absolute());
        assert_ne!(p.parent(), Some(std::path::Path::new("")));
    }
}
