//! Durable checkpoint: completed records and the residual frontier, kept in
//! one SQLite database so that both move together in a single transaction.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PersistResult;
use crate::frontier::Frontier;
use crate::model::{Fragment, Record, WorkItem};

/// Where `flush` mirrors the checkpoint as plain JSON arrays.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub records: PathBuf,
    pub pending: PathBuf,
}

pub struct CheckpointStore {
    conn: Connection,
    exports: Option<ExportPaths>,
}

pub struct Stats {
    pub completed: usize,
    pub degraded: usize,
    pub pending: usize,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> PersistResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PersistResult<Self> {
        let store = CheckpointStore {
            conn,
            exports: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn with_exports(mut self, exports: ExportPaths) -> Self {
        self.exports = Some(exports);
        self
    }

    fn init_schema(&self) -> PersistResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id           INTEGER PRIMARY KEY,
                link         TEXT UNIQUE NOT NULL,
                record       TEXT NOT NULL,
                degraded     BOOLEAN NOT NULL DEFAULT 0,
                completed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS frontier (
                position INTEGER PRIMARY KEY,
                link     TEXT UNIQUE NOT NULL,
                item     TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Resume ──

    pub fn completed_links(&self) -> PersistResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT link FROM records")?;
        let links = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(links)
    }

    /// Overwrite the stored frontier with `frontier`, preserving its order.
    pub fn replace_frontier(&self, frontier: &Frontier) -> PersistResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM frontier", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO frontier (position, link, item) VALUES (?1, ?2, ?3)")?;
            for (pos, item) in frontier.iter().enumerate() {
                stmt.execute(params![pos as i64, item.link, serde_json::to_string(item)?])?;
            }
        }
        tx.commit()?;
        debug!("Stored frontier of {} items", frontier.len());
        Ok(())
    }

    // ── Progress ──

    /// Record a finished item and drop it from the stored frontier, atomically.
    pub fn append(&self, item: WorkItem, fragment: Fragment) -> PersistResult<Record> {
        let link = item.link.clone();
        let record = item.into_record(fragment);
        let json = serde_json::to_string(&record)?;
        let now = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO records (link, record, degraded, completed_at) VALUES (?1, ?2, ?3, ?4)",
            params![link, json, record.is_degraded(), now],
        )?;
        tx.execute("DELETE FROM frontier WHERE link = ?1", params![link])?;
        tx.commit()?;

        Ok(record)
    }

    /// Push everything to disk and refresh the JSON mirrors, if configured.
    pub fn flush(&self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        if let Some(exports) = &self.exports {
            self.export(&exports.records, &exports.pending)?;
        }
        Ok(())
    }

    pub fn export(&self, records: &Path, pending: &Path) -> PersistResult<()> {
        let done = self.completed_records()?;
        let left = self.frontier_items()?;
        write_json_atomic(records, &done)?;
        write_json_atomic(pending, &left)?;
        info!(
            "Exported {} records to {:?}, {} pending to {:?}",
            done.len(),
            records,
            left.len(),
            pending
        );
        Ok(())
    }

    // ── Queries ──

    pub fn completed_records(&self) -> PersistResult<Vec<Record>> {
        let mut stmt = self.conn.prepare("SELECT record FROM records ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|s| serde_json::from_str(s).map_err(Into::into))
            .collect()
    }

    pub fn frontier_items(&self) -> PersistResult<Vec<WorkItem>> {
        let mut stmt = self.conn.prepare("SELECT item FROM frontier ORDER BY position")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|s| serde_json::from_str(s).map_err(Into::into))
            .collect()
    }

    pub fn stats(&self) -> PersistResult<Stats> {
        let completed: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        let degraded: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE degraded = 1",
            [],
            |r| r.get(0),
        )?;
        let pending: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM frontier", [], |r| r.get(0))?;
        Ok(Stats {
            completed,
            degraded,
            pending,
        })
    }
}

/// Write pretty JSON next to `path` and rename it into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> PersistResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
