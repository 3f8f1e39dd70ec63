//! Media Vault - Metadata Store
//!
//! SQLite table of imported files. Every mutation re-publishes the full
//! ordered list to live subscribers.

use std::path::Path;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    path      TEXT NOT NULL CHECK (length(path) > 0),
    extension TEXT NOT NULL
);
"#;

/// One imported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Assigned by the database, never reused
    pub id: i64,
    /// Display name
    pub name: String,
    /// Blob name inside the blob directory
    pub stored_path: String,
    /// Lowercase file-type tag, possibly empty
    pub extension: String,
}

/// A record not yet inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub name: String,
    pub stored_path: String,
    pub extension: String,
}

impl FileRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            stored_path: row.get(2)?,
            extension: row.get(3)?,
        })
    }
}

/// Metadata Store
pub struct MetadataStore {
    conn: Mutex<Connection>,
    subscribers: Mutex<Vec<Sender<Vec<FileRecord>>>>,
}

impl MetadataStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::debug!("opening metadata database {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Database that lives only as long as the store
    pub fn open_in_memory() -> VaultResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    /// All records in insertion order
    pub fn list(&self) -> VaultResult<Vec<FileRecord>> {
        let conn = self.conn.lock();
        Self::list_locked(&conn)
    }

    fn list_locked(conn: &Connection) -> VaultResult<Vec<FileRecord>> {
        let mut stmt = conn.prepare("SELECT id, name, path, extension FROM files ORDER BY id")?;
        let rows = stmt.query_map([], FileRecord::from_row)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Record by id
    pub fn get(&self, id: i64) -> VaultResult<FileRecord> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, path, extension FROM files WHERE id = ?1",
            params![id],
            FileRecord::from_row,
        )
        .optional()?
        .ok_or_else(|| VaultError::NotFound(format!("file record {}", id)))
    }

    /// Number of records
    pub fn count(&self) -> VaultResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Number of records pointing at a blob
    pub fn count_by_path(&self, stored_path: &str) -> VaultResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE path = ?1",
            params![stored_path],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a record and return it with its assigned id
    pub fn insert(&self, record: NewFileRecord) -> VaultResult<FileRecord> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO files (name, path, extension) VALUES (?1, ?2, ?3)",
            params![record.name, record.stored_path, record.extension],
        )?;

        let inserted = FileRecord {
            id: conn.last_insert_rowid(),
            name: record.name,
            stored_path: record.stored_path,
            extension: record.extension,
        };
        log::debug!("inserted file record {} ({})", inserted.id, inserted.name);

        self.publish(&conn);
        Ok(inserted)
    }

    /// Replace the fields of an existing record
    pub fn update(&self, record: &FileRecord) -> VaultResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE files SET name = ?1, path = ?2, extension = ?3 WHERE id = ?4",
            params![record.name, record.stored_path, record.extension, record.id],
        )?;

        if changed == 0 {
            return Err(VaultError::NotFound(format!("file record {}", record.id)));
        }

        self.publish(&conn);
        Ok(())
    }

    /// Delete a record, returning whether one was removed
    pub fn delete(&self, id: i64) -> VaultResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;

        if changed > 0 {
            self.publish(&conn);
        }
        Ok(changed > 0)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SUBSCRIPTIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Live view of the full list. The current snapshot is delivered first,
    /// then a fresh one after every change.
    pub fn subscribe(&self) -> VaultResult<Receiver<Vec<FileRecord>>> {
        let (tx, rx) = unbounded();

        // Hold the connection so no mutation slips between snapshot and registration
        let conn = self.conn.lock();
        let snapshot = Self::list_locked(&conn)?;
        // The receiver is still alive here
        let _ = tx.send(snapshot);
        self.subscribers.lock().push(tx);

        Ok(rx)
    }

    /// Live subscriptions, as of the last push
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Push the current list to every subscriber, dropping dead ones
    fn publish(&self, conn: &Connection) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }

        let snapshot = match Self::list_locked(conn) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not read file list for subscribers: {}", e);
                return;
            }
        };

        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}
