use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

const INSERT_ID: &str = "INSERT OR IGNORE INTO processed_items (item_id) VALUES (?1)";

/// Durable set of listing ids that have already been processed.
///
/// Backed by a single SQLite table. Every id is loaded into memory on open so
/// membership checks never touch the database; inserts are committed before
/// the in-memory set is updated.
pub struct SeenStore {
    conn: Connection,
    ids: HashSet<String>,
}

impl SeenStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open seen-item store {}", path.display()))?;
        let store = Self::init(conn)?;
        info!(
            "Loaded {} seen item id(s) from {}",
            store.ids.len(),
            path.display()
        );
        Ok(store)
    }

    /// Non-durable store, for dry runs and tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        Self::init(conn)
    }

    /// In-memory copy of the store at `path`, which is only ever opened read-only.
    ///
    /// Inserts land in the copy. A missing file gives an empty store and is not created.
    pub fn snapshot(path: &Path) -> Result<Self> {
        let mut store = Self::open_in_memory()?;
        if !path.exists() {
            info!("No seen-item store at {}, starting empty", path.display());
            return Ok(store);
        }

        let source = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open seen-item store {} read-only", path.display()))?;
        let has_table: bool = source
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master
                     WHERE type = 'table' AND name = 'processed_items')",
                [],
                |row| row.get(0),
            )
            .context("failed to inspect seen-item store")?;
        if has_table {
            let ids = load_ids(&source)?;
            let tx = store.conn.transaction()?;
            for id in &ids {
                tx.execute(INSERT_ID, params![id])?;
            }
            tx.commit().context("failed to copy seen-item store")?;
            store.ids = ids;
        }

        info!(
            "Loaded {} seen item id(s) from {} (read-only snapshot)",
            store.ids.len(),
            path.display()
        );
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed_items (
                 item_id TEXT PRIMARY KEY
             );",
        )
        .context("failed to create processed_items table")?;

        let ids = load_ids(&conn)?;
        Ok(Self { conn, ids })
    }

    /// Import a flat one-id-per-line file. Returns how many ids were new.
    ///
    /// A missing file is not an error; blank lines are ignored.
    pub fn import_legacy(&mut self, path: &Path) -> Result<usize> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No legacy id file at {}", path.display());
                return Ok(0);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let fresh: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !self.ids.contains(*id))
            .collect();

        let tx = self.conn.transaction()?;
        let mut imported = Vec::with_capacity(fresh.len());
        for id in fresh {
            if tx.execute(INSERT_ID, params![id])? > 0 {
                imported.push(id.to_string());
            }
        }
        tx.commit().context("failed to commit legacy import")?;

        let count = imported.len();
        self.ids.extend(imported);
        if count > 0 {
            info!("Imported {count} legacy id(s) from {}", path.display());
        }
        Ok(count)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as processed. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> Result<bool> {
        if self.ids.contains(id) {
            return Ok(false);
        }
        let changed = self
            .conn
            .execute(INSERT_ID, params![id])
            .with_context(|| format!("failed to record item {id}"))?;
        self.ids.insert(id.to_string());
        Ok(changed > 0)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn load_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT item_id FROM processed_items")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect::<rusqlite::Result<HashSet<String>>>()
        .context("failed to load processed item ids")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "vinted-scanner-{name}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn insert_is_idempotent() {
        let mut store = SeenStore::open_in_memory().expect("store");
        assert!(store.is_empty());
        assert!(!store.contains("42"));

        assert!(store.insert("42").expect("insert"));
        assert!(store.contains("42"));
        assert!(!store.insert("42").expect("second insert"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ids_survive_reopen() {
        let path = temp_path("reopen.db");
        {
            let mut store = SeenStore::open(&path).expect("open");
            store.insert("1001").expect("insert");
            store.insert("1002").expect("insert");
        }
        let store = SeenStore::open(&path).expect("reopen");
        assert_eq!(store.len(), 2);
        assert!(store.contains("1001"));
        assert!(store.contains("1002"));
        assert!(!store.contains("1003"));
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn legacy_import_skips_blank_and_known_ids() {
        let ids_path = temp_path("legacy.txt");
        std::fs::write(&ids_path, "7\n\n8\n  9  \n7\n").expect("write legacy file");

        let mut store = SeenStore::open_in_memory().expect("store");
        store.insert("8").expect("insert");

        let imported = store.import_legacy(&ids_path).expect("import");
        assert_eq!(imported, 2);
        assert_eq!(store.len(), 3);
        assert!(store.contains("7"));
        assert!(store.contains("9"));

        assert_eq!(store.import_legacy(&ids_path).expect("re-import"), 0);
        let _ = std::fs::remove_file(&ids_path);
    }

    #[test]
    fn missing_legacy_file_is_not_an_error() {
        let mut store = SeenStore::open_in_memory().expect("store");
        let imported = store
            .import_legacy(&temp_path("does-not-exist.txt"))
            .expect("import");
        assert_eq!(imported, 0);
    }

    #[test]
    fn snapshot_never_writes_back() {
        let path = temp_path("snapshot.db");
        {
            let mut store = SeenStore::open(&path).expect("open");
            store.insert("2001").expect("insert");
        }

        let mut snapshot = SeenStore::snapshot(&path).expect("snapshot");
        assert!(snapshot.contains("2001"));
        assert!(snapshot.insert("2002").expect("insert into snapshot"));
        assert!(snapshot.contains("2002"));
        assert_eq!(snapshot.len(), 2);
        drop(snapshot);

        let store = SeenStore::open(&path).expect("reopen");
        assert_eq!(store.len(), 1);
        assert!(!store.contains("2002"));
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn snapshot_of_missing_store_creates_nothing() {
        let path = temp_path("absent.db");
        let mut snapshot = SeenStore::snapshot(&path).expect("snapshot");
        assert!(snapshot.is_empty());
        snapshot.insert("1").expect("insert");
        assert!(!path.exists());
    }
}
