// Key-value storage backends for the persisted task list

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const CURRENT_VERSION: u32 = 1;

/// Name of the store directory created under the configured path
pub const STORE_DIR: &str = ".tasklist";

/// Durable string-to-string storage
///
/// `get` returning `Ok(None)` means the key was never written, not an error.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Which backend to persist through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    File,
    /// Not durable; library and test use only
    #[value(skip)]
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::File => write!(f, "file"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

/// Open the chosen backend rooted at `path`
///
/// On-disk backends live in a `.tasklist` subdirectory of `path`.
pub fn open_backend<P: AsRef<Path>>(backend: Backend, path: P) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match backend {
        Backend::Sqlite => Arc::new(SqliteKv::open(prepare_store_dir(path)?)?),
        Backend::File => Arc::new(FileKv::open(prepare_store_dir(path)?)?),
        Backend::Memory => Arc::new(MemoryKv::new()),
    };
    info!(%backend, "Opened key-value backend");
    Ok(store)
}

/// Create `<path>/.tasklist` with its `.gitignore` and `.version` files
pub fn prepare_store_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let base_path = path.as_ref().join(STORE_DIR);
    fs::create_dir_all(&base_path).context("Failed to create store directory")?;

    let gitignore_path = base_path.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(
            gitignore_path,
            "tasklist.db\ntasklist.db-shm\ntasklist.db-wal\nkv/.lock\nkv/*.tmp\n",
        )?;
    }

    let version_path = base_path.join(".version");
    if !version_path.exists() {
        fs::write(version_path, CURRENT_VERSION.to_string())?;
    }

    Ok(base_path)
}

// ============================================================================
// SQLite
// ============================================================================

/// Keys stored as rows of a single SQLite table
pub struct SqliteKv {
    db: Mutex<Connection>,
}

impl SqliteKv {
    /// Open or create `tasklist.db` inside `base_path`
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let db_path = base_path.as_ref().join("tasklist.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    /// Wrap an existing connection, creating the schema if needed
    pub fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating key-value schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| eyre!("SQLite connection lock poisoned"))
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        let value = db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, now_ms()],
        )
        .context("Failed to write key")?;
        Ok(())
    }
}

// ============================================================================
// File per key
// ============================================================================

/// One file per key in a `kv/` directory, replaced atomically on write
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let dir = base_path.as_ref().join("kv");
        fs::create_dir_all(&dir).context("Failed to create kv directory")?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join(".lock"))
            .context("Failed to open lock file")?;

        // Acquire exclusive lock before writing
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).context("Failed to create temp file")?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path).context("Failed to replace value file")?;

        // Lock is automatically released when file is dropped
        Ok(())
    }
}

/// Map a key onto a safe file stem: alphanumerics, `-` and `_` pass through,
/// every other byte becomes `%XX`
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

// ============================================================================
// In memory
// ============================================================================

/// Process-local storage
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get` calls fail (or succeed again)
    #[cfg(test)]
    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `set` calls fail (or succeed again)
    #[cfg(test)]
    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw value directly, bypassing failure injection
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .expect("memory store lock poisoned")
            .insert(key.to_string(), value.to_string());
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(eyre!("Read of {} rejected", key));
        }
        let values = self.values.lock().map_err(|_| eyre!("Memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(eyre!("Write to {} rejected", key));
        }
        let mut values = self.values.lock().map_err(|_| eyre!("Memory store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// Helper function for timestamps
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_store_dir_creates_files() {
        let temp = TempDir::new().unwrap();

        let base = prepare_store_dir(temp.path()).unwrap();
        assert_eq!(base, temp.path().join(".tasklist"));
        assert!(base.join(".gitignore").exists());
        assert_eq!(fs::read_to_string(base.join(".version")).unwrap(), "1");
    }

    #[test]
    fn test_sqlite_get_absent() {
        let temp = TempDir::new().unwrap();
        let kv = SqliteKv::open(temp.path()).unwrap();

        assert_eq!(kv.get("@tasks").unwrap(), None);
    }

    #[test]
    fn test_sqlite_set_overwrites() {
        let temp = TempDir::new().unwrap();
        let kv = SqliteKv::open(temp.path()).unwrap();

        kv.set("@tasks", "[]").unwrap();
        kv.set("@tasks", "[1]").unwrap();
        assert_eq!(kv.get("@tasks").unwrap().as_deref(), Some("[1]"));
        assert!(temp.path().join("tasklist.db").exists());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let kv = SqliteKv::open(temp.path()).unwrap();
            kv.set("k", "v").unwrap();
        }
        let kv = SqliteKv::open(temp.path()).unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_kv_round_trip() {
        let temp = TempDir::new().unwrap();
        let kv = FileKv::open(temp.path()).unwrap();

        assert_eq!(kv.get("@tasks").unwrap(), None);
        kv.set("@tasks", r#"[{"text":"a"}]"#).unwrap();
        kv.set("@tasks", "[]").unwrap();
        assert_eq!(kv.get("@tasks").unwrap().as_deref(), Some("[]"));

        assert!(temp.path().join("kv/%40tasks.json").exists());
        assert!(!temp.path().join("kv/%40tasks.tmp").exists());
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("@tasks"), "%40tasks");
        assert_eq!(encode_key("my_key-1"), "my_key-1");
        assert_eq!(encode_key("../x"), "%2E%2E%2Fx");
    }

    #[test]
    fn test_memory_kv_fail_writes() {
        let kv = MemoryKv::new();
        kv.set("k", "1").unwrap();

        kv.set_fail_writes(true);
        assert!(kv.set("k", "2").is_err());
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("1"));

        kv.set_fail_writes(false);
        kv.set("k", "3").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_memory_kv_fail_reads() {
        let kv = MemoryKv::new();
        kv.insert_raw("k", "1");

        kv.set_fail_reads(true);
        assert!(kv.get("k").is_err());

        kv.set_fail_reads(false);
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_memory_backend_not_offered_on_cli() {
        use clap::ValueEnum;

        let names: Vec<String> = Backend::value_variants()
            .iter()
            .filter_map(|b| b.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["sqlite", "file"]);
    }

    #[test]
    fn test_open_backend_variants() {
        let temp = TempDir::new().unwrap();

        for backend in [Backend::Sqlite, Backend::File, Backend::Memory] {
            let kv = open_backend(backend, temp.path()).unwrap();
            kv.set("k", &backend.to_string()).unwrap();
            assert_eq!(kv.get("k").unwrap(), Some(backend.to_string()));
        }
    }
}
