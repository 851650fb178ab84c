use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::fingerprint::Fingerprint;
use crate::sqlite::{configure_connection, configure_read_only};

use super::{CompletionError, CompletionResult, CompletionStore};

const COMPLETION_SCHEMA: &str = include_str!("../../../sql/completion.sql");

#[derive(Debug, Clone)]
pub struct SqliteCompletionStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteCompletionStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteCompletionStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CompletionResult<SqliteCompletionStore> {
        let path = self.path.ok_or(CompletionError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteCompletionStore {
            path,
            flags,
            read_only: self.read_only,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteCompletionStore {
    path: PathBuf,
    flags: OpenFlags,
    read_only: bool,
}

impl SqliteCompletionStore {
    pub fn builder() -> SqliteCompletionStoreBuilder {
        SqliteCompletionStoreBuilder::new()
    }

    fn open(&self) -> CompletionResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CompletionError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        let configured = if self.read_only {
            configure_read_only(&conn)
        } else {
            configure_connection(&conn)
        };
        configured.map_err(|source| CompletionError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CompletionResult<()> {
        let conn = self.open()?;
        conn.execute_batch(COMPLETION_SCHEMA)?;
        Ok(())
    }
}

impl CompletionStore for SqliteCompletionStore {
    fn exists(&self, fingerprint: &Fingerprint) -> CompletionResult<bool> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM completion_flags WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark(&self, fingerprint: &Fingerprint) -> CompletionResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO completion_flags(fingerprint) VALUES (?1)",
            params![fingerprint.as_str()],
        )?;
        Ok(())
    }

    fn unmark(&self, fingerprint: &Fingerprint) -> CompletionResult<bool> {
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM completion_flags WHERE fingerprint = ?1",
            params![fingerprint.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn list(&self) -> CompletionResult<Vec<Fingerprint>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT fingerprint FROM completion_flags ORDER BY fingerprint")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|text| Fingerprint::parse(text).map_err(CompletionError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use tempfile::TempDir;

    fn temp_store(dir: &Path) -> SqliteCompletionStore {
        let store = SqliteCompletionStore::builder()
            .path(dir.join("completion.sqlite"))
            .create_if_missing(true)
            .build()
            .expect("create store");
        store.initialize().expect("initialize store");
        store
    }

    #[test]
    fn mark_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(dir.path());
        let fp = fingerprint(b"video bytes");
        store.mark(&fp).unwrap();
        store.mark(&fp).unwrap();
        assert!(store.exists(&fp).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn unmark_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(dir.path());
        let fp = fingerprint(b"video bytes");
        assert!(!store.unmark(&fp).unwrap());
        store.mark(&fp).unwrap();
        assert!(store.unmark(&fp).unwrap());
        assert!(!store.exists(&fp).unwrap());
    }

    #[test]
    fn read_only_store_sees_flags_and_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let fp = fingerprint(b"video bytes");
        temp_store(dir.path()).mark(&fp).unwrap();

        let reader = SqliteCompletionStore::builder()
            .path(dir.path().join("completion.sqlite"))
            .read_only(true)
            .build()
            .unwrap();
        assert!(reader.exists(&fp).unwrap());
        assert!(reader.mark(&fingerprint(b"other")).is_err());
    }

    #[test]
    fn read_only_store_never_creates_the_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.sqlite");
        let reader = SqliteCompletionStore::builder()
            .path(&path)
            .read_only(true)
            .build()
            .unwrap();
        assert!(reader.exists(&fingerprint(b"x")).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn builder_requires_path() {
        let err = SqliteCompletionStore::builder().build().unwrap_err();
        assert!(matches!(err, CompletionError::MissingStore));
    }
}
