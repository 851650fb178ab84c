use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::fingerprint::Fingerprint;

use super::{CompletionError, CompletionResult, CompletionStore};

/// One empty marker file per fingerprint in a flat directory.
#[derive(Debug, Clone)]
pub struct FileCompletionStore {
    root: PathBuf,
}

impl FileCompletionStore {
    pub fn open(root: impl AsRef<Path>) -> CompletionResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| CompletionError::Io {
            source,
            path: root.clone(),
        })?;
        Ok(Self { root })
    }

    /// Opens an existing flag directory without creating it. A missing
    /// directory reads as holding no flags.
    pub fn existing(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn flag_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }
}

impl CompletionStore for FileCompletionStore {
    fn exists(&self, fingerprint: &Fingerprint) -> CompletionResult<bool> {
        let path = self.flag_path(fingerprint);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CompletionError::Io { source, path }),
        }
    }

    fn mark(&self, fingerprint: &Fingerprint) -> CompletionResult<()> {
        if self.exists(fingerprint)? {
            return Ok(());
        }
        let path = self.flag_path(fingerprint);
        // Staged beside the target so the rename stays on one filesystem.
        let staged = NamedTempFile::new_in(&self.root).map_err(|source| CompletionError::Io {
            source,
            path: self.root.clone(),
        })?;
        staged
            .persist(&path)
            .map_err(|err| CompletionError::Io {
                source: err.error,
                path: path.clone(),
            })?;
        debug!(target: "completion", fingerprint = %fingerprint, "flag written");
        Ok(())
    }

    fn unmark(&self, fingerprint: &Fingerprint) -> CompletionResult<bool> {
        let path = self.flag_path(fingerprint);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CompletionError::Io { source, path }),
        }
    }

    fn list(&self) -> CompletionResult<Vec<Fingerprint>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CompletionError::Io {
                    source,
                    path: self.root.clone(),
                })
            }
        };
        let mut flags = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CompletionError::Io {
                source,
                path: self.root.clone(),
            })?;
            let name = entry.file_name();
            // Leftover staging files and foreign entries are not flags.
            if let Some(fingerprint) = name.to_str().and_then(|n| Fingerprint::parse(n).ok()) {
                flags.push(fingerprint);
            }
        }
        flags.sort();
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use tempfile::TempDir;

    #[test]
    fn mark_exists_unmark_cycle() {
        let dir = TempDir::new().unwrap();
        let store = FileCompletionStore::open(dir.path().join("flags")).unwrap();
        let fp = fingerprint(b"cat picture");

        assert!(!store.exists(&fp).unwrap());
        store.mark(&fp).unwrap();
        assert!(store.exists(&fp).unwrap());
        assert!(dir.path().join("flags").join(fp.as_str()).is_file());

        store.mark(&fp).unwrap();
        assert_eq!(store.list().unwrap(), vec![fp.clone()]);

        assert!(store.unmark(&fp).unwrap());
        assert!(!store.exists(&fp).unwrap());
        assert!(!store.unmark(&fp).unwrap());
    }

    #[test]
    fn flags_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let fp = fingerprint(b"durable");
        FileCompletionStore::open(dir.path()).unwrap().mark(&fp).unwrap();
        let reopened = FileCompletionStore::open(dir.path()).unwrap();
        assert!(reopened.exists(&fp).unwrap());
    }

    #[test]
    fn existing_store_reads_without_creating() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("flags");
        let store = FileCompletionStore::existing(&root);
        assert!(!store.exists(&fingerprint(b"anything")).unwrap());
        assert!(store.list().unwrap().is_empty());
        assert!(!root.exists());
    }

    #[test]
    fn list_ignores_foreign_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(".tmpXYZ"), b"").unwrap();
        fs::write(dir.path().join("README"), b"notes").unwrap();
        let fp = fingerprint(b"real");
        store.mark(&fp).unwrap();
        assert_eq!(store.list().unwrap(), vec![fp]);
    }
}
