//! Completion flags: the record of which fingerprints have been fully
//! processed.
//!
//! A flag is written only after every artifact for its fingerprint is in
//! place, and removing it is the supported way to force reprocessing. The
//! pipeline talks to the [`CompletionStore`] trait, so the flat marker
//! directory and the SQLite table are interchangeable.

mod file;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{CompletionBackend, PipelineConfig};
use crate::fingerprint::{Fingerprint, FingerprintError};

pub use file::FileCompletionStore;
pub use sqlite::{SqliteCompletionStore, SqliteCompletionStoreBuilder};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to open completion database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("completion store path not configured")]
    MissingStore,
    #[error(transparent)]
    InvalidFingerprint(#[from] FingerprintError),
}

pub type CompletionResult<T> = Result<T, CompletionError>;

pub trait CompletionStore: Send + Sync {
    fn exists(&self, fingerprint: &Fingerprint) -> CompletionResult<bool>;

    /// Records completion. Marking an already-marked fingerprint is a no-op.
    fn mark(&self, fingerprint: &Fingerprint) -> CompletionResult<()>;

    /// Removes a flag, returning whether one was present. Never called by the
    /// pipeline itself.
    fn unmark(&self, fingerprint: &Fingerprint) -> CompletionResult<bool>;

    fn list(&self) -> CompletionResult<Vec<Fingerprint>>;
}

/// Opens the backend selected in `[completion]`, creating it if needed.
pub fn open_store(config: &PipelineConfig) -> CompletionResult<Arc<dyn CompletionStore>> {
    let location = config.completion_location();
    match config.completion.backend {
        CompletionBackend::File => Ok(Arc::new(FileCompletionStore::open(location)?)),
        CompletionBackend::Sqlite => {
            if let Some(parent) = location.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CompletionError::Io {
                    source,
                    path: parent.to_path_buf(),
                })?;
            }
            let store = SqliteCompletionStore::builder().path(&location).build()?;
            store.initialize()?;
            Ok(Arc::new(store))
        }
    }
}

/// Opens the configured backend for reading only. Nothing is created on
/// disk; `None` means no flag has ever been written.
pub fn open_existing_store(
    config: &PipelineConfig,
) -> CompletionResult<Option<Arc<dyn CompletionStore>>> {
    let location = config.completion_location();
    if !location.exists() {
        return Ok(None);
    }
    let store: Arc<dyn CompletionStore> = match config.completion.backend {
        CompletionBackend::File => Arc::new(FileCompletionStore::existing(location)),
        CompletionBackend::Sqlite => Arc::new(
            SqliteCompletionStore::builder()
                .path(&location)
                .read_only(true)
                .build()?,
        ),
    };
    Ok(Some(store))
}
