//! Where configuration bytes come from.
//!
//! The engine only needs two things from a source: the current bytes, and a
//! cheap revision token the watcher can poll to notice that the bytes may
//! have changed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::SourceError;

/// Cheap change indicator for a source.
///
/// Equal revisions mean "probably unchanged"; the watcher still compares
/// content fingerprints before rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRevision {
    /// File metadata.
    File {
        modified: Option<SystemTime>,
        len: u64,
    },
    /// Monotonic version counter.
    Version(u64),
}

/// A configuration source.
pub trait ConfigSource: Send + Sync {
    /// Reads the full configuration document.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the bytes cannot be read.
    fn load(&self) -> Result<Vec<u8>, SourceError>;

    /// Current revision, if the source supports polling.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the revision cannot be read.
    fn revision(&self) -> Result<Option<SourceRevision>, SourceError> {
        Ok(None)
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// A configuration file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The configured path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: &std::io::Error) -> SourceError {
        SourceError::Io {
            location: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<Vec<u8>, SourceError> {
        fs::read(&self.path).map_err(|e| self.io_error(&e))
    }

    fn revision(&self) -> Result<Option<SourceRevision>, SourceError> {
        let meta = fs::metadata(&self.path).map_err(|e| self.io_error(&e))?;
        Ok(Some(SourceRevision::File {
            modified: meta.modified().ok(),
            len: meta.len(),
        }))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// In-memory configuration, replaceable at runtime.
#[derive(Debug)]
pub struct StaticSource {
    bytes: Mutex<Arc<[u8]>>,
    version: AtomicU64,
}

impl StaticSource {
    /// Creates a source holding `bytes`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: Mutex::new(Arc::from(bytes)),
            version: AtomicU64::new(1),
        }
    }

    /// Replaces the held bytes and bumps the version.
    pub fn replace(&self, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        let next: Arc<[u8]> = Arc::from(bytes);
        match self.bytes.lock() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Current version counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl ConfigSource for StaticSource {
    fn load(&self) -> Result<Vec<u8>, SourceError> {
        let guard = self.bytes.lock().map_err(|_| SourceError::Unavailable {
            message: "static source lock poisoned".to_string(),
        })?;
        Ok(guard.to_vec())
    }

    fn revision(&self) -> Result<Option<SourceRevision>, SourceError> {
        Ok(Some(SourceRevision::Version(self.version())))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for Arc<S> {
    fn load(&self) -> Result<Vec<u8>, SourceError> {
        (**self).load()
    }

    fn revision(&self) -> Result<Option<SourceRevision>, SourceError> {
        (**self).revision()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
