//! Persistent storage adapters.
//!
//! Implements [`PersistentStore`] for the two media the agent reads its
//! configuration from.
//!
//! - [`FileStore`] — a directory on a mounted filesystem. On the device the
//!   internal flash (SPIFFS) and the SD card (FAT) are both mounted into the
//!   VFS by ESP-IDF, so plain `std::fs` serves both targets.
//! - [`MemoryStore`] — an in-memory map for host tests and simulation.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reset mid-write leaves either the old or the new file.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::app::ports::PersistentStore;
use crate::error::StorageError;

/// Largest file either store accepts.
pub const MAX_FILE_SIZE: usize = 4096;

/// Mount point of the internal flash partition.
pub const FLASH_MOUNT: &str = "/spiffs";
/// Mount point of the SD card.
pub const SD_CARD_MOUNT: &str = "/sdcard";

// ───────────────────────────────────────────────────────────────
// FileStore
// ───────────────────────────────────────────────────────────────

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("FileStore: rooted at {}", root.display());
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn map_io(e: &std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::Io,
    }
}

impl PersistentStore for FileStore {
    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        let path = self.path(name);
        let meta = fs::metadata(&path).map_err(|e| map_io(&e))?;
        if meta.len() > MAX_FILE_SIZE as u64 {
            warn!("FileStore: {} is {} bytes, refusing", path.display(), meta.len());
            return Err(StorageError::TooLarge);
        }
        fs::read(&path).map_err(|e| map_io(&e))
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        if data.len() > MAX_FILE_SIZE {
            return Err(StorageError::TooLarge);
        }
        let path = self.path(name);
        let staging = path.with_extension("tmp");
        fs::write(&staging, data).map_err(|e| map_io(&e))?;
        fs::rename(&staging, &path).map_err(|e| {
            warn!("FileStore: rename into {} failed: {e}", path.display());
            StorageError::Io
        })?;
        debug!("FileStore: wrote {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn delete_file(&mut self, name: &str) -> Result<(), StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        fs::remove_file(self.path(name)).map_err(|e| map_io(&e))
    }
}

// ───────────────────────────────────────────────────────────────
// MemoryStore
// ───────────────────────────────────────────────────────────────

/// In-memory store. Can be marked unavailable to model a missing card.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    files: HashMap<String, Vec<u8>>,
    available: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            available: true,
        }
    }

    /// Store pre-populated with one file.
    pub fn with_file(name: &str, data: &[u8]) -> Self {
        let mut store = Self::new();
        store.files.insert(name.to_owned(), data.to_vec());
        store
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl PersistentStore for MemoryStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        self.files.get(name).cloned().ok_or(StorageError::NotFound)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        if data.len() > MAX_FILE_SIZE {
            return Err(StorageError::TooLarge);
        }
        self.files.insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete_file(&mut self, name: &str) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        self.files.remove(name).map(|_| ()).ok_or(StorageError::NotFound)
    }
}
