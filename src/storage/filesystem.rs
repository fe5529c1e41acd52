// SPDX-License-Identifier: MIT
//! Directory-backed resource storage

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use memmap2::Mmap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ResourceStorage;
use crate::config::FileStorageConfig;
use crate::error::{Error, Result};

/// Resource storage keeping one file per key inside a directory.
///
/// Every write goes to its own temporary file which is then renamed over the
/// target, so concurrent writes of different keys share no file handle and a
/// reader never observes a half-written resource.
#[derive(Clone)]
pub struct FileResourceStorage {
    root: PathBuf,
    durable_writes: bool,
    memory_map: bool,
    // Directories known to exist, shared with sub-directories
    created_dirs: Arc<DashSet<PathBuf>>,
}

impl FileResourceStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(FileStorageConfig::new(root))
    }

    pub fn with_config(config: FileStorageConfig) -> Self {
        Self {
            root: config.root,
            durable_writes: config.durable_writes,
            memory_map: config.memory_map,
            created_dirs: Arc::new(DashSet::new()),
        }
    }

    /// Create a storage rooted at `root` behind the storage port
    pub fn create(root: impl Into<PathBuf>) -> Arc<dyn ResourceStorage> {
        Arc::new(Self::new(root))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn ensure_dir(&self, dir: &Path) -> std::io::Result<()> {
        if self.created_dirs.contains(dir) {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        self.created_dirs.insert(dir.to_path_buf());
        Ok(())
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        self.ensure_dir(dir)?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            if self.durable_writes {
                file.sync_all()?;
            }
            fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            warn!("Failed to write resource file {:?}: {}", path, e);
            // Best effort cleanup
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if self.durable_writes {
            match File::open(dir) {
                Ok(dir_file) => {
                    if let Err(e) = dir_file.sync_all() {
                        warn!("Failed to sync directory after rename: {}", e);
                    }
                }
                Err(e) => warn!("Failed to open directory for sync: {}", e),
            }
        }
        Ok(())
    }

    fn read_file(&self, path: &Path) -> std::io::Result<Bytes> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Bytes::new());
        }
        if !self.memory_map {
            return fs::read(path).map(Bytes::from);
        }
        // SAFETY: resource files are never modified in place; writes replace
        // them by renaming a new file over the old one, which leaves existing
        // mappings of the old file intact.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Bytes::from_owner(map))
    }
}

impl std::fmt::Debug for FileResourceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResourceStorage")
            .field("root", &self.root)
            .field("durable_writes", &self.durable_writes)
            .field("memory_map", &self.memory_map)
            .finish()
    }
}

impl ResourceStorage for FileResourceStorage {
    fn read_resource(&self, key: &str) -> Result<Bytes> {
        let path = self.path(key);
        let data = self.read_file(&path).map_err(|e| Error::io(key, e))?;
        debug!(resource = key, size = data.len(), "read resource file {:?}", path);
        Ok(data)
    }

    fn write_resource(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path(key);
        debug!(resource = key, size = data.len(), "writing resource file {:?}", path);
        self.write_file(&path, &data).map_err(|e| Error::Io {
            resource: key.to_string(),
            source: e,
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    fn directory(&self, name: &str) -> Result<Arc<dyn ResourceStorage>> {
        Ok(Arc::new(Self {
            root: self.root.join(name),
            durable_writes: self.durable_writes,
            memory_map: self.memory_map,
            created_dirs: Arc::clone(&self.created_dirs),
        }))
    }
}
