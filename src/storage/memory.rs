// SPDX-License-Identifier: MIT
//! In-memory resource storage

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::ResourceStorage;
use crate::error::{Error, Result};

type Registry = Arc<RwLock<HashMap<String, Bytes>>>;

/// Process-lifetime resource storage backed by a shared map.
///
/// Sub-directories share the registry of their parent and prefix their keys
/// with `name/`.
#[derive(Clone, Default)]
pub struct MemoryResourceStorage {
    resources: Registry,
    prefix: String,
}

impl MemoryResourceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty storage behind the storage port
    pub fn create() -> Arc<dyn ResourceStorage> {
        Arc::new(Self::new())
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Keys visible from this storage, sorted, including those of sub-directories
    pub fn keys(&self) -> Vec<String> {
        let guard = self.resources.read();
        let mut keys: Vec<String> = guard
            .keys()
            .filter_map(|key| key.strip_prefix(&self.prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        keys
    }

    /// Total bytes held by the shared registry
    pub fn byte_count(&self) -> usize {
        self.resources.read().values().map(Bytes::len).sum()
    }
}

impl std::fmt::Debug for MemoryResourceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryResourceStorage")
            .field("prefix", &self.prefix)
            .field("resources", &self.resources.read().len())
            .finish()
    }
}

impl ResourceStorage for MemoryResourceStorage {
    fn read_resource(&self, key: &str) -> Result<Bytes> {
        let full_key = self.key(key);
        self.resources
            .read()
            .get(&full_key)
            .cloned()
            .ok_or_else(|| Error::not_found(full_key))
    }

    fn write_resource(&self, key: &str, data: Bytes) -> Result<()> {
        let full_key = self.key(key);
        debug!(resource = %full_key, size = data.len(), "storing resource in memory");
        // Only the registration is serialized
        self.resources.write().insert(full_key, data);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.resources.read().contains_key(&self.key(key))
    }

    fn directory(&self, name: &str) -> Result<Arc<dyn ResourceStorage>> {
        Ok(Arc::new(Self {
            resources: Arc::clone(&self.resources),
            prefix: format!("{}{}/", self.prefix, name),
        }))
    }
}
