// SPDX-License-Identifier: MIT
use std::path::PathBuf;

/// Settings of the file-backed resource storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStorageConfig {
    pub root: PathBuf,
    /// fsync every resource file and its directory after writing
    pub durable_writes: bool,
    /// Serve reads from read-only memory maps instead of heap copies
    pub memory_map: bool,
}

impl FileStorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            durable_writes: false,
            memory_map: true,
        }
    }

    pub fn from_env() -> Self {
        Self {
            root: std::env::var("FLATDATA_ARCHIVE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./archive")),
            durable_writes: std::env::var("FLATDATA_DURABLE_WRITES")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(false),
            memory_map: std::env::var("FLATDATA_MEMORY_MAP")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(true),
        }
    }

    pub fn with_durable_writes(mut self, durable_writes: bool) -> Self {
        self.durable_writes = durable_writes;
        self
    }

    pub fn with_memory_map(mut self, memory_map: bool) -> Self {
        self.memory_map = memory_map;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("FLATDATA_ARCHIVE_ROOT cannot be empty".to_string());
        }

        if self.root.exists() && !self.root.is_dir() {
            return Err(format!(
                "FLATDATA_ARCHIVE_ROOT {} is not a directory",
                self.root.display()
            ));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
