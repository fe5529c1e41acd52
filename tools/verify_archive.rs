use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use flatdata::format::{self, SIGNATURE_SIZE};
use flatdata::{
    ArrayView, FileResourceStorage, FileStorageConfig, IndexType40, ResourceStorage,
    ResourceStorageExt,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Check the framing and schemas of every resource in an archive directory
#[derive(Parser)]
struct Cli {
    /// Archive directory; defaults to FLATDATA_ARCHIVE_ROOT
    dir: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = FileStorageConfig::from_env();
    if let Some(dir) = cli.dir {
        config.root = dir;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    if !config.root.is_dir() {
        bail!("{} is not an archive directory", config.root.display());
    }

    let root = config.root.clone();
    let storage: Arc<dyn ResourceStorage> = Arc::new(FileResourceStorage::with_config(config));

    let mut keys = Vec::new();
    collect_keys(&root, "", &mut keys)
        .with_context(|| format!("failed to list {}", root.display()))?;
    keys.sort();

    let mut problems = 0;
    for key in &keys {
        match verify(&storage, key) {
            Ok(()) => debug!("{key}: ok"),
            Err(e) => {
                error!("{key}: {e}");
                problems += 1;
            }
        }
    }

    println!("Resources checked: {}", keys.len());
    println!("Problems found: {problems}");
    if problems > 0 {
        bail!("{problems} of {} resources failed verification", keys.len());
    }
    info!("archive at {} is consistent", root.display());
    Ok(())
}

/// Storage keys of all resources below `dir`, schemas and temporary files excluded
fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.ends_with(format::SCHEMA_SUFFIX) {
            continue;
        }
        let key = format!("{prefix}{name}");
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &format!("{key}/"), keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}

fn verify(storage: &Arc<dyn ResourceStorage>, key: &str) -> anyhow::Result<()> {
    if let Some(archive) = key.strip_suffix(format::ARCHIVE_SUFFIX) {
        let signature = storage.read_resource(key)?;
        if signature.len() != SIGNATURE_SIZE {
            bail!(
                "signature has {} bytes, expected {SIGNATURE_SIZE}",
                signature.len()
            );
        }
        storage
            .read_resource(&format::archive_schema_key(archive))
            .context("archive schema missing")?;
        return Ok(());
    }

    let payload = storage.read(key)?;
    let schema = storage.read_schema(key).context("schema missing")?;
    debug!(resource = key, size = payload.len(), "framing ok");

    if let Some(data_key) = key.strip_suffix(format::INDEX_SUFFIX) {
        if schema.starts_with("index(") {
            let index = ArrayView::<IndexType40>::new(key, payload)?;
            let data = storage.read(data_key)?;
            check_index(&index, data.len())?;
        }
    }
    Ok(())
}

fn check_index(index: &ArrayView<IndexType40>, data_len: usize) -> anyhow::Result<()> {
    let offsets: Vec<u64> = index
        .iter()
        .map(|entry| entry.get(IndexType40::VALUE))
        .collect();
    let Some(&sentinel) = offsets.last() else {
        bail!("index holds no sentinel entry");
    };
    if let Some(pair) = offsets.windows(2).find(|pair| pair[0] > pair[1]) {
        bail!("offsets decrease from {} to {}", pair[0], pair[1]);
    }
    if sentinel != data_len as u64 {
        bail!("sentinel {sentinel} does not match data size {data_len}");
    }
    Ok(())
}
