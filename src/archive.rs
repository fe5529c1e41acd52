// SPDX-License-Identifier: MIT
//! Archive open and build protocol
//!
//! An archive is a named set of resources sharing one storage. Generated code
//! describes it with a static [`ResourceSpec`] table and implements
//! [`Archive`] (reading) and [`ArchiveBuilder`] (writing) on top of
//! [`ArchiveReader`] and [`ArchiveWriter`].
//!
//! Opening validates, in order:
//! 1. the signature `<Archive>.archive` (present and 16 bytes long),
//! 2. the archive schema `<Archive>.archive.schema`,
//! 3. the `.schema` of every declared resource, tolerating absent optional ones.
//!
//! Any mismatch rejects the archive; nothing is written while opening.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::format::{self, ResourceKind};
use crate::memory::MemoryDescriptor;
use crate::multivector::{MultiArrayView, MultiVectorBuilder, VariadicStruct};
use crate::storage::{ResourceStorage, ResourceStorageExt};
use crate::structs::{InstanceView, Struct, StructRef};
use crate::vector::{ArrayView, ExternalVector, Vector};

/// Static description of one resource of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: &'static str,
    /// Schema persisted next to the resource; the full schema of the
    /// sub-archive for [`ResourceKind::Archive`]
    pub schema: &'static str,
    pub kind: ResourceKind,
    pub optional: bool,
}

impl ResourceSpec {
    pub const fn new(name: &'static str, schema: &'static str, kind: ResourceKind) -> Self {
        Self {
            name,
            schema,
            kind,
            optional: false,
        }
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A readable archive type
pub trait Archive: Sized {
    const NAME: &'static str;
    const SCHEMA: &'static str;
    const RESOURCES: &'static [ResourceSpec];

    /// Validate `storage` and load every declared resource.
    ///
    /// Signature failures are reported as:
    /// - [`Error::NotFound`] when `<NAME>.archive` is absent, so an optional
    ///   sub-archive can be told apart from a broken one,
    /// - [`Error::SchemaMismatch`] when the signature is not 16 bytes long or
    ///   `<NAME>.archive.schema` differs from [`SCHEMA`](Self::SCHEMA).
    ///
    /// A missing mandatory resource is [`Error::NotFound`] as well.
    fn open(storage: Arc<dyn ResourceStorage>) -> Result<Self>;
}

/// A writer for an archive type
pub trait ArchiveBuilder: Sized {
    type Archive: Archive;

    /// Start or resume building the archive in `storage`
    fn new(storage: Arc<dyn ResourceStorage>) -> Result<Self>;
}

/// Treat a missing resource as absent; every other error stays fatal
pub fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn find_spec(
    archive: &str,
    resources: &'static [ResourceSpec],
    name: &str,
    kind: ResourceKind,
) -> Result<&'static ResourceSpec> {
    let spec = resources
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| Error::Misuse(format!("archive {archive} declares no resource {name}")))?;
    if spec.kind != kind {
        return Err(Error::Misuse(format!(
            "resource {name} of archive {archive} is a {}, not a {}",
            spec.kind.name(),
            kind.name()
        )));
    }
    Ok(spec)
}

/// Validated read access to the resources of an archive
pub struct ArchiveReader {
    storage: Arc<dyn ResourceStorage>,
    name: &'static str,
    resources: &'static [ResourceSpec],
}

impl ArchiveReader {
    /// Check signature and schemas of archive `A` in `storage`.
    ///
    /// A missing signature is reported as [`Error::NotFound`] so that optional
    /// sub-archives can be told apart from broken ones.
    pub fn open<A: Archive>(storage: Arc<dyn ResourceStorage>) -> Result<Self> {
        let signature_key = format::signature_key(A::NAME);
        let signature = storage.read_resource(&signature_key)?;
        if signature.len() != format::SIGNATURE_SIZE {
            warn!(archive = A::NAME, size = signature.len(), "invalid archive signature");
            return Err(Error::SchemaMismatch {
                resource: signature_key,
                expected: format!("{}-byte signature", format::SIGNATURE_SIZE),
                actual: format!("{} bytes", signature.len()),
            });
        }
        storage.check_schema(&signature_key, A::SCHEMA)?;

        for spec in A::RESOURCES {
            if spec.kind == ResourceKind::Archive {
                continue;
            }
            match check_resource_schema(&storage, spec) {
                Ok(()) => {}
                Err(e) if spec.optional && e.is_not_found() => {
                    debug!(archive = A::NAME, resource = spec.name, "optional resource absent");
                }
                Err(e) => return Err(e),
            }
        }

        info!(archive = A::NAME, "archive opened");
        Ok(Self {
            storage,
            name: A::NAME,
            resources: A::RESOURCES,
        })
    }

    pub fn storage(&self) -> &Arc<dyn ResourceStorage> {
        &self.storage
    }

    fn spec(&self, name: &str, kind: ResourceKind) -> Result<&'static ResourceSpec> {
        find_spec(self.name, self.resources, name, kind)
    }

    pub fn instance<T: Struct>(&self, name: &str) -> Result<InstanceView<T>> {
        self.spec(name, ResourceKind::Instance)?;
        InstanceView::new(name, self.storage.read(name)?)
    }

    pub fn vector<T: Struct>(&self, name: &str) -> Result<ArrayView<T>> {
        self.spec(name, ResourceKind::Vector)?;
        ArrayView::new(name, self.storage.read(name)?)
    }

    pub fn multivector<V: VariadicStruct>(&self, name: &str) -> Result<MultiArrayView<V>> {
        self.spec(name, ResourceKind::Multivector)?;
        let data = self.storage.read(name)?;
        let index_name = format::index_name(name);
        let index = ArrayView::new(&index_name, self.storage.read(&index_name)?)?;
        MultiArrayView::new(name, index, data)
    }

    /// Payload of a raw data resource; borrow it with [`MemoryDescriptor::from`]
    pub fn raw_data(&self, name: &str) -> Result<Bytes> {
        self.spec(name, ResourceKind::RawData)?;
        self.storage.read(name)
    }

    /// Open the sub-archive stored under `name`
    pub fn archive<B: Archive>(&self, name: &str) -> Result<B> {
        let spec = self.spec(name, ResourceKind::Archive)?;
        if spec.schema != B::SCHEMA {
            return Err(Error::Misuse(format!(
                "resource {name} of archive {} does not hold a {}",
                self.name,
                B::NAME
            )));
        }
        B::open(self.storage.directory(name)?)
    }
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("name", &self.name)
            .field("resources", &self.resources.len())
            .finish()
    }
}

fn check_resource_schema(storage: &Arc<dyn ResourceStorage>, spec: &ResourceSpec) -> Result<()> {
    storage.check_schema(spec.name, spec.schema)?;
    if spec.kind == ResourceKind::Multivector {
        storage.check_schema(
            &format::index_name(spec.name),
            &format::index_schema(spec.schema),
        )?;
    }
    Ok(())
}

/// Write access to the resources of an archive.
///
/// Every resource can be written once. A writer created on an archive that
/// already exists only accepts sub-archives.
pub struct ArchiveWriter {
    storage: Arc<dyn ResourceStorage>,
    name: &'static str,
    resources: &'static [ResourceSpec],
    resumed: bool,
}

impl ArchiveWriter {
    /// Initialize archive `A` in `storage`, or resume an existing one with the
    /// same schema.
    pub fn create<A: Archive>(storage: Arc<dyn ResourceStorage>) -> Result<Self> {
        let signature_key = format::signature_key(A::NAME);
        let resumed = storage.exists(&signature_key);
        if resumed {
            storage.check_schema(&signature_key, A::SCHEMA)?;
            debug!(archive = A::NAME, "resuming existing archive");
        } else {
            storage.write_resource(&signature_key, Bytes::copy_from_slice(&format::signature()))?;
            storage.write_schema(&signature_key, A::SCHEMA)?;
            for spec in A::RESOURCES {
                match spec.kind {
                    ResourceKind::Archive => {}
                    ResourceKind::Multivector => {
                        storage.write_schema(spec.name, spec.schema)?;
                        storage.write_schema(
                            &format::index_name(spec.name),
                            &format::index_schema(spec.schema),
                        )?;
                    }
                    _ => storage.write_schema(spec.name, spec.schema)?,
                }
            }
            info!(archive = A::NAME, "archive created");
        }
        Ok(Self {
            storage,
            name: A::NAME,
            resources: A::RESOURCES,
            resumed,
        })
    }

    pub fn storage(&self) -> &Arc<dyn ResourceStorage> {
        &self.storage
    }

    fn writable(&self, name: &str, kind: ResourceKind) -> Result<&'static ResourceSpec> {
        let spec = find_spec(self.name, self.resources, name, kind)?;
        if self.resumed {
            return Err(Error::Misuse(format!(
                "archive {} already exists; only sub-archives can be added",
                self.name
            )));
        }
        if self.storage.exists(name) {
            return Err(Error::Misuse(format!(
                "resource {name} of archive {} is already written",
                self.name
            )));
        }
        Ok(spec)
    }

    pub fn set_instance<T: Struct>(&self, name: &str, value: StructRef<'_, T>) -> Result<()> {
        let spec = self.writable(name, ResourceKind::Instance)?;
        self.storage.write(name, value.as_bytes(), spec.schema)
    }

    pub fn set_vector<T: Struct>(&self, name: &str, vector: &Vector<T>) -> Result<()> {
        let spec = self.writable(name, ResourceKind::Vector)?;
        self.storage.write(name, vector.as_bytes(), spec.schema)
    }

    pub fn set_raw_data<'a>(&self, name: &str, data: impl Into<MemoryDescriptor<'a>>) -> Result<()> {
        let spec = self.writable(name, ResourceKind::RawData)?;
        self.storage.write(name, data.into().as_bytes(), spec.schema)
    }

    pub fn start_vector<T: Struct>(&self, name: &str) -> Result<ExternalVector<T>> {
        let spec = self.writable(name, ResourceKind::Vector)?;
        Ok(self.storage.create_external_vector(name, spec.schema))
    }

    pub fn start_multivector<V: VariadicStruct>(&self, name: &str) -> Result<MultiVectorBuilder<V>> {
        let spec = self.writable(name, ResourceKind::Multivector)?;
        Ok(self.storage.create_multivector_builder(name, spec.schema))
    }

    /// Builder of the sub-archive stored under `name`
    pub fn archive<B: ArchiveBuilder>(&self, name: &str) -> Result<B> {
        let spec = find_spec(self.name, self.resources, name, ResourceKind::Archive)?;
        if spec.schema != B::Archive::SCHEMA {
            return Err(Error::Misuse(format!(
                "resource {name} of archive {} does not hold a {}",
                self.name,
                B::Archive::NAME
            )));
        }
        B::new(self.storage.directory(name)?)
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("name", &self.name)
            .field("resumed", &self.resumed)
            .finish()
    }
}
