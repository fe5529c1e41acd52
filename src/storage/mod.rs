// SPDX-License-Identifier: MIT
//! Named byte-resource storage
//!
//! [`ResourceStorage`] is the port every backend implements: a key to bytes map
//! with write-once-then-frozen entries. Typed access (framing, schemas, streaming
//! builders) lives in [`ResourceStorageExt`] so backends only provide the four
//! primitive operations.
//!
//! Backends must tolerate concurrent writes of *different* keys from
//! independent threads; the critical section is limited to registering the
//! finished bytes under their key.

mod filesystem;
mod memory;

pub use filesystem::FileResourceStorage;
pub use memory::MemoryResourceStorage;

use std::sync::Arc;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::format;
use crate::multivector::{MultiVectorBuilder, VariadicStruct};
use crate::structs::Struct;
use crate::vector::ExternalVector;

/// Port for physical resource storage
#[cfg_attr(test, automock)]
pub trait ResourceStorage: Send + Sync {
    /// Read the bytes stored under `key` exactly as written
    fn read_resource(&self, key: &str) -> Result<Bytes>;

    /// Store `data` under `key`, replacing a previous value
    fn write_resource(&self, key: &str, data: Bytes) -> Result<()>;

    /// Check if `key` holds a value
    fn exists(&self, key: &str) -> bool;

    /// Storage scoped to the sub-directory `name`; nothing is created until written
    fn directory(&self, name: &str) -> Result<Arc<dyn ResourceStorage>>;
}

/// Framed, schema-tagged access on top of [`ResourceStorage`]
pub trait ResourceStorageExt {
    /// Read the payload of resource `name`
    fn read(&self, name: &str) -> Result<Bytes>;

    /// Read the schema stored next to resource `name`
    fn read_schema(&self, name: &str) -> Result<String>;

    /// Frame and store `payload` as resource `name`, together with its schema
    fn write(&self, name: &str, payload: &[u8], schema: &str) -> Result<()>;

    /// Store only the schema of resource `name`
    fn write_schema(&self, name: &str, schema: &str) -> Result<()>;

    /// Fail with [`Error::SchemaMismatch`] unless the stored schema equals `expected`
    fn check_schema(&self, name: &str, expected: &str) -> Result<()>;

    /// Start streaming a vector resource
    fn create_external_vector<T: Struct>(&self, name: &str, schema: &str) -> ExternalVector<T>;

    /// Start streaming a multivector resource and its index
    fn create_multivector_builder<V: VariadicStruct>(
        &self,
        name: &str,
        schema: &str,
    ) -> MultiVectorBuilder<V>;
}

impl ResourceStorageExt for Arc<dyn ResourceStorage> {
    fn read(&self, name: &str) -> Result<Bytes> {
        let data = self.read_resource(name)?;
        format::decode_bytes(name, &data)
    }

    fn read_schema(&self, name: &str) -> Result<String> {
        let key = format::schema_key(name);
        let data = self.read_resource(&key)?;
        String::from_utf8(data.to_vec()).map_err(|e| Error::SchemaMismatch {
            resource: key,
            expected: "UTF-8 schema".to_string(),
            actual: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    fn write(&self, name: &str, payload: &[u8], schema: &str) -> Result<()> {
        // Framing happens before the backend's critical section
        let framed = Bytes::from(format::encode(payload));
        self.write_resource(name, framed)?;
        self.write_schema(name, schema)
    }

    fn write_schema(&self, name: &str, schema: &str) -> Result<()> {
        self.write_resource(
            &format::schema_key(name),
            Bytes::copy_from_slice(schema.as_bytes()),
        )
    }

    fn check_schema(&self, name: &str, expected: &str) -> Result<()> {
        let actual = self.read_schema(name)?;
        if actual != expected {
            warn!(resource = name, "schema does not match software expectations");
            return Err(Error::SchemaMismatch {
                resource: format::schema_key(name),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn create_external_vector<T: Struct>(&self, name: &str, schema: &str) -> ExternalVector<T> {
        ExternalVector::new(Arc::clone(self), name, schema)
    }

    fn create_multivector_builder<V: VariadicStruct>(
        &self,
        name: &str,
        schema: &str,
    ) -> MultiVectorBuilder<V> {
        MultiVectorBuilder::new(Arc::clone(self), name, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Arc<dyn ResourceStorage> {
        MemoryResourceStorage::create()
    }

    #[test]
    fn test_write_frames_payload_and_schema() {
        let storage = storage();
        storage.write("raw", b"abc", "raw_data").unwrap();

        let stored = storage.read_resource("raw").unwrap();
        assert_eq!(stored.len(), 8 + 3 + 8);
        assert_eq!(&stored[..8], &3u64.to_le_bytes());
        assert_eq!(storage.read("raw").unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(storage.read_schema("raw").unwrap(), "raw_data");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let storage = storage();
        assert!(storage.read("missing").unwrap_err().is_not_found());
        assert!(storage.read_schema("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_check_schema_exact_match() {
        let storage = storage();
        storage.write("r", b"", "struct A { x : u8 : 8; }").unwrap();
        assert!(storage.check_schema("r", "struct A { x : u8 : 8; }").is_ok());

        let err = storage
            .check_schema("r", "struct A { x : u8 : 7; }")
            .unwrap_err();
        match err {
            Error::SchemaMismatch {
                resource,
                expected,
                actual,
            } => {
                assert_eq!(resource, "r.schema");
                assert_eq!(expected, "struct A { x : u8 : 7; }");
                assert_eq!(actual, "struct A { x : u8 : 8; }");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_utf8_schema_is_mismatch() {
        let storage = storage();
        storage
            .write_resource("r.schema", Bytes::from_static(&[0xFF, 0xFE]))
            .unwrap();
        assert!(matches!(
            storage.read_schema("r"),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_mock_storage_errors_propagate() {
        let mut mock = MockResourceStorage::new();
        mock.expect_read_resource()
            .withf(|key| key == "broken")
            .times(1)
            .returning(|key| {
                Err(Error::io(
                    key,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ))
            });
        let storage: Arc<dyn ResourceStorage> = Arc::new(mock);

        assert!(matches!(storage.read("broken"), Err(Error::Io { .. })));
    }
}
