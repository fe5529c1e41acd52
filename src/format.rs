// SPDX-License-Identifier: MIT
//! Resource framing and storage key conventions
//!
//! Every resource, whatever its kind, is stored with the same envelope:
//!
//! ```text
//! [0..8)                      payload size in bytes (u64, little-endian)
//! [8..8+size)                 payload
//! [8+size..8+size+8)          zero padding
//! ```
//!
//! The padding lets bit-field reads load whole words starting anywhere inside
//! the payload without touching memory past the end of the resource.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Bytes used by the payload size prefix
pub const SIZE_PREFIX_BYTES: usize = 8;

/// Zero bytes written after every payload
pub const PADDING_SIZE: usize = 8;

/// Width of the archive signature: the framing of an empty payload
pub const SIGNATURE_SIZE: usize = SIZE_PREFIX_BYTES + PADDING_SIZE;

/// Suffix of the schema resource stored next to each resource
pub const SCHEMA_SUFFIX: &str = ".schema";

/// Suffix of the archive signature resource
pub const ARCHIVE_SUFFIX: &str = ".archive";

/// Suffix of a multivector's index resource
pub const INDEX_SUFFIX: &str = "_index";

/// The kinds of resources an archive can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Exactly one struct
    Instance,

    /// Fixed-stride array of one struct type
    Vector,

    /// Tagged heterogeneous lists plus an index resource
    Multivector,

    /// Uninterpreted bytes
    RawData,

    /// A nested archive stored in its own sub-storage
    Archive,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::Vector => "vector",
            ResourceKind::Multivector => "multivector",
            ResourceKind::RawData => "raw_data",
            ResourceKind::Archive => "archive",
        }
    }
}

/// The size prefix of a framed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHeader {
    pub payload_size: u64,
}

impl ResourceHeader {
    pub fn new(payload_size: usize) -> Self {
        Self {
            payload_size: payload_size as u64,
        }
    }

    /// Parse the header of `data`, checking that payload and padding fit
    pub fn from_bytes(resource: &str, data: &[u8]) -> Result<Self> {
        let prefix: [u8; SIZE_PREFIX_BYTES] = data
            .get(..SIZE_PREFIX_BYTES)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                Error::size_mismatch(
                    resource,
                    format!(
                        "resource of {} bytes is shorter than the {SIZE_PREFIX_BYTES}-byte size prefix",
                        data.len()
                    ),
                )
            })?;
        let header = Self {
            payload_size: u64::from_le_bytes(prefix),
        };
        header.validate(resource, data.len())?;
        Ok(header)
    }

    /// Check that a resource of `total_len` bytes holds the payload and padding
    pub fn validate(&self, resource: &str, total_len: usize) -> Result<()> {
        let required = self
            .payload_size
            .checked_add((SIZE_PREFIX_BYTES + PADDING_SIZE) as u64)
            .ok_or_else(|| Error::size_mismatch(resource, "payload size overflows"))?;
        if (total_len as u64) < required {
            return Err(Error::size_mismatch(
                resource,
                format!(
                    "payload of {} bytes needs {required} framed bytes, found {total_len}",
                    self.payload_size
                ),
            ));
        }
        Ok(())
    }

    pub fn payload_range(&self) -> std::ops::Range<usize> {
        SIZE_PREFIX_BYTES..SIZE_PREFIX_BYTES + self.payload_size as usize
    }

    /// Write the header directly to a buffer
    #[inline]
    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.payload_size.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; SIZE_PREFIX_BYTES] {
        self.payload_size.to_le_bytes()
    }
}

/// Total framed size of a payload of `payload_len` bytes
#[inline]
pub const fn framed_len(payload_len: usize) -> usize {
    SIZE_PREFIX_BYTES + payload_len + PADDING_SIZE
}

/// Frame `payload` into a freshly allocated buffer
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(framed_len(payload.len()));
    encode_into(payload, &mut buffer);
    buffer
}

/// Append the framing of `payload` to `buffer`
pub fn encode_into(payload: &[u8], buffer: &mut Vec<u8>) {
    buffer.reserve(framed_len(payload.len()));
    ResourceHeader::new(payload.len()).write_to_buffer(buffer);
    buffer.extend_from_slice(payload);
    buffer.extend_from_slice(&[0; PADDING_SIZE]);
}

/// Return the payload of a framed resource
pub fn decode<'a>(resource: &str, data: &'a [u8]) -> Result<&'a [u8]> {
    let header = ResourceHeader::from_bytes(resource, data)?;
    Ok(&data[header.payload_range()])
}

/// Return the payload of a framed resource without copying
pub fn decode_bytes(resource: &str, data: &Bytes) -> Result<Bytes> {
    let header = ResourceHeader::from_bytes(resource, data)?;
    Ok(data.slice(header.payload_range()))
}

/// The signature written for every archive
pub fn signature() -> [u8; SIGNATURE_SIZE] {
    [0; SIGNATURE_SIZE]
}

/// Key of the schema stored next to `resource`
pub fn schema_key(resource: &str) -> String {
    format!("{resource}{SCHEMA_SUFFIX}")
}

/// Key of the signature of archive `archive`
pub fn signature_key(archive: &str) -> String {
    format!("{archive}{ARCHIVE_SUFFIX}")
}

/// Key of the schema of archive `archive`
pub fn archive_schema_key(archive: &str) -> String {
    schema_key(&signature_key(archive))
}

/// Name of the index resource of multivector `resource`
pub fn index_name(resource: &str) -> String {
    format!("{resource}{INDEX_SUFFIX}")
}

/// Schema of the index resource of a multivector with schema `schema`
pub fn index_schema(schema: &str) -> String {
    format!("index({schema})")
}
