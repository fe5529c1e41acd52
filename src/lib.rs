// SPDX-License-Identifier: MIT
//! # flatdata
//!
//! Zero-copy, write-once binary archives of bit-packed structs.
//!
//! An archive is a set of named resources kept in a [`ResourceStorage`]: an
//! in-memory map or a directory of files. Every resource is stored together
//! with its schema string, and opening an archive compares each stored schema
//! with the schema compiled into the reading software before any data is
//! exposed.
//!
//! ## Resource Kinds
//!
//! - **Instance**: exactly one struct
//! - **Vector**: a fixed-stride array of one struct type
//! - **Multivector**: lists of tagged structs of different types, plus an index
//! - **RawData**: uninterpreted bytes
//! - **Archive**: a nested archive in its own sub-storage
//!
//! ## On-disk Format
//!
//! ```text
//! Resource (little-endian):
//! - Payload size: u64 (8 bytes)
//! - Payload: `size` bytes
//! - Padding: 8 zero bytes
//!
//! Keys for archive `A` with resource `R`:
//! - A.archive           signature (an empty framed resource, 16 bytes)
//! - A.archive.schema    schema of the whole archive
//! - R                   framed resource
//! - R.schema            schema of the resource, raw UTF-8
//! - R_index             index of multivector `R`, schema `index(<schema of R>)`
//! ```
//!
//! Struct fields live at arbitrary bit offsets with widths up to 64 bits; signed
//! fields use two's complement.
//!
//! ## Usage
//!
//! ```rust
//! use flatdata::{MemoryResourceStorage, ResourceStorageExt, ArrayView};
//! # use flatdata::{Field, FieldDescriptor, Struct};
//! # pub enum Point {}
//! # impl Point {
//! #     pub const X: Field<u32> = Field::new("x", 0, 16);
//! #     pub const Y: Field<u32> = Field::new("y", 16, 16);
//! # }
//! # impl Struct for Point {
//! #     const NAME: &'static str = "Point";
//! #     const SCHEMA: &'static str = "struct Point { x : u32 : 16; y : u32 : 16; }";
//! #     const SIZE_IN_BYTES: usize = 4;
//! #     const FIELDS: &'static [FieldDescriptor] = &[Point::X.descriptor(), Point::Y.descriptor()];
//! # }
//!
//! let storage = MemoryResourceStorage::create();
//!
//! // Stream a vector into storage
//! let mut points = storage.create_external_vector::<Point>("points", Point::SCHEMA);
//! points.grow().set(Point::X, 1).set(Point::Y, 2);
//! points.grow().set(Point::X, 3).set(Point::Y, 4);
//! points.close().unwrap();
//!
//! // Read it back without copying
//! storage.check_schema("points", Point::SCHEMA).unwrap();
//! let view = ArrayView::<Point>::new("points", storage.read("points").unwrap()).unwrap();
//! assert_eq!(view.len(), 2);
//! assert_eq!(view.at(1).unwrap().get(Point::Y), 4);
//! ```
//!
//! Typed archives are described by implementing [`Archive`] and
//! [`ArchiveBuilder`] on top of [`ArchiveReader`] and [`ArchiveWriter`].

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod multivector;
pub mod storage;
pub mod structs;
pub mod vector;

pub use archive::{optional, Archive, ArchiveBuilder, ArchiveReader, ArchiveWriter, ResourceSpec};
pub use config::FileStorageConfig;
pub use error::{Error, Result};
pub use format::ResourceKind;
pub use memory::MemoryDescriptor;
pub use multivector::{
    IndexType40, ItemOf, ListBuilder, MultiArrayView, MultiListIter, MultiVectorBuilder,
    VariadicStruct,
};
pub use storage::{FileResourceStorage, MemoryResourceStorage, ResourceStorage, ResourceStorageExt};
pub use structs::{
    check_layout, Field, FieldDescriptor, FieldValue, InstanceView, Struct, StructBuf, StructMut,
    StructRef,
};
pub use vector::{ArrayView, ExternalVector, Vector};
