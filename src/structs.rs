// SPDX-License-Identifier: MIT
//! Bit-packed struct types and their read-only / read-write projections
//!
//! A struct type is pure data: a schema string, a byte size and a table of
//! field descriptors. Generated code implements [`Struct`] on a marker type and
//! exposes one `const` [`Field`] per member:
//!
//! ```rust
//! use flatdata::{Field, FieldDescriptor, Struct, StructBuf};
//!
//! pub enum Point {}
//!
//! impl Point {
//!     pub const X: Field<i32> = Field::new("x", 0, 20);
//!     pub const Y: Field<i32> = Field::new("y", 20, 20);
//! }
//!
//! impl Struct for Point {
//!     const NAME: &'static str = "Point";
//!     const SCHEMA: &'static str = "struct Point { x : i32 : 20; y : i32 : 20; }";
//!     const SIZE_IN_BYTES: usize = 5;
//!     const FIELDS: &'static [FieldDescriptor] = &[Point::X.descriptor(), Point::Y.descriptor()];
//! }
//!
//! let mut point = StructBuf::<Point>::new();
//! point.as_mut().set(Point::X, -7);
//! assert_eq!(point.as_ref().get(Point::X), -7);
//! ```
//!
//! [`StructRef`] and [`StructMut`] hold no storage of their own; they are thin
//! typed windows over bytes owned by a vector, a resource or a [`StructBuf`].

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;

use crate::codec;
use crate::error::{Error, Result};

/// Untyped description of one field, used for layout validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub signed: bool,
}

/// Integer types a field can be read as
pub trait FieldValue: Copy {
    /// Whether the stored bits are two's complement
    const SIGNED: bool;

    /// Convert from the codec's 64-bit representation
    fn from_bits(bits: u64) -> Self;

    /// Convert to the codec's 64-bit representation
    fn to_bits(self) -> u64;
}

macro_rules! impl_field_value {
    ($signed:expr => $($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                const SIGNED: bool = $signed;

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as Self
                }

                #[inline]
                fn to_bits(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_field_value!(false => u8, u16, u32, u64);
impl_field_value!(true => i8, i16, i32, i64);

impl FieldValue for bool {
    const SIGNED: bool = false;

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }

    #[inline]
    fn to_bits(self) -> u64 {
        u64::from(self)
    }
}

/// A typed field: bit offset and width plus the Rust type it is read as
pub struct Field<V> {
    name: &'static str,
    offset: usize,
    width: usize,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Field<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Field<V> {}

impl<V> fmt::Debug for Field<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("width", &self.width)
            .finish()
    }
}

impl<V: FieldValue> Field<V> {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            _value: PhantomData,
        }
    }

    pub const fn descriptor(&self) -> FieldDescriptor {
        FieldDescriptor {
            name: self.name,
            offset: self.offset,
            width: self.width,
            signed: V::SIGNED,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn read(&self, data: &[u8]) -> V {
        let bits = if V::SIGNED {
            codec::read_signed(data, self.offset, self.width) as u64
        } else {
            codec::read_unsigned(data, self.offset, self.width)
        };
        V::from_bits(bits)
    }

    #[inline]
    fn write(&self, data: &mut [u8], value: V) {
        codec::write_unsigned(data, self.offset, self.width, value.to_bits());
    }
}

/// A fixed-size bit-packed record type
pub trait Struct: 'static {
    /// Type name used in diagnostics
    const NAME: &'static str;
    /// Schema of the struct as emitted by the generator
    const SCHEMA: &'static str;
    /// `ceil(total_bits / 8)`
    const SIZE_IN_BYTES: usize;
    /// Every field of the struct, in declaration order
    const FIELDS: &'static [FieldDescriptor];
}

/// Verify that every field of `T` lies within `T::SIZE_IN_BYTES`.
pub fn check_layout<T: Struct>() -> Result<()> {
    T::FIELDS.iter().try_for_each(|field| {
        codec::check_field(field.name, field.offset, field.width, T::SIZE_IN_BYTES)
    })
}

/// Read-only projection of a struct over a byte window
pub struct StructRef<'a, T> {
    data: &'a [u8],
    _type: PhantomData<T>,
}

impl<'a, T: Struct> StructRef<'a, T> {
    /// Project `T` onto the first `T::SIZE_IN_BYTES` bytes of `data`.
    ///
    /// Panics if `data` is shorter than the struct.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: &data[..T::SIZE_IN_BYTES],
            _type: PhantomData,
        }
    }

    #[inline]
    pub fn get<V: FieldValue>(&self, field: Field<V>) -> V {
        field.read(self.data)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn size_in_bytes(&self) -> usize {
        T::SIZE_IN_BYTES
    }
}

impl<T> Clone for StructRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StructRef<'_, T> {}

impl<T: Struct> PartialEq for StructRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T: Struct> fmt::Debug for StructRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(T::NAME);
        for field in T::FIELDS {
            let value = codec::read_field(self.data, field.offset, field.width, field.signed);
            out.field(field.name, &value);
        }
        out.finish()
    }
}

/// Read-write projection of a struct over a byte window
pub struct StructMut<'a, T> {
    data: &'a mut [u8],
    _type: PhantomData<T>,
}

impl<'a, T: Struct> StructMut<'a, T> {
    /// Project `T` onto the first `T::SIZE_IN_BYTES` bytes of `data`.
    #[inline]
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data: &mut data[..T::SIZE_IN_BYTES],
            _type: PhantomData,
        }
    }

    #[inline]
    pub fn get<V: FieldValue>(&self, field: Field<V>) -> V {
        field.read(self.data)
    }

    /// Set a field; values wider than the field are truncated.
    #[inline]
    pub fn set<V: FieldValue>(&mut self, field: Field<V>, value: V) -> &mut Self {
        field.write(self.data, value);
        self
    }

    pub fn as_ref(&self) -> StructRef<'_, T> {
        StructRef::new(self.data)
    }

    /// Overwrite all bytes with the contents of `other`
    pub fn copy_from(&mut self, other: StructRef<'_, T>) {
        self.data.copy_from_slice(other.as_bytes());
    }
}

impl<T: Struct> fmt::Debug for StructMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// Owned, zero-initialized storage for exactly one struct
pub struct StructBuf<T> {
    data: Vec<u8>,
    _type: PhantomData<T>,
}

impl<T: Struct> StructBuf<T> {
    pub fn new() -> Self {
        Self {
            data: vec![0; T::SIZE_IN_BYTES],
            _type: PhantomData,
        }
    }

    pub fn as_ref(&self) -> StructRef<'_, T> {
        StructRef::new(&self.data)
    }

    pub fn as_mut(&mut self) -> StructMut<'_, T> {
        StructMut::new(&mut self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<T: Struct> Default for StructBuf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Struct> Clone for StructBuf<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: Struct> fmt::Debug for StructBuf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// An instance resource: exactly one struct, backed by a shared payload
pub struct InstanceView<T> {
    data: Bytes,
    _type: PhantomData<T>,
}

impl<T: Struct> InstanceView<T> {
    pub fn new(resource: &str, payload: Bytes) -> Result<Self> {
        if payload.len() != T::SIZE_IN_BYTES {
            return Err(Error::size_mismatch(
                resource,
                format!(
                    "instance of {} needs {} bytes, found {}",
                    T::NAME,
                    T::SIZE_IN_BYTES,
                    payload.len()
                ),
            ));
        }
        Ok(Self {
            data: payload,
            _type: PhantomData,
        })
    }

    pub fn get(&self) -> StructRef<'_, T> {
        StructRef::new(&self.data)
    }
}

impl<T> Clone for InstanceView<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: Struct> fmt::Debug for InstanceView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}
