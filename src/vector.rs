// SPDX-License-Identifier: MIT
//! Fixed-stride arrays of structs: read views, owned buffers and streaming builders

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::{ResourceStorage, ResourceStorageExt};
use crate::structs::{Struct, StructMut, StructRef};

/// Read-only view of a vector resource payload.
///
/// Cloning is cheap: the payload is shared, never copied.
pub struct ArrayView<T> {
    data: Bytes,
    _type: PhantomData<T>,
}

impl<T: Struct> ArrayView<T> {
    /// View `payload` as an array of `T`, rejecting sizes that are not a
    /// multiple of `T::SIZE_IN_BYTES`.
    pub fn new(resource: &str, payload: Bytes) -> Result<Self> {
        if T::SIZE_IN_BYTES == 0 || payload.len() % T::SIZE_IN_BYTES != 0 {
            return Err(Error::size_mismatch(
                resource,
                format!(
                    "payload of {} bytes is not a multiple of {} ({} bytes)",
                    payload.len(),
                    T::NAME,
                    T::SIZE_IN_BYTES
                ),
            ));
        }
        Ok(Self {
            data: payload,
            _type: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / T::SIZE_IN_BYTES
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<StructRef<'_, T>> {
        let start = index.checked_mul(T::SIZE_IN_BYTES)?;
        let end = start.checked_add(T::SIZE_IN_BYTES)?;
        self.data
            .get(start..end)
            .map(StructRef::new)
    }

    /// Like [`get`](Self::get), but reports the index and length on failure
    pub fn at(&self, index: usize) -> Result<StructRef<'_, T>> {
        self.get(index).ok_or_else(|| Error::OutOfRange {
            what: format!("index into array of {}", T::NAME),
            index: index as u64,
            limit: self.len() as u64,
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = StructRef<'_, T>> + '_ {
        self.data.chunks_exact(T::SIZE_IN_BYTES).map(StructRef::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }
}

impl<T> Clone for ArrayView<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: Struct> fmt::Debug for ArrayView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("type", &T::NAME)
            .field("len", &self.len())
            .finish()
    }
}

/// Owned, growable array of `T` for building a vector in memory
pub struct Vector<T> {
    data: Vec<u8>,
    _type: PhantomData<T>,
}

impl<T: Struct> Vector<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            _type: PhantomData,
        }
    }

    /// A vector of `len` zero-initialized items
    pub fn with_len(len: usize) -> Self {
        Self {
            data: vec![0; len * T::SIZE_IN_BYTES],
            _type: PhantomData,
        }
    }

    /// Append one zero-initialized item and return it for filling
    pub fn grow(&mut self) -> StructMut<'_, T> {
        let start = self.data.len();
        self.data.resize(start + T::SIZE_IN_BYTES, 0);
        StructMut::new(&mut self.data[start..])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / T::SIZE_IN_BYTES.max(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StructRef<'_, T>> {
        let start = index.checked_mul(T::SIZE_IN_BYTES)?;
        let end = start.checked_add(T::SIZE_IN_BYTES)?;
        self.data
            .get(start..end)
            .map(StructRef::new)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<StructMut<'_, T>> {
        let start = index.checked_mul(T::SIZE_IN_BYTES)?;
        let end = start.checked_add(T::SIZE_IN_BYTES)?;
        self.data
            .get_mut(start..end)
            .map(StructMut::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze into a read view without copying
    pub fn into_view(self) -> ArrayView<T> {
        ArrayView {
            data: Bytes::from(self.data),
            _type: PhantomData,
        }
    }
}

impl<T: Struct> Default for Vector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Struct> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("type", &T::NAME)
            .field("len", &self.len())
            .finish()
    }
}

/// Append-only builder streaming a vector resource into storage.
///
/// The payload grows in memory with amortized doubling; its size is only
/// fixed when [`close`](Self::close) frames and stores it. `close` consumes the
/// builder, so nothing can be appended afterwards.
pub struct ExternalVector<T> {
    storage: Arc<dyn ResourceStorage>,
    name: String,
    schema: String,
    data: Vec<u8>,
    _type: PhantomData<T>,
}

impl<T: Struct> ExternalVector<T> {
    pub fn new(storage: Arc<dyn ResourceStorage>, name: &str, schema: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
            schema: schema.to_string(),
            data: Vec::new(),
            _type: PhantomData,
        }
    }

    /// Append one zero-initialized item and return it for filling
    pub fn grow(&mut self) -> StructMut<'_, T> {
        let start = self.data.len();
        self.data.resize(start + T::SIZE_IN_BYTES, 0);
        StructMut::new(&mut self.data[start..])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / T::SIZE_IN_BYTES.max(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store the accumulated items and return a view of what was written.
    ///
    /// A vector that never grew is not materialized and yields `None`.
    pub fn close(mut self) -> Result<Option<ArrayView<T>>> {
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            debug!(resource = %self.name, "external vector closed without items");
            return Ok(None);
        }
        let len = data.len() / T::SIZE_IN_BYTES;
        self.storage.write(&self.name, &data, &self.schema)?;
        debug!(resource = %self.name, len, "external vector closed");
        ArrayView::new(&self.name, Bytes::from(data)).map(Some)
    }
}

impl<T> Drop for ExternalVector<T> {
    fn drop(&mut self) {
        if !self.data.is_empty() {
            warn!(
                resource = %self.name,
                "external vector dropped without close; {} bytes were not stored",
                self.data.len()
            );
        }
    }
}

impl<T: Struct> fmt::Debug for ExternalVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalVector")
            .field("name", &self.name)
            .field("type", &T::NAME)
            .field("len", &self.len())
            .finish()
    }
}
