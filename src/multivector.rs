// SPDX-License-Identifier: MIT
//! Heterogeneous, variable-length lists of tagged structs
//!
//! A multivector is stored as two resources:
//!
//! ```text
//! name          [tag][item bytes][tag][item bytes]...   all lists back to back
//! name_index    offset[0] .. offset[n-1], sentinel      40-bit offsets into `name`
//! ```
//!
//! List `i` spans `data[offset[i]..offset[i + 1]]` and the sentinel equals the
//! data payload size, so both the list count and every list's byte range are
//! O(1). Each item is a one-byte type tag followed by the struct bytes of that
//! type.
//!
//! The set of item types is described by a [`VariadicStruct`]: it maps tags to
//! sizes and decodes an item into a typed variant, usually an enum with one
//! [`StructRef`](crate::StructRef) per declared type. Readers `match` on that
//! enum; a tag outside the declared set is reported as
//! [`Error::UnknownTag`].

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format;
use crate::storage::{ResourceStorage, ResourceStorageExt};
use crate::structs::{Field, FieldDescriptor, Struct, StructMut};
use crate::vector::{ArrayView, Vector};

/// Largest data offset an index entry can hold
pub const MAX_INDEX_OFFSET: u64 = (1 << 40) - 1;

/// Entry of a multivector index: one 40-bit data offset
pub enum IndexType40 {}

impl IndexType40 {
    pub const VALUE: Field<u64> = Field::new("value", 0, 40);
}

impl Struct for IndexType40 {
    const NAME: &'static str = "IndexType40";
    const SCHEMA: &'static str = "struct IndexType40 { value : u64 : 40; }";
    const SIZE_IN_BYTES: usize = 5;
    const FIELDS: &'static [FieldDescriptor] = &[IndexType40::VALUE.descriptor()];
}

/// The closed set of item types a multivector may hold
pub trait VariadicStruct: 'static {
    /// A decoded item borrowing the multivector data
    type Item<'a>;

    /// Byte size of the struct identified by `tag`, `None` if undeclared
    fn size_of(tag: u8) -> Option<usize>;

    /// Decode the item with type `tag` from exactly `size_of(tag)` bytes
    fn decode<'a>(tag: u8, data: &'a [u8]) -> Option<Self::Item<'a>>;
}

/// A struct type declared in the item set `V`, with its tag
pub trait ItemOf<V: VariadicStruct>: Struct {
    const TAG: u8;
}

/// Streaming builder of a multivector and its index.
///
/// Lists are appended in order with [`grow`](Self::grow); items of a list are
/// appended through the returned [`ListBuilder`].
pub struct MultiVectorBuilder<V> {
    storage: Arc<dyn ResourceStorage>,
    name: String,
    schema: String,
    data: Vec<u8>,
    index: Vector<IndexType40>,
    _type: PhantomData<V>,
}

impl<V: VariadicStruct> MultiVectorBuilder<V> {
    pub fn new(storage: Arc<dyn ResourceStorage>, name: &str, schema: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
            schema: schema.to_string(),
            data: Vec::new(),
            index: Vector::new(),
            _type: PhantomData,
        }
    }

    /// Finish the current list and start a new, empty one
    pub fn grow(&mut self) -> ListBuilder<'_, V> {
        self.index
            .grow()
            .set(IndexType40::VALUE, self.data.len() as u64);
        ListBuilder {
            data: &mut self.data,
            _type: PhantomData,
        }
    }

    /// Number of lists started so far
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store data and index and return a view of what was written.
    ///
    /// A builder without lists is not materialized and yields `None`.
    pub fn close(mut self) -> Result<Option<MultiArrayView<V>>> {
        let data = std::mem::take(&mut self.data);
        let mut index = std::mem::take(&mut self.index);
        if index.is_empty() {
            debug!(resource = %self.name, "multivector closed without lists");
            return Ok(None);
        }
        if data.len() as u64 > MAX_INDEX_OFFSET {
            return Err(Error::OutOfRange {
                what: format!("data size of multivector {}", self.name),
                index: data.len() as u64,
                limit: MAX_INDEX_OFFSET + 1,
            });
        }
        index.grow().set(IndexType40::VALUE, data.len() as u64);

        let index_name = format::index_name(&self.name);
        self.storage.write(&self.name, &data, &self.schema)?;
        self.storage
            .write(&index_name, index.as_bytes(), &format::index_schema(&self.schema))?;
        debug!(
            resource = %self.name,
            lists = index.len() - 1,
            size = data.len(),
            "multivector closed"
        );

        MultiArrayView::new(&self.name, index.into_view(), Bytes::from(data)).map(Some)
    }
}

impl<V> Drop for MultiVectorBuilder<V> {
    fn drop(&mut self) {
        if !self.index.as_bytes().is_empty() {
            warn!(
                resource = %self.name,
                "multivector builder dropped without close; {} bytes were not stored",
                self.data.len()
            );
        }
    }
}

impl<V> fmt::Debug for MultiVectorBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiVectorBuilder")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Appends items to the list most recently started by [`MultiVectorBuilder::grow`]
pub struct ListBuilder<'a, V> {
    data: &'a mut Vec<u8>,
    _type: PhantomData<V>,
}

impl<V: VariadicStruct> ListBuilder<'_, V> {
    /// Append one zero-initialized item of type `T` and return it for filling
    pub fn add<T: ItemOf<V>>(&mut self) -> StructMut<'_, T> {
        self.data.push(T::TAG);
        let start = self.data.len();
        self.data.resize(start + T::SIZE_IN_BYTES, 0);
        StructMut::new(&mut self.data[start..])
    }
}

/// Read view of a multivector: its index plus the shared data payload
pub struct MultiArrayView<V> {
    resource: String,
    index: ArrayView<IndexType40>,
    data: Bytes,
    _type: PhantomData<V>,
}

impl<V: VariadicStruct> MultiArrayView<V> {
    /// Combine an index and a data payload, checking the sentinel
    pub fn new(resource: &str, index: ArrayView<IndexType40>, data: Bytes) -> Result<Self> {
        let sentinel = index
            .get(index.len().wrapping_sub(1))
            .map(|entry| entry.get(IndexType40::VALUE))
            .ok_or_else(|| {
                Error::size_mismatch(
                    format::index_name(resource),
                    "index holds no sentinel entry",
                )
            })?;
        if sentinel != data.len() as u64 {
            return Err(Error::size_mismatch(
                format::index_name(resource),
                format!(
                    "sentinel offset {sentinel} does not match data size {}",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            resource: resource.to_string(),
            index,
            data,
            _type: PhantomData,
        })
    }

    /// Number of lists
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn offset(&self, i: usize) -> Result<usize> {
        let entry = self.index.at(i)?;
        Ok(entry.get(IndexType40::VALUE) as usize)
    }

    /// Byte range of list `index` inside the data payload
    pub fn list_range(&self, index: usize) -> Result<Range<usize>> {
        if index >= self.len() {
            return Err(Error::OutOfRange {
                what: format!("list of multivector {}", self.resource),
                index: index as u64,
                limit: self.len() as u64,
            });
        }
        let start = self.offset(index)?;
        let end = self.offset(index + 1)?;
        if start > end || end > self.data.len() {
            return Err(Error::size_mismatch(
                format::index_name(&self.resource),
                format!("list {index} spans invalid offsets {start}..{end}"),
            ));
        }
        Ok(start..end)
    }

    /// Size of list `index` in bytes, tags included
    pub fn list_size_in_bytes(&self, index: usize) -> Result<usize> {
        self.list_range(index).map(|range| range.len())
    }

    /// Number of items in list `index`; walks the list
    pub fn list_len(&self, index: usize) -> Result<usize> {
        self.at(index)?.try_fold(0, |count, item| item.map(|_| count + 1))
    }

    /// Decoding iterator over the items of list `index`
    pub fn at(&self, index: usize) -> Result<MultiListIter<'_, V>> {
        let range = self.list_range(index)?;
        Ok(MultiListIter {
            resource: &self.resource,
            data: &self.data[range],
            done: false,
            _type: PhantomData,
        })
    }

    /// Call `visit` with every item of list `index`, in append order
    pub fn for_each<'a, F>(&'a self, index: usize, mut visit: F) -> Result<()>
    where
        F: FnMut(V::Item<'a>),
    {
        for item in self.at(index)? {
            visit(item?);
        }
        Ok(())
    }

    /// Iterate over all lists
    pub fn iter(&self) -> impl Iterator<Item = Result<MultiListIter<'_, V>>> + '_ {
        (0..self.len()).map(move |index| self.at(index))
    }

    pub fn index(&self) -> &ArrayView<IndexType40> {
        &self.index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl<V> Clone for MultiArrayView<V> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            index: self.index.clone(),
            data: self.data.clone(),
            _type: PhantomData,
        }
    }
}

impl<V> fmt::Debug for MultiArrayView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiArrayView")
            .field("resource", &self.resource)
            .field("index_entries", &(self.index.size_in_bytes() / IndexType40::SIZE_IN_BYTES))
            .field("size", &self.data.len())
            .finish()
    }
}

/// Items of one multivector list.
///
/// Yields an error and stops at the first unknown tag or truncated item.
pub struct MultiListIter<'a, V> {
    resource: &'a str,
    data: &'a [u8],
    done: bool,
    _type: PhantomData<V>,
}

impl<'a, V: VariadicStruct> MultiListIter<'a, V> {
    fn fail(&mut self, error: Error) -> Option<Result<V::Item<'a>>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<'a, V: VariadicStruct> Iterator for MultiListIter<'a, V> {
    type Item = Result<V::Item<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (&tag, rest) = self.data.split_first()?;
        let resource = self.resource;
        let unknown = || Error::UnknownTag {
            resource: resource.to_string(),
            tag,
        };
        let Some(size) = V::size_of(tag) else {
            return self.fail(unknown());
        };
        if rest.len() < size {
            let error = Error::size_mismatch(
                self.resource,
                format!(
                    "item with tag {tag} needs {size} bytes, {} left in list",
                    rest.len()
                ),
            );
            return self.fail(error);
        }
        let (item, rest) = rest.split_at(size);
        let Some(decoded) = V::decode(tag, item) else {
            return self.fail(unknown());
        };
        self.data = rest;
        Some(Ok(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryResourceStorage;
    use crate::structs::tests::Pair;
    use crate::structs::StructRef;

    enum Byte {}

    impl Byte {
        const VALUE: Field<u8> = Field::new("value", 0, 8);
    }

    impl Struct for Byte {
        const NAME: &'static str = "Byte";
        const SCHEMA: &'static str = "struct Byte { value : u8 : 8; }";
        const SIZE_IN_BYTES: usize = 1;
        const FIELDS: &'static [FieldDescriptor] = &[Byte::VALUE.descriptor()];
    }

    enum Items {}

    enum Item<'a> {
        Byte(StructRef<'a, Byte>),
        Pair(StructRef<'a, Pair>),
    }

    impl VariadicStruct for Items {
        type Item<'a> = Item<'a>;

        fn size_of(tag: u8) -> Option<usize> {
            match tag {
                0 => Some(Byte::SIZE_IN_BYTES),
                1 => Some(Pair::SIZE_IN_BYTES),
                _ => None,
            }
        }

        fn decode<'a>(tag: u8, data: &'a [u8]) -> Option<Item<'a>> {
            match tag {
                0 => Some(Item::Byte(StructRef::new(data))),
                1 => Some(Item::Pair(StructRef::new(data))),
                _ => None,
            }
        }
    }

    impl ItemOf<Items> for Byte {
        const TAG: u8 = 0;
    }

    impl ItemOf<Items> for Pair {
        const TAG: u8 = 1;
    }

    fn build(storage: &Arc<dyn ResourceStorage>) -> MultiArrayView<Items> {
        let mut builder = storage.create_multivector_builder::<Items>("mv", "schema");
        {
            let mut list = builder.grow();
            list.add::<Byte>().set(Byte::VALUE, 7);
            list.add::<Pair>().set(Pair::A, 1000).set(Pair::B, -5);
        }
        builder.grow();
        builder.grow().add::<Byte>().set(Byte::VALUE, 9);
        builder.close().unwrap().unwrap()
    }

    fn describe(item: Item<'_>) -> String {
        match item {
            Item::Byte(b) => format!("byte {}", b.get(Byte::VALUE)),
            Item::Pair(p) => format!("pair {} {}", p.get(Pair::A), p.get(Pair::B)),
        }
    }

    #[test]
    fn test_index_layout() {
        let storage = MemoryResourceStorage::create();
        let view = build(&storage);
        assert_eq!(view.len(), 3);

        let offsets: Vec<u64> = view
            .index()
            .iter()
            .map(|entry| entry.get(IndexType40::VALUE))
            .collect();
        assert_eq!(offsets, vec![0, 9, 9, 11]);
        assert_eq!(view.data().len(), 11);
        assert_eq!(
            storage.read_schema("mv_index").unwrap(),
            "index(schema)".to_string()
        );
    }

    #[test]
    fn test_for_each_visits_in_order() {
        let storage = MemoryResourceStorage::create();
        let view = build(&storage);

        let mut seen = Vec::new();
        view.for_each(0, |item| seen.push(describe(item))).unwrap();
        assert_eq!(seen, vec!["byte 7", "pair 1000 -5"]);

        let mut calls = 0;
        view.for_each(1, |_| calls += 1).unwrap();
        assert_eq!(calls, 0);

        assert_eq!(view.list_len(0).unwrap(), 2);
        assert_eq!(view.list_len(2).unwrap(), 1);
        assert_eq!(view.list_size_in_bytes(0).unwrap(), 9);
    }

    #[test]
    fn test_list_out_of_range() {
        let storage = MemoryResourceStorage::create();
        let view = build(&storage);
        assert!(matches!(
            view.for_each(3, |_| {}),
            Err(Error::OutOfRange { index: 3, limit: 3, .. })
        ));
    }

    #[test]
    fn test_iter_over_all_lists() {
        let storage = MemoryResourceStorage::create();
        let view = build(&storage);
        let counts: Vec<usize> = view
            .iter()
            .map(|list| list.unwrap().count())
            .collect();
        assert_eq!(counts, vec![2, 0, 1]);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let mut index = Vector::<IndexType40>::new();
        index.grow().set(IndexType40::VALUE, 0);
        index.grow().set(IndexType40::VALUE, 4);
        let data = Bytes::from_static(&[0, 1, 7, 0]);
        let view = MultiArrayView::<Items>::new("mv", index.into_view(), data).unwrap();

        let mut items = view.at(0).unwrap();
        assert!(matches!(items.next(), Some(Ok(Item::Byte(_)))));
        assert!(matches!(
            items.next(),
            Some(Err(Error::UnknownTag { tag: 7, .. }))
        ));
        assert!(items.next().is_none());
        assert!(view.for_each(0, |_| {}).is_err());
    }

    #[test]
    fn test_truncated_item_is_size_mismatch() {
        let mut index = Vector::<IndexType40>::new();
        index.grow().set(IndexType40::VALUE, 0);
        index.grow().set(IndexType40::VALUE, 3);
        let view =
            MultiArrayView::<Items>::new("mv", index.into_view(), Bytes::from_static(&[1, 0, 0]))
                .unwrap();
        assert!(matches!(
            view.list_len(0),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_sentinel_must_match_data() {
        let mut index = Vector::<IndexType40>::new();
        index.grow().set(IndexType40::VALUE, 0);
        index.grow().set(IndexType40::VALUE, 5);
        let err = MultiArrayView::<Items>::new("mv", index.into_view(), Bytes::from_static(&[0, 1]))
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));

        let empty = Vector::<IndexType40>::new().into_view();
        assert!(MultiArrayView::<Items>::new("mv", empty, Bytes::new()).is_err());
    }

    #[test]
    fn test_non_monotone_index_is_rejected_on_access() {
        let mut index = Vector::<IndexType40>::new();
        index.grow().set(IndexType40::VALUE, 2);
        index.grow().set(IndexType40::VALUE, 0);
        index.grow().set(IndexType40::VALUE, 2);
        let view =
            MultiArrayView::<Items>::new("mv", index.into_view(), Bytes::from_static(&[0, 1]))
                .unwrap();
        assert!(matches!(view.at(0), Err(Error::SizeMismatch { .. })));
        assert!(view.at(1).is_ok());
    }

    #[test]
    fn test_builder_without_lists_writes_nothing() {
        let storage = MemoryResourceStorage::create();
        let builder = storage.create_multivector_builder::<Items>("mv", "schema");
        assert!(builder.close().unwrap().is_none());
        assert!(!storage.exists("mv"));
        assert!(!storage.exists("mv_index"));
    }

    #[test]
    fn test_only_empty_lists() {
        let storage = MemoryResourceStorage::create();
        let mut builder = storage.create_multivector_builder::<Items>("mv", "schema");
        builder.grow();
        builder.grow();
        let view = builder.close().unwrap().unwrap();
        assert_eq!(view.len(), 2);
        assert!(view.data().is_empty());
        assert_eq!(view.at(1).unwrap().count(), 0);
    }
}
