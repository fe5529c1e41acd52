// SPDX-License-Identifier: MIT
//! Non-owning views over resource bytes

use std::fmt;
use std::ops::Deref;

/// A borrowed `(pointer, length)` view.
///
/// Never owns: the bytes belong to a storage buffer or mapped file that outlives
/// the descriptor. `len == 0` is a valid empty view.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryDescriptor<'a> {
    data: &'a [u8],
}

impl<'a> MemoryDescriptor<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub const fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub const fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Interpret the bytes as UTF-8, if they are
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.data).ok()
    }
}

impl Deref for MemoryDescriptor<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl<'a> From<&'a [u8]> for MemoryDescriptor<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

impl<'a> From<&'a str> for MemoryDescriptor<'a> {
    fn from(data: &'a str) -> Self {
        Self::new(data.as_bytes())
    }
}

impl fmt::Debug for MemoryDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDescriptor")
            .field("size_in_bytes", &self.data.len())
            .finish()
    }
}
