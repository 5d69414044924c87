//! Page-to-instance map.
//!
//! Every page backing a live tracked instance has a [`PageDescriptor`]. All
//! pages of a multi-page instance share the same base, size and type.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use accprof_sys::{page_base, pages};

use crate::registry::TypeIndex;

/// The instance a page currently backs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Start address of the owning instance.
    pub base: usize,
    /// Logical byte size of the owning instance (excludes page rounding).
    pub size: usize,
    /// Owning type.
    pub type_index: TypeIndex,
}

impl PageDescriptor {
    /// Offset of `addr` within the instance, if it lies inside the
    /// instance's logical size.
    #[inline]
    #[must_use]
    pub const fn offset_of(&self, addr: usize) -> Option<usize> {
        if addr >= self.base && addr < self.base + self.size {
            Some(addr - self.base)
        } else {
            None
        }
    }
}

/// Map from page address to the instance it backs.
#[derive(Default)]
pub struct PageMap {
    pages: RwLock<FxHashMap<usize, PageDescriptor>>,
}

impl PageMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor for every page of `[descriptor.base, descriptor.base + span)`.
    pub fn insert_block(&self, descriptor: PageDescriptor, span: usize) {
        let mut map = self.pages.write();
        for page in pages(descriptor.base, span) {
            map.insert(page, descriptor);
        }
    }

    /// Drop the descriptors of every page of `[base, base + span)`.
    pub fn remove_block(&self, base: usize, span: usize) {
        let mut map = self.pages.write();
        for page in pages(base, span) {
            map.remove(&page);
        }
    }

    /// Descriptor of the page containing `addr`.
    #[inline]
    #[must_use]
    pub fn lookup(&self, addr: usize) -> Option<PageDescriptor> {
        self.pages.read().get(&page_base(addr)).copied()
    }

    /// Whether the page containing `addr` is tracked.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.lookup(addr).is_some()
    }

    /// Run `f` on the base of the page containing `addr` if that page is
    /// still tracked.
    ///
    /// The map stays read-locked while `f` runs: the page cannot be released,
    /// unmapped and handed to unrelated code until `f` returns.
    pub fn with_tracked_page(&self, addr: usize, f: impl FnOnce(usize)) {
        let map = self.pages.read();
        let page = page_base(addr);
        if map.contains_key(&page) {
            f(page);
        }
        drop(map);
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.pages.is_locked()
    }

    /// Number of tracked pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
