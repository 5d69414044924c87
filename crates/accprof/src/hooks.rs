//! Allocation hooks for instrumented types.
//!
//! A tracked instance gets its own page-aligned block, rounded up to whole
//! pages, with every page registered in the page map and then protected.
//! Untracked requests (registry full, no handlers installed, zero-sized or
//! over-aligned layouts) fall through to the global allocator.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use tracing::{trace, warn};

use accprof_sys::{PAGE_SIZE, map_pages, page_span, protect, unmap_pages, unprotect};

use crate::page_map::PageDescriptor;
use crate::profiler::Profiler;
use crate::registry::{TypeIndex, TypeToken};

/// Plain heap allocation. Zero-sized layouts get a dangling, aligned pointer.
pub fn heap_alloc(layout: Layout) -> Option<NonNull<u8>> {
    if layout.size() == 0 {
        return NonNull::new(ptr::without_provenance_mut(layout.align()));
    }
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Free a block from [`heap_alloc`].
///
/// # Safety
///
/// `ptr` must come from `heap_alloc(layout)` and not have been freed.
pub unsafe fn heap_dealloc(ptr: NonNull<u8>, layout: Layout) {
    if layout.size() != 0 {
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

impl Profiler {
    /// Allocate storage for one instance of `layout`.
    ///
    /// Returns `None` only when the underlying allocation fails.
    pub fn acquire(&self, layout: Layout, token: TypeToken) -> Option<NonNull<u8>> {
        match token {
            TypeToken::Tracked(index) if self.is_armed() => self.acquire_tracked(layout, index),
            _ => heap_alloc(layout),
        }
    }

    pub(crate) fn acquire_tracked(&self, layout: Layout, index: TypeIndex) -> Option<NonNull<u8>> {
        if layout.size() == 0 || layout.align() > PAGE_SIZE {
            return heap_alloc(layout);
        }
        let span = page_span(layout.size())?;

        let block = match map_pages(span) {
            Ok(block) => block,
            Err(e) => {
                trace!(error = %e, size = layout.size(), "page block allocation failed");
                return None;
            }
        };
        let base = block.as_ptr() as usize;

        self.pages.insert_block(
            PageDescriptor {
                base,
                size: layout.size(),
                type_index: index,
            },
            span,
        );

        if let Err(e) = protect(base, span) {
            warn!(error = %e, "failed to protect instance, leaving it untracked");
            self.pages.remove_block(base, span);
            unsafe { unmap_pages(block, span) };
            return heap_alloc(layout);
        }

        trace!(
            base = format!("{base:#x}"),
            size = layout.size(),
            span,
            index = index.as_usize(),
            "acquired tracked instance"
        );
        Some(block)
    }

    /// Whether `addr` is the base of a live tracked instance.
    #[must_use]
    pub fn is_tracked_block(&self, addr: usize) -> bool {
        self.pages.lookup(addr).is_some_and(|d| d.base == addr)
    }

    /// Return storage obtained from [`Profiler::acquire`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `acquire(layout, token)` on this profiler, must
    /// not have been released, and must not be used afterwards.
    pub unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout, token: TypeToken) {
        let base = ptr.as_ptr() as usize;
        if !token.is_tracked() || !self.is_tracked_block(base) {
            unsafe { heap_dealloc(ptr, layout) };
            return;
        }
        let Some(span) = page_span(layout.size()) else {
            return;
        };

        // The pages must be accessible before anything else touches them.
        if let Err(e) = unprotect(base, span) {
            warn!(
                error = %e,
                base = format!("{base:#x}"),
                "failed to unprotect released instance"
            );
        }
        self.pages.remove_block(base, span);
        unsafe { unmap_pages(ptr, span) };

        trace!(base = format!("{base:#x}"), span, "released tracked instance");
    }
}
