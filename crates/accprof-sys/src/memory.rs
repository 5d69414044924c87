//! Page-block mapping and protection with mmap/mprotect.
//!
//! Tracked instances live in their own anonymous mappings so that every page
//! they touch belongs to exactly one instance. Protection is toggled on whole
//! pages only.

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use thiserror::Error;

use crate::page::PAGE_SIZE;

/// Page mapping/protection error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("mmap failed: {0}")]
    Mmap(#[source] nix::Error),

    #[error("mprotect failed: {0}")]
    Protect(#[source] nix::Error),

    #[error("invalid page block size: {0}")]
    InvalidSize(usize),

    #[error("null page address")]
    NullAddress,
}

fn check_span(span: usize) -> Result<NonZeroUsize, MemoryError> {
    if span % PAGE_SIZE != 0 {
        return Err(MemoryError::InvalidSize(span));
    }
    NonZeroUsize::new(span).ok_or(MemoryError::InvalidSize(span))
}

fn as_region(addr: usize) -> Result<NonNull<c_void>, MemoryError> {
    NonNull::new(addr as *mut c_void).ok_or(MemoryError::NullAddress)
}

/// Map a fresh, page-aligned, read/write block of `span` bytes.
///
/// `span` must be a non-zero multiple of [`PAGE_SIZE`].
///
/// # Errors
///
/// Returns an error if the size is invalid or mmap fails.
pub fn map_pages(span: usize) -> Result<NonNull<u8>, MemoryError> {
    let len = check_span(span)?;
    let region = unsafe {
        mmap_anonymous(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_PRIVATE,
        )
        .map_err(MemoryError::Mmap)?
    };
    Ok(region.cast::<u8>())
}

/// Return a block obtained from [`map_pages`] to the OS.
///
/// # Safety
///
/// `ptr` and `span` must describe exactly one block returned by
/// [`map_pages`], and nothing may reference the block afterwards.
pub unsafe fn unmap_pages(ptr: NonNull<u8>, span: usize) {
    unsafe {
        let _ = munmap(ptr.cast::<c_void>(), span);
    }
}

/// Make `[addr, addr + len)` fully inaccessible (no read, write or execute).
///
/// # Errors
///
/// Returns an error if `addr` is null or mprotect fails.
pub fn protect(addr: usize, len: usize) -> Result<(), MemoryError> {
    let region = as_region(addr)?;
    unsafe { mprotect(region, len, ProtFlags::PROT_NONE) }.map_err(MemoryError::Protect)
}

/// Make `[addr, addr + len)` readable and writable again.
///
/// # Errors
///
/// Returns an error if `addr` is null or mprotect fails.
pub fn unprotect(addr: usize, len: usize) -> Result<(), MemoryError> {
    let region = as_region(addr)?;
    unsafe {
        mprotect(region, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE)
            .map_err(MemoryError::Protect)
    }
}
