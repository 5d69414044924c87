//! Page size and address rounding.

/// Granularity of tracking. Every tracked instance starts on a page boundary.
pub const PAGE_SIZE: usize = 4096;

const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Round an address down to the start of its page.
#[inline]
#[must_use]
pub const fn page_base(addr: usize) -> usize {
    addr & !PAGE_MASK
}

/// Round a byte size up to a whole number of pages.
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn page_span(size: usize) -> Option<usize> {
    match size.checked_add(PAGE_MASK) {
        Some(padded) => Some(padded & !PAGE_MASK),
        None => None,
    }
}

/// Iterate the page addresses of the block `[base, base + span)`.
pub fn pages(base: usize, span: usize) -> impl Iterator<Item = usize> {
    (base..base.saturating_add(span)).step_by(PAGE_SIZE)
}
