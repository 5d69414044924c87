//! Fault-driven access counting.
//!
//! Per thread, a two-state machine:
//!
//! ```text
//!            protection fault on a tracked page
//!   NORMAL ─────────────────────────────────────▶ AWAITING_RESTEP
//!     ▲      count, unprotect page, arm single step        │
//!     │                                                     │
//!     └─────────────────────────────────────────────────────┘
//!            single-step trap: disarm, re-protect page
//! ```
//!
//! The faulting instruction re-executes against the unprotected page, the CPU
//! traps right after it, and the page is protected again, so every individual
//! access to a tracked page is seen.
//!
//! The pending pages are thread-local. Another thread touching a page in the
//! window where it is unprotected does not fault and goes uncounted.
//! Re-protection runs under the page map's read lock, so a page released by
//! another thread is never protected after it has been reused.

use std::cell::Cell;
use std::ffi::c_void;

use accprof_sys::{PAGE_SIZE, arm_single_step, disarm_single_step, page_base, protect, unprotect};

use crate::profiler::Profiler;

/// Pages one instruction can fault on before its single step completes.
/// Two operands, each straddling a page boundary.
pub const MAX_PENDING_PAGES: usize = 4;

/// The four operations the state machine needs from the platform.
pub trait FaultContext {
    /// Make `page` inaccessible.
    fn protect(&mut self, page: usize);
    /// Make `page` readable and writable.
    fn unprotect(&mut self, page: usize);
    /// Trap after the next instruction.
    fn arm_single_step(&mut self);
    /// Stop trapping.
    fn disarm_single_step(&mut self);
}

/// Whether a signal belonged to the profiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Handled,
    Foreign,
}

/// Pages unprotected by this thread that await re-protection.
#[derive(Clone, Copy, Debug)]
struct PendingPages {
    pages: [usize; MAX_PENDING_PAGES],
    len: usize,
}

impl PendingPages {
    const EMPTY: Self = Self {
        pages: [0; MAX_PENDING_PAGES],
        len: 0,
    };

    const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, page: usize) -> bool {
        if self.as_slice().contains(&page) {
            return true;
        }
        let Some(slot) = self.pages.get_mut(self.len) else {
            return false;
        };
        *slot = page;
        self.len += 1;
        true
    }

    fn as_slice(&self) -> &[usize] {
        self.pages.get(..self.len).unwrap_or(&[])
    }
}

thread_local! {
    static PENDING: Cell<PendingPages> = const { Cell::new(PendingPages::EMPTY) };
}

/// Whether this thread is between a handled fault and its single-step trap.
#[must_use]
pub fn awaiting_restep() -> bool {
    !PENDING.with(Cell::get).is_empty()
}

impl Profiler {
    /// `NORMAL` → `AWAITING_RESTEP`.
    ///
    /// Returns [`Disposition::Foreign`] without touching anything when `addr`
    /// is not on a tracked page.
    pub fn handle_protection_fault(
        &self,
        addr: usize,
        cx: &mut impl FaultContext,
    ) -> Disposition {
        let Some(descriptor) = self.pages.lookup(addr) else {
            return Disposition::Foreign;
        };

        // Accesses in the page-rounding tail are allowed but not counted.
        if let Some(offset) = descriptor.offset_of(addr) {
            self.registry.increment(descriptor.type_index, offset);
        }

        let page = page_base(addr);
        cx.unprotect(page);

        let mut pending = PENDING.with(Cell::get);
        // A full set means the page stays accessible until release.
        let _ = pending.push(page);
        PENDING.with(|p| p.set(pending));

        cx.arm_single_step();
        Disposition::Handled
    }

    /// `AWAITING_RESTEP` → `NORMAL`.
    ///
    /// Returns [`Disposition::Foreign`] when this thread has nothing pending,
    /// i.e. the trap was not armed by us.
    pub fn handle_single_step(&self, cx: &mut impl FaultContext) -> Disposition {
        let pending = PENDING.with(|p| p.replace(PendingPages::EMPTY));
        if pending.is_empty() {
            return Disposition::Foreign;
        }

        cx.disarm_single_step();
        for &page in pending.as_slice() {
            // Skipped if another thread released the page meanwhile. The map
            // lock keeps it from being released during the protect itself.
            self.pages.with_tracked_page(page, |page| cx.protect(page));
        }
        Disposition::Handled
    }
}

/// [`FaultContext`] backed by mprotect and the interrupted `ucontext_t`.
struct SignalContext {
    ucontext: *mut c_void,
}

impl FaultContext for SignalContext {
    fn protect(&mut self, page: usize) {
        let _ = protect(page, PAGE_SIZE);
    }

    fn unprotect(&mut self, page: usize) {
        let _ = unprotect(page, PAGE_SIZE);
    }

    fn arm_single_step(&mut self) {
        unsafe { arm_single_step(self.ucontext) };
    }

    fn disarm_single_step(&mut self) {
        unsafe { disarm_single_step(self.ucontext) };
    }
}

fn forward(
    profiler: &Profiler,
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
) {
    if let Some(chain) = profiler.signals.get() {
        unsafe { chain.forward(signum, info, context) };
    }
}

/// SIGSEGV/SIGBUS handler.
pub extern "C" fn on_fault_signal(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
) {
    let Some(profiler) = Profiler::active() else {
        return;
    };
    if info.is_null() {
        forward(profiler, signum, info, context);
        return;
    }

    let addr = unsafe { (*info).si_addr() } as usize;
    let mut cx = SignalContext { ucontext: context };
    if profiler.handle_protection_fault(addr, &mut cx) == Disposition::Foreign {
        forward(profiler, signum, info, context);
    }
}

/// SIGTRAP handler.
pub extern "C" fn on_trap_signal(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
) {
    let Some(profiler) = Profiler::active() else {
        return;
    };
    let mut cx = SignalContext { ucontext: context };
    if profiler.handle_single_step(&mut cx) == Disposition::Foreign {
        forward(profiler, signum, info, context);
    }
}
