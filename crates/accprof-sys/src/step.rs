//! Single-step trapping via the x86 trap flag.
//!
//! Setting TF in the interrupted context makes the CPU raise `SIGTRAP` after
//! exactly one instruction once the signal handler returns.
//!
//! | Platform        | Register                     |
//! |-----------------|------------------------------|
//! | Linux `x86_64`  | `uc_mcontext.gregs[REG_EFL]` |
//! | macOS `x86_64`  | `uc_mcontext->__ss.__rflags` |
//!
//! Other targets have no user-space single step reachable from a signal
//! context; arming is a no-op there and [`SINGLE_STEP_SUPPORTED`] is false.

use std::ffi::c_void;

/// RFLAGS trap flag (bit 8).
pub const TRAP_FLAG: u64 = 0x100;

/// Whether this target can arm a single-step trap from a signal handler.
pub const SINGLE_STEP_SUPPORTED: bool = cfg!(all(
    target_arch = "x86_64",
    any(target_os = "linux", target_os = "macos")
));

/// Set the trap flag in an interrupted context.
///
/// # Safety
///
/// `context` must be the `ucontext_t` pointer passed to an `SA_SIGINFO`
/// handler that is currently running.
pub unsafe fn arm_single_step(context: *mut c_void) {
    unsafe { update_flags(context, |flags| flags | TRAP_FLAG) }
}

/// Clear the trap flag in an interrupted context.
///
/// # Safety
///
/// Same contract as [`arm_single_step`].
pub unsafe fn disarm_single_step(context: *mut c_void) {
    unsafe { update_flags(context, |flags| flags & !TRAP_FLAG) }
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
unsafe fn update_flags(context: *mut c_void, f: impl FnOnce(u64) -> u64) {
    if context.is_null() {
        return;
    }
    unsafe {
        let uc = context.cast::<libc::ucontext_t>();
        let reg = &mut (*uc).uc_mcontext.gregs[libc::REG_EFL as usize];
        let flags = f(u64::from_ne_bytes(reg.to_ne_bytes()));
        *reg = libc::greg_t::from_ne_bytes(flags.to_ne_bytes());
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "macos"))]
unsafe fn update_flags(context: *mut c_void, f: impl FnOnce(u64) -> u64) {
    if context.is_null() {
        return;
    }
    unsafe {
        let uc = context.cast::<libc::ucontext_t>();
        let mcontext = (*uc).uc_mcontext;
        if mcontext.is_null() {
            return;
        }
        (*mcontext).__ss.__rflags = f((*mcontext).__ss.__rflags);
    }
}

#[cfg(not(all(
    target_arch = "x86_64",
    any(target_os = "linux", target_os = "macos")
)))]
unsafe fn update_flags(_context: *mut c_void, _f: impl FnOnce(u64) -> u64) {}
