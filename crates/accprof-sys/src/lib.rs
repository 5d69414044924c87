//! Platform capabilities for fault-driven access profiling.
//!
//! Everything here is a thin layer over the OS and CPU:
//!
//! - page rounding and anonymous page-block mapping ([`map_pages`], [`unmap_pages`])
//! - page protection toggling ([`protect`], [`unprotect`])
//! - the x86 trap flag in an interrupted signal context ([`arm_single_step`],
//!   [`disarm_single_step`])
//! - installing the fault/trap handlers and forwarding foreign signals to
//!   whatever was installed before ([`SignalChain`])
//!
//! The protection and trap-flag functions are plain syscalls or register
//! edits and are safe to call from a signal handler.

mod memory;
mod page;
mod signal;
mod step;

pub use memory::{MemoryError, map_pages, protect, unmap_pages, unprotect};
pub use page::{PAGE_SIZE, page_base, page_span, pages};
pub use signal::{SignalChain, SignalHandlerFn};
pub use step::{SINGLE_STEP_SUPPORTED, TRAP_FLAG, arm_single_step, disarm_single_step};
