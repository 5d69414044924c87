//! accprof - byte-granularity memory access profiler.
//!
//! Counts, per byte offset of an instrumented type, how many times the CPU
//! touched that byte. Instances of an instrumented type live on their own
//! pages, which are kept inaccessible; each access faults, is counted, and is
//! let through for exactly one instruction before the page is protected again.
//!
//! # Example
//!
//! ```ignore
//! use accprof::{ProfiledBox, Profiler, ProfilerConfig};
//!
//! let profiler = Profiler::start(ProfilerConfig::default())?;
//!
//! let mut conn = ProfiledBox::new(Connection::default());
//! conn.bytes_sent += 64;
//! drop(conn);
//!
//! // Writes access_profile.out in the working directory.
//! let report = profiler.stop();
//! ```
//!
//! This perturbs timing heavily and is meant for offline investigation of
//! data-structure layout, not production use.

mod boxed;
mod config;
mod counters;
mod error;
mod fault;
mod hooks;
mod page_map;
mod profiler;
mod registry;
mod report;

pub mod metrics;

pub use accprof_sys::PAGE_SIZE;
pub use boxed::ProfiledBox;
pub use config::{DEFAULT_REPORT_PATH, MAX_TYPES, ProfilerConfig};
pub use counters::AccessCounters;
pub use error::{ProfilerError, Result};
pub use fault::{Disposition, FaultContext, MAX_PENDING_PAGES, awaiting_restep};
pub use page_map::{PageDescriptor, PageMap};
pub use profiler::Profiler;
pub use registry::{TypeIndex, TypeKey, TypeRecord, TypeRegistry, TypeToken};
pub use report::{Report, TypeReport};
