//! Profiler metrics using metrics-rs.
//!
//! Recorded from registration and `stop()` only; nothing here runs inside a
//! signal handler.

use metrics::{Unit, describe_counter, describe_gauge};

/// Register metric descriptions. Call once at startup if a recorder is
/// installed.
pub fn init() {
    describe_gauge!(
        "accprof_registered_types",
        Unit::Count,
        "Distinct instrumented types in the registry"
    );
    describe_counter!(
        "accprof_accesses_total",
        Unit::Count,
        "Byte accesses counted across all instrumented types"
    );
    describe_counter!(
        "accprof_degraded_types_total",
        Unit::Count,
        "Types left uninstrumented because the registry was full"
    );
}
