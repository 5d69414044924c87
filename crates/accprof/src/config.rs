//! Profiler configuration.

use std::path::PathBuf;

/// Default cap on distinct instrumented types.
pub const MAX_TYPES: usize = 300;

/// Default report file name, relative to the working directory.
pub const DEFAULT_REPORT_PATH: &str = "access_profile.out";

/// Profiler configuration.
#[derive(Clone, Debug)]
pub struct ProfilerConfig {
    /// Where `stop()` writes the report.
    pub report_path: PathBuf,
    /// Capacity of the type registry. Types past this are left uninstrumented.
    pub max_types: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            max_types: MAX_TYPES,
        }
    }
}

impl ProfilerConfig {
    /// Set the report destination.
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Set the type registry capacity.
    #[must_use]
    pub const fn with_max_types(mut self, max_types: usize) -> Self {
        self.max_types = max_types;
        self
    }
}
