//! Profiler error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by profiler setup and reporting.
///
/// Conditions inside the instrumentation itself (a full type registry, a
/// fault on an untracked page) are not errors and never reach the caller.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("a profiler is already running in this process")]
    AlreadyStarted,

    #[error("single-step trapping is not supported on this platform")]
    UnsupportedPlatform,

    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[source] nix::Error),

    #[error("failed to write report to {path}: {source}")]
    ReportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
