//! The profiler context and its process lifecycle.
//!
//! A [`Profiler`] owns the type registry, the page map and the counters.
//! Signal handlers are process-wide, so at most one profiler can be started
//! per process; it is published through a static pointer the handlers read.

use std::any::type_name;
use std::path::Path;
use std::ptr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use tracing::{debug, error, info};

use accprof_sys::{SINGLE_STEP_SUPPORTED, SignalChain};

use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use crate::fault;
use crate::page_map::PageMap;
use crate::registry::{TypeKey, TypeRegistry, TypeToken};
use crate::report::Report;

static ACTIVE: AtomicPtr<Profiler> = AtomicPtr::new(ptr::null_mut());

/// Byte-granularity access profiler.
pub struct Profiler {
    config: ProfilerConfig,
    pub(crate) registry: TypeRegistry,
    pub(crate) pages: PageMap,
    pub(crate) signals: OnceLock<SignalChain>,
    stopped: AtomicBool,
}

impl Profiler {
    /// Create a profiler without installing any signal handlers.
    ///
    /// Types can be registered and reports produced, but allocations are
    /// never tracked: nothing would catch the faults.
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        let registry = TypeRegistry::new(config.max_types);
        Self {
            config,
            registry,
            pages: PageMap::new(),
            signals: OnceLock::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Create the process-wide profiler and install its fault and
    /// single-step handlers.
    ///
    /// # Errors
    ///
    /// Fails if the platform cannot single-step from a signal handler, if a
    /// profiler is already running, or if the handlers cannot be installed.
    pub fn start(config: ProfilerConfig) -> Result<&'static Self> {
        if !SINGLE_STEP_SUPPORTED {
            return Err(ProfilerError::UnsupportedPlatform);
        }

        let raw = Box::into_raw(Box::new(Self::new(config)));
        if ACTIVE
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            drop(unsafe { Box::from_raw(raw) });
            return Err(ProfilerError::AlreadyStarted);
        }
        // Published and never freed from here on.
        let profiler: &'static Self = unsafe { &*raw };

        let chain = match unsafe {
            SignalChain::install(fault::on_fault_signal, fault::on_trap_signal)
        } {
            Ok(chain) => chain,
            Err(e) => {
                ACTIVE.store(ptr::null_mut(), Ordering::Release);
                error!(error = %e, "failed to install signal handlers");
                return Err(ProfilerError::SignalInstall(e));
            }
        };
        let _ = profiler.signals.set(chain);

        info!(
            report = %profiler.config.report_path.display(),
            max_types = profiler.config.max_types,
            "access profiler started"
        );
        Ok(profiler)
    }

    /// The started profiler, if any.
    #[must_use]
    pub fn active() -> Option<&'static Self> {
        let raw = ACTIVE.load(Ordering::Acquire);
        unsafe { raw.as_ref() }
    }

    /// Whether the fault handlers are installed for this profiler.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.signals.get().is_some()
    }

    #[must_use]
    pub const fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn page_map(&self) -> &PageMap {
        &self.pages
    }

    /// Register `T` (or look up its index).
    pub fn register<T: 'static>(&self) -> TypeToken {
        self.registry.register_or_lookup(
            TypeKey::of::<T>(),
            type_name::<T>(),
            std::mem::size_of::<T>(),
        )
    }

    /// Register a layout under an explicitly assigned key.
    pub fn register_custom(&self, key: TypeKey, name: &str, size: usize) -> TypeToken {
        self.registry.register_or_lookup(key, name, size)
    }

    /// Snapshot of every type with at least one counted access.
    #[must_use]
    pub fn report(&self) -> Report {
        Report::collect(&self.registry)
    }

    /// Write the current report to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::ReportIo`] if the file cannot be written.
    pub fn emit_report(&self, path: &Path) -> Result<()> {
        self.report().write_file(path)
    }

    /// Write the final report to the configured path and return it.
    ///
    /// A report that cannot be written is logged and skipped. The handlers
    /// stay installed, since tracked instances may still be alive.
    pub fn stop(&self) -> Report {
        let report = self.report();
        if let Err(e) = report.write_file(&self.config.report_path) {
            error!(error = %e, "skipping access report");
        } else {
            debug!(path = %self.config.report_path.display(), "access report written");
        }

        if !self.stopped.swap(true, Ordering::AcqRel) {
            let total = report.total_accesses();
            metrics::counter!("accprof_accesses_total").increment(total);
            info!(
                types = self.registry.len(),
                reported = report.types.len(),
                accesses = total,
                "access profiler stopped"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_profiler_is_not_armed() {
        let profiler = Profiler::new(ProfilerConfig::default());
        assert!(!profiler.is_armed());
        assert!(profiler.registry().is_empty());
    }

    #[test]
    fn test_register_uses_type_name_and_size() {
        #[allow(dead_code)]
        struct Pair {
            a: u32,
            b: u64,
        }
        let profiler = Profiler::new(ProfilerConfig::default());
        let token = profiler.register::<Pair>();
        let record = profiler.registry().record(token.index().unwrap()).unwrap();
        assert!(record.name().ends_with("Pair"));
        assert_eq!(record.size(), std::mem::size_of::<Pair>());
        assert_eq!(profiler.register::<Pair>(), token);
    }

    #[test]
    fn test_stop_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.out");
        let profiler = Profiler::new(ProfilerConfig::default().with_report_path(&path));

        let token = profiler.register_custom(TypeKey::custom(1), "Widget", 8);
        profiler.registry().increment(token.index().unwrap(), 2);

        let report = profiler.stop();
        assert_eq!(report.types.len(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Widget\n      2: 1\n\n");
    }

    #[test]
    fn test_stop_with_unwritable_destination_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("profile.out");
        let profiler = Profiler::new(ProfilerConfig::default().with_report_path(&path));
        let token = profiler.register_custom(TypeKey::custom(1), "Widget", 8);
        profiler.registry().increment(token.index().unwrap(), 0);

        let report = profiler.stop();
        assert_eq!(report.types.len(), 1);
        assert!(!path.exists());
        assert!(matches!(
            profiler.emit_report(&path),
            Err(ProfilerError::ReportIo { .. })
        ));
    }

    #[test]
    fn test_registry_capacity_limits_report() {
        let profiler = Profiler::new(ProfilerConfig::default());
        let mut tokens = Vec::new();
        for id in 0..301 {
            let token = profiler.register_custom(TypeKey::custom(id), &format!("T{id}"), 4);
            tokens.push(token);
            if let Some(index) = token.index() {
                profiler.registry().increment(index, 0);
            }
        }
        assert_eq!(tokens[300], TypeToken::Untracked);
        let report = profiler.report();
        assert_eq!(report.types.len(), 300);
        assert!(report.find("T300").is_none());
    }
}
