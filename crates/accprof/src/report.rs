//! Access report.
//!
//! ```text
//! accprof::demo::Record
//!      50: 21
//!      54: 30
//!
//! accprof::demo::Other
//!       0: 4
//!
//! ```
//!
//! One block per type with at least one counted access, in registration
//! order. Offsets ascend; zero counts are omitted.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{ProfilerError, Result};
use crate::registry::TypeRegistry;

/// Counted accesses of one type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeReport {
    pub name: String,
    pub size: usize,
    /// `(offset, count)` pairs with non-zero counts, ascending by offset.
    pub counts: Vec<(usize, u64)>,
}

impl TypeReport {
    /// Count at `offset` (zero if never accessed).
    #[must_use]
    pub fn count_at(&self, offset: usize) -> u64 {
        self.counts
            .binary_search_by_key(&offset, |&(o, _)| o)
            .map_or(0, |i| self.counts[i].1)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&(_, c)| c).sum()
    }
}

/// Snapshot of all counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub types: Vec<TypeReport>,
}

impl Report {
    /// Read every registered type's counters.
    #[must_use]
    pub fn collect(registry: &TypeRegistry) -> Self {
        let types = registry
            .records()
            .filter_map(|record| {
                let counts: Vec<_> = record.counters().nonzero().collect();
                (!counts.is_empty()).then(|| TypeReport {
                    name: record.name().to_owned(),
                    size: record.size(),
                    counts,
                })
            })
            .collect();
        Self { types }
    }

    /// Block for the type with display name `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TypeReport> {
        self.types.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn total_accesses(&self) -> u64 {
        self.types.iter().map(TypeReport::total).sum()
    }

    /// Render the report.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `out`.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        write!(out, "{self}")
    }

    /// Render the report into a fresh file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::ReportIo`] if the file cannot be created or
    /// written.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let io_err = |source: io::Error| ProfilerError::ReportIo {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out).map_err(io_err)?;
        out.flush().map_err(io_err)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.types {
            writeln!(f, "{}", ty.name)?;
            for (offset, count) in &ty.counts {
                writeln!(f, "   {offset:4}: {count}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeKey;

    fn sample_registry() -> TypeRegistry {
        let registry = TypeRegistry::new(8);
        let a = registry
            .register_or_lookup(TypeKey::custom(1), "Record", 58)
            .index()
            .unwrap();
        let _untouched = registry.register_or_lookup(TypeKey::custom(2), "Idle", 16);
        let b = registry
            .register_or_lookup(TypeKey::custom(3), "Other", 4)
            .index()
            .unwrap();

        for _ in 0..3 {
            registry.increment(a, 54);
        }
        registry.increment(a, 50);
        registry.increment(b, 0);
        registry
    }

    #[test]
    fn test_collect_skips_untouched_types() {
        let report = Report::collect(&sample_registry());
        let names: Vec<_> = report.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Record", "Other"]);
        assert!(report.find("Idle").is_none());
    }

    #[test]
    fn test_counts_ascending() {
        let report = Report::collect(&sample_registry());
        let record = report.find("Record").unwrap();
        assert_eq!(record.counts, vec![(50, 1), (54, 3)]);
        assert_eq!(record.count_at(54), 3);
        assert_eq!(record.count_at(0), 0);
        assert_eq!(record.size, 58);
        assert_eq!(report.total_accesses(), 5);
    }

    #[test]
    fn test_render_format() {
        let report = Report::collect(&sample_registry());
        assert_eq!(
            report.to_string(),
            "Record\n     50: 1\n     54: 3\n\nOther\n      0: 1\n\n"
        );
    }

    #[test]
    fn test_empty_report_renders_nothing() {
        let report = Report::collect(&TypeRegistry::new(4));
        assert!(report.types.is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_profile.out");
        let report = Report::collect(&sample_registry());
        report.write_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), report.to_string());
    }
}
