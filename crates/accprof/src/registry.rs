//! Type registry.
//!
//! Assigns a dense [`TypeIndex`] to each distinct instrumented type the first
//! time it is seen and owns that type's [`AccessCounters`]. The registry only
//! grows; once it holds `capacity` types every new type is handed
//! [`TypeToken::Untracked`].
//!
//! Records live in a fixed slot table sized up front, so the fault handler can
//! reach a type's counters by index without taking any lock.

use std::any::TypeId;
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::counters::AccessCounters;

/// Process-stable identity of an instrumented type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeKey(KeyRepr);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum KeyRepr {
    Type(TypeId),
    Custom(u64),
}

impl TypeKey {
    /// Key for a Rust type.
    #[must_use]
    pub const fn of<T: ?Sized + 'static>() -> Self {
        Self(KeyRepr::Type(TypeId::of::<T>()))
    }

    /// Explicitly assigned key, for layouts that have no Rust type of their own.
    #[must_use]
    pub const fn custom(id: u64) -> Self {
        Self(KeyRepr::Custom(id))
    }
}

/// Dense index of a registered type, in `[0, capacity)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);

impl TypeIndex {
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Outcome of registration: either a tracked index or "do not instrument".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeToken {
    Tracked(TypeIndex),
    Untracked,
}

impl TypeToken {
    #[must_use]
    pub const fn index(self) -> Option<TypeIndex> {
        match self {
            Self::Tracked(index) => Some(index),
            Self::Untracked => None,
        }
    }

    #[must_use]
    pub const fn is_tracked(self) -> bool {
        matches!(self, Self::Tracked(_))
    }
}

/// One registered type.
#[derive(Debug)]
pub struct TypeRecord {
    index: TypeIndex,
    name: Box<str>,
    counters: AccessCounters,
}

impl TypeRecord {
    #[must_use]
    pub const fn index(&self) -> TypeIndex {
        self.index
    }

    /// Display name used in the report.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte size fixed at registration.
    #[must_use]
    pub fn size(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub const fn counters(&self) -> &AccessCounters {
        &self.counters
    }
}

/// Bounded registry of instrumented types.
pub struct TypeRegistry {
    index: RwLock<FxHashMap<TypeKey, TypeIndex>>,
    records: Box<[OnceLock<TypeRecord>]>,
    refused: Mutex<FxHashSet<TypeKey>>,
}

impl TypeRegistry {
    /// Create a registry with room for `capacity` types.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            index: RwLock::new(FxHashMap::default()),
            records: (0..capacity).map(|_| OnceLock::new()).collect(),
            refused: Mutex::new(FxHashSet::default()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of an already registered key.
    #[must_use]
    pub fn lookup(&self, key: TypeKey) -> Option<TypeIndex> {
        self.index.read().get(&key).copied()
    }

    /// Return the index for `key`, registering it with a zeroed counter
    /// array of `size` entries on first use.
    ///
    /// Yields [`TypeToken::Untracked`] for zero-sized layouts and once the
    /// registry is full.
    pub fn register_or_lookup(&self, key: TypeKey, name: &str, size: usize) -> TypeToken {
        if size == 0 {
            return TypeToken::Untracked;
        }
        if let Some(index) = self.lookup(key) {
            return TypeToken::Tracked(index);
        }

        let mut map = self.index.write();
        // Another thread may have registered it between the two locks.
        if let Some(&index) = map.get(&key) {
            return TypeToken::Tracked(index);
        }

        let slot = map.len();
        let Some(cell) = self.records.get(slot) else {
            drop(map);
            self.refuse(key, name);
            return TypeToken::Untracked;
        };
        let Ok(raw) = u32::try_from(slot) else {
            drop(map);
            self.refuse(key, name);
            return TypeToken::Untracked;
        };

        let index = TypeIndex(raw);
        let record = TypeRecord {
            index,
            name: name.into(),
            counters: AccessCounters::new(size),
        };
        if cell.set(record).is_err() {
            return TypeToken::Untracked;
        }
        map.insert(key, index);
        drop(map);

        debug!(type_name = name, index = raw, size, "registered type");
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("accprof_registered_types").set((slot + 1) as f64);
        TypeToken::Tracked(index)
    }

    fn refuse(&self, key: TypeKey, name: &str) {
        let mut refused = self.refused.lock();
        if !refused.insert(key) {
            return;
        }
        let first = refused.len() == 1;
        drop(refused);

        if first {
            warn!(
                type_name = name,
                capacity = self.capacity(),
                "type registry full, further types are not instrumented"
            );
        } else {
            debug!(type_name = name, "type registry full, not instrumenting");
        }
        metrics::counter!("accprof_degraded_types_total").increment(1);
    }

    /// Number of distinct types refused because the registry was full.
    #[must_use]
    pub fn refused(&self) -> usize {
        self.refused.lock().len()
    }

    /// Record for `index`, without locking.
    #[inline]
    #[must_use]
    pub fn record(&self, index: TypeIndex) -> Option<&TypeRecord> {
        self.records.get(index.as_usize())?.get()
    }

    /// Count one access at `offset` of the type at `index`.
    #[inline]
    pub fn increment(&self, index: TypeIndex, offset: usize) {
        if let Some(record) = self.record(index) {
            record.counters.increment(offset);
        }
    }

    /// Registered records in index order.
    pub fn records(&self) -> impl Iterator<Item = &TypeRecord> {
        self.records.iter().filter_map(OnceLock::get)
    }
}
