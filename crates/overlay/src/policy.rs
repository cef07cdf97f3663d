//! Per-kind storage policies and their conflict callbacks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use crate::key::InfoHash;
use crate::record::Record;

//================================================================================================
// Types
//================================================================================================

/// Decides whether a replica admits a brand-new record at a key.
pub type StoreCallback = Arc<dyn Fn(&InfoHash, &Record) -> bool + Send + Sync>;

/// Decides whether an incoming record supersedes the stored record with the
/// same `(kind, id)` pair. Returning `false` keeps the old record and lets
/// the newcomer coexist beside it.
pub type EditCallback = Arc<dyn Fn(&InfoHash, &Record, &Record) -> bool + Send + Sync>;

/// A registered record kind: its wire id, lifetime, and conflict callbacks.
///
/// Callbacks run on overlay threads, on every replica holding the key. They
/// must be pure functions of the key and payloads; a callback that panics is
/// treated as having rejected the record, so no panic ever crosses the
/// overlay boundary.
#[derive(Clone)]
pub struct ValueType {
    id: u16,
    name: &'static str,
    lifetime: Duration,
    store: StoreCallback,
    edit: EditCallback,
}

/// Filters `get` results down to a single record kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFilter {
    /// Keep every record at the key.
    Any,
    /// Keep only records of the given kind id.
    Kind(u16),
}

//================================================================================================
// Impls
//================================================================================================

impl ValueType {
    /// Registers a record kind with its lifetime and callbacks.
    pub fn new(
        id: u16,
        name: &'static str,
        lifetime: Duration,
        store: StoreCallback,
        edit: EditCallback,
    ) -> Self {
        ValueType {
            id,
            name,
            lifetime,
            store,
            edit,
        }
    }

    /// The wire kind id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The human-readable policy name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// How long records of this kind live on a replica.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub(crate) fn accept_store(&self, key: &InfoHash, incoming: &Record) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.store)(key, incoming))).unwrap_or(false)
    }

    pub(crate) fn accept_edit(&self, key: &InfoHash, old: &Record, incoming: &Record) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.edit)(key, old, incoming))).unwrap_or(false)
    }
}

impl TypeFilter {
    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Kind(id) => record.kind == *id,
        }
    }
}

impl std::fmt::Debug for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_all() -> (StoreCallback, EditCallback) {
        (Arc::new(|_, _| true), Arc::new(|_, _, _| true))
    }

    #[test]
    fn filter_by_kind() {
        let rec = Record::new(7, 1, "x");
        assert!(TypeFilter::Any.matches(&rec));
        assert!(TypeFilter::Kind(7).matches(&rec));
        assert!(!TypeFilter::Kind(8).matches(&rec));
    }

    #[test]
    fn panicking_callback_rejects() {
        let (store, _) = accept_all();
        let vt = ValueType::new(
            1,
            "panicky",
            Duration::from_secs(60),
            store,
            Arc::new(|_, _, _| panic!("boom")),
        );
        let key = InfoHash::get("k");
        let rec = Record::new(1, 1, "x");
        assert!(!vt.accept_edit(&key, &rec, &rec));
        assert!(vt.accept_store(&key, &rec));
    }
}
