//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use chrono::{DateTime, FixedOffset};
use std::fmt::Debug;
use std::hash::Hash;

/// Port for obtaining the current wall-clock time.
///
/// The returned value carries its UTC offset so that calendar-day
/// extraction (`date_naive()`) follows the offset the clock reports.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current date-time.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Port for concurrent key-value storage.
///
/// Every method is atomic with respect to a single key: a reader never
/// observes a half-applied insert, replacement or removal. No ordering is
/// promised across different keys.
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an entry without creating it.
    ///
    /// Returns `None` if the key is absent, otherwise the accessor's result.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Insert a value, returning the one it replaced.
    fn insert(&self, key: K, value: V) -> Option<V>;

    /// Remove an entry only if the predicate accepts its current value.
    ///
    /// The check and the removal happen under the same lock.
    fn remove_if<F>(&self, key: &K, predicate: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool;

    /// Remove an entry unconditionally.
    fn remove(&self, key: &K) -> Option<V>;

    /// Check whether a key is present.
    fn contains_key(&self, key: &K) -> bool;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}
