//! Bounded interning tables for values that are created many times with the same content.
//!
//! Chromosomes and annotation entries are shared between a large number of positions.
//! An [`Interner`] maps structurally equal values to a single shared instance.
//! The tables do not evict by recency: once a table grows past its capacity, it is cleared before the next insertion.
//! Callers may rely on the returned value being equal to the argument, but not on pointer identity across a clear.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

//-----------------------------------------------------------------------------

/// A canonicalizing cache for shared immutable values.
pub trait Interner<T: ?Sized>: Send + Sync {
    /// Returns a previously interned value equal to `value`, or interns and returns `value`.
    fn intern(&self, value: Arc<T>) -> Arc<T>;

    /// Returns the number of values in the table.
    fn len(&self) -> usize;

    /// Returns `true` if the table is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all values from the table.
    fn clear(&self);
}

//-----------------------------------------------------------------------------

/// An interning table with a soft capacity and clear-on-full eviction.
///
/// # Examples
///
/// ```
/// use genostore::interning::{Interner, InternTable};
/// use std::sync::Arc;
///
/// let table: InternTable<String> = InternTable::with_capacity(10);
/// let first = table.intern(Arc::new(String::from("chr1")));
/// let second = table.intern(Arc::new(String::from("chr1")));
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Debug)]
pub struct InternTable<T: Eq + Hash> {
    capacity: usize,
    values: Mutex<HashSet<Arc<T>>>,
}

impl<T: Eq + Hash> InternTable<T> {
    /// Creates an empty table that is cleared when it holds more than `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        InternTable {
            capacity: capacity,
            values: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the capacity of the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the set in an inconsistent state.
    fn lock(&self) -> MutexGuard<'_, HashSet<Arc<T>>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Eq + Hash + Send + Sync> Interner<T> for InternTable<T> {
    fn intern(&self, value: Arc<T>) -> Arc<T> {
        let mut values = self.lock();
        if values.len() > self.capacity {
            values.clear();
        }
        if let Some(existing) = values.get(value.as_ref()) {
            return existing.clone();
        }
        values.insert(value.clone());
        value
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

//-----------------------------------------------------------------------------

/// An interner that never shares values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NoInterning;

impl<T: ?Sized + Send + Sync> Interner<T> for NoInterning {
    fn intern(&self, value: Arc<T>) -> Arc<T> {
        value
    }

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_equal_values() {
        let table: InternTable<String> = InternTable::with_capacity(100);
        let first = table.intern(Arc::new(String::from("10")));
        let second = table.intern(Arc::new(String::from("10")));
        let third = table.intern(Arc::new(String::from("2")));
        assert!(Arc::ptr_eq(&first, &second), "Equal values were not shared");
        assert!(!Arc::ptr_eq(&first, &third), "Different values were shared");
        assert_eq!(table.len(), 2, "Invalid table size");
    }

    #[test]
    fn clears_when_full() {
        let table: InternTable<u32> = InternTable::with_capacity(2);
        let first = table.intern(Arc::new(1));
        table.intern(Arc::new(2));
        table.intern(Arc::new(3));
        assert_eq!(table.len(), 3, "The table was cleared too early");

        table.intern(Arc::new(4));
        assert_eq!(table.len(), 1, "The table was not cleared when full");

        let again = table.intern(Arc::new(1));
        assert_eq!(again, first, "Value changed after clearing");
        assert!(!Arc::ptr_eq(&again, &first), "Identity survived clearing the table");
    }

    #[test]
    fn no_interning() {
        let first = NoInterning.intern(Arc::new(String::from("A")));
        let second = NoInterning.intern(Arc::new(String::from("A")));
        assert!(!Arc::ptr_eq(&first, &second), "NoInterning shared values");
        assert!(Interner::<String>::is_empty(&NoInterning), "NoInterning is not empty");
    }
}

//-----------------------------------------------------------------------------
