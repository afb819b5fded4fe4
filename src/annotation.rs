//! Free-form key-value annotations attached to chromosomes and positions.
//!
//! An [`Annotations`] value is an immutable, sorted multiset of `(key, value)` entries.
//! Entries are shared between annotation sets through an [`Interner`], as the same entries (e.g. `DP=10`) tend to appear at millions of positions.

use crate::interning::{Interner, InternTable};

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

//-----------------------------------------------------------------------------

/// Maximum number of distinct entries in the global entry table before it is cleared.
pub const ENTRY_CACHE_CAPACITY: usize = 1_000_000;

/// Returns the process-wide interning table for annotation entries.
pub fn entry_cache() -> &'static InternTable<AnnotationEntry> {
    static CACHE: OnceLock<InternTable<AnnotationEntry>> = OnceLock::new();
    CACHE.get_or_init(|| InternTable::with_capacity(ENTRY_CACHE_CAPACITY))
}

//-----------------------------------------------------------------------------

/// A single `(key, value)` annotation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnotationEntry {
    key: String,
    value: String,
}

impl AnnotationEntry {
    /// Creates a new entry.
    pub fn new(key: &str, value: &str) -> Self {
        AnnotationEntry {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

//-----------------------------------------------------------------------------

/// An immutable set of annotations.
///
/// Keys may have multiple values.
/// Values are stored as text; numeric values are parsed on demand.
///
/// # Examples
///
/// ```
/// use genostore::annotation::Annotations;
///
/// let annotations = Annotations::builder()
///     .add("DP", "12")
///     .add("GT", "0/0")
///     .add_number("DP", 3.0)
///     .build();
/// assert_eq!(annotations.len(), 3);
/// assert_eq!(annotations.text("GT"), vec!["0/0"]);
/// assert_eq!(annotations.average("DP"), 7.5);
/// assert!(annotations.average("GQ").is_nan());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Annotations {
    // Sorted by key, then by value.
    entries: Vec<Arc<AnnotationEntry>>,
}

impl Annotations {
    /// Returns an empty annotation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder for a new annotation set.
    pub fn builder() -> AnnotationBuilder {
        AnnotationBuilder::new()
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the entries as `(key, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|entry| (entry.key(), entry.value()))
    }

    // Returns the entries with the given key.
    fn entries_for(&self, key: &str) -> &[Arc<AnnotationEntry>] {
        let start = self.entries.partition_point(|entry| entry.key() < key);
        let limit = start + self.entries[start..].partition_point(|entry| entry.key() == key);
        &self.entries[start..limit]
    }

    /// Returns all text values for the key in sorted order.
    pub fn text(&self, key: &str) -> Vec<&str> {
        self.entries_for(key).iter().map(|entry| entry.value()).collect()
    }

    /// Returns the first text value for the key, or [`None`] if the key is not present.
    pub fn first_text(&self, key: &str) -> Option<&str> {
        self.entries_for(key).first().map(|entry| entry.value())
    }

    /// Returns the values for the key that can be parsed as numbers.
    pub fn quantitative(&self, key: &str) -> Vec<f64> {
        self.entries_for(key).iter().filter_map(|entry| entry.value().trim().parse::<f64>().ok()).collect()
    }

    /// Returns the average of the numeric values for the key, or NaN if there are none.
    pub fn average(&self, key: &str) -> f64 {
        let values = self.quantitative(key);
        if values.is_empty() {
            return f64::NAN;
        }
        values.iter().sum::<f64>() / (values.len() as f64)
    }

    /// Returns the distinct keys.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|entry| entry.key()).collect()
    }

    /// Returns `true` if at least one entry has the key.
    pub fn contains_key(&self, key: &str) -> bool {
        !self.entries_for(key).is_empty()
    }

    /// Returns `true` if the key has the given value.
    pub fn is_annotated_with_value(&self, key: &str, value: &str) -> bool {
        self.entries_for(key).iter().any(|entry| entry.value() == value)
    }

    /// Returns the values for the key joined with commas.
    pub fn concatenated_text(&self, key: &str) -> String {
        self.text(key).join(",")
    }
}

//-----------------------------------------------------------------------------

/// A builder for [`Annotations`].
#[derive(Clone, Debug, Default)]
pub struct AnnotationBuilder {
    entries: Vec<AnnotationEntry>,
}

impl AnnotationBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a text annotation.
    pub fn add(mut self, key: &str, value: &str) -> Self {
        self.push(key, value);
        self
    }

    /// Adds a numeric annotation, stored in its text form.
    pub fn add_number(mut self, key: &str, value: f64) -> Self {
        self.push(key, &value.to_string());
        self
    }

    /// Adds all entries from an existing annotation set.
    pub fn add_all(mut self, annotations: &Annotations) -> Self {
        for (key, value) in annotations.iter() {
            self.push(key, value);
        }
        self
    }

    /// Adds a text annotation to a builder behind a mutable reference.
    pub fn push(&mut self, key: &str, value: &str) {
        self.entries.push(AnnotationEntry::new(key, value));
    }

    /// Builds the annotation set using the global entry table.
    pub fn build(self) -> Annotations {
        self.build_with(entry_cache())
    }

    /// Builds the annotation set using the given entry table.
    pub fn build_with(mut self, interner: &dyn Interner<AnnotationEntry>) -> Annotations {
        self.entries.sort_unstable();
        self.entries.dedup();
        let entries = self.entries.into_iter().map(|entry| interner.intern(Arc::new(entry))).collect();
        Annotations {
            entries: entries,
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::interning::NoInterning;

    #[test]
    fn queries() {
        let annotations = Annotations::builder()
            .add("VARIANT", "A/T")
            .add("END", "105")
            .add("AD", "3,0")
            .add("AD", "1,2")
            .add("FLAG", "TRUE")
            .build();

        assert_eq!(annotations.len(), 5, "Invalid number of entries");
        assert_eq!(annotations.text("AD"), vec!["1,2", "3,0"], "Values are not sorted");
        assert_eq!(annotations.first_text("END"), Some("105"), "Invalid first value");
        assert_eq!(annotations.first_text("DP"), None, "Found a missing key");
        assert_eq!(annotations.quantitative("END"), vec![105.0], "Invalid numeric values");
        assert!(annotations.quantitative("AD").is_empty(), "Parsed a list as a number");
        assert_eq!(annotations.concatenated_text("AD"), "1,2,3,0", "Invalid concatenation");
        assert!(annotations.is_annotated_with_value("FLAG", "TRUE"), "Missing flag value");
        assert!(!annotations.is_annotated_with_value("FLAG", "FALSE"), "Found a wrong flag value");

        let keys: Vec<&str> = annotations.keys().into_iter().collect();
        assert_eq!(keys, vec!["AD", "END", "FLAG", "VARIANT"], "Invalid keys");
        assert!(annotations.contains_key("VARIANT"), "Missing key");
        assert!(!annotations.contains_key("VAR"), "Found a key prefix");
    }

    #[test]
    fn duplicates_and_copies() {
        let original = Annotations::builder().add("DP", "10").add("DP", "10").build();
        assert_eq!(original.len(), 1, "Duplicate entries were not merged");

        let copy = Annotations::builder().add_all(&original).add("GQ", "99").build();
        assert_eq!(copy.len(), 2, "Invalid number of entries after copying");
        assert_eq!(copy.first_text("DP"), Some("10"), "Copied value was lost");
    }

    #[test]
    fn shared_entries() {
        let table: InternTable<AnnotationEntry> = InternTable::with_capacity(10);
        let first = Annotations::builder().add("DP", "10").build_with(&table);
        let second = Annotations::builder().add("DP", "10").add("GT", "0/0").build_with(&table);
        assert!(Arc::ptr_eq(&first.entries[0], &second.entries[0]), "Entries were not shared");
        assert_eq!(table.len(), 2, "Invalid number of interned entries");

        let third = Annotations::builder().add("DP", "10").build_with(&NoInterning);
        assert!(!Arc::ptr_eq(&first.entries[0], &third.entries[0]), "Entries were shared without interning");
        assert_eq!(first, third, "Annotation sets with equal entries are not equal");
    }
}

//-----------------------------------------------------------------------------
