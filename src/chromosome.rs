//! Chromosome identity: normalized names, numeric ordering, and canonical shared instances.

use crate::annotation::Annotations;
use crate::interning::{Interner, InternTable};
use crate::{Error, Result};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Maximum number of chromosomes in the global interning table before it is cleared.
pub const INTERN_CAPACITY: usize = 1000;

/// Annotation key for the free text following the name in a FASTA header.
pub const DESCRIPTION_KEY: &str = "Description";

/// Chromosome number for names that are not base-10 integers.
pub const NOT_A_NUMBER: i32 = i32::MAX;

/// Length of a chromosome with unknown length.
pub const UNKNOWN_LENGTH: i32 = -1;

// Width of the zero-padded numeric prefix in comparison strings.
const PADDED_PREFIX_WIDTH: usize = 5;

/// Returns the process-wide interning table for chromosomes.
pub fn intern_table() -> &'static InternTable<ChromosomeData> {
    static TABLE: OnceLock<InternTable<ChromosomeData>> = OnceLock::new();
    TABLE.get_or_init(|| InternTable::with_capacity(INTERN_CAPACITY))
}

//-----------------------------------------------------------------------------

/// The shared content of a [`Chromosome`].
///
/// Equality and hashing only consider the normalized name.
#[derive(Clone, Debug)]
pub struct ChromosomeData {
    name: String,
    number: i32,
    compare_string: String,
    length: i32,
    annotations: Annotations,
}

impl PartialEq for ChromosomeData {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChromosomeData {}

impl Hash for ChromosomeData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

//-----------------------------------------------------------------------------

/// A named sequence unit: a chromosome, a contig, or a scaffold.
///
/// `Chromosome` is a cheap handle to shared immutable data.
/// Names are normalized to upper case with a leading `CHROMOSOME` or `CHR` removed, and anything after the first space is moved to the `Description` annotation.
/// Two chromosomes with the same normalized name are equal, regardless of length or annotations.
///
/// Chromosomes whose names are both integers are ordered numerically.
/// Otherwise the names are compared as strings after zero-padding a leading digit run, so that `2` sorts before `10` even when mixed with non-numeric names.
///
/// # Examples
///
/// ```
/// use genostore::Chromosome;
///
/// let chr10 = Chromosome::new("chr10").unwrap();
/// let chr2 = Chromosome::new("Chr2").unwrap();
/// assert_eq!(chr10.name(), "10");
/// assert!(chr2 < chr10);
///
/// let first = Chromosome::new("scaffold_2").unwrap();
/// let second = Chromosome::new("scaffold_10").unwrap();
/// assert!(second < first);
/// assert_eq!(first.number(), None);
/// ```
#[derive(Clone)]
pub struct Chromosome {
    data: Arc<ChromosomeData>,
}

impl Chromosome {
    /// Creates a chromosome with unknown length from a raw name.
    ///
    /// Text after the first space is stored as the `Description` annotation.
    /// Returns an error if the name is empty.
    pub fn new(raw_name: &str) -> Result<Self> {
        Self::with_length(raw_name, UNKNOWN_LENGTH, Self::description(raw_name))
    }

    /// Creates a chromosome with the given length and annotations.
    ///
    /// # Arguments
    ///
    /// * `raw_name`: Name to be normalized.
    /// * `length`: Length of the chromosome, or [`UNKNOWN_LENGTH`].
    /// * `annotations`: Annotations for the chromosome.
    pub fn with_length(raw_name: &str, length: i32, annotations: Annotations) -> Result<Self> {
        if raw_name.trim().is_empty() {
            return Err(Error::invalid("Chromosome: name can't be empty"));
        }
        let name = normalize_name(raw_name);
        if name.is_empty() {
            return Err(Error::invalid(format!("Chromosome: name {} is empty after normalization", raw_name)));
        }
        let number = name.parse::<i32>().ok().filter(|n| *n != NOT_A_NUMBER).unwrap_or(NOT_A_NUMBER);
        let compare_string = padded_compare_string(&name);
        let data = ChromosomeData {
            name: name,
            number: number,
            compare_string: compare_string,
            length: length,
            annotations: annotations,
        };
        Ok(Chromosome {
            data: Arc::new(data),
        })
    }

    /// Parses a raw name and returns the canonical instance from the global table.
    pub fn parse(raw_name: &str) -> Result<Self> {
        Ok(Self::new(raw_name)?.canonicalize())
    }

    /// Returns the placeholder chromosome `UNKNOWN`.
    pub fn unknown() -> Self {
        static UNKNOWN: OnceLock<Chromosome> = OnceLock::new();
        UNKNOWN.get_or_init(|| {
            let data = ChromosomeData {
                name: String::from("UNKNOWN"),
                number: NOT_A_NUMBER,
                compare_string: String::from("UNKNOWN"),
                length: UNKNOWN_LENGTH,
                annotations: Annotations::new(),
            };
            Chromosome { data: Arc::new(data) }
        }).clone()
    }

    /// Returns a copy of the chromosome with a different length.
    pub fn with_new_length(&self, length: i32) -> Self {
        let mut data = self.data.as_ref().clone();
        data.length = length;
        Chromosome {
            data: Arc::new(data),
        }
    }

    /// Returns an equal chromosome from the global interning table.
    pub fn canonicalize(self) -> Self {
        self.canonicalize_with(intern_table())
    }

    /// Returns an equal chromosome from the given interning table.
    pub fn canonicalize_with(self, interner: &dyn Interner<ChromosomeData>) -> Self {
        Chromosome {
            data: interner.intern(self.data),
        }
    }

    /// Returns `true` if both handles point to the same shared data.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Returns the normalized name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Returns the chromosome number, or [`None`] if the name is not a base-10 integer.
    #[inline]
    pub fn number(&self) -> Option<i32> {
        if self.data.number == NOT_A_NUMBER { None } else { Some(self.data.number) }
    }

    /// Returns the chromosome number, or [`NOT_A_NUMBER`] if the name is not a base-10 integer.
    #[inline]
    pub fn number_or_sentinel(&self) -> i32 {
        self.data.number
    }

    /// Returns the length of the chromosome, or [`UNKNOWN_LENGTH`].
    #[inline]
    pub fn length(&self) -> i32 {
        self.data.length
    }

    /// Returns the annotations.
    #[inline]
    pub fn annotations(&self) -> &Annotations {
        &self.data.annotations
    }

    /// Returns the string used for non-numeric comparisons.
    #[inline]
    pub fn compare_string(&self) -> &str {
        &self.data.compare_string
    }

    // Annotations derived from the text after the first space.
    fn description(raw_name: &str) -> Annotations {
        match raw_name.find(' ') {
            Some(offset) if offset > 0 => Annotations::builder().add(DESCRIPTION_KEY, &raw_name[offset + 1..]).build(),
            _ => Annotations::new(),
        }
    }
}

//-----------------------------------------------------------------------------

/// Normalizes a chromosome name.
///
/// The name is trimmed and converted to upper case.
/// A leading `CHROMOSOME` and then a leading `CHR` are removed.
/// Anything starting from the first space is dropped.
pub fn normalize_name(raw_name: &str) -> String {
    let upper = raw_name.trim().to_uppercase();
    let mut name: &str = &upper;
    if let Some(rest) = name.strip_prefix("CHROMOSOME") {
        name = rest;
    }
    if let Some(rest) = name.strip_prefix("CHR") {
        name = rest;
    }
    match name.find(' ') {
        Some(offset) if offset > 0 => name[..offset].to_string(),
        _ => name.to_string(),
    }
}

// Pads a leading digit run with zeros to a fixed width.
fn padded_compare_string(name: &str) -> String {
    let digits = name.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return name.to_string();
    }
    let padding = PADDED_PREFIX_WIDTH.saturating_sub(digits);
    let mut result = "0".repeat(padding);
    result.push_str(name);
    result
}

//-----------------------------------------------------------------------------

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.data.name == other.data.name
    }
}

impl Eq for Chromosome {}

impl Hash for Chromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl PartialOrd for Chromosome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Chromosome {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        let ordering = if self.data.number != NOT_A_NUMBER && other.data.number != NOT_A_NUMBER {
            self.data.number.cmp(&other.data.number)
        } else {
            self.data.compare_string.cmp(&other.data.compare_string)
        };
        // Names such as `01` and `1` compare equal above.
        ordering.then_with(|| self.data.name.cmp(&other.data.name))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chromosome").field("name", &self.data.name).field("length", &self.data.length).finish()
    }
}

//-----------------------------------------------------------------------------
