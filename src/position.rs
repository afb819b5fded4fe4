//! Genomic positions: an immutable site on a chromosome with allele states and annotations.

use crate::annotation::{AnnotationBuilder, AnnotationEntry, Annotations, entry_cache};
use crate::chromosome::{Chromosome, ChromosomeData, intern_table};
use crate::interning::Interner;
use crate::support;
use crate::{Error, Result};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};


//-----------------------------------------------------------------------------

/// Annotation key for the known variants of a position.
pub const VARIANT_KEY: &str = "VARIANT";

/// Value stored for a flag annotation without a value.
pub const FLAG_VALUE: &str = "TRUE";

//-----------------------------------------------------------------------------

/// Strand of a position.
///
/// The numeric codes determine the ordering of positions: unknown < minus < plus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Numeric code for the plus strand.
    pub const PLUS_CODE: i8 = 1;

    /// Numeric code for the minus strand.
    pub const MINUS_CODE: i8 = 0;

    /// Numeric code for an unknown strand.
    pub const UNKNOWN_CODE: i8 = i8::MIN;

    /// Returns the numeric code of the strand.
    #[inline]
    pub fn code(self) -> i8 {
        match self {
            Strand::Plus => Self::PLUS_CODE,
            Strand::Minus => Self::MINUS_CODE,
            Strand::Unknown => Self::UNKNOWN_CODE,
        }
    }

    /// Returns the strand with the given numeric code, or an error if the code is not valid.
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            Self::PLUS_CODE => Ok(Strand::Plus),
            Self::MINUS_CODE => Ok(Strand::Minus),
            Self::UNKNOWN_CODE => Ok(Strand::Unknown),
            _ => Err(Error::illegal_state(format!("unknown strand value: {}", code))),
        }
    }

    /// Parses a strand from `+`, `-`, or `N`.
    ///
    /// Numeric codes `1` and `0` are also accepted.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "+" | "1" => Ok(Strand::Plus),
            "-" | "0" => Ok(Strand::Minus),
            "N" => Ok(Strand::Unknown),
            _ => Err(Error::illegal_state(format!("unknown strand value: {}", value))),
        }
    }

    /// Returns the string form of the strand.
    pub fn as_str(self) -> &'static str {
        match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Unknown => "N",
        }
    }
}

impl Default for Strand {
    fn default() -> Self {
        Strand::Plus
    }
}

//-----------------------------------------------------------------------------

/// Allele roles stored at a position.
///
/// Each role occupies 4 bits in the packed allele value, at offset `4 * index()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlleleType {
    Major,
    Minor,
    GlobalMajor,
    GlobalMinor,
    Reference,
    Alternate,
    HighCoverage,
    LowCoverage,
    Minor2,
    Minor3,
    Minor4,
    Minor5,
    Ancestral,
    Unknown,
}

impl AlleleType {
    /// Number of allele types.
    pub const COUNT: usize = 14;

    /// All allele types in index order.
    pub const ALL: [AlleleType; Self::COUNT] = [
        AlleleType::Major, AlleleType::Minor, AlleleType::GlobalMajor, AlleleType::GlobalMinor,
        AlleleType::Reference, AlleleType::Alternate, AlleleType::HighCoverage, AlleleType::LowCoverage,
        AlleleType::Minor2, AlleleType::Minor3, AlleleType::Minor4, AlleleType::Minor5,
        AlleleType::Ancestral, AlleleType::Unknown,
    ];

    /// Returns the index of the allele type.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the allele type with the given index, or [`None`] if there is no such type.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the allele types for major and minor alleles by frequency rank.
    pub fn frequency_order() -> [AlleleType; 6] {
        [AlleleType::Major, AlleleType::Minor, AlleleType::Minor2, AlleleType::Minor3, AlleleType::Minor4, AlleleType::Minor5]
    }
}

//-----------------------------------------------------------------------------

/// An immutable genomic position.
///
/// Positions are totally ordered by chromosome, physical position, insertion position, strand code, and finally SNP name.
/// Two positions without explicit names compare equal when the other fields are equal.
/// A position without an explicit name reports the default name `S<chromosome>_<position>`.
///
/// # Examples
///
/// ```
/// use genostore::{Chromosome, Position};
/// use genostore::position::AlleleType;
/// use genostore::support;
///
/// let chr = Chromosome::new("chr1").unwrap();
/// let position = Position::builder(chr, 1000)
///     .known_variants(&["A", "T"])
///     .allele(AlleleType::Reference, support::A_ALLELE)
///     .add_anno_pair("DP=12")
///     .build();
/// assert_eq!(position.snp_id(), "S1_1000");
/// assert_eq!(position.actual_snp_id(), None);
/// assert_eq!(position.known_variants(), vec!["A", "T"]);
/// assert_eq!(position.allele(AlleleType::Reference), support::A_ALLELE);
/// assert_eq!(position.allele(AlleleType::Major), support::UNKNOWN_ALLELE);
/// assert_eq!(position.annotations().first_text("DP"), Some("12"));
/// ```
#[derive(Clone, Debug)]
pub struct Position {
    chromosome: Chromosome,
    position: i32,
    insertion_position: i16,
    strand: Strand,
    snp_name: Option<String>,
    nucleotide: bool,
    indel: bool,
    maf: f32,
    site_coverage: f32,
    alleles: u64,
    annotations: Annotations,
}

impl Position {
    /// Returns a builder for a position on the given chromosome.
    pub fn builder(chromosome: Chromosome, position: i32) -> Builder {
        Builder::new(chromosome, position)
    }

    /// Creates a position with default fields on the chromosome with the given raw name.
    pub fn of(chromosome: &str, position: i32) -> Result<Self> {
        Ok(Builder::new(Chromosome::parse(chromosome)?, position).build())
    }

    #[inline]
    pub fn chromosome(&self) -> &Chromosome {
        &self.chromosome
    }

    /// Returns the physical position.
    #[inline]
    pub fn position(&self) -> i32 {
        self.position
    }

    #[inline]
    pub fn insertion_position(&self) -> i16 {
        self.insertion_position
    }

    #[inline]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    #[inline]
    pub fn strand_str(&self) -> &'static str {
        self.strand.as_str()
    }

    /// Returns the SNP name, or the default name `S<chromosome>_<position>` if there is no explicit name.
    pub fn snp_id(&self) -> String {
        match &self.snp_name {
            Some(name) => name.clone(),
            None => default_snp_id(&self.chromosome, self.position),
        }
    }

    /// Returns the explicit SNP name, if there is one.
    #[inline]
    pub fn actual_snp_id(&self) -> Option<&str> {
        self.snp_name.as_deref()
    }

    #[inline]
    pub fn is_nucleotide(&self) -> bool {
        self.nucleotide
    }

    #[inline]
    pub fn is_indel(&self) -> bool {
        self.indel
    }

    /// Returns the global minor allele frequency, or NaN if unknown.
    #[inline]
    pub fn maf(&self) -> f32 {
        self.maf
    }

    /// Returns the global site coverage, or NaN if unknown.
    #[inline]
    pub fn site_coverage(&self) -> f32 {
        self.site_coverage
    }

    /// Returns the allele code for the given type.
    #[inline]
    pub fn allele(&self, allele_type: AlleleType) -> u8 {
        ((self.alleles >> (4 * allele_type.index())) & 0xF) as u8
    }

    /// Returns the packed allele value.
    #[inline]
    pub fn packed_alleles(&self) -> u64 {
        self.alleles
    }

    /// Returns the known variants from the first `VARIANT` annotation.
    ///
    /// Brackets are removed and the value is split at `/`.
    pub fn known_variants(&self) -> Vec<String> {
        match self.annotations.first_text(VARIANT_KEY) {
            Some(value) => value.replace(['[', ']'], "").split('/').map(|s| s.to_string()).collect(),
            None => Vec::new(),
        }
    }

    #[inline]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

fn default_snp_id(chromosome: &Chromosome, position: i32) -> String {
    format!("S{}_{}", chromosome.name(), position)
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chromosome.hash(state);
        self.position.hash(state);
        self.insertion_position.hash(state);
        self.strand.code().hash(state);
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chromosome.cmp(&other.chromosome)
            .then(self.position.cmp(&other.position))
            .then(self.insertion_position.cmp(&other.insertion_position))
            .then(self.strand.code().cmp(&other.strand.code()))
            .then_with(|| {
                if self.snp_name.is_none() && other.snp_name.is_none() {
                    Ordering::Equal
                } else {
                    self.snp_id().cmp(&other.snp_id())
                }
            })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position\tChr:{}\tPos:{}\tInsertionPos:{}\tName:{}", self.chromosome.name(), self.position, self.insertion_position, self.snp_id())?;
        let variants = self.annotations.text(VARIANT_KEY);
        if !variants.is_empty() {
            write!(f, "\tVariants:{}", variants.join(","))?;
        }
        write!(f, "\tMAF:{}\tRef:{}", self.maf, support::decode_base(self.allele(AlleleType::Reference)) as char)
    }
}

//-----------------------------------------------------------------------------

/// A builder for [`Position`].
///
/// All alleles default to [`support::UNKNOWN_ALLELE`], MAF and site coverage to NaN, and the strand to plus.
#[derive(Clone, Debug)]
pub struct Builder {
    chromosome: Chromosome,
    position: i32,
    insertion_position: i16,
    strand: Strand,
    snp_name: Option<String>,
    nucleotide: bool,
    indel: bool,
    maf: f32,
    site_coverage: f32,
    alleles: [u8; AlleleType::COUNT],
    annotations: AnnotationBuilder,
}

impl Builder {
    /// Creates a builder for a position on the given chromosome.
    pub fn new(chromosome: Chromosome, position: i32) -> Self {
        Builder {
            chromosome: chromosome,
            position: position,
            insertion_position: 0,
            strand: Strand::Plus,
            snp_name: None,
            nucleotide: true,
            indel: false,
            maf: f32::NAN,
            site_coverage: f32::NAN,
            alleles: [support::UNKNOWN_ALLELE; AlleleType::COUNT],
            annotations: AnnotationBuilder::new(),
        }
    }

    /// Creates a builder initialized with all fields of an existing position.
    pub fn from_position(position: &Position) -> Self {
        let mut alleles = [support::UNKNOWN_ALLELE; AlleleType::COUNT];
        for allele_type in AlleleType::ALL {
            alleles[allele_type.index()] = position.allele(allele_type);
        }
        Builder {
            chromosome: position.chromosome.clone(),
            position: position.position,
            insertion_position: position.insertion_position,
            strand: position.strand,
            snp_name: position.snp_name.clone(),
            nucleotide: position.nucleotide,
            indel: position.indel,
            maf: position.maf,
            site_coverage: position.site_coverage,
            alleles: alleles,
            annotations: AnnotationBuilder::new().add_all(&position.annotations),
        }
    }

    pub fn chromosome(mut self, chromosome: Chromosome) -> Self {
        self.chromosome = chromosome;
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn insertion_position(mut self, insertion_position: i16) -> Self {
        self.insertion_position = insertion_position;
        self
    }

    pub fn strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    /// Sets the strand from its string form.
    pub fn strand_str(mut self, strand: &str) -> Result<Self> {
        self.strand = Strand::parse(strand)?;
        Ok(self)
    }

    pub fn snp_name(mut self, name: &str) -> Self {
        self.snp_name = Some(name.to_string());
        self
    }

    pub fn nucleotide(mut self, nucleotide: bool) -> Self {
        self.nucleotide = nucleotide;
        self
    }

    pub fn indel(mut self, indel: bool) -> Self {
        self.indel = indel;
        self
    }

    /// Adds the known variants as a `VARIANT` annotation joined with `/`.
    pub fn known_variants<T: AsRef<str>>(mut self, variants: &[T]) -> Self {
        let joined: Vec<&str> = variants.iter().map(|s| s.as_ref()).collect();
        self.annotations.push(VARIANT_KEY, &joined.join("/"));
        self
    }

    /// Adds the known variants as a `VARIANT` annotation in text form, such as `A/T`.
    pub fn known_variants_str(mut self, variants: &str) -> Self {
        self.annotations.push(VARIANT_KEY, variants);
        self
    }

    pub fn maf(mut self, maf: f32) -> Self {
        self.maf = maf;
        self
    }

    pub fn site_coverage(mut self, site_coverage: f32) -> Self {
        self.site_coverage = site_coverage;
        self
    }

    /// Sets the allele code for the given type.
    ///
    /// Only the low 4 bits of the code are stored.
    pub fn allele(mut self, allele_type: AlleleType, code: u8) -> Self {
        self.alleles[allele_type.index()] = code & 0xF;
        self
    }

    /// Adds a text annotation.
    pub fn add_anno(mut self, key: &str, value: &str) -> Self {
        self.annotations.push(key, value);
        self
    }

    /// Adds a numeric annotation.
    pub fn add_anno_number(mut self, key: &str, value: f64) -> Self {
        self.annotations.push(key, &value.to_string());
        self
    }

    /// Adds an annotation in the form `key=value`.
    ///
    /// A token without `=` is stored as a flag with value `TRUE`.
    pub fn add_anno_pair(mut self, pair: &str) -> Self {
        let mut parts: Vec<&str> = pair.split('=').collect();
        while parts.len() > 1 && parts.last().map_or(false, |part| part.is_empty()) {
            parts.pop();
        }
        if parts.len() == 1 {
            self.annotations.push(parts[0], FLAG_VALUE);
        } else {
            self.annotations.push(parts[0], parts[1]);
        }
        self
    }

    /// Builds the position using the global interning tables.
    pub fn build(self) -> Position {
        self.build_with(intern_table(), entry_cache())
    }

    /// Builds the position using the given interning tables.
    ///
    /// # Arguments
    ///
    /// * `chromosomes`: Interner for the chromosome.
    /// * `entries`: Interner for annotation entries.
    pub fn build_with(self, chromosomes: &dyn Interner<ChromosomeData>, entries: &dyn Interner<AnnotationEntry>) -> Position {
        let mut alleles: u64 = 0;
        for code in self.alleles.iter().rev() {
            alleles = (alleles << 4) | (*code as u64);
        }
        let chromosome = self.chromosome.canonicalize_with(chromosomes);
        let snp_name = match self.snp_name {
            Some(name) if name == default_snp_id(&chromosome, self.position) => None,
            name => name,
        };
        Position {
            chromosome: chromosome,
            position: self.position,
            insertion_position: self.insertion_position,
            strand: self.strand,
            snp_name: snp_name,
            nucleotide: self.nucleotide,
            indel: self.indel,
            maf: self.maf,
            site_coverage: self.site_coverage,
            alleles: alleles,
            annotations: self.annotations.build_with(entries),
        }
    }
}

//-----------------------------------------------------------------------------
