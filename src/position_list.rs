//! Ordered, chromosome-partitioned lists of positions.
//!
//! A [`PositionList`] is immutable after construction.
//! Sites are numbered `0..len()` in chromosome-major, position-minor order, and each chromosome occupies a contiguous range of sites.
//! The shared [`SiteIndex`] answers all coordinate lookups, while the backends differ in how they provide [`Position`] objects and alleles.
//!
//! * [`PositionArrayList`] keeps every position in memory.
//! * [`crate::block_list::BlockPositionList`] materializes positions from a block store on demand.

use crate::chromosome::Chromosome;
use crate::position::{AlleleType, Position};
use crate::support;
use crate::{Error, Result};

use log::{debug, info};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::io::BufRead;


//-----------------------------------------------------------------------------

/// Annotation key used by [`read_quality_scores`].
pub const QUALITY_SCORE_KEY: &str = "QualityScore";

/// Sentinel returned by site lookups when the chromosome is not in the list.
pub const ABSENT_CHROMOSOME: isize = isize::MIN;

// Error message for all mutating operations.
const IMMUTABLE: &str = "This list is immutable";

//-----------------------------------------------------------------------------

/// The sites of a single chromosome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChromosomeRange {
    /// First site of the chromosome.
    pub start: usize,
    /// Last site of the chromosome (inclusive).
    pub end: usize,
    /// Physical positions of the sites in site order.
    pub positions: Vec<i32>,
}

impl ChromosomeRange {
    /// Returns the number of sites on the chromosome.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if the chromosome has no sites.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Coordinate index shared by all [`PositionList`] implementations.
///
/// The index is built by scanning the sites in order and starting a new range whenever the chromosome changes.
/// A chromosome must not reappear after another chromosome; if it does, the later run replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct SiteIndex {
    ranges: BTreeMap<Chromosome, ChromosomeRange>,
    by_name: HashMap<String, Chromosome>,
    // First site and chromosome for each run in site order.
    runs: Vec<(usize, Chromosome)>,
    len: usize,
}

impl SiteIndex {
    /// Builds an index from `(chromosome, physical position)` pairs in site order.
    pub fn new<I: IntoIterator<Item = (Chromosome, i32)>>(sites: I) -> Self {
        let mut result = SiteIndex::default();
        let mut current: Option<(Chromosome, ChromosomeRange)> = None;
        for (site, (chromosome, position)) in sites.into_iter().enumerate() {
            let same = match &current {
                Some((chr, _)) => *chr == chromosome,
                None => false,
            };
            if !same {
                if let Some((chr, range)) = current.take() {
                    result.insert_range(chr, range);
                }
                result.runs.push((site, chromosome.clone()));
                current = Some((chromosome, ChromosomeRange { start: site, end: site, positions: Vec::new() }));
            }
            if let Some((_, range)) = current.as_mut() {
                range.end = site;
                range.positions.push(position);
            }
            result.len = site + 1;
        }
        if let Some((chr, range)) = current.take() {
            result.insert_range(chr, range);
        }
        result
    }

    fn insert_range(&mut self, chromosome: Chromosome, range: ChromosomeRange) {
        self.by_name.insert(chromosome.name().to_string(), chromosome.clone());
        self.ranges.insert(chromosome, range);
    }

    /// Returns the number of sites.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no sites.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the site range for the chromosome.
    pub fn range(&self, chromosome: &Chromosome) -> Option<&ChromosomeRange> {
        self.ranges.get(chromosome)
    }

    /// Returns the chromosome with the given normalized name.
    pub fn chromosome_by_name(&self, name: &str) -> Option<&Chromosome> {
        self.by_name.get(name)
    }

    /// Returns an iterator over the chromosomes in sorted order.
    pub fn chromosomes(&self) -> impl Iterator<Item = &Chromosome> + '_ {
        self.ranges.keys()
    }

    /// Returns an iterator over the chromosomes and their ranges in sorted order.
    pub fn ranges(&self) -> impl Iterator<Item = (&Chromosome, &ChromosomeRange)> + '_ {
        self.ranges.iter()
    }

    /// Returns the number of chromosomes.
    #[inline]
    pub fn num_chromosomes(&self) -> usize {
        self.ranges.len()
    }

    /// Returns the chromosome of the site, or [`None`] if there is no such site.
    pub fn chromosome(&self, site: usize) -> Option<&Chromosome> {
        if site >= self.len {
            return None;
        }
        let run = self.runs.partition_point(|(start, _)| *start <= site);
        self.runs.get(run.wrapping_sub(1)).map(|(_, chromosome)| chromosome)
    }

    /// Returns the physical position of the site, or [`None`] if there is no such site.
    pub fn position(&self, site: usize) -> Option<i32> {
        let chromosome = self.chromosome(site)?;
        let range = self.ranges.get(chromosome)?;
        range.positions.get(site.checked_sub(range.start)?).copied()
    }

    /// Returns the first site with the physical position on the chromosome.
    ///
    /// If there is no such site, returns `-(insertion point) - 1`, where the insertion point is a global site.
    /// Returns [`ABSENT_CHROMOSOME`] if the chromosome is not in the index.
    pub fn site_of_physical_position(&self, position: i32, chromosome: &Chromosome) -> isize {
        let range = match self.ranges.get(chromosome) {
            Some(range) => range,
            None => return ABSENT_CHROMOSOME,
        };
        // Positions in a chromosome are sorted, so this is the first duplicate.
        let offset = range.positions.partition_point(|p| *p < position);
        if offset < range.positions.len() && range.positions[offset] == position {
            (range.start + offset) as isize
        } else {
            -((range.start + offset) as isize) - 1
        }
    }

    /// Returns the physical positions of all chromosomes in sorted chromosome order.
    pub fn physical_positions(&self) -> Vec<i32> {
        let mut result = Vec::with_capacity(self.len);
        for range in self.ranges.values() {
            result.extend_from_slice(&range.positions);
        }
        result
    }

    /// Returns the first site of each chromosome in sorted chromosome order.
    pub fn offsets(&self) -> Vec<usize> {
        self.ranges.values().map(|range| range.start).collect()
    }
}

//-----------------------------------------------------------------------------

/// An immutable list of positions.
///
/// Implementations provide the [`SiteIndex`] and the per-site data.
/// Site accessors return [`Error::InvalidArgument`] for sites out of bounds.
/// All mutating operations return [`Error::UnsupportedOperation`].
pub trait PositionList: Send + Sync {
    /// Returns the coordinate index.
    fn site_index(&self) -> &SiteIndex;

    /// Returns the position at the site.
    fn get(&self, site: usize) -> Result<Position>;

    /// Returns the allele of the given type at the site.
    fn allele(&self, allele_type: AlleleType, site: usize) -> Result<u8>;

    /// Returns the alleles of the given type for sites `start..end`.
    fn alleles(&self, allele_type: AlleleType, start: usize, end: usize) -> Result<Vec<u8>>;

    /// Returns the alleles of the given type for all sites.
    fn allele_for_all_sites(&self, allele_type: AlleleType) -> Result<Vec<u8>>;

    /// Returns the SNP name of the site.
    fn site_name(&self, site: usize) -> Result<String>;

    /// Returns `true` if the site is an indel.
    fn is_indel(&self, site: usize) -> Result<bool>;

    /// Returns `true` if the site is on the plus strand.
    fn is_positive_strand(&self, site: usize) -> Result<bool>;

    /// Returns the genome version, if known.
    fn genome_version(&self) -> Option<&str>;

    /// Returns the length of the second known variant at the site, or 0 if there is none.
    fn indel_size(&self, site: usize) -> Result<usize> {
        let position = self.get(site)?;
        Ok(position.known_variants().get(1).map_or(0, |variant| variant.len()))
    }

    /// Returns the number of sites.
    fn len(&self) -> usize {
        self.site_index().len()
    }

    /// Returns `true` if the list is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of sites.
    fn number_of_sites(&self) -> usize {
        self.len()
    }

    /// Returns `true` if the positions refer to a reference genome.
    fn has_reference(&self) -> bool {
        self.genome_version().is_some()
    }

    /// Returns an iterator over the positions in site order.
    fn iter(&self) -> Box<dyn Iterator<Item = Result<Position>> + '_> {
        Box::new((0..self.len()).map(move |site| self.get(site)))
    }

    /// Returns the number of sites on the chromosome.
    fn chromosome_site_count(&self, chromosome: &Chromosome) -> usize {
        self.site_index().range(chromosome).map_or(0, |range| range.len())
    }

    /// Returns the first and last (inclusive) sites of the chromosome.
    fn start_and_end_of_chromosome(&self, chromosome: &Chromosome) -> Option<(usize, usize)> {
        self.site_index().range(chromosome).map(|range| (range.start, range.end))
    }

    /// Returns the physical position of the site.
    fn chromosomal_position(&self, site: usize) -> Result<i32> {
        self.site_index().position(site).ok_or_else(|| out_of_bounds(site, self.len()))
    }

    /// Returns the first site with the physical position on the chromosome.
    ///
    /// See [`SiteIndex::site_of_physical_position`].
    fn site_of_physical_position(&self, position: i32, chromosome: &Chromosome) -> isize {
        self.site_index().site_of_physical_position(position, chromosome)
    }

    /// Returns the site with the physical position and SNP name on the chromosome.
    ///
    /// Scans forward over the sites with the same physical position.
    /// If none of them has the name, returns `-(first site after the run) - 1`.
    fn site_of_physical_position_named(&self, position: i32, chromosome: &Chromosome, name: &str) -> Result<isize> {
        let first = self.site_of_physical_position(position, chromosome);
        if first < 0 {
            return Ok(first);
        }
        let mut site = first as usize;
        while site < self.len() && self.chromosomal_position(site)? == position && self.chromosome(site)? == chromosome {
            if self.site_name(site)? == name {
                return Ok(site as isize);
            }
            site += 1;
        }
        Ok(-(site as isize) - 1)
    }

    /// Returns the physical positions of all chromosomes in sorted chromosome order.
    fn physical_positions(&self) -> Vec<i32> {
        self.site_index().physical_positions()
    }

    /// Returns the chromosome of the site.
    fn chromosome(&self, site: usize) -> Result<&Chromosome> {
        self.site_index().chromosome(site).ok_or_else(|| out_of_bounds(site, self.len()))
    }

    /// Returns the name of the chromosome of the site.
    fn chromosome_name(&self, site: usize) -> Result<&str> {
        Ok(self.chromosome(site)?.name())
    }

    /// Returns the chromosome with the given normalized name.
    fn chromosome_by_name(&self, name: &str) -> Option<&Chromosome> {
        self.site_index().chromosome_by_name(name)
    }

    /// Returns the chromosomes in sorted order.
    fn chromosomes(&self) -> Vec<Chromosome> {
        self.site_index().chromosomes().cloned().collect()
    }

    /// Returns the number of chromosomes.
    fn num_chromosomes(&self) -> usize {
        self.site_index().num_chromosomes()
    }

    /// Returns the first site of each chromosome in sorted chromosome order.
    fn chromosome_offsets(&self) -> Vec<usize> {
        self.site_index().offsets()
    }

    /// Returns `true` if a site has the chromosome and physical position of the given position.
    fn contains(&self, position: &Position) -> bool {
        self.site_of_physical_position(position.position(), position.chromosome()) >= 0
    }

    /// Binary searches for the position.
    ///
    /// Returns the site or `-(insertion point) - 1`.
    fn index_of(&self, position: &Position) -> Result<isize> {
        let (mut low, mut high) = (0, self.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.get(mid)?.cmp(position) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Ok(mid as isize),
            }
        }
        Ok(-(low as isize) - 1)
    }

    /// Fails: the list is immutable.
    fn push(&mut self, _position: Position) -> Result<()> {
        Err(Error::unsupported(IMMUTABLE))
    }

    /// Fails: the list is immutable.
    fn insert(&mut self, _site: usize, _position: Position) -> Result<()> {
        Err(Error::unsupported(IMMUTABLE))
    }

    /// Fails: the list is immutable.
    fn set(&mut self, _site: usize, _position: Position) -> Result<Position> {
        Err(Error::unsupported(IMMUTABLE))
    }

    /// Fails: the list is immutable.
    fn remove(&mut self, _site: usize) -> Result<Position> {
        Err(Error::unsupported(IMMUTABLE))
    }

    /// Fails: the list is immutable.
    fn clear(&mut self) -> Result<()> {
        Err(Error::unsupported(IMMUTABLE))
    }
}

pub(crate) fn out_of_bounds(site: usize, len: usize) -> Error {
    Error::invalid(format!("Site {} is out of bounds (number of sites {})", site, len))
}

pub(crate) fn check_range(start: usize, end: usize, len: usize) -> Result<()> {
    if start > end || end > len {
        return Err(Error::invalid(format!("Invalid site range {}..{} (number of sites {})", start, end, len)));
    }
    Ok(())
}

//-----------------------------------------------------------------------------

/// A [`PositionList`] that keeps all positions in memory.
///
/// Alleles are also stored in a separate array for each [`AlleleType`].
///
/// # Examples
///
/// ```
/// use genostore::{Chromosome, Position, PositionList};
/// use genostore::position_list::PositionListBuilder;
///
/// let chr = Chromosome::parse("1").unwrap();
/// let mut builder = PositionListBuilder::new();
/// for pos in [30, 10, 20] {
///     builder.add(Position::builder(chr.clone(), pos).build());
/// }
/// let list = builder.build();
/// assert_eq!(list.physical_positions(), vec![10, 20, 30]);
/// assert_eq!(list.site_of_physical_position(20, &chr), 1);
/// assert_eq!(list.site_of_physical_position(25, &chr), -3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PositionArrayList {
    positions: Vec<Position>,
    // Indexed by allele type, then by site.
    alleles: Vec<Vec<u8>>,
    index: SiteIndex,
    genome_version: Option<String>,
}

impl PositionArrayList {
    /// Creates a list from positions in site order.
    ///
    /// See [`SiteIndex`] for the requirements on the order.
    pub fn new(positions: Vec<Position>, genome_version: Option<String>) -> Self {
        let mut alleles: Vec<Vec<u8>> = vec![Vec::with_capacity(positions.len()); AlleleType::COUNT];
        for position in positions.iter() {
            for allele_type in AlleleType::ALL {
                alleles[allele_type.index()].push(position.allele(allele_type));
            }
        }
        let index = SiteIndex::new(positions.iter().map(|position| (position.chromosome().clone(), position.position())));
        PositionArrayList {
            positions: positions,
            alleles: alleles,
            index: index,
            genome_version: genome_version,
        }
    }

    /// Returns the positions as a slice.
    #[inline]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    fn position_ref(&self, site: usize) -> Result<&Position> {
        self.positions.get(site).ok_or_else(|| out_of_bounds(site, self.positions.len()))
    }
}

impl PositionList for PositionArrayList {
    fn site_index(&self) -> &SiteIndex {
        &self.index
    }

    fn get(&self, site: usize) -> Result<Position> {
        self.position_ref(site).cloned()
    }

    fn allele(&self, allele_type: AlleleType, site: usize) -> Result<u8> {
        Ok(self.position_ref(site)?.allele(allele_type))
    }

    fn alleles(&self, allele_type: AlleleType, start: usize, end: usize) -> Result<Vec<u8>> {
        check_range(start, end, self.len())?;
        Ok(self.alleles[allele_type.index()][start..end].to_vec())
    }

    fn allele_for_all_sites(&self, allele_type: AlleleType) -> Result<Vec<u8>> {
        Ok(self.alleles[allele_type.index()].clone())
    }

    fn site_name(&self, site: usize) -> Result<String> {
        Ok(self.position_ref(site)?.snp_id())
    }

    fn is_indel(&self, site: usize) -> Result<bool> {
        Ok(self.position_ref(site)?.is_indel())
    }

    fn is_positive_strand(&self, site: usize) -> Result<bool> {
        Ok(self.position_ref(site)?.strand().code() == crate::position::Strand::PLUS_CODE)
    }

    fn genome_version(&self) -> Option<&str> {
        self.genome_version.as_deref()
    }

    fn indel_size(&self, site: usize) -> Result<usize> {
        Ok(self.position_ref(site)?.known_variants().get(1).map_or(0, |variant| variant.len()))
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Position>> + '_> {
        Box::new(self.positions.iter().cloned().map(Ok))
    }

    fn index_of(&self, position: &Position) -> Result<isize> {
        match self.positions.binary_search(position) {
            Ok(site) => Ok(site as isize),
            Err(insertion) => Ok(-(insertion as isize) - 1),
        }
    }
}

impl FromIterator<Position> for PositionArrayList {
    /// Collects the positions, sorting them if necessary.
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        collect_reorder(iter)
    }
}

//-----------------------------------------------------------------------------

/// A builder for [`PositionArrayList`].
#[derive(Clone, Debug, Default)]
pub struct PositionListBuilder {
    positions: Vec<Position>,
    genome_version: Option<String>,
}

impl PositionListBuilder {
    /// Creates an empty builder without a genome version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty builder with the given genome version.
    pub fn with_genome_version(genome_version: &str) -> Self {
        PositionListBuilder {
            positions: Vec::new(),
            genome_version: Some(genome_version.to_string()),
        }
    }

    /// Sets the genome version.
    pub fn set_genome_version(&mut self, genome_version: &str) {
        self.genome_version = Some(genome_version.to_string());
    }

    /// Appends a position.
    pub fn add(&mut self, position: Position) -> &mut Self {
        self.positions.push(position);
        self
    }

    /// Returns the number of positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if the builder is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns `true` if the positions are in non-decreasing order.
    pub fn validate_ordering(&self) -> bool {
        self.positions.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Builds the list, sorting the positions if they are out of order.
    pub fn build(mut self) -> PositionArrayList {
        if !self.validate_ordering() {
            debug!("PositionListBuilder: Sorting {} positions", self.positions.len());
            self.positions.sort();
        }
        PositionArrayList::new(self.positions, self.genome_version)
    }

    /// Builds the list, or returns [`Error::IllegalState`] if the positions are out of order.
    pub fn build_validated(self) -> Result<PositionArrayList> {
        if !self.validate_ordering() {
            return Err(Error::illegal_state("Positions are not in order"));
        }
        Ok(PositionArrayList::new(self.positions, self.genome_version))
    }
}

impl Extend<Position> for PositionListBuilder {
    fn extend<I: IntoIterator<Item = Position>>(&mut self, iter: I) {
        self.positions.extend(iter);
    }
}

/// Collects positions into a list, or returns [`Error::IllegalState`] if they are out of order.
pub fn collect_validate_order<I: IntoIterator<Item = Position>>(iter: I) -> Result<PositionArrayList> {
    let mut builder = PositionListBuilder::new();
    builder.extend(iter);
    builder.build_validated()
}

/// Collects positions into a list, sorting them if necessary.
pub fn collect_reorder<I: IntoIterator<Item = Position>>(iter: I) -> PositionArrayList {
    let mut builder = PositionListBuilder::new();
    builder.extend(iter);
    builder.build()
}

//-----------------------------------------------------------------------------

/// Reads a list of conserved sites.
///
/// The first line is a header.
/// Each following line contains a chromosome name and a physical position separated by a tab.
/// The file may be gzip-compressed.
pub fn read_conserved_snps<P: AsRef<Path>>(filename: P) -> Result<PositionArrayList> {
    let reader = support::open_text(&filename)?;
    let list = read_position_file(reader, 2, |chromosome, position, _| {
        Ok(Position::builder(chromosome, position).build())
    })?;
    info!("Read {} conserved sites from {}", list.len(), filename.as_ref().display());
    Ok(list)
}

/// Reads a list of sites with quality scores.
///
/// The first line is a header.
/// Each following line starts with a chromosome name, a physical position, and a quality score separated by tabs.
/// The score is stored as the numeric annotation [`QUALITY_SCORE_KEY`].
/// The file may be gzip-compressed.
pub fn read_quality_scores<P: AsRef<Path>>(filename: P) -> Result<PositionArrayList> {
    let reader = support::open_text(&filename)?;
    let list = read_position_file(reader, 3, |chromosome, position, fields| {
        let score = fields[2].trim().parse::<f64>().map_err(|err| {
            Error::malformed(format!("Invalid quality score {}: {}", fields[2], err))
        })?;
        Ok(Position::builder(chromosome, position).add_anno_number(QUALITY_SCORE_KEY, score).build())
    })?;
    info!("Read {} quality scores from {}", list.len(), filename.as_ref().display());
    Ok(list)
}

// Parses a tab-delimited position file with at least `min_fields` fields per line.
fn read_position_file<R, F>(reader: R, min_fields: usize, make_position: F) -> Result<PositionArrayList>
where
    R: BufRead,
    F: Fn(Chromosome, i32, &[&str]) -> Result<Position>,
{
    let mut builder = PositionListBuilder::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line_num == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < min_fields {
            return Err(Error::malformed(format!("Line {}: expected {} tab-separated fields, found {}", line_num + 1, min_fields, fields.len())));
        }
        let chromosome = Chromosome::parse(fields[0])?;
        let position = fields[1].trim().parse::<i32>().map_err(|err| {
            Error::malformed(format!("Line {}: invalid position {}: {}", line_num + 1, fields[1], err))
        })?;
        builder.add(make_position(chromosome, position, &fields)?);
    }
    Ok(builder.build())
}

//-----------------------------------------------------------------------------
