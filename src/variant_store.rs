//! A reference genome overlaid with the calls of a single-sample GVCF track.
//!
//! Each track record has a mask bit and a filter bit, addressed by the site of the record in the track.
//! A filtered record contributes nothing to the reconstructed sequence.
//! A masked record is reconstructed with unknown bases.
//!
//! Reconstruction of `chromosome:start..=last` works as follows:
//!
//! * Select the records on the chromosome with positions in `start..=last`.
//!   If the preceding record covers `start` and no selected record begins at `start`, it is included as well.
//! * Walk the sites from `start`.
//!   Sites not covered by a record are unknown.
//!   A block record (with `END`) emits reference bases when the genotype is homozygous reference, and unknown bases otherwise.
//!   A site record is classified by its allele depths using [`CallThresholds`].
//! * Sites after the last record are unknown.
//!
//! An empty selection reconstructs as a single unknown base.

use crate::chromosome::Chromosome;
use crate::gvcf::{AD_KEY, DP_KEY, END_KEY, GQ_KEY, GT_KEY, MIN_DP_KEY};
use crate::position::Position;
use crate::position_list::PositionList;
use crate::sequence::SequenceStore;
use crate::support;
use crate::{Error, Result};

use simple_sds::raw_vector::{AccessRaw, RawVector};

use log::{debug, info, warn};
use rayon::prelude::*;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;


//-----------------------------------------------------------------------------

/// Width of a coarse index bucket in base pairs.
pub const DEFAULT_BUCKET_WIDTH: i32 = 10_000;

/// Depth thresholds for classifying site records.
///
/// A depth `d` is low if `low_depth_min <= d <= low_depth_max` and high if `d >= high_depth_min`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallThresholds {
    pub low_depth_min: u64,
    pub low_depth_max: u64,
    pub high_depth_min: u64,
}

impl Default for CallThresholds {
    fn default() -> Self {
        CallThresholds {
            low_depth_min: 1,
            low_depth_max: 2,
            high_depth_min: 3,
        }
    }
}

impl CallThresholds {
    /// Returns `true` if the depth is in the low range.
    #[inline]
    pub fn is_low(&self, depth: u64) -> bool {
        depth >= self.low_depth_min && depth <= self.low_depth_max
    }

    /// Returns `true` if the depth is in the high range.
    #[inline]
    pub fn is_high(&self, depth: u64) -> bool {
        depth >= self.high_depth_min
    }

    /// Returns an error if the ranges are empty or overlap.
    pub fn validate(&self) -> Result<()> {
        if self.low_depth_min > self.low_depth_max {
            return Err(Error::invalid(format!("CallThresholds: Empty low depth range {}..={}", self.low_depth_min, self.low_depth_max)));
        }
        if self.high_depth_min <= self.low_depth_max {
            return Err(Error::invalid(format!("CallThresholds: High depth {} overlaps the low depth range", self.high_depth_min)));
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Statistics collected while reconstructing a region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub ref_size: u64,
    pub size: u64,
    pub het_count: u64,
    pub alt_count: u64,
    pub depth: u64,
    pub gq: u64,
    pub min_depth: u64,
    pub zero_coverage_count: u64,
    pub homo_ref_count: u64,
    pub homo_alt_low_depth_count: u64,
    pub homo_alt_high_depth_count: u64,
}

impl RegionStats {
    /// Names of the statistics in the order returned by [`RegionStats::iter`].
    pub const NAMES: [&'static str; 11] = [
        "RefSize", "Size", "HetCount", "AltCount", "Depth", "GQ", "Min_Depth",
        "ZeroCoverageCount", "HomoRefCount", "HomoAltLowDepthCount", "HomoAltHighDepthCount",
    ];

    fn values(&self) -> [u64; 11] {
        [
            self.ref_size, self.size, self.het_count, self.alt_count, self.depth, self.gq, self.min_depth,
            self.zero_coverage_count, self.homo_ref_count, self.homo_alt_low_depth_count, self.homo_alt_high_depth_count,
        ]
    }

    /// Returns the statistic with the given name.
    pub fn get(&self, name: &str) -> Option<u64> {
        Self::NAMES.iter().position(|n| *n == name).map(|i| self.values()[i])
    }

    /// Returns `(name, value)` pairs for all statistics.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
        Self::NAMES.iter().copied().zip(self.values())
    }
}

impl fmt::Display for RegionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Which bitset [`VariantAwareSequenceStore::filter_and_mask`] updates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Filter,
    Mask,
}

/// Comparison of an annotation value with a threshold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    /// Returns `true` if `value` passes the comparison with `threshold`.
    pub fn passes(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Less => value < threshold,
            Comparison::LessOrEqual => value <= threshold,
            Comparison::Equal => value == threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::Greater => value > threshold,
        }
    }

    /// Returns `true` if a record without a numeric value passes the comparison.
    pub fn passes_missing(self) -> bool {
        matches!(self, Comparison::Less | Comparison::LessOrEqual)
    }
}

impl FromStr for Comparison {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lt" | "<" => Ok(Comparison::Less),
            "le" | "<=" => Ok(Comparison::LessOrEqual),
            "eq" | "=" | "==" => Ok(Comparison::Equal),
            "ge" | ">=" => Ok(Comparison::GreaterOrEqual),
            "gt" | ">" => Ok(Comparison::Greater),
            _ => Err(Error::invalid(format!("Invalid comparison: {}", s))),
        }
    }
}

//-----------------------------------------------------------------------------

/// Coarse index from physical positions to track sites.
///
/// Each chromosome is divided into buckets of `width` base pairs, and each bucket stores the first site with a position in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoarseIndex {
    width: i32,
    buckets: HashMap<Chromosome, Vec<Option<usize>>>,
}

impl CoarseIndex {
    /// Builds the index for the track.
    ///
    /// The number of buckets for a chromosome is based on the larger of the chromosome length in the reference and the last record position.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not positive.
    pub fn new(track: &dyn PositionList, reference: &SequenceStore, width: i32) -> Self {
        assert!(width > 0, "CoarseIndex: Bucket width must be positive");
        let mut buckets = HashMap::new();
        for (chromosome, range) in track.site_index().ranges() {
            let last_position = range.positions.iter().copied().max().unwrap_or(0).max(0);
            let length = match reference.chromosome_size(chromosome) {
                Some(size) => size as i32,
                None => {
                    warn!("CoarseIndex: Chromosome {} is not in the reference", chromosome);
                    0
                }
            };
            let mut table: Vec<Option<usize>> = vec![None; (length.max(last_position) / width) as usize + 2];
            for (offset, position) in range.positions.iter().enumerate() {
                let bucket = ((*position).max(0) / width) as usize;
                if table[bucket].is_none() {
                    table[bucket] = Some(range.start + offset);
                }
            }
            buckets.insert(chromosome.clone(), table);
        }
        CoarseIndex {
            width: width,
            buckets: buckets,
        }
    }

    /// Returns the bucket width.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Returns the buckets of the chromosome.
    pub fn buckets(&self, chromosome: &Chromosome) -> Option<&[Option<usize>]> {
        self.buckets.get(chromosome).map(|table| table.as_slice())
    }

    /// Returns a site from which a forward scan finds the first record at or after the position.
    ///
    /// Starts from the bucket of the position and moves backward over empty buckets.
    /// Returns [`None`] if the chromosome is not indexed or all buckets up to the position are empty.
    pub fn start_site(&self, chromosome: &Chromosome, position: i32) -> Option<usize> {
        let table = self.buckets.get(chromosome)?;
        let mut bucket = ((position.max(0) / self.width) as usize).min(table.len() - 1);
        loop {
            if let Some(site) = table[bucket] {
                return Some(site);
            }
            if bucket == 0 {
                return None;
            }
            bucket -= 1;
        }
    }
}

//-----------------------------------------------------------------------------

// The parts of a track record used in reconstruction.
#[derive(Clone, Debug)]
struct Record {
    site: usize,
    position: i32,
    end: Option<i32>,
    variants: Vec<String>,
    allele: Option<usize>,
    no_depth: bool,
    depth: u64,
    min_depth: u64,
    allele_depths: (u64, u64),
    quality: u64,
}

impl Record {
    fn new(site: usize, position: &Position) -> Result<Self> {
        let annotations = position.annotations();
        let end = match annotations.first_text(END_KEY) {
            Some(value) => Some(value.trim().parse::<i32>().map_err(|_| {
                Error::malformed(format!("VariantAwareSequenceStore: Invalid END {} for site {}", value, site))
            })?),
            None => None,
        };
        let depth_text = annotations.first_text(DP_KEY);
        let allele_depths = match annotations.first_text(AD_KEY) {
            Some(value) => {
                let mut iter = value.split(',').map(parse_count);
                (iter.next().unwrap_or(0), iter.next().unwrap_or(0))
            }
            None => (0, 0),
        };
        Ok(Record {
            site: site,
            position: position.position(),
            end: end,
            variants: position.known_variants(),
            allele: annotations.first_text(GT_KEY).and_then(first_allele),
            no_depth: depth_text.map_or(false, |value| value.trim() == "0"),
            depth: depth_text.map_or(0, parse_count),
            min_depth: annotations.first_text(MIN_DP_KEY).map_or(0, parse_count),
            allele_depths: allele_depths,
            quality: annotations.first_text(GQ_KEY).map_or(0, parse_count),
        })
    }

    fn reference(&self) -> &[u8] {
        self.variants.first().map_or(&[][..], |variant| variant.as_bytes())
    }

    fn alternate(&self) -> &[u8] {
        self.variants.get(1).map_or(&[][..], |variant| variant.as_bytes())
    }

    // Number of reference sites the record spans.
    fn span(&self) -> i32 {
        (self.reference().len() as i32).max(1)
    }

    // Last position covered by the record.
    fn last(&self) -> i32 {
        self.end.unwrap_or(self.position + self.span() - 1)
    }

    fn covers(&self, position: i32) -> bool {
        self.position <= position && position <= self.last()
    }
}

fn parse_count(value: &str) -> u64 {
    value.trim().parse().unwrap_or(0)
}

// Returns the first allele of a diploid (`/` or `|`) or haploid genotype.
fn first_allele(genotype: &str) -> Option<usize> {
    genotype.split(|c| c == '/' || c == '|').next()?.trim().parse().ok()
}

//-----------------------------------------------------------------------------

/// A reference genome overlaid with a GVCF track.
///
/// The reference, the track, and the coarse index are shared between stores derived from each other.
/// Each store owns its mask and filter bitsets.
///
/// # Examples
///
/// ```
/// use genostore::Chromosome;
/// use genostore::gvcf::GvcfReader;
/// use genostore::sequence::SequenceStore;
/// use genostore::variant_store::VariantAwareSequenceStore;
/// use std::io::Cursor;
/// use std::sync::Arc;
///
/// let chr = Chromosome::parse("1").unwrap();
/// let reference = SequenceStore::from_sequence(&chr, "ACGTACGT").unwrap();
/// let gvcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tsample\n\
///     1\t1\t.\tA\t<NON_REF>\t.\t.\tEND=4\tGT:DP\t0/0:10\n\
///     1\t5\t.\tA\tT,<NON_REF>\t50\t.\tDP=5\tGT:AD:DP:GQ\t1/1:0,5,0:5:30\n";
/// let track = GvcfReader::new().read(Cursor::new(gvcf)).unwrap();
/// let store = VariantAwareSequenceStore::new(reference, Arc::new(track));
/// assert_eq!(store.sequence_as_string(&chr, 1, 5).unwrap(), "ACGTT");
///
/// let filtered = store.derive_flipped_filter(1).unwrap();
/// assert_eq!(filtered.sequence_as_string(&chr, 1, 5).unwrap(), "ACGT");
/// ```
#[derive(Clone)]
pub struct VariantAwareSequenceStore {
    reference: Arc<SequenceStore>,
    track: Arc<dyn PositionList>,
    index: Arc<CoarseIndex>,
    mask: RawVector,
    filter: RawVector,
    thresholds: CallThresholds,
}

impl VariantAwareSequenceStore {
    /// Creates a store with all mask and filter bits clear.
    pub fn new(reference: SequenceStore, track: Arc<dyn PositionList>) -> Self {
        let len = track.len();
        Self::build(Arc::new(reference), track, RawVector::with_len(len, false), RawVector::with_len(len, false))
    }

    /// Creates a store with the given bitsets.
    ///
    /// Returns [`Error::InvalidArgument`] if the length of a bitset differs from the length of the track.
    pub fn with_bitsets(reference: Arc<SequenceStore>, track: Arc<dyn PositionList>, mask: RawVector, filter: RawVector) -> Result<Self> {
        check_bitset(&mask, track.len(), "mask")?;
        check_bitset(&filter, track.len(), "filter")?;
        Ok(Self::build(reference, track, mask, filter))
    }

    /// Reads the reference from a FASTA file and the track from a GVCF file.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(fasta: P, gvcf: Q) -> Result<Self> {
        let reference = SequenceStore::from_fasta(fasta, &Default::default())?;
        let track = crate::gvcf::GvcfReader::new().read_file(gvcf)?;
        Ok(Self::new(reference, Arc::new(track)))
    }

    fn build(reference: Arc<SequenceStore>, track: Arc<dyn PositionList>, mask: RawVector, filter: RawVector) -> Self {
        let start = Instant::now();
        let index = CoarseIndex::new(track.as_ref(), &reference, DEFAULT_BUCKET_WIDTH);
        debug!("VariantAwareSequenceStore: Built the coarse index in {:.3} seconds", start.elapsed().as_secs_f64());
        VariantAwareSequenceStore {
            reference: reference,
            track: track,
            index: Arc::new(index),
            mask: mask,
            filter: filter,
            thresholds: CallThresholds::default(),
        }
    }

    /// Returns a store that shares the reference, the track, and the index, but uses the given bitsets.
    ///
    /// Returns [`Error::InvalidArgument`] if the length of a bitset differs from the length of the track.
    pub fn derive(&self, mask: RawVector, filter: RawVector) -> Result<Self> {
        check_bitset(&mask, self.track.len(), "mask")?;
        check_bitset(&filter, self.track.len(), "filter")?;
        Ok(VariantAwareSequenceStore {
            reference: self.reference.clone(),
            track: self.track.clone(),
            index: self.index.clone(),
            mask: mask,
            filter: filter,
            thresholds: self.thresholds,
        })
    }

    /// Returns a derived store with the filter bit of the site flipped.
    pub fn derive_flipped_filter(&self, site: usize) -> Result<Self> {
        let mut result = self.derive(self.mask.clone(), self.filter.clone())?;
        result.flip_filter_bit(site)?;
        Ok(result)
    }

    /// Returns a derived store with the mask bit of the site flipped.
    pub fn derive_flipped_mask(&self, site: usize) -> Result<Self> {
        let mut result = self.derive(self.mask.clone(), self.filter.clone())?;
        result.flip_mask_bit(site)?;
        Ok(result)
    }

    /// Returns a copy of the store using the given thresholds.
    pub fn with_thresholds(mut self, thresholds: CallThresholds) -> Result<Self> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(self)
    }
}

fn check_bitset(bits: &RawVector, len: usize, name: &str) -> Result<()> {
    if bits.len() != len {
        return Err(Error::invalid(format!(
            "VariantAwareSequenceStore: The {} bitset has length {} (number of records {})", name, bits.len(), len
        )));
    }
    Ok(())
}

//-----------------------------------------------------------------------------

/// Bitsets and accessors.
impl VariantAwareSequenceStore {
    /// Returns the reference genome.
    #[inline]
    pub fn reference(&self) -> &SequenceStore {
        &self.reference
    }

    /// Returns the variant track.
    #[inline]
    pub fn track(&self) -> &Arc<dyn PositionList> {
        &self.track
    }

    /// Returns the coarse index.
    #[inline]
    pub fn index(&self) -> &CoarseIndex {
        &self.index
    }

    /// Returns the depth thresholds.
    #[inline]
    pub fn thresholds(&self) -> CallThresholds {
        self.thresholds
    }

    /// Returns the mask bits.
    #[inline]
    pub fn mask_bits(&self) -> &RawVector {
        &self.mask
    }

    /// Returns the filter bits.
    #[inline]
    pub fn filter_bits(&self) -> &RawVector {
        &self.filter
    }

    /// Flips the mask bit of the site.
    pub fn flip_mask_bit(&mut self, site: usize) -> Result<()> {
        flip_bit(&mut self.mask, site)
    }

    /// Flips the filter bit of the site.
    pub fn flip_filter_bit(&mut self, site: usize) -> Result<()> {
        flip_bit(&mut self.filter, site)
    }

    /// Replaces the mask bits.
    pub fn set_mask_bits(&mut self, mask: RawVector) -> Result<()> {
        check_bitset(&mask, self.track.len(), "mask")?;
        self.mask = mask;
        Ok(())
    }

    /// Replaces the filter bits.
    pub fn set_filter_bits(&mut self, filter: RawVector) -> Result<()> {
        check_bitset(&filter, self.track.len(), "filter")?;
        self.filter = filter;
        Ok(())
    }

    /// Returns the reference sequence for global coordinates `start..=last`.
    pub fn genome_sequence(&self, start: u64, last: u64) -> Result<Vec<u8>> {
        self.reference.global_sequence(start, last)
    }

    /// Returns the length of the chromosome in the reference.
    pub fn chromosome_size(&self, chromosome: &Chromosome) -> Option<usize> {
        self.reference.chromosome_size(chromosome)
    }

    /// Returns the length of the reference genome.
    pub fn genome_size(&self) -> u64 {
        self.reference.genome_size()
    }

    /// Returns the number of chromosomes in the reference.
    pub fn number_of_chromosomes(&self) -> usize {
        self.reference.number_of_chromosomes()
    }

    /// Maps global coordinates to local coordinates in the reference.
    pub fn to_local_coordinates(&self, coordinates: &[u64]) -> Result<HashMap<u64, (Chromosome, u32)>> {
        self.reference.to_local_coordinates(coordinates)
    }
}

fn flip_bit(bits: &mut RawVector, site: usize) -> Result<()> {
    if site >= bits.len() {
        return Err(Error::invalid(format!("VariantAwareSequenceStore: Site {} is out of bounds (number of records {})", site, bits.len())));
    }
    let value = bits.bit(site);
    bits.set_bit(site, !value);
    Ok(())
}

//-----------------------------------------------------------------------------

/// Reconstruction.
impl VariantAwareSequenceStore {
    /// Returns the reconstructed sequence for `chromosome:start..=last` as allele codes.
    ///
    /// See [`VariantAwareSequenceStore::sequence_and_stats`].
    pub fn sequence(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<Vec<u8>> {
        Ok(self.sequence_and_stats(chromosome, start, last)?.0)
    }

    /// Returns the reconstructed sequence as a string.
    pub fn sequence_as_string(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<String> {
        Ok(support::decode_sequence(&self.sequence(chromosome, start, last)?))
    }

    /// Returns the reconstructed sequence for `chromosome:start..=last` and statistics for the region.
    ///
    /// The sequence length may differ from the length of the region because of indels, filtered records, and the unknown base emitted for an empty selection.
    /// A range with `last < start` yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `start < 1` or the chromosome is not in the reference.
    /// Returns [`Error::MalformedInput`] if a record has an invalid `END` annotation.
    pub fn sequence_and_stats(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<(Vec<u8>, RegionStats)> {
        if start < 1 {
            return Err(Error::invalid(format!("VariantAwareSequenceStore: Invalid start position {}", start)));
        }
        if self.reference.chromosome_size(chromosome).is_none() {
            return Err(Error::invalid(format!("VariantAwareSequenceStore: Chromosome {} is not in the reference", chromosome)));
        }
        let mut stats = RegionStats::default();
        if last < start {
            return Ok((Vec::new(), stats));
        }
        stats.ref_size = (last - start + 1) as u64;

        let records = self.select(chromosome, start, last)?;
        let mut result: Vec<u8> = Vec::new();
        if records.is_empty() {
            result.push(support::UNKNOWN_ALLELE);
        } else {
            self.reconstruct(chromosome, start, last, &records, &mut result, &mut stats)?;
        }
        stats.size = result.len() as u64;
        Ok((result, stats))
    }

    // Records with positions in `start..=last`, and the preceding record if it covers `start`.
    fn select(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<Vec<Record>> {
        let range = match self.track.site_index().range(chromosome) {
            Some(range) => range,
            None => return Ok(Vec::new()),
        };
        let mut offset = self.index.start_site(chromosome, start).map_or(0, |site| site - range.start);
        while offset < range.len() && range.positions[offset] < start {
            offset += 1;
        }
        let first = offset;

        let mut records = Vec::new();
        while offset < range.len() && range.positions[offset] <= last {
            let site = range.start + offset;
            records.push(Record::new(site, &self.track.get(site)?)?);
            offset += 1;
        }
        records.sort_by_key(|record| record.position);

        let starts_at = records.first().map_or(false, |record| record.position == start);
        if !starts_at && first > 0 {
            let site = range.start + first - 1;
            let previous = Record::new(site, &self.track.get(site)?)?;
            if previous.covers(start) {
                records.insert(0, previous);
            }
        }
        Ok(records)
    }

    fn reconstruct(&self, chromosome: &Chromosome, start: i32, last: i32, records: &[Record], result: &mut Vec<u8>, stats: &mut RegionStats) -> Result<()> {
        let mut position = start;
        let mut iter = records.iter().peekable();
        while position <= last {
            let record = match iter.peek() {
                Some(record) => *record,
                None => break,
            };
            if record.position > position {
                result.push(support::UNKNOWN_ALLELE);
                stats.zero_coverage_count += 1;
                position += 1;
                continue;
            }
            iter.next();
            if self.filter.bit(record.site) {
                position = position.max(record.last() + 1);
                continue;
            }
            let masked = self.mask.bit(record.site);
            match record.end {
                Some(end) => {
                    let end = end.min(last);
                    if end < position {
                        continue;
                    }
                    let n = (end - position + 1) as u64;
                    if masked || record.no_depth {
                        push_unknown(result, n as usize);
                        stats.zero_coverage_count += n;
                    } else if record.allele == Some(0) {
                        result.extend(self.reference.sequence(chromosome, position, end)?);
                        stats.depth += record.depth * n;
                        stats.min_depth += record.min_depth * n;
                    } else {
                        push_unknown(result, n as usize);
                        stats.depth += record.depth * n;
                        stats.zero_coverage_count += n;
                    }
                    position = end + 1;
                }
                None => {
                    // A preceding record may start before the region.
                    let skip = (position - record.position) as usize;
                    let available = (last - position + 1) as usize;
                    self.call_site(record, masked, skip, available, result, stats);
                    position = position.max(record.last() + 1);
                }
            }
        }

        // Sites after the last record.
        while position <= last {
            result.push(support::UNKNOWN_ALLELE);
            stats.zero_coverage_count += 1;
            position += 1;
        }
        Ok(())
    }

    // Emits the bases of a site record, skipping the first `skip` bases.
    // Reference bases are limited to the `available` sites before the end of the region.
    fn call_site(&self, record: &Record, masked: bool, skip: usize, available: usize, result: &mut Vec<u8>, stats: &mut RegionStats) {
        let reference = record.reference();
        let reference = &reference[skip.min(reference.len())..];
        let reference = &reference[..reference.len().min(available)];
        let alternate = record.alternate();
        let alternate = &alternate[skip.min(alternate.len())..];
        let (ref_depth, alt_depth) = record.allele_depths;
        let thresholds = &self.thresholds;

        if ref_depth > 0 && alt_depth > 0 {
            push_unknown(result, reference.len());
            stats.het_count += reference.len() as u64;
        } else if thresholds.is_low(ref_depth) && alt_depth == 0 {
            push_bases(result, reference, masked);
            stats.homo_ref_count += reference.len() as u64;
            stats.depth += record.depth * reference.len() as u64;
        } else if thresholds.is_low(alt_depth) {
            push_unknown(result, alternate.len());
            stats.homo_alt_low_depth_count += alternate.len() as u64;
            stats.depth += record.depth * alternate.len() as u64;
        } else if thresholds.is_high(alt_depth) {
            push_bases(result, alternate, masked);
            stats.alt_count += alternate.len() as u64;
            stats.homo_alt_high_depth_count += alternate.len() as u64;
            stats.depth += record.depth * alternate.len() as u64;
        } else {
            push_bases(result, reference, masked);
        }
        stats.gq += record.quality;
    }
}

fn push_unknown(result: &mut Vec<u8>, n: usize) {
    result.extend(std::iter::repeat(support::UNKNOWN_ALLELE).take(n));
}

fn push_bases(result: &mut Vec<u8>, bases: &[u8], masked: bool) {
    if masked {
        push_unknown(result, bases.len());
    } else {
        result.extend(bases.iter().map(|&c| support::encode_base(c)));
    }
}

//-----------------------------------------------------------------------------

/// Regions and export.
impl VariantAwareSequenceStore {
    /// Returns the maximal regions covered by non-filtered records as inclusive intervals.
    ///
    /// Every chromosome of the reference is in the result, possibly with no regions.
    /// Records touching or overlapping each other are merged into the same region.
    pub fn consecutive_regions(&self) -> Result<BTreeMap<Chromosome, Vec<(i32, i32)>>> {
        let mut result: BTreeMap<Chromosome, Vec<(i32, i32)>> = BTreeMap::new();
        for chromosome in self.reference.chromosomes() {
            result.insert(chromosome.clone(), Vec::new());
        }

        for (chromosome, range) in self.track.site_index().ranges() {
            // Half-open intervals.
            let mut current: Option<(i32, i32)> = None;
            let mut regions = Vec::new();
            for offset in 0..range.len() {
                let site = range.start + offset;
                if self.filter.bit(site) {
                    continue;
                }
                let record = Record::new(site, &self.track.get(site)?)?;
                let (low, high) = (record.position, record.last() + 1);
                current = match current {
                    Some((cur_low, cur_high)) if low <= cur_high => Some((cur_low, cur_high.max(high))),
                    Some((cur_low, cur_high)) => {
                        regions.push((cur_low, cur_high - 1));
                        Some((low, high))
                    }
                    None => Some((low, high)),
                };
            }
            if let Some((low, high)) = current {
                regions.push((low, high - 1));
            }
            result.insert(chromosome.clone(), regions);
        }
        Ok(result)
    }

    /// Writes the reconstructed sequence of each consecutive region in FASTA format.
    ///
    /// The header of a region is `>Chr_{chromosome}_StartSite_{start}_EndSite_{end}`, where `chromosome` is the chromosome number or the name of a non-numeric chromosome.
    pub fn write_fasta<W: Write>(&self, writer: &mut W) -> Result<()> {
        let start = Instant::now();
        let regions = self.consecutive_regions()?;
        let mut count = 0;
        for (chromosome, intervals) in regions.iter() {
            let label = match chromosome.number() {
                Some(number) => number.to_string(),
                None => chromosome.name().to_string(),
            };
            for (low, high) in intervals.iter() {
                let sequence = self.sequence(chromosome, *low, *high)?;
                writeln!(writer, ">Chr_{}_StartSite_{}_EndSite_{}", label, low, high)?;
                writeln!(writer, "{}", support::decode_sequence(&sequence))?;
                count += 1;
            }
        }
        info!("VariantAwareSequenceStore: Wrote {} regions in {:.3} seconds", count, start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Writes the consecutive regions to a FASTA file.
    pub fn write_fasta_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(filename)?);
        self.write_fasta(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Derivation by annotation values.
impl VariantAwareSequenceStore {
    /// Returns a derived store with additional filter or mask bits.
    ///
    /// A record is flagged if the first numeric value of the annotation fails the comparison with the threshold.
    /// A record without a numeric value passes [`Comparison::Less`] and [`Comparison::LessOrEqual`], and fails the others.
    /// Bits that are already set stay set.
    pub fn filter_and_mask(&self, annotation: &str, comparison: Comparison, threshold: f64, mode: Mode) -> Result<Self> {
        let flags: Vec<bool> = (0..self.track.len()).into_par_iter().map(|site| {
            let position = self.track.get(site)?;
            let value = position.annotations().quantitative(annotation).first().copied();
            let passes = match value {
                Some(value) => comparison.passes(value, threshold),
                None => comparison.passes_missing(),
            };
            Ok(!passes)
        }).collect::<Result<Vec<bool>>>()?;

        let mut bits = match mode {
            Mode::Filter => self.filter.clone(),
            Mode::Mask => self.mask.clone(),
        };
        let mut count = 0;
        for (site, flag) in flags.into_iter().enumerate() {
            if flag && !bits.bit(site) {
                bits.set_bit(site, true);
                count += 1;
            }
        }
        debug!("VariantAwareSequenceStore: {:?} {} {:?} {} flagged {} new records", mode, annotation, comparison, threshold, count);

        match mode {
            Mode::Filter => self.derive(self.mask.clone(), bits),
            Mode::Mask => self.derive(bits, self.filter.clone()),
        }
    }
}

//-----------------------------------------------------------------------------
