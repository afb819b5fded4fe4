//! A reference genome stored as packed half-byte nucleotide codes.
//!
//! [`SequenceStore`] reads FASTA records and packs each chromosome at two bases per byte.
//! Chromosome coordinates are 1-based and inclusive.
//! Global coordinates are 0-based offsets into the concatenation of all chromosomes in sorted order.

use crate::chromosome::{self, Chromosome};
use crate::annotation::Annotations;
use crate::headers::{Header, SequencePayload};
use crate::support::{self, StringList};
use crate::{Error, Result};

use simple_sds::int_vector::IntVector;
use simple_sds::ops::{Vector, Access, Push};
use simple_sds::serialize::Serialize;
use simple_sds::bits;

use log::info;
use rayon::prelude::*;

use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead};
use std::path::Path;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Options for reading FASTA files.
///
/// Each sequence character is passed through a remapping table before encoding.
/// The default table is the identity.
///
/// # Examples
///
/// ```
/// use genostore::sequence::FastaOptions;
///
/// let options = FastaOptions::default().mask_lowercase();
/// assert_eq!(options.apply(b'a'), b'N');
/// assert_eq!(options.apply(b'A'), b'A');
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaOptions {
    remap: [u8; 256],
}

impl Default for FastaOptions {
    fn default() -> Self {
        let mut remap = [0; 256];
        for (i, value) in remap.iter_mut().enumerate() {
            *value = i as u8;
        }
        FastaOptions { remap: remap }
    }
}

impl FastaOptions {
    /// Returns options that replace character `from` with `to`.
    pub fn remap(mut self, from: u8, to: u8) -> Self {
        self.remap[from as usize] = to;
        self
    }

    /// Returns options that replace soft-masked (lower case) nucleotides with `N`.
    pub fn mask_lowercase(self) -> Self {
        self.remap(b'a', b'N').remap(b'c', b'N').remap(b'g', b'N').remap(b't', b'N')
    }

    /// Returns the remapped character.
    #[inline]
    pub fn apply(&self, c: u8) -> u8 {
        self.remap[c as usize]
    }

    // Summary of the remapping for the usual nucleotide characters.
    fn describe(&self) -> String {
        let base = b"ACGTNacgtn";
        let converted: Vec<u8> = base.iter().map(|c| self.apply(*c)).collect();
        format!("{} to {}", String::from_utf8_lossy(base), String::from_utf8_lossy(&converted))
    }
}

//-----------------------------------------------------------------------------

/// A genome sequence packed at two nucleotides per byte.
///
/// Chromosomes are stored in sorted order, and the store keeps the length of each chromosome from the FASTA file.
/// The chromosomes returned by [`SequenceStore::chromosomes`] carry that length.
/// Other chromosome handles with the same name can be used for queries.
///
/// # Examples
///
/// ```
/// use genostore::sequence::SequenceStore;
/// use genostore::support;
/// use std::io::Cursor;
///
/// let store = SequenceStore::from_reader(Cursor::new(">1\nACGT\n>2 second\nGGN\n"), &Default::default()).unwrap();
/// assert_eq!(store.number_of_chromosomes(), 2);
/// assert_eq!(store.genome_size(), 7);
///
/// let chr1 = &store.chromosomes()[0];
/// assert_eq!(chr1.length(), 4);
/// assert_eq!(store.sequence(chr1, 1, 4).unwrap(), support::encode_sequence(b"ACGT"));
/// assert_eq!(store.global_sequence(3, 5).unwrap(), support::encode_sequence(b"TGG"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceStore {
    header: Header<SequencePayload>,
    chromosomes: Vec<Chromosome>,
    lengths: Vec<usize>,
    // Packed sequences of all chromosomes and the starting offset of each chromosome.
    data: Vec<u8>,
    starts: Vec<usize>,
    index: HashMap<Chromosome, usize>,
    // Global start offset of each non-empty chromosome.
    offsets: BTreeMap<u64, usize>,
}

impl SequenceStore {
    /// Reads a FASTA file, which may be gzip-compressed.
    pub fn from_fasta<P: AsRef<Path>>(filename: P, options: &FastaOptions) -> Result<Self> {
        let reader = support::open_text(&filename)?;
        Self::from_reader(reader, options)
    }

    /// Reads FASTA records from a reader.
    ///
    /// Lines are trimmed, and a line starting with `>` starts a new chromosome.
    /// The chromosome name is parsed from the rest of the header line, and any text after the first space becomes the description.
    ///
    /// Returns an error if a sequence line appears before the first header or if two records have the same chromosome name.
    pub fn from_reader<R: BufRead>(reader: R, options: &FastaOptions) -> Result<Self> {
        info!("SequenceStore: FASTA character conversion {}", options.describe());
        let mut records: Vec<(Chromosome, Vec<u8>, usize)> = Vec::new();
        let mut current: Option<(Chromosome, Vec<u8>)> = None;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if let Some(header) = line.strip_prefix('>') {
                if let Some((chromosome, sequence)) = current.take() {
                    records.push(Self::finish_record(chromosome, &sequence, options));
                }
                current = Some((Chromosome::new(header)?, Vec::new()));
            } else if !line.is_empty() {
                match current.as_mut() {
                    Some((_, sequence)) => sequence.extend_from_slice(line.as_bytes()),
                    None => return Err(Error::malformed("SequenceStore: Sequence data before the first FASTA header")),
                }
            }
        }
        if let Some((chromosome, sequence)) = current.take() {
            records.push(Self::finish_record(chromosome, &sequence, options));
        }
        Self::from_records(records)
    }

    /// Builds a store with a single chromosome.
    pub fn from_sequence(chromosome: &Chromosome, sequence: &str) -> Result<Self> {
        let record = Self::finish_record(chromosome.clone(), sequence.as_bytes(), &FastaOptions::default());
        Self::from_records(vec![record])
    }

    // Packs the sequence and sets the chromosome length.
    fn finish_record(chromosome: Chromosome, sequence: &[u8], options: &FastaOptions) -> (Chromosome, Vec<u8>, usize) {
        let packed = support::pack_sequence(sequence, |c| options.apply(c));
        (chromosome.with_new_length(sequence.len() as i32), packed, sequence.len())
    }

    fn from_records(mut records: Vec<(Chromosome, Vec<u8>, usize)>) -> Result<Self> {
        records.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in records.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::illegal_state(format!("SequenceStore: Duplicate chromosome {}", pair[0].0.name())));
            }
        }

        let mut header = Header::<SequencePayload>::new();
        let mut chromosomes = Vec::with_capacity(records.len());
        let mut lengths = Vec::with_capacity(records.len());
        let mut data: Vec<u8> = Vec::new();
        let mut starts = Vec::with_capacity(records.len() + 1);
        let mut index = HashMap::with_capacity(records.len());
        let mut offsets = BTreeMap::new();
        let mut genome_size = 0;
        for (i, (chromosome, bytes, len)) in records.into_iter().enumerate() {
            if chromosome.annotations().contains_key(chromosome::DESCRIPTION_KEY) {
                header.set(SequencePayload::FLAG_DESCRIPTIONS);
            }
            if len > 0 {
                offsets.insert(genome_size as u64, i);
            }
            genome_size += len;
            index.insert(chromosome.clone(), i);
            chromosomes.push(chromosome);
            lengths.push(len);
            starts.push(data.len());
            data.extend(bytes);
        }
        starts.push(data.len());
        header.payload_mut().chromosomes = chromosomes.len();
        header.payload_mut().genome_size = genome_size;
        info!("SequenceStore: {} chromosomes with {} bases", chromosomes.len(), genome_size);

        Ok(SequenceStore {
            header: header,
            chromosomes: chromosomes,
            lengths: lengths,
            data: data,
            starts: starts,
            index: index,
            offsets: offsets,
        })
    }
}

//-----------------------------------------------------------------------------

/// Statistics and chromosome lookups.
impl SequenceStore {
    /// Returns the header of the store.
    pub fn header(&self) -> &Header<SequencePayload> {
        &self.header
    }

    /// Returns the chromosomes in sorted order.
    #[inline]
    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    /// Returns the number of chromosomes.
    #[inline]
    pub fn number_of_chromosomes(&self) -> usize {
        self.chromosomes.len()
    }

    /// Returns the total length of the chromosomes.
    #[inline]
    pub fn genome_size(&self) -> u64 {
        self.header.payload().genome_size as u64
    }

    /// Returns the length of the chromosome, or [`None`] if the chromosome is not in the store.
    pub fn chromosome_size(&self, chromosome: &Chromosome) -> Option<usize> {
        self.index.get(chromosome).map(|i| self.lengths[*i])
    }

    /// Returns the stored chromosome with the given name, or [`None`] if there is no such chromosome.
    pub fn chromosome_by_name(&self, name: &str) -> Option<&Chromosome> {
        let normalized = chromosome::normalize_name(name);
        self.chromosomes.iter().find(|chromosome| chromosome.name() == normalized)
    }

    /// Returns the packed sequence of the chromosome, or [`None`] if the chromosome is not in the store.
    ///
    /// Base `i` (0-based) is in the high nibble of byte `i / 2` if `i` is even and in the low nibble otherwise.
    pub fn packed(&self, chromosome: &Chromosome) -> Option<&[u8]> {
        self.index.get(chromosome).map(|i| self.packed_at(*i))
    }

    #[inline]
    fn packed_at(&self, i: usize) -> &[u8] {
        &self.data[self.starts[i]..self.starts[i + 1]]
    }

    fn packed_or_error(&self, chromosome: &Chromosome) -> Result<&[u8]> {
        self.packed(chromosome).ok_or_else(|| Error::invalid(format!("SequenceStore: Chromosome {} not found", chromosome.name())))
    }
}

//-----------------------------------------------------------------------------

/// Sequence queries.
impl SequenceStore {
    /// Returns the nucleotide codes for the 1-based inclusive range `start..=last` of the chromosome.
    ///
    /// Returns an empty vector if `last < start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `start < 1`, if the chromosome is not in the store, or if the range extends past the packed sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// use genostore::{Chromosome, ErrorKind};
    /// use genostore::sequence::SequenceStore;
    ///
    /// let chr = Chromosome::parse("1").unwrap();
    /// let store = SequenceStore::from_sequence(&chr, "ACGTAC").unwrap();
    /// assert_eq!(store.sequence_as_string(&chr, 2, 4).unwrap(), "CGT");
    /// assert_eq!(store.sequence(&chr, 0, 10).unwrap_err().kind(), ErrorKind::InvalidArgument);
    /// ```
    pub fn sequence(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<Vec<u8>> {
        if start < 1 {
            return Err(Error::invalid(format!("SequenceStore: Start position {} is less than 1", start)));
        }
        let packed = self.packed_or_error(chromosome)?;
        let limit = 2 * packed.len() as i64;
        let (start, last) = (start as i64 - 1, last as i64 - 1);
        if start >= limit || last >= limit {
            return Err(Error::invalid(format!(
                "SequenceStore: Range {}..={} is out of range for chromosome {} of length {}",
                start + 1, last + 1, chromosome.name(), self.chromosome_size(chromosome).unwrap_or(0)
            )));
        }
        if last < start {
            return Ok(Vec::new());
        }
        Ok(support::unpack_range(packed, start as usize, last as usize))
    }

    /// Returns the nucleotide codes for the entire chromosome.
    pub fn chromosome_sequence(&self, chromosome: &Chromosome) -> Result<Vec<u8>> {
        let len = self.chromosome_size(chromosome).ok_or_else(|| {
            Error::invalid(format!("SequenceStore: Chromosome {} not found", chromosome.name()))
        })?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.sequence(chromosome, 1, len as i32)
    }

    /// Returns the nucleotide code at the 1-based position.
    pub fn genotype(&self, chromosome: &Chromosome, position: i32) -> Result<u8> {
        let bases = self.sequence(chromosome, position, position)?;
        Ok(bases[0])
    }

    /// Returns the nucleotide at the 1-based position as a string.
    pub fn genotype_as_string(&self, chromosome: &Chromosome, position: i32) -> Result<String> {
        let code = self.genotype(chromosome, position)?;
        Ok(char::from(support::decode_base(code)).to_string())
    }

    /// Returns the 1-based inclusive range of the chromosome as a string.
    pub fn sequence_as_string(&self, chromosome: &Chromosome, start: i32, last: i32) -> Result<String> {
        let bases = self.sequence(chromosome, start, last)?;
        Ok(support::decode_sequence(&bases))
    }

    /// Returns the nucleotide codes for the 0-based inclusive global range `start..=last`.
    ///
    /// The range may span multiple chromosomes.
    /// Returns an empty vector if `last < start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the range is longer than [`i32::MAX`] or extends past the end of the genome.
    pub fn global_sequence(&self, start: u64, last: u64) -> Result<Vec<u8>> {
        if last < start {
            return Ok(Vec::new());
        }
        if last - start > i32::MAX as u64 {
            return Err(Error::invalid(format!("SequenceStore: Less than {} sites must be requested at a time", i32::MAX)));
        }
        if last >= self.genome_size() {
            return Err(Error::invalid(format!("SequenceStore: Global position {} is past the genome size {}", last, self.genome_size())));
        }

        let mut result = Vec::with_capacity((last - start + 1) as usize);
        let mut next = start;
        while next <= last {
            let (chromosome_start, i) = match self.offsets.range(..=next).next_back() {
                Some((offset, i)) => (*offset, *i),
                None => return Err(Error::invalid(format!("SequenceStore: Global position {} not found", next))),
            };
            let chromosome_last = (self.lengths[i] as u64 - 1).min(last - chromosome_start);
            let bases = support::unpack_range(self.packed_at(i), (next - chromosome_start) as usize, chromosome_last as usize);
            next += bases.len() as u64;
            result.extend(bases);
        }
        Ok(result)
    }

    // Returns the chromosome index and the 0-based offset for a global coordinate.
    fn locate(&self, coordinate: u64) -> Option<(usize, u64)> {
        let (offset, i) = self.offsets.range(..=coordinate).next_back()?;
        if coordinate - offset < self.lengths[*i] as u64 { Some((*i, coordinate - offset)) } else { None }
    }

    /// Maps global 0-based coordinates to chromosomes and 0-based chromosome offsets.
    ///
    /// The coordinates are processed in parallel using the current rayon thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a coordinate is past the end of the genome.
    pub fn to_local_coordinates(&self, coordinates: &[u64]) -> Result<HashMap<u64, (Chromosome, u32)>> {
        coordinates.par_iter().map(|coordinate| {
            match self.locate(*coordinate) {
                Some((i, offset)) => Ok((*coordinate, (self.chromosomes[i].clone(), offset as u32))),
                None => Err(Error::invalid(format!("SequenceStore: Global position {} is past the genome size {}", coordinate, self.genome_size()))),
            }
        }).collect()
    }
}

//-----------------------------------------------------------------------------

impl Serialize for SequenceStore {
    fn serialize_header<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.header.serialize(writer)
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        let names: Vec<&str> = self.chromosomes.iter().map(|chromosome| chromosome.name()).collect();
        StringList::from(names).serialize(writer)?;
        let descriptions: Vec<String> = self.chromosomes.iter().map(|chromosome| {
            chromosome.annotations().concatenated_text(chromosome::DESCRIPTION_KEY)
        }).collect();
        StringList::from(descriptions).serialize(writer)?;
        lengths_vector(&self.lengths).serialize(writer)?;
        self.data.serialize(writer)?;
        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let header = Header::<SequencePayload>::load(reader)?;
        if let Err(msg) = header.validate() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, msg));
        }

        let names = StringList::load(reader)?.to_strings().map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let descriptions = StringList::load(reader)?.to_strings().map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let lengths = IntVector::load(reader)?;
        let data = Vec::<u8>::load(reader)?;
        let n = header.payload().chromosomes;
        if names.len() != n || descriptions.len() != n || lengths.len() != n {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "SequenceStore: Chromosome count mismatch"));
        }

        let mut records = Vec::with_capacity(n);
        let mut offset = 0;
        for i in 0..n {
            let len = lengths.get(i) as usize;
            let packed_len = support::packed_len(len);
            if offset + packed_len > data.len() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "SequenceStore: Packed sequences are too short"));
            }
            let annotations = if descriptions[i].is_empty() {
                Annotations::new()
            } else {
                Annotations::builder().add(chromosome::DESCRIPTION_KEY, &descriptions[i]).build()
            };
            let chromosome = Chromosome::with_length(&names[i], len as i32, annotations)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            records.push((chromosome, data[offset..offset + packed_len].to_vec(), len));
            offset += packed_len;
        }
        if offset != data.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "SequenceStore: Packed sequences are too long"));
        }

        let store = Self::from_records(records).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        if store.genome_size() != header.payload().genome_size as u64 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "SequenceStore: Genome size mismatch"));
        }
        Ok(store)
    }

    fn size_in_elements(&self) -> usize {
        let names: Vec<&str> = self.chromosomes.iter().map(|chromosome| chromosome.name()).collect();
        let descriptions: Vec<String> = self.chromosomes.iter().map(|chromosome| {
            chromosome.annotations().concatenated_text(chromosome::DESCRIPTION_KEY)
        }).collect();
        self.header.size_in_elements()
            + StringList::from(names).size_in_elements()
            + StringList::from(descriptions).size_in_elements()
            + lengths_vector(&self.lengths).size_in_elements()
            + self.data.size_in_elements()
    }
}

// Chromosome lengths in an integer vector of minimal width.
fn lengths_vector(lengths: &[usize]) -> IntVector {
    let max = lengths.iter().copied().max().unwrap_or(0);
    let mut result = match IntVector::with_capacity(lengths.len(), bits::bit_len(max as u64)) {
        Ok(result) => result,
        Err(_) => IntVector::default(),
    };
    for len in lengths {
        result.push(*len as u64);
    }
    result
}

//-----------------------------------------------------------------------------
