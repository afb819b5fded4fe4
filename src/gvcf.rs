//! Reading GVCF files into a variant track.
//!
//! Each data line becomes a [`Position`] with the following content:
//!
//! * The ID column is the SNP name unless it is `.`.
//! * Known variants are `REF/ALT`, with the commas in ALT replaced by `/`.
//! * Each `;`-separated INFO token is an annotation, either `key=value` or a flag.
//! * The `GT`, `AD`, `DP`, and `GQ` fields of the first sample are annotations with the same keys.
//!
//! Block records have an `END` annotation in the INFO column.

use crate::chromosome::Chromosome;
use crate::position::Position;
use crate::position_list::{PositionArrayList, PositionList, PositionListBuilder};
use crate::support;
use crate::{Error, Result};

use log::info;

use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Genome version assigned to variant tracks by default.
pub const DEFAULT_GENOME_VERSION: &str = "AGPv4";

/// Annotation key for the last position of a block record.
pub const END_KEY: &str = "END";

/// Annotation key for the genotype call.
pub const GT_KEY: &str = "GT";

/// Annotation key for allele depths.
pub const AD_KEY: &str = "AD";

/// Annotation key for the total depth.
pub const DP_KEY: &str = "DP";

/// Annotation key for the genotype quality.
pub const GQ_KEY: &str = "GQ";

/// Annotation key for the minimum depth in a block.
pub const MIN_DP_KEY: &str = "MIN_DP";

// Sample fields stored as annotations.
const SAMPLE_FIELDS: [&str; 4] = [GT_KEY, AD_KEY, DP_KEY, GQ_KEY];

//-----------------------------------------------------------------------------

/// Column indexes from the `#CHROM` header line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderColumns {
    pub chromosome: usize,
    pub position: usize,
    pub id: Option<usize>,
    pub reference: usize,
    pub alternate: usize,
    pub quality: Option<usize>,
    pub filter: Option<usize>,
    pub info: usize,
    pub format: Option<usize>,
}

impl HeaderColumns {
    /// Parses the header line.
    ///
    /// The chromosome column may be called `#CHROM` or `#CHR`.
    /// Returns an error if a required column is missing.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let find = |name: &str| fields.iter().position(|field| *field == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| Error::malformed(format!("GvcfReader: Missing column {} in the header", name)))
        };
        let chromosome = match find("#CHROM").or_else(|| find("#CHR")) {
            Some(index) => index,
            None => return Err(Error::malformed("GvcfReader: Missing chromosome column in the header")),
        };
        Ok(HeaderColumns {
            chromosome: chromosome,
            position: require("POS")?,
            id: find("ID"),
            reference: require("REF")?,
            alternate: require("ALT")?,
            quality: find("QUAL"),
            filter: find("FILTER"),
            info: require("INFO")?,
            format: find("FORMAT"),
        })
    }

    // The first sample column follows INFO and FORMAT.
    fn sample(&self) -> usize {
        self.info.max(self.format.unwrap_or(0)) + 1
    }
}

//-----------------------------------------------------------------------------

/// A reader for single-sample GVCF files.
///
/// # Examples
///
/// ```
/// use genostore::PositionList;
/// use genostore::gvcf::GvcfReader;
/// use std::io::Cursor;
///
/// let gvcf = "##fileformat=VCFv4.2\n\
///     #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tsample\n\
///     1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=105\tGT:DP\t0/0:10\n\
///     1\t106\trs1\tC\tT,<NON_REF>\t50\t.\tDP=4\tGT:AD:DP:GQ\t1/1:0,4,0:4:12\n";
/// let track = GvcfReader::new().read(Cursor::new(gvcf)).unwrap();
/// assert_eq!(track.len(), 2);
/// let site = track.get(1).unwrap();
/// assert_eq!(site.snp_id(), "rs1");
/// assert_eq!(site.known_variants(), vec!["C", "T", "<NON_REF>"]);
/// assert_eq!(site.annotations().first_text("AD"), Some("0,4,0"));
/// ```
#[derive(Clone, Debug)]
pub struct GvcfReader {
    genome_version: String,
}

impl Default for GvcfReader {
    fn default() -> Self {
        GvcfReader {
            genome_version: String::from(DEFAULT_GENOME_VERSION),
        }
    }
}

impl GvcfReader {
    /// Creates a reader with the default genome version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reader that assigns the given genome version to the track.
    pub fn with_genome_version(genome_version: &str) -> Self {
        GvcfReader {
            genome_version: String::from(genome_version),
        }
    }

    /// Reads a GVCF file, which may be gzip-compressed.
    pub fn read_file<P: AsRef<Path>>(&self, filename: P) -> Result<PositionArrayList> {
        let reader = support::open_text(&filename)?;
        self.read(reader)
    }

    /// Reads GVCF records from a reader.
    ///
    /// Lines before the `#CHROM` (or `#CHR`) header are skipped.
    /// Empty lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the header is missing or incomplete, if a record has too few columns or an invalid position, or if the FORMAT column does not start with `GT`.
    pub fn read<R: BufRead>(&self, reader: R) -> Result<PositionArrayList> {
        let start = Instant::now();
        let mut lines = reader.lines();
        let mut columns: Option<HeaderColumns> = None;
        for line in lines.by_ref() {
            let line = line?;
            if line.starts_with("#CHROM") || line.starts_with("#CHR") {
                columns = Some(HeaderColumns::parse(&line)?);
                break;
            }
        }
        let columns = columns.ok_or_else(|| Error::malformed("GvcfReader: Missing #CHROM header line"))?;

        let mut builder = PositionListBuilder::with_genome_version(&self.genome_version);
        for (line_num, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let position = parse_record(&line, &columns).map_err(|err| match err {
                Error::MalformedInput(msg) => Error::MalformedInput(format!("{} (record {})", msg, line_num + 1)),
                err => err,
            })?;
            builder.add(position);
        }
        let track = builder.build();
        info!("GvcfReader: Read {} records in {:.3} seconds", track.len(), start.elapsed().as_secs_f64());
        Ok(track)
    }
}

//-----------------------------------------------------------------------------

/// Parses a single GVCF data line.
pub fn parse_record(line: &str, columns: &HeaderColumns) -> Result<Position> {
    let fields: Vec<&str> = line.split('\t').collect();
    let field = |index: usize| {
        fields.get(index).copied().ok_or_else(|| Error::malformed(format!("GvcfReader: Missing column {} in a record", index + 1)))
    };

    let chromosome = Chromosome::parse(field(columns.chromosome)?)
        .map_err(|err| Error::malformed(err.to_string()))?;
    let position_str = field(columns.position)?;
    let position: i32 = position_str.trim().parse()
        .map_err(|_| Error::malformed(format!("GvcfReader: Invalid position {}", position_str)))?;
    let mut builder = Position::builder(chromosome, position);

    if let Some(index) = columns.id {
        let id = field(index)?;
        if id != "." {
            builder = builder.snp_name(id);
        }
    }

    let reference = field(columns.reference)?;
    let alternate = field(columns.alternate)?;
    builder = builder.known_variants_str(&format!("{}/{}", reference, alternate.replace(',', "/")));

    for token in field(columns.info)?.split(';') {
        builder = builder.add_anno_pair(token);
    }

    if let Some(format_index) = columns.format {
        let format = field(format_index)?;
        if format.is_empty() || !format.starts_with(GT_KEY) {
            if format.contains(GT_KEY) {
                return Err(Error::malformed("GvcfReader: GT field is not in first position of FORMAT"));
            }
            return Err(Error::malformed("GvcfReader: Missing FORMAT tag"));
        }
        let keys: Vec<&str> = format.split(':').collect();
        if let Some(sample) = fields.get(columns.sample()) {
            for (key, value) in keys.iter().zip(sample.split(':')) {
                if SAMPLE_FIELDS.contains(key) {
                    builder = builder.add_anno(key, value);
                }
            }
        }
    }

    Ok(builder.build())
}

//-----------------------------------------------------------------------------
