//! # Genostore: genome sequence and position storage
//!
//! This crate stores reference genomes, genomic positions, and single-sample variant calls for random access.
//! It is based on the [Simple-SDS](https://github.com/jltsiren/simple-sds) library.
//!
//! * [`Chromosome`] and [`Position`] identify sites in a genome.
//!   Chromosomes and annotation entries are deduplicated through bounded interning tables.
//! * A [`PositionList`] is an ordered list of positions with a per-chromosome coordinate index.
//!   [`position_list::PositionArrayList`] keeps everything in memory, while [`block_list::BlockPositionList`] loads blocks of sites from a [`block_store::BlockStore`] on demand.
//! * [`SequenceStore`] stores a reference genome packed at two bases per byte.
//! * [`VariantAwareSequenceStore`] overlays the calls of a GVCF file on a reference genome and reconstructs the sequence of a sample.
//! * [`matrix::WideByteMatrix`] is a byte matrix that may exceed the size of a single buffer.
//!
//! # Notes
//!
//! * Coordinates on a chromosome are 1-based and inclusive. Global coordinates over the concatenated genome are 0-based.
//! * Sequences are returned as allele codes. See [`support`] for the codes and the conversions.
//! * See [Simple-SDS](https://github.com/jltsiren/simple-sds) for assumptions on the environment.

pub mod annotation;
pub mod block_list;
pub mod block_store;
pub mod chromosome;
pub mod error;
pub mod gvcf;
pub mod headers;
pub mod interning;
pub mod matrix;
pub mod position;
pub mod position_list;
pub mod sequence;
pub mod support;
pub mod variant_store;

// Shared internal code for the binaries.
#[cfg(feature = "binaries")]
#[doc(hidden)]
pub mod internal;

//-----------------------------------------------------------------------------

pub use crate::chromosome::Chromosome;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::position::{AlleleType, Position, Strand};
pub use crate::position_list::PositionList;
pub use crate::sequence::SequenceStore;
pub use crate::variant_store::VariantAwareSequenceStore;

//-----------------------------------------------------------------------------
