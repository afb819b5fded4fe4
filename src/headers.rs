//! Headers for the serialized sequence store and block store files.
//!
//! Each file starts with a [`Header`]: a tag identifying the format, a version, a format-specific [`Payload`], and binary flags.
//! The header is serialized as a plain `#[repr(C)]` struct, which makes it possible to identify a file by loading only the header.

use std::fs::File;
use std::path::Path;

use simple_sds::serialize::{Serialize, Serializable};

//-----------------------------------------------------------------------------

/// A file header with a format-specific payload.
///
/// # Examples
///
/// ```
/// use genostore::headers::{Header, SequencePayload};
/// use simple_sds::serialize::Serialize;
///
/// let mut header = Header::<SequencePayload>::new();
/// assert_eq!(header.size_in_elements(), 4);
/// header.set(SequencePayload::FLAG_DESCRIPTIONS);
/// header.payload_mut().chromosomes = 2;
/// header.payload_mut().genome_size = 100;
/// assert!(header.validate().is_ok());
/// assert!(header.is_set(SequencePayload::FLAG_DESCRIPTIONS));
///
/// header.set(0x8000);
/// assert!(header.validate().is_err());
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header<T: Payload> {
    tag: u32,
    version: u32,
    payload: T,
    flags: u64,
}

impl<T: Payload> Header<T> {
    /// Creates a header for the current version with no flags set.
    pub fn new() -> Self {
        Header {
            tag: T::TAG,
            version: T::VERSION,
            payload: T::default(),
            flags: 0,
        }
    }

    /// Returns the format version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the binary flags.
    #[inline]
    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// Returns `true` if the flag is set.
    #[inline]
    pub fn is_set(&self, flag: u64) -> bool {
        (self.flags & flag) != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u64) {
        self.flags |= flag;
    }

    #[inline]
    pub fn unset(&mut self, flag: u64) {
        self.flags &= !flag;
    }

    /// Checks the tag, the version, the flags, and the payload.
    pub fn validate(&self) -> Result<(), String> {
        if self.tag != T::TAG {
            return Err(format!("{}: Invalid tag {:X}", T::NAME, self.tag));
        }
        if self.version != T::VERSION {
            return Err(format!("{}: Unsupported version {} (expected {})", T::NAME, self.version, T::VERSION));
        }
        if (self.flags & !T::FLAGS) != 0 {
            return Err(format!("{}: Unknown flags {:X}", T::NAME, self.flags & !T::FLAGS));
        }
        self.payload.validate().map_err(|msg| format!("{}: {}", T::NAME, msg))
    }

    /// Returns `true` if the file exists and starts with a header of this type.
    pub fn found_in<P: AsRef<Path>>(filename: P) -> bool {
        let Ok(mut file) = File::open(filename) else {
            return false;
        };
        Self::load(&mut file).map(|header| header.tag == T::TAG).unwrap_or(false)
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

impl<T: Payload> Default for Header<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Serializable for Header<T> {}

//-----------------------------------------------------------------------------

/// Format-specific fields of a [`Header`].
///
/// The implementing type must be `#[repr(C)]` with a size that is a multiple of 8 bytes.
pub trait Payload: Copy + Eq + Default {
    /// Format name used in error messages.
    const NAME: &'static str;

    /// The first four bytes of the file as a little-endian integer.
    const TAG: u32;

    /// The only supported version.
    const VERSION: u32;

    /// Union of the valid flags.
    const FLAGS: u64;

    /// Checks the consistency of the fields.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Header fields of a serialized [`crate::SequenceStore`].
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct SequencePayload {
    pub chromosomes: usize,

    /// Total length of the chromosomes.
    pub genome_size: usize,
}

impl SequencePayload {
    /// The store contains chromosome descriptions from FASTA headers.
    pub const FLAG_DESCRIPTIONS: u64 = 0x0001;
}

impl Payload for SequencePayload {
    const NAME: &'static str = "SequenceHeader";
    const TAG: u32 = 0x51534E47;
    const VERSION: u32 = 1;
    const FLAGS: u64 = Self::FLAG_DESCRIPTIONS;

    fn validate(&self) -> Result<(), String> {
        if self.chromosomes == 0 && self.genome_size > 0 {
            return Err(format!("Genome size {} without chromosomes", self.genome_size));
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Header fields of a [`crate::block_store::FileBlockStore`].
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct BlockStorePayload {
    pub arrays: usize,

    /// Size of the data region in bytes.
    pub data_size: usize,
}

impl Payload for BlockStorePayload {
    const NAME: &'static str = "BlockStoreHeader";
    const TAG: u32 = 0x4B4C4247;
    const VERSION: u32 = 1;
    const FLAGS: u64 = 0;

    fn validate(&self) -> Result<(), String> {
        if self.arrays == 0 && self.data_size > 0 {
            return Err(format!("{} bytes of data without arrays", self.data_size));
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use simple_sds::serialize;

    #[test]
    fn sequence_header() {
        let mut header = Header::<SequencePayload>::new();
        assert!(header.validate().is_ok(), "Default header is invalid");
        assert_eq!(header.flags(), 0, "Default header has flags set");
        serialize::test(&header, "sequence-header", Some(4), true);

        header.set(SequencePayload::FLAG_DESCRIPTIONS);
        header.payload_mut().chromosomes = 3;
        header.payload_mut().genome_size = 1000;
        assert!(header.validate().is_ok(), "Modified header is invalid");
        assert!(header.is_set(SequencePayload::FLAG_DESCRIPTIONS), "Description flag could not be set");
        serialize::test(&header, "modified-sequence-header", Some(4), true);

        header.unset(SequencePayload::FLAG_DESCRIPTIONS);
        assert!(!header.is_set(SequencePayload::FLAG_DESCRIPTIONS), "Description flag could not be unset");

        header.payload_mut().chromosomes = 0;
        assert!(header.validate().is_err(), "Accepted a genome without chromosomes");
    }

    #[test]
    fn block_store_header() {
        let mut header = Header::<BlockStorePayload>::new();
        assert!(header.validate().is_ok(), "Default header is invalid");
        serialize::test(&header, "block-store-header", Some(4), true);

        header.set(0x0100);
        assert!(header.validate().is_err(), "Accepted an unknown flag");
        header.unset(0x0100);
        header.payload_mut().data_size = 16;
        assert!(header.validate().is_err(), "Accepted data without arrays");
        header.payload_mut().arrays = 1;
        assert!(header.validate().is_ok(), "Rejected a valid payload");
    }

    #[test]
    fn found_in() {
        let header = Header::<BlockStorePayload>::new();
        let filename = serialize::temp_file_name("found-in");
        serialize::serialize_to(&header, &filename).unwrap();
        assert!(Header::<BlockStorePayload>::found_in(&filename), "The file does not start with a block store header");
        assert!(!Header::<SequencePayload>::found_in(&filename), "The file starts with a sequence header");
        fs::remove_file(&filename).unwrap();
        assert!(!Header::<BlockStorePayload>::found_in(&filename), "Deleted file starts with a block store header");
    }
}

//-----------------------------------------------------------------------------
