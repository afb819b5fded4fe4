//! Support structures: the nucleotide half-byte codec, packed sequences, string lists, and input helpers.

use simple_sds::int_vector::IntVector;
use simple_sds::ops::{Vector, Access, Push};
use simple_sds::serialize::Serialize;
use simple_sds::bits;

use flate2::read::MultiGzDecoder;

use std::fs::File;
use std::io::{BufRead, BufReader, Error, ErrorKind, Read};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::str::Utf8Error;
use std::io;


//-----------------------------------------------------------------------------

/// Code for nucleotide `A`.
pub const A_ALLELE: u8 = 0x0;

/// Code for nucleotide `C`.
pub const C_ALLELE: u8 = 0x1;

/// Code for nucleotide `G`.
pub const G_ALLELE: u8 = 0x2;

/// Code for nucleotide `T`.
pub const T_ALLELE: u8 = 0x3;

/// Code for an insertion (`+`).
pub const INSERT_ALLELE: u8 = 0x4;

/// Code for a gap (`-`).
pub const GAP_ALLELE: u8 = 0x5;

/// Code for characters that are not nucleotides.
pub const UNDEFINED_ALLELE: u8 = 0x6;

/// Code for a rare allele.
pub const RARE_ALLELE: u8 = 0xE;

/// Code for an unknown base (`N`).
pub const UNKNOWN_ALLELE: u8 = 0xF;

// Characters for the 16 half-byte codes.
const DECODE: [u8; 16] = *b"ACGT+-XXXXXXXXZN";

/// Returns the half-byte code for a sequence character.
///
/// `ACGT` are accepted in either case, `N` and `n` are unknown bases, and any other character is [`UNDEFINED_ALLELE`].
///
/// # Examples
///
/// ```
/// use genostore::support;
///
/// assert_eq!(support::encode_base(b'g'), support::G_ALLELE);
/// assert_eq!(support::encode_base(b'N'), support::UNKNOWN_ALLELE);
/// assert_eq!(support::decode_base(support::encode_base(b'-')), b'-');
/// ```
#[inline]
pub fn encode_base(c: u8) -> u8 {
    match c {
        b'A' | b'a' => A_ALLELE,
        b'C' | b'c' => C_ALLELE,
        b'G' | b'g' => G_ALLELE,
        b'T' | b't' => T_ALLELE,
        b'+' => INSERT_ALLELE,
        b'-' => GAP_ALLELE,
        b'N' | b'n' => UNKNOWN_ALLELE,
        _ => UNDEFINED_ALLELE,
    }
}

/// Returns the character for a half-byte code.
///
/// Only the low 4 bits are used.
#[inline]
pub fn decode_base(code: u8) -> u8 {
    DECODE[(code & 0xF) as usize]
}

/// Encodes a sequence of characters as half-byte codes.
pub fn encode_sequence(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().map(|c| encode_base(*c)).collect()
}

/// Decodes a sequence of half-byte codes as a string.
pub fn decode_sequence(codes: &[u8]) -> String {
    codes.iter().map(|code| decode_base(*code) as char).collect()
}

/// Returns the complement of a nucleotide code; other codes are returned unchanged.
#[inline]
pub fn complement(code: u8) -> u8 {
    match code {
        A_ALLELE => T_ALLELE,
        T_ALLELE => A_ALLELE,
        C_ALLELE => G_ALLELE,
        G_ALLELE => C_ALLELE,
        _ => code,
    }
}

/// Returns `true` if the diploid byte is heterozygous (the two half-bytes differ).
#[inline]
pub fn is_heterozygous(diploid: u8) -> bool {
    (diploid >> 4) != (diploid & 0xF)
}

//-----------------------------------------------------------------------------

/// Packs a sequence of characters at two half-byte codes per byte.
///
/// The code for an even 0-based index is stored in the high half of the byte.
/// The result has length `(sequence.len() + 1) / 2`; the unused half of the last byte is zero.
///
/// # Arguments
///
/// * `sequence`: Sequence characters.
/// * `remap`: Character conversion applied before encoding.
pub fn pack_sequence<F: Fn(u8) -> u8>(sequence: &[u8], remap: F) -> Vec<u8> {
    let mut packed = vec![0u8; packed_len(sequence.len())];
    for (i, c) in sequence.iter().enumerate() {
        let code = encode_base(remap(*c));
        if i % 2 == 0 {
            packed[i / 2] |= code << 4;
        } else {
            packed[i / 2] |= code;
        }
    }
    packed
}

/// Returns the number of bytes needed for a packed sequence of the given length.
#[inline]
pub fn packed_len(len: usize) -> usize {
    (len + 1) / 2
}

/// Returns the half-byte code at 0-based offset `i` of a packed sequence.
///
/// # Panics
///
/// Panics if `i / 2 >= packed.len()`.
#[inline]
pub fn unpack_base(packed: &[u8], i: usize) -> u8 {
    if i % 2 == 0 { (packed[i / 2] & 0xF0) >> 4 } else { packed[i / 2] & 0x0F }
}

/// Unpacks the half-byte codes at 0-based offsets `start..=last`.
///
/// # Panics
///
/// Panics if `last / 2 >= packed.len()`.
pub fn unpack_range(packed: &[u8], start: usize, last: usize) -> Vec<u8> {
    if last < start {
        return Vec::new();
    }
    (start..=last).map(|i| unpack_base(packed, i)).collect()
}

//-----------------------------------------------------------------------------

/// Returns the full file name for a specific test file.
pub fn get_test_data(filename: &'static str) -> PathBuf {
    let mut buf = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    buf.push("test-data");
    buf.push(filename);
    buf
}

/// Opens a text file for buffered reading, decompressing it if it starts with the gzip magic bytes.
pub fn open_text<P: AsRef<Path>>(filename: P) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(&filename)?;
    let mut magic = [0u8; 2];
    let mut found = 0;
    while found < magic.len() {
        let n = file.read(&mut magic[found..])?;
        if n == 0 {
            break;
        }
        found += n;
    }
    drop(file);

    let file = File::open(&filename)?;
    if found == 2 && magic == [0x1F, 0x8B] {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

//-----------------------------------------------------------------------------

/// An immutable list of strings stored in a single byte vector.
///
/// The serialization format stores the starting offsets in an [`IntVector`] of minimal width, followed by the concatenated bytes.
/// Because the bytes may come from an untrusted file, they are not assumed to be valid UTF-8.
///
/// # Examples
///
/// ```
/// use genostore::support::StringList;
///
/// let names = StringList::from(vec!["1", "10", "MT"]);
/// assert_eq!(names.len(), 3);
/// assert_eq!(names.str(1).unwrap(), "10");
/// let all: Vec<&[u8]> = names.iter().collect();
/// assert_eq!(all.concat(), b"110MT");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringList {
    // Starting offsets with a past-the-end sentinel.
    offsets: IntVector,
    bytes: Vec<u8>,
}

impl StringList {
    /// Returns the number of strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Returns `true` if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bytes of the `i`th string.
    ///
    /// # Panics
    ///
    /// May panic if `i >= self.len()`.
    pub fn bytes(&self, i: usize) -> &[u8] {
        let start = self.offsets.get(i) as usize;
        let limit = self.offsets.get(i + 1) as usize;
        &self.bytes[start..limit]
    }

    /// Returns the `i`th string, or an error if it is not valid UTF-8.
    ///
    /// # Panics
    ///
    /// May panic if `i >= self.len()`.
    pub fn str(&self, i: usize) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.bytes(i))
    }

    /// Returns an iterator over the strings as byte slices.
    pub fn iter(&self) -> StringListIter<'_> {
        StringListIter {
            parent: self,
            next: 0,
            limit: self.len(),
        }
    }

    /// Returns owned copies of all strings, or an error if some string is not valid UTF-8.
    pub fn to_strings(&self) -> Result<Vec<String>, Utf8Error> {
        (0..self.len()).map(|i| self.str(i).map(|s| s.to_string())).collect()
    }
}

impl Serialize for StringList {
    fn serialize_header<T: io::Write>(&self, _: &mut T) -> io::Result<()> {
        Ok(())
    }

    fn serialize_body<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        self.offsets.serialize(writer)?;
        self.bytes.serialize(writer)?;
        Ok(())
    }

    fn load<T: io::Read>(reader: &mut T) -> io::Result<Self> {
        let offsets = IntVector::load(reader)?;
        let bytes = Vec::<u8>::load(reader)?;
        if offsets.is_empty() || offsets.get(0) != 0 {
            return Err(Error::new(ErrorKind::InvalidData, "StringList: Invalid first offset"));
        }
        if offsets.get(offsets.len() - 1) as usize != bytes.len() {
            return Err(Error::new(ErrorKind::InvalidData, "StringList: Offsets do not match the data"));
        }
        for i in 1..offsets.len() {
            if offsets.get(i) < offsets.get(i - 1) {
                return Err(Error::new(ErrorKind::InvalidData, "StringList: Offsets are not sorted"));
            }
        }
        Ok(StringList {
            offsets: offsets,
            bytes: bytes,
        })
    }

    fn size_in_elements(&self) -> usize {
        self.offsets.size_in_elements() + self.bytes.size_in_elements()
    }
}

impl<T: AsRef<str>> From<&[T]> for StringList {
    fn from(v: &[T]) -> Self {
        let total_len: usize = v.iter().map(|s| s.as_ref().len()).sum();
        let width = bits::bit_len(total_len as u64);
        let mut offsets = match IntVector::with_capacity(v.len() + 1, width) {
            Ok(offsets) => offsets,
            // The width is always in 1..=64.
            Err(_) => IntVector::default(),
        };
        let mut bytes: Vec<u8> = Vec::with_capacity(total_len);
        offsets.push(0);
        for s in v.iter() {
            bytes.extend_from_slice(s.as_ref().as_bytes());
            offsets.push(bytes.len() as u64);
        }
        StringList {
            offsets: offsets,
            bytes: bytes,
        }
    }
}

impl<T: AsRef<str>> From<Vec<T>> for StringList {
    fn from(v: Vec<T>) -> Self {
        StringList::from(v.as_slice())
    }
}

//-----------------------------------------------------------------------------

/// An iterator over a [`StringList`].
///
/// The type of `Item` is `&[`[`u8`]`]`.
#[derive(Clone, Debug)]
pub struct StringListIter<'a> {
    parent: &'a StringList,
    next: usize,
    limit: usize,
}

impl<'a> Iterator for StringListIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.limit {
            None
        } else {
            let result = Some(self.parent.bytes(self.next));
            self.next += 1;
            result
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.limit - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a> DoubleEndedIterator for StringListIter<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.next >= self.limit {
            None
        } else {
            self.limit -= 1;
            Some(self.parent.bytes(self.limit))
        }
    }
}

impl<'a> ExactSizeIterator for StringListIter<'a> {}

impl<'a> FusedIterator for StringListIter<'a> {}

//-----------------------------------------------------------------------------
