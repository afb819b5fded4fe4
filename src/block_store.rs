//! Block-oriented random-access array storage.
//!
//! A [`BlockStore`] holds named one-dimensional arrays and string attributes.
//! Arrays are addressed by a path-like name and read as `(offset, len)` slices, so that a reader can load fixed-size blocks without touching the rest of the array.
//!
//! * [`MemoryBlockStore`] keeps the arrays in memory and is also used for building a store.
//! * [`FileBlockStore`] reads the arrays from a file created with [`FileBlockStore::create`].
//!
//! [`write_position_list`] stores a [`PositionList`] in the layout read by [`crate::block_list::BlockPositionList`].

use crate::headers::{Header, BlockStorePayload};
use crate::position::AlleleType;
use crate::position_list::PositionList;
use crate::support::StringList;
use crate::{Error, Result};

use simple_sds::serialize::Serialize;

use log::info;

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::io;


//-----------------------------------------------------------------------------

/// Array of physical positions (`i32`).
pub const POSITIONS: &str = "Positions/Positions";

/// Array of chromosome names, one per distinct chromosome (strings).
pub const CHROMOSOMES: &str = "Positions/Chromosomes";

/// Array of indices into [`CHROMOSOMES`], one per site (`i32`).
pub const CHROMOSOME_INDICES: &str = "Positions/ChromosomeIndices";

/// Array of explicit SNP names, with an empty string for sites without one (strings).
pub const SNP_IDS: &str = "Positions/SnpIds";

/// Array of reference alleles (`u8`).
pub const REFERENCE_ALLELES: &str = "Positions/ReferenceAlleles";

/// Array of ancestral alleles (`u8`).
pub const ANCESTRAL_ALLELES: &str = "Positions/AncestralAlleles";

/// Array of minor allele frequencies (`f32`).
pub const MAF: &str = "Genotypes/_Descriptors/MAF";

/// Array of site coverages (`f32`).
pub const SITE_COVERAGE: &str = "Genotypes/_Descriptors/SiteCoverage";

/// Matrix of alleles by frequency (`u8`), stored as major alleles for all sites followed by minor alleles for all sites.
pub const ALLELE_FREQ_ORDER: &str = "Genotypes/_Descriptors/AlleleFreqOrder";

/// Path that carries the genome version attribute.
pub const POSITION_ATTRIBUTES: &str = "Positions/";

/// Name of the genome version attribute.
pub const GENOME_VERSION: &str = "genomeVersion";

//-----------------------------------------------------------------------------

/// Element type of an array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    I32,
    U8,
    F32,
    Strings,
}

impl ArrayKind {
    fn code(self) -> u8 {
        match self {
            ArrayKind::I32 => 0,
            ArrayKind::U8 => 1,
            ArrayKind::F32 => 2,
            ArrayKind::Strings => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ArrayKind::I32),
            1 => Some(ArrayKind::U8),
            2 => Some(ArrayKind::F32),
            3 => Some(ArrayKind::Strings),
            _ => None,
        }
    }
}

/// A read-only store of named arrays and attributes.
///
/// Reads out of bounds, reads of missing arrays, and reads with the wrong element type return [`Error::InvalidArgument`].
pub trait BlockStore: Send + Sync {
    /// Returns `true` if there is an array at the path.
    fn exists(&self, path: &str) -> bool;

    /// Returns the value of the attribute attached to the path.
    fn attribute(&self, path: &str, name: &str) -> Result<Option<String>>;

    /// Returns the length of the array at the path.
    fn array_len(&self, path: &str) -> Result<usize>;

    /// Reads `len` elements starting from `offset` from an `i32` array.
    fn read_i32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<i32>>;

    /// Reads `len` elements starting from `offset` from a `u8` array.
    fn read_u8(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Reads `len` elements starting from `offset` from an `f32` array.
    fn read_f32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<f32>>;

    /// Reads `len` strings starting from `offset` from a string array.
    fn read_strings(&self, path: &str, offset: usize, len: usize) -> Result<Vec<String>>;
}

fn missing_array(path: &str) -> Error {
    Error::invalid(format!("No array at path {}", path))
}

fn wrong_kind(path: &str, expected: ArrayKind, found: ArrayKind) -> Error {
    Error::invalid(format!("Array {} has type {:?}, expected {:?}", path, found, expected))
}

fn check_slice(path: &str, offset: usize, len: usize, array_len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > array_len) {
        return Err(Error::invalid(format!("Slice {}..{} is out of bounds for array {} of length {}", offset, offset.saturating_add(len), path, array_len)));
    }
    Ok(())
}

//-----------------------------------------------------------------------------

/// Contents of an array in a [`MemoryBlockStore`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    I32(Vec<i32>),
    U8(Vec<u8>),
    F32(Vec<f32>),
    Strings(Vec<String>),
}

impl ArrayData {
    /// Returns the element type.
    pub fn kind(&self) -> ArrayKind {
        match self {
            ArrayData::I32(_) => ArrayKind::I32,
            ArrayData::U8(_) => ArrayKind::U8,
            ArrayData::F32(_) => ArrayKind::F32,
            ArrayData::Strings(_) => ArrayKind::Strings,
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayData::I32(v) => v.len(),
            ArrayData::U8(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::Strings(v) => v.len(),
        }
    }

    /// Returns `true` if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Little-endian encoding used in the data region of a file.
    fn encode(&self) -> Vec<u8> {
        match self {
            ArrayData::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ArrayData::U8(v) => v.clone(),
            ArrayData::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ArrayData::Strings(v) => {
                let mut offsets: Vec<u8> = Vec::with_capacity((v.len() + 1) * 8);
                let mut bytes: Vec<u8> = Vec::new();
                offsets.extend_from_slice(&0u64.to_le_bytes());
                for s in v.iter() {
                    bytes.extend_from_slice(s.as_bytes());
                    offsets.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                }
                offsets.extend(bytes);
                offsets
            },
        }
    }
}

/// A [`BlockStore`] that keeps the arrays in memory.
///
/// # Examples
///
/// ```
/// use genostore::block_store::{ArrayData, BlockStore, MemoryBlockStore};
///
/// let mut store = MemoryBlockStore::new();
/// store.insert("Positions/Positions", ArrayData::I32(vec![5, 10, 15, 20]));
/// store.set_attribute("Positions/", "genomeVersion", "AGPv4");
/// assert_eq!(store.read_i32("Positions/Positions", 1, 2).unwrap(), vec![10, 15]);
/// assert_eq!(store.attribute("Positions/", "genomeVersion").unwrap().as_deref(), Some("AGPv4"));
/// assert!(store.read_u8("Positions/Positions", 0, 1).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryBlockStore {
    arrays: BTreeMap<String, ArrayData>,
    // Path -> name -> value.
    attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl MemoryBlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the array at the path.
    pub fn insert(&mut self, path: &str, data: ArrayData) {
        self.arrays.insert(path.to_string(), data);
    }

    /// Sets an attribute for the path.
    pub fn set_attribute(&mut self, path: &str, name: &str, value: &str) {
        self.attributes.entry(path.to_string()).or_default().insert(name.to_string(), value.to_string());
    }

    /// Returns the number of arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Returns `true` if there are no arrays.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Returns an iterator over the arrays in path order.
    pub fn arrays(&self) -> impl Iterator<Item = (&str, &ArrayData)> + '_ {
        self.arrays.iter().map(|(path, data)| (path.as_str(), data))
    }

    fn array(&self, path: &str) -> Result<&ArrayData> {
        self.arrays.get(path).ok_or_else(|| missing_array(path))
    }
}

impl BlockStore for MemoryBlockStore {
    fn exists(&self, path: &str) -> bool {
        self.arrays.contains_key(path)
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<String>> {
        Ok(self.attributes.get(path).and_then(|values| values.get(name)).cloned())
    }

    fn array_len(&self, path: &str) -> Result<usize> {
        Ok(self.array(path)?.len())
    }

    fn read_i32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<i32>> {
        match self.array(path)? {
            ArrayData::I32(v) => {
                check_slice(path, offset, len, v.len())?;
                Ok(v[offset..offset + len].to_vec())
            },
            other => Err(wrong_kind(path, ArrayKind::I32, other.kind())),
        }
    }

    fn read_u8(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        match self.array(path)? {
            ArrayData::U8(v) => {
                check_slice(path, offset, len, v.len())?;
                Ok(v[offset..offset + len].to_vec())
            },
            other => Err(wrong_kind(path, ArrayKind::U8, other.kind())),
        }
    }

    fn read_f32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<f32>> {
        match self.array(path)? {
            ArrayData::F32(v) => {
                check_slice(path, offset, len, v.len())?;
                Ok(v[offset..offset + len].to_vec())
            },
            other => Err(wrong_kind(path, ArrayKind::F32, other.kind())),
        }
    }

    fn read_strings(&self, path: &str, offset: usize, len: usize) -> Result<Vec<String>> {
        match self.array(path)? {
            ArrayData::Strings(v) => {
                check_slice(path, offset, len, v.len())?;
                Ok(v[offset..offset + len].to_vec())
            },
            other => Err(wrong_kind(path, ArrayKind::Strings, other.kind())),
        }
    }
}

//-----------------------------------------------------------------------------

// Directory entry for an array in a file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct ArrayEntry {
    kind: ArrayKind,
    // Byte offset in the data region.
    offset: u64,
    // Number of elements.
    len: usize,
}

/// A [`BlockStore`] that reads the arrays from a file.
///
/// The file starts with a [`Header`] and a directory of arrays and attributes, all serialized in the simple-sds format.
/// The directory is followed by a data region that contains the arrays in little-endian form.
/// Only the directory is loaded into memory; array slices are read with a seek under a mutex.
///
/// # Examples
///
/// ```
/// use genostore::block_store::{ArrayData, BlockStore, FileBlockStore, MemoryBlockStore};
/// use simple_sds::serialize;
/// use std::fs;
///
/// let mut store = MemoryBlockStore::new();
/// store.insert("names", ArrayData::Strings(vec![String::from("1"), String::from("MT")]));
/// let filename = serialize::temp_file_name("block-store-doctest");
/// FileBlockStore::create(&filename, &store).unwrap();
///
/// let file = FileBlockStore::open(&filename).unwrap();
/// assert_eq!(file.read_strings("names", 1, 1).unwrap(), vec![String::from("MT")]);
/// drop(file);
/// fs::remove_file(&filename).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlockStore {
    header: Header<BlockStorePayload>,
    entries: HashMap<String, ArrayEntry>,
    attributes: HashMap<(String, String), String>,
    data_start: u64,
    file: Mutex<BufReader<File>>,
}

impl FileBlockStore {
    /// Writes the contents of a memory store to a file.
    pub fn create<P: AsRef<Path>>(filename: P, store: &MemoryBlockStore) -> Result<()> {
        let mut names: Vec<&str> = Vec::with_capacity(store.len());
        let mut kinds: Vec<u8> = Vec::with_capacity(store.len());
        let mut offsets: Vec<u64> = Vec::with_capacity(store.len());
        let mut lengths: Vec<u64> = Vec::with_capacity(store.len());
        let mut data: Vec<u8> = Vec::new();
        for (path, array) in store.arrays() {
            names.push(path);
            kinds.push(array.kind().code());
            offsets.push(data.len() as u64);
            lengths.push(array.len() as u64);
            data.extend(array.encode());
        }

        let mut attr_paths: Vec<&str> = Vec::new();
        let mut attr_names: Vec<&str> = Vec::new();
        let mut attr_values: Vec<&str> = Vec::new();
        for (path, values) in store.attributes.iter() {
            for (name, value) in values.iter() {
                attr_paths.push(path);
                attr_names.push(name);
                attr_values.push(value);
            }
        }

        let mut header = Header::<BlockStorePayload>::new();
        header.payload_mut().arrays = names.len();
        header.payload_mut().data_size = data.len();

        let mut options = OpenOptions::new();
        let file = options.create(true).write(true).truncate(true).open(&filename)?;
        let mut writer = BufWriter::new(file);
        header.serialize(&mut writer)?;
        StringList::from(names).serialize(&mut writer)?;
        kinds.serialize(&mut writer)?;
        offsets.serialize(&mut writer)?;
        lengths.serialize(&mut writer)?;
        StringList::from(attr_paths).serialize(&mut writer)?;
        StringList::from(attr_names).serialize(&mut writer)?;
        StringList::from(attr_values).serialize(&mut writer)?;
        data.serialize(&mut writer)?;
        io::Write::flush(&mut writer)?;

        info!("Wrote {} arrays ({} bytes of data) to {}", header.payload().arrays, header.payload().data_size, filename.as_ref().display());
        Ok(())
    }

    /// Opens a file created with [`FileBlockStore::create`].
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let file = File::open(&filename)?;
        let mut reader = BufReader::new(file);

        let header = Header::<BlockStorePayload>::load(&mut reader)?;
        header.validate().map_err(|msg| Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg)))?;
        let names = StringList::load(&mut reader)?;
        let kinds = Vec::<u8>::load(&mut reader)?;
        let offsets = Vec::<u64>::load(&mut reader)?;
        let lengths = Vec::<u64>::load(&mut reader)?;
        let attr_paths = StringList::load(&mut reader)?;
        let attr_names = StringList::load(&mut reader)?;
        let attr_values = StringList::load(&mut reader)?;
        // The data region is a serialized `Vec<u8>`: its length followed by the bytes.
        let mut size_buf = [0u8; 8];
        reader.read_exact(&mut size_buf)?;
        let data_size = u64::from_ne_bytes(size_buf);
        let data_start = reader.stream_position()?;

        let arrays = header.payload().arrays;
        if names.len() != arrays || kinds.len() != arrays || offsets.len() != arrays || lengths.len() != arrays {
            return Err(invalid_data("BlockStore: Directory size does not match the header"));
        }
        if data_size as usize != header.payload().data_size {
            return Err(invalid_data("BlockStore: Data size does not match the header"));
        }
        if attr_paths.len() != attr_names.len() || attr_paths.len() != attr_values.len() {
            return Err(invalid_data("BlockStore: Attribute lists have different lengths"));
        }

        let mut entries = HashMap::with_capacity(arrays);
        for i in 0..arrays {
            let name = names.str(i).map_err(|err| invalid_data(format!("BlockStore: {}", err)))?;
            let kind = ArrayKind::from_code(kinds[i]).ok_or_else(|| invalid_data(format!("BlockStore: Invalid array type {}", kinds[i])))?;
            let entry = ArrayEntry { kind: kind, offset: offsets[i], len: lengths[i] as usize };
            if entry.offset > data_size {
                return Err(invalid_data(format!("BlockStore: Array {} starts past the data region", name)));
            }
            entries.insert(name.to_string(), entry);
        }

        let mut attributes = HashMap::with_capacity(attr_paths.len());
        let to_string = |list: &StringList, i: usize| -> Result<String> {
            list.str(i).map(|s| s.to_string()).map_err(|err| invalid_data(format!("BlockStore: {}", err)))
        };
        for i in 0..attr_paths.len() {
            attributes.insert((to_string(&attr_paths, i)?, to_string(&attr_names, i)?), to_string(&attr_values, i)?);
        }

        Ok(FileBlockStore {
            header: header,
            entries: entries,
            attributes: attributes,
            data_start: data_start,
            file: Mutex::new(reader),
        })
    }

    /// Returns the header of the file.
    pub fn header(&self) -> &Header<BlockStorePayload> {
        &self.header
    }

    fn entry(&self, path: &str, kind: ArrayKind) -> Result<ArrayEntry> {
        let entry = *self.entries.get(path).ok_or_else(|| missing_array(path))?;
        if entry.kind != kind {
            return Err(wrong_kind(path, kind, entry.kind));
        }
        Ok(entry)
    }

    fn lock(&self) -> MutexGuard<'_, BufReader<File>> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Reads `len` bytes starting from `offset` in the data region.
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut file = self.lock();
        file.seek(SeekFrom::Start(self.data_start + offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    // Reads fixed-width elements from an array.
    fn read_fixed<const W: usize>(&self, path: &str, kind: ArrayKind, offset: usize, len: usize) -> Result<Vec<[u8; W]>> {
        let entry = self.entry(path, kind)?;
        check_slice(path, offset, len, entry.len)?;
        let bytes = self.read_bytes(entry.offset + (offset * W) as u64, len * W)?;
        Ok(bytes.chunks_exact(W).map(|chunk| {
            let mut element = [0u8; W];
            element.copy_from_slice(chunk);
            element
        }).collect())
    }
}

fn invalid_data<S: Into<String>>(msg: S) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}

impl BlockStore for FileBlockStore {
    fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Option<String>> {
        Ok(self.attributes.get(&(path.to_string(), name.to_string())).cloned())
    }

    fn array_len(&self, path: &str) -> Result<usize> {
        self.entries.get(path).map(|entry| entry.len).ok_or_else(|| missing_array(path))
    }

    fn read_i32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<i32>> {
        let elements = self.read_fixed::<4>(path, ArrayKind::I32, offset, len)?;
        Ok(elements.into_iter().map(i32::from_le_bytes).collect())
    }

    fn read_u8(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        let entry = self.entry(path, ArrayKind::U8)?;
        check_slice(path, offset, len, entry.len)?;
        self.read_bytes(entry.offset + offset as u64, len)
    }

    fn read_f32(&self, path: &str, offset: usize, len: usize) -> Result<Vec<f32>> {
        let elements = self.read_fixed::<4>(path, ArrayKind::F32, offset, len)?;
        Ok(elements.into_iter().map(f32::from_le_bytes).collect())
    }

    fn read_strings(&self, path: &str, offset: usize, len: usize) -> Result<Vec<String>> {
        let entry = self.entry(path, ArrayKind::Strings)?;
        check_slice(path, offset, len, entry.len)?;
        let bounds: Vec<u64> = self.read_bytes(entry.offset + (offset * 8) as u64, (len + 1) * 8)?
            .chunks_exact(8)
            .map(|chunk| {
                let mut element = [0u8; 8];
                element.copy_from_slice(chunk);
                u64::from_le_bytes(element)
            })
            .collect();
        let bytes_start = entry.offset + ((entry.len + 1) * 8) as u64;
        let first = bounds[0];
        let bytes = self.read_bytes(bytes_start + first, (bounds[len] - first) as usize)?;
        let mut result = Vec::with_capacity(len);
        for i in 0..len {
            let start = (bounds[i] - first) as usize;
            let limit = (bounds[i + 1] - first) as usize;
            let s = String::from_utf8(bytes[start..limit].to_vec()).map_err(|err| invalid_data(format!("BlockStore: {}", err)))?;
            result.push(s);
        }
        Ok(result)
    }
}

//-----------------------------------------------------------------------------

/// Stores a position list in the layout read by [`crate::block_list::BlockPositionList`].
///
/// Chromosome names are stored once, and each site refers to its chromosome by index.
/// Strand, insertion position, and free-form annotations are not stored.
pub fn write_position_list(list: &dyn PositionList, store: &mut MemoryBlockStore) -> Result<()> {
    let n = list.len();
    let mut positions: Vec<i32> = Vec::with_capacity(n);
    let mut chromosome_names: Vec<String> = Vec::new();
    let mut chromosome_ids: HashMap<String, i32> = HashMap::new();
    let mut chromosome_indices: Vec<i32> = Vec::with_capacity(n);
    let mut snp_ids: Vec<String> = Vec::with_capacity(n);
    let mut maf: Vec<f32> = Vec::with_capacity(n);
    let mut coverage: Vec<f32> = Vec::with_capacity(n);

    for site in 0..n {
        let position = list.get(site)?;
        positions.push(position.position());
        let name = position.chromosome().name();
        let next_id = chromosome_names.len() as i32;
        let id = *chromosome_ids.entry(name.to_string()).or_insert_with(|| {
            chromosome_names.push(name.to_string());
            next_id
        });
        chromosome_indices.push(id);
        snp_ids.push(position.actual_snp_id().unwrap_or("").to_string());
        maf.push(position.maf());
        coverage.push(position.site_coverage());
    }

    let mut freq_order = list.allele_for_all_sites(AlleleType::Major)?;
    freq_order.extend(list.allele_for_all_sites(AlleleType::Minor)?);

    store.insert(POSITIONS, ArrayData::I32(positions));
    store.insert(CHROMOSOMES, ArrayData::Strings(chromosome_names));
    store.insert(CHROMOSOME_INDICES, ArrayData::I32(chromosome_indices));
    store.insert(SNP_IDS, ArrayData::Strings(snp_ids));
    store.insert(REFERENCE_ALLELES, ArrayData::U8(list.allele_for_all_sites(AlleleType::Reference)?));
    store.insert(ANCESTRAL_ALLELES, ArrayData::U8(list.allele_for_all_sites(AlleleType::Ancestral)?));
    store.insert(MAF, ArrayData::F32(maf));
    store.insert(SITE_COVERAGE, ArrayData::F32(coverage));
    store.insert(ALLELE_FREQ_ORDER, ArrayData::U8(freq_order));
    if let Some(version) = list.genome_version() {
        store.set_attribute(POSITION_ATTRIBUTES, GENOME_VERSION, version);
    }
    Ok(())
}

//-----------------------------------------------------------------------------
