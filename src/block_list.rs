//! A position list backed by a block store, with positions materialized on demand.
//!
//! [`BlockPositionList`] keeps only the physical positions and chromosome ranges in memory.
//! Positions are created in fixed-size blocks through a [`BlockCache`]: a request for a single site loads every site in the same block in one batch of reads.

use crate::block_store::{self, BlockStore};
use crate::chromosome::Chromosome;
use crate::position::{AlleleType, Position, Strand};
use crate::position_list::{self, PositionList, SiteIndex};
use crate::support;
use crate::{Error, Result};

use log::{debug, info};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Default number of sites in a block.
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;

/// Default maximum number of cached sites.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000_000;

/// Configuration for a [`BlockCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockCacheConfig {
    /// Number of sites in a block; must be a power of two.
    pub block_size: usize,
    /// Maximum number of cached sites.
    pub max_entries: usize,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        BlockCacheConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl BlockCacheConfig {
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two() {
            return Err(Error::invalid(format!("Block size {} is not a power of two", self.block_size)));
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

// A cache slot. The slot mutex is held while the block is loaded.
type Slot<T> = Arc<Mutex<Option<Arc<Vec<T>>>>>;

/// A bounded cache of fixed-size blocks keyed by site.
///
/// Loading a block is atomic per block: concurrent requests for the same block wait for a single load.
/// When the number of cached blocks would exceed `max_entries / block_size`, the cache is cleared before the new block is added.
///
/// # Examples
///
/// ```
/// use genostore::block_list::{BlockCache, BlockCacheConfig};
///
/// let cache: BlockCache<usize> = BlockCache::new(BlockCacheConfig { block_size: 4, max_entries: 8 });
/// let (block, offset) = cache.get_or_load(6, |start| Ok((start..start + 4).collect())).unwrap();
/// assert_eq!(block[offset], 6);
/// let (block, offset) = cache.get_or_load(5, |_| unreachable!()).unwrap();
/// assert_eq!(block[offset], 5);
/// assert_eq!(cache.loads(), 1);
/// ```
#[derive(Debug)]
pub struct BlockCache<T> {
    block_size: usize,
    max_blocks: usize,
    blocks: Mutex<HashMap<usize, Slot<T>>>,
    loads: AtomicUsize,
}

impl<T> BlockCache<T> {
    /// Creates an empty cache.
    ///
    /// # Panics
    ///
    /// Panics if the block size is not a power of two.
    pub fn new(config: BlockCacheConfig) -> Self {
        assert!(config.block_size.is_power_of_two(), "BlockCache: Block size {} is not a power of two", config.block_size);
        BlockCache {
            block_size: config.block_size,
            max_blocks: (config.max_entries / config.block_size).max(1),
            blocks: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Returns the number of sites in a block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the first site of the block containing the site.
    #[inline]
    pub fn block_start(&self, site: usize) -> usize {
        site & !(self.block_size - 1)
    }

    /// Returns the number of block loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of cached blocks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all blocks from the cache.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Slot<T>>> {
        self.blocks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the block containing the site and the offset of the site in the block.
    ///
    /// If the block is not in the cache, `loader` is called with the first site of the block.
    /// A failed load leaves the slot empty, so a later request will try again.
    pub fn get_or_load<F>(&self, site: usize, loader: F) -> Result<(Arc<Vec<T>>, usize)>
    where
        F: FnOnce(usize) -> Result<Vec<T>>,
    {
        let start = self.block_start(site);
        let slot = {
            let mut blocks = self.lock();
            if !blocks.contains_key(&start) && blocks.len() >= self.max_blocks {
                debug!("BlockCache: Clearing {} blocks", blocks.len());
                blocks.clear();
            }
            blocks.entry(start).or_default().clone()
        };

        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(block) = guard.as_ref() {
            return Ok((block.clone(), site - start));
        }
        let block = Arc::new(loader(start)?);
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!("BlockCache: Loaded block starting at site {} ({} entries)", start, block.len());
        *guard = Some(block.clone());
        Ok((block, site - start))
    }
}

//-----------------------------------------------------------------------------

/// A [`PositionList`] that reads positions from a [`BlockStore`].
///
/// The store must contain the arrays written by [`block_store::write_position_list`].
/// Physical positions, chromosome indices, and chromosome names are read when the list is opened.
/// Other arrays are optional, and missing values use the defaults of [`crate::position::Builder`].
///
/// The stored layout has no strand, insertion position, known variants, indel flag, or free-form annotations.
/// Positions read from the store therefore use the builder defaults for these fields, and [`PositionList::is_positive_strand`], [`PositionList::is_indel`], and [`PositionList::indel_size`] may differ from the list that was written.
/// A list used as a variant track should stay in a [`crate::position_list::PositionArrayList`].
///
/// # Examples
///
/// ```
/// use genostore::{Chromosome, Position, PositionList};
/// use genostore::block_list::BlockPositionList;
/// use genostore::block_store::{self, MemoryBlockStore};
/// use genostore::position_list::PositionListBuilder;
/// use std::sync::Arc;
///
/// let chr = Chromosome::parse("3").unwrap();
/// let mut builder = PositionListBuilder::with_genome_version("AGPv4");
/// builder.add(Position::builder(chr.clone(), 100).snp_name("rs100").build());
/// builder.add(Position::builder(chr.clone(), 200).build());
/// let mut store = MemoryBlockStore::new();
/// block_store::write_position_list(&builder.build(), &mut store).unwrap();
///
/// let list = BlockPositionList::new(Arc::new(store)).unwrap();
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.site_of_physical_position(200, &chr), 1);
/// assert_eq!(list.get(0).unwrap().snp_id(), "rs100");
/// assert_eq!(list.genome_version(), Some("AGPv4"));
/// ```
pub struct BlockPositionList {
    store: Arc<dyn BlockStore>,
    index: SiteIndex,
    genome_version: Option<String>,
    cache: BlockCache<Position>,
    // Allele columns loaded by `allele_for_all_sites`.
    columns: [Mutex<Option<Arc<Vec<u8>>>>; AlleleType::COUNT],
}

impl BlockPositionList {
    /// Opens a list with the default cache configuration.
    pub fn new(store: Arc<dyn BlockStore>) -> Result<Self> {
        Self::with_config(store, BlockCacheConfig::default())
    }

    /// Opens a list with the given cache configuration.
    pub fn with_config(store: Arc<dyn BlockStore>, config: BlockCacheConfig) -> Result<Self> {
        config.validate()?;
        for path in [block_store::POSITIONS, block_store::CHROMOSOMES, block_store::CHROMOSOME_INDICES] {
            if !store.exists(path) {
                return Err(Error::malformed(format!("BlockPositionList: Missing array {}", path)));
            }
        }

        let n = store.array_len(block_store::POSITIONS)?;
        let positions = store.read_i32(block_store::POSITIONS, 0, n)?;
        let indices = store.read_i32(block_store::CHROMOSOME_INDICES, 0, n)?;
        let names = store.read_strings(block_store::CHROMOSOMES, 0, store.array_len(block_store::CHROMOSOMES)?)?;
        let mut chromosomes: Vec<Chromosome> = Vec::with_capacity(names.len());
        for name in names.iter() {
            chromosomes.push(Chromosome::parse(name)?);
        }

        let mut sites: Vec<(Chromosome, i32)> = Vec::with_capacity(n);
        for (site, (index, position)) in indices.iter().zip(positions.iter()).enumerate() {
            let chromosome = usize::try_from(*index).ok().and_then(|i| chromosomes.get(i)).ok_or_else(|| {
                Error::malformed(format!("BlockPositionList: Invalid chromosome index {} at site {}", index, site))
            })?;
            sites.push((chromosome.clone(), *position));
        }
        let index = SiteIndex::new(sites);
        let genome_version = store.attribute(block_store::POSITION_ATTRIBUTES, block_store::GENOME_VERSION)?;
        info!("BlockPositionList: {} sites on {} chromosomes", index.len(), index.num_chromosomes());

        Ok(BlockPositionList {
            store: store,
            index: index,
            genome_version: genome_version,
            cache: BlockCache::new(config),
            columns: std::array::from_fn(|_| Mutex::new(None)),
        })
    }

    /// Returns the number of block loads so far.
    pub fn loads(&self) -> usize {
        self.cache.loads()
    }

    /// Returns the block cache.
    pub fn cache(&self) -> &BlockCache<Position> {
        &self.cache
    }

    // Reads alleles of the given type for sites `start..start + len`.
    fn read_alleles(&self, allele_type: AlleleType, start: usize, len: usize) -> Result<Vec<u8>> {
        let (path, offset) = match allele_type {
            AlleleType::Reference => (block_store::REFERENCE_ALLELES, 0),
            AlleleType::Ancestral => (block_store::ANCESTRAL_ALLELES, 0),
            AlleleType::Major => (block_store::ALLELE_FREQ_ORDER, 0),
            AlleleType::Minor => (block_store::ALLELE_FREQ_ORDER, self.len()),
            _ => return Ok(vec![support::UNKNOWN_ALLELE; len]),
        };
        if !self.store.exists(path) {
            return Ok(vec![support::UNKNOWN_ALLELE; len]);
        }
        self.store.read_u8(path, offset + start, len)
    }

    fn read_optional_f32(&self, path: &str, start: usize, len: usize) -> Result<Vec<f32>> {
        if self.store.exists(path) {
            self.store.read_f32(path, start, len)
        } else {
            Ok(vec![f32::NAN; len])
        }
    }

    // Creates the positions for sites `start..start + block_size`.
    fn load_block(&self, start: usize) -> Result<Vec<Position>> {
        let len = self.cache.block_size().min(self.len() - start);
        let snp_ids = if self.store.exists(block_store::SNP_IDS) {
            self.store.read_strings(block_store::SNP_IDS, start, len)?
        } else {
            vec![String::new(); len]
        };
        let maf = self.read_optional_f32(block_store::MAF, start, len)?;
        let coverage = self.read_optional_f32(block_store::SITE_COVERAGE, start, len)?;
        let stored_types = [AlleleType::Major, AlleleType::Minor, AlleleType::Reference, AlleleType::Ancestral];
        let mut alleles: Vec<Vec<u8>> = Vec::with_capacity(stored_types.len());
        for allele_type in stored_types {
            alleles.push(self.read_alleles(allele_type, start, len)?);
        }

        let mut result = Vec::with_capacity(len);
        for i in 0..len {
            let site = start + i;
            let chromosome = self.index.chromosome(site).ok_or_else(|| position_list::out_of_bounds(site, self.len()))?;
            let position = self.index.position(site).ok_or_else(|| position_list::out_of_bounds(site, self.len()))?;
            let mut builder = Position::builder(chromosome.clone(), position).maf(maf[i]).site_coverage(coverage[i]);
            if !snp_ids[i].is_empty() {
                builder = builder.snp_name(&snp_ids[i]);
            }
            for (allele_type, values) in stored_types.iter().zip(alleles.iter()) {
                builder = builder.allele(*allele_type, values[i]);
            }
            result.push(builder.build());
        }
        Ok(result)
    }

    fn check_site(&self, site: usize) -> Result<()> {
        if site >= self.len() {
            return Err(position_list::out_of_bounds(site, self.len()));
        }
        Ok(())
    }

    fn column(&self, allele_type: AlleleType) -> Result<Arc<Vec<u8>>> {
        let mut guard = self.columns[allele_type.index()].lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(column) = guard.as_ref() {
            return Ok(column.clone());
        }
        let column = Arc::new(self.read_alleles(allele_type, 0, self.len())?);
        *guard = Some(column.clone());
        Ok(column)
    }
}

impl PositionList for BlockPositionList {
    fn site_index(&self) -> &SiteIndex {
        &self.index
    }

    fn get(&self, site: usize) -> Result<Position> {
        self.check_site(site)?;
        let (block, offset) = self.cache.get_or_load(site, |start| self.load_block(start))?;
        Ok(block[offset].clone())
    }

    fn allele(&self, allele_type: AlleleType, site: usize) -> Result<u8> {
        Ok(self.get(site)?.allele(allele_type))
    }

    fn alleles(&self, allele_type: AlleleType, start: usize, end: usize) -> Result<Vec<u8>> {
        position_list::check_range(start, end, self.len())?;
        let column = self.column(allele_type)?;
        Ok(column[start..end].to_vec())
    }

    fn allele_for_all_sites(&self, allele_type: AlleleType) -> Result<Vec<u8>> {
        Ok(self.column(allele_type)?.as_ref().clone())
    }

    fn site_name(&self, site: usize) -> Result<String> {
        Ok(self.get(site)?.snp_id())
    }

    fn is_indel(&self, site: usize) -> Result<bool> {
        Ok(self.get(site)?.is_indel())
    }

    fn is_positive_strand(&self, site: usize) -> Result<bool> {
        Ok(self.get(site)?.strand() == Strand::Plus)
    }

    fn genome_version(&self) -> Option<&str> {
        self.genome_version.as_deref()
    }
}

//-----------------------------------------------------------------------------
