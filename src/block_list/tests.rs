use super::*;

use crate::block_store::{FileBlockStore, MemoryBlockStore};
use crate::position_list::{PositionArrayList, PositionListBuilder};
use crate::ErrorKind;

use simple_sds::serialize;

use rand::Rng;

use std::fs;
use std::thread;

//-----------------------------------------------------------------------------

fn chromosome(name: &str) -> Chromosome {
    Chromosome::parse(name).unwrap()
}

// Sites 0..n spread over three chromosomes, with alleles derived from the site.
fn example_list(n: usize) -> PositionArrayList {
    let names = ["1", "2", "10"];
    let mut builder = PositionListBuilder::with_genome_version("AGPv4");
    for site in 0..n {
        let chr = chromosome(names[site * names.len() / n]);
        let mut position = Position::builder(chr, 10 * (site as i32) + 1)
            .maf(site as f32 / n as f32)
            .allele(AlleleType::Major, (site % 4) as u8)
            .allele(AlleleType::Minor, ((site + 1) % 4) as u8)
            .allele(AlleleType::Reference, (site % 4) as u8);
        if site % 3 == 0 {
            position = position.snp_name(&format!("rs{}", site));
        }
        builder.add(position.build());
    }
    builder.build()
}

fn memory_store(list: &PositionArrayList) -> Arc<dyn BlockStore> {
    let mut store = MemoryBlockStore::new();
    block_store::write_position_list(list, &mut store).unwrap();
    Arc::new(store)
}

fn small_config() -> BlockCacheConfig {
    BlockCacheConfig {
        block_size: 8,
        max_entries: 16,
    }
}

fn check_list(truth: &PositionArrayList, list: &BlockPositionList, name: &str) {
    assert_eq!(list.len(), truth.len(), "[{}]: Invalid number of sites", name);
    assert_eq!(list.chromosomes(), truth.chromosomes(), "[{}]: Invalid chromosomes", name);
    assert_eq!(list.chromosome_offsets(), truth.chromosome_offsets(), "[{}]: Invalid chromosome offsets", name);
    assert_eq!(list.physical_positions(), truth.physical_positions(), "[{}]: Invalid physical positions", name);
    assert_eq!(list.genome_version(), truth.genome_version(), "[{}]: Invalid genome version", name);

    for site in 0..truth.len() {
        let expected = truth.get(site).unwrap();
        let position = list.get(site).unwrap();
        assert_eq!(position, expected, "[{}]: Invalid position at site {}", name, site);
        assert_eq!(position.snp_id(), expected.snp_id(), "[{}]: Invalid SNP id at site {}", name, site);
        assert_eq!(position.maf(), expected.maf(), "[{}]: Invalid MAF at site {}", name, site);
        for allele_type in [AlleleType::Major, AlleleType::Minor, AlleleType::Reference, AlleleType::Ancestral] {
            assert_eq!(
                list.allele(allele_type, site).unwrap(), expected.allele(allele_type),
                "[{}]: Invalid {:?} allele at site {}", name, allele_type, site
            );
        }
        let found = list.site_of_physical_position(expected.position(), expected.chromosome());
        assert_eq!(found, site as isize, "[{}]: Invalid site for physical position {}", name, expected.position());
    }

    for allele_type in AlleleType::ALL {
        assert_eq!(
            list.allele_for_all_sites(allele_type).unwrap(), truth.allele_for_all_sites(allele_type).unwrap(),
            "[{}]: Invalid {:?} column", name, allele_type
        );
    }
}

//-----------------------------------------------------------------------------

#[test]
fn cache_config() {
    assert!(BlockCacheConfig::default().validate().is_ok(), "The default configuration is invalid");
    let config = BlockCacheConfig { block_size: 3, max_entries: 10 };
    let result = config.validate();
    assert!(result.is_err(), "Accepted a block size that is not a power of two");
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument, "Invalid error kind");
}

#[test]
fn cache_loads_and_evictions() {
    let cache: BlockCache<usize> = BlockCache::new(BlockCacheConfig { block_size: 4, max_entries: 8 });
    assert!(cache.is_empty(), "New cache is not empty");
    for site in [0, 1, 2, 3] {
        let (block, offset) = cache.get_or_load(site, |start| Ok((start..start + 4).collect())).unwrap();
        assert_eq!(block[offset], site, "Invalid value for site {}", site);
    }
    assert_eq!(cache.loads(), 1, "A single block was loaded more than once");

    let (block, offset) = cache.get_or_load(5, |start| Ok((start..start + 4).collect())).unwrap();
    assert_eq!(block[offset], 5, "Invalid value in the second block");
    assert_eq!(cache.len(), 2, "Invalid number of cached blocks");

    // The cache holds two blocks, so the third one clears it.
    let _ = cache.get_or_load(9, |start| Ok((start..start + 4).collect())).unwrap();
    assert_eq!(cache.len(), 1, "The cache was not cleared");
    assert_eq!(cache.loads(), 3, "Invalid number of loads");
    let _ = cache.get_or_load(0, |start| Ok((start..start + 4).collect())).unwrap();
    assert_eq!(cache.loads(), 4, "An evicted block was not reloaded");

    cache.clear();
    assert!(cache.is_empty(), "The cache is not empty after clearing");
}

#[test]
fn failed_load() {
    let cache: BlockCache<usize> = BlockCache::new(BlockCacheConfig { block_size: 4, max_entries: 8 });
    let result = cache.get_or_load(2, |_| Err(Error::malformed("broken block")));
    assert!(result.is_err(), "A failed load succeeded");
    assert_eq!(cache.loads(), 0, "A failed load was counted");
    let (block, offset) = cache.get_or_load(2, |start| Ok((start..start + 4).collect())).unwrap();
    assert_eq!(block[offset], 2, "The block was not loaded after a failure");
}

#[test]
fn concurrent_loads() {
    let cache: Arc<BlockCache<usize>> = Arc::new(BlockCache::new(BlockCacheConfig { block_size: 16, max_entries: 1024 }));
    let mut handles = Vec::new();
    for thread_id in 0..4 {
        let cache = cache.clone();
        handles.push(thread::spawn(move || {
            for i in 0..64 {
                let site = (i * 7 + thread_id) % 64;
                let (block, offset) = cache.get_or_load(site, |start| Ok((start..start + 16).collect())).unwrap();
                assert_eq!(block[offset], site, "Invalid value for site {}", site);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.loads(), 4, "Some blocks were loaded more than once");
}

//-----------------------------------------------------------------------------

#[test]
fn empty_list() {
    let truth = PositionListBuilder::new().build();
    let list = BlockPositionList::new(memory_store(&truth)).unwrap();
    assert!(list.is_empty(), "Empty list is not empty");
    assert_eq!(list.genome_version(), None, "Empty list has a genome version");
    assert!(list.get(0).is_err(), "Found a position in an empty list");
}

#[test]
fn memory_list() {
    let truth = example_list(50);
    let list = BlockPositionList::with_config(memory_store(&truth), small_config()).unwrap();
    check_list(&truth, &list, "memory");
}

#[test]
fn file_list() {
    let truth = example_list(40);
    let mut store = MemoryBlockStore::new();
    block_store::write_position_list(&truth, &mut store).unwrap();
    let filename = serialize::temp_file_name("block-position-list");
    FileBlockStore::create(&filename, &store).unwrap();

    let file = FileBlockStore::open(&filename).unwrap();
    let list = BlockPositionList::with_config(Arc::new(file), small_config()).unwrap();
    check_list(&truth, &list, "file");
    drop(list);
    fs::remove_file(&filename).unwrap();
}

#[test]
fn block_loading() {
    let truth = example_list(30);
    let list = BlockPositionList::with_config(memory_store(&truth), small_config()).unwrap();
    assert_eq!(list.loads(), 0, "Opening the list loaded blocks");
    for site in 0..8 {
        let _ = list.get(site).unwrap();
    }
    assert_eq!(list.loads(), 1, "Sites in the first block were loaded separately");
    let _ = list.get(29).unwrap();
    assert_eq!(list.loads(), 2, "The last block was not loaded");
    let _ = list.site_of_physical_position(101, &chromosome("2"));
    let _ = list.alleles(AlleleType::Reference, 0, 30).unwrap();
    assert_eq!(list.loads(), 2, "Lookups and allele columns loaded blocks");

    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let site = rng.gen_range(0..truth.len());
        assert_eq!(list.get(site).unwrap(), truth.get(site).unwrap(), "Invalid position at random site {}", site);
    }
}

#[test]
fn out_of_bounds() {
    let truth = example_list(10);
    let list = BlockPositionList::new(memory_store(&truth)).unwrap();
    for result in [list.get(10).map(|_| ()), list.alleles(AlleleType::Major, 5, 11).map(|_| ()), list.site_name(100).map(|_| ())] {
        assert!(result.is_err(), "Accessed a site past the end");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument, "Invalid error kind");
    }
}

#[test]
fn fields_not_stored() {
    let chr = chromosome("4");
    let mut builder = PositionListBuilder::new();
    builder.add(Position::builder(chr.clone(), 50).snp_name("del50").strand(Strand::Minus).indel(true).known_variants(&["ACG", "A"]).build());
    let truth = builder.build();
    let list = BlockPositionList::new(memory_store(&truth)).unwrap();

    assert_eq!(list.physical_positions(), vec![50], "Invalid physical positions");
    assert_eq!(list.site_name(0).unwrap(), "del50", "Invalid SNP name");
    assert!(!truth.is_positive_strand(0).unwrap(), "The written position is on the plus strand");
    assert!(list.is_positive_strand(0).unwrap(), "Strand was stored");
    assert!(truth.is_indel(0).unwrap() && !list.is_indel(0).unwrap(), "Indel flag was stored");
    assert_eq!(truth.indel_size(0).unwrap(), 1, "Invalid indel size in the written list");
    assert_eq!(list.indel_size(0).unwrap(), 0, "Known variants were stored");
}

#[test]
fn missing_arrays() {
    let mut store = MemoryBlockStore::new();
    store.insert(block_store::POSITIONS, block_store::ArrayData::I32(vec![1, 2]));
    let result = BlockPositionList::new(Arc::new(store));
    assert!(result.is_err(), "Opened a store without chromosomes");
    assert_eq!(result.err().unwrap().kind(), ErrorKind::MalformedInput, "Invalid error kind");

    let mut store = MemoryBlockStore::new();
    store.insert(block_store::POSITIONS, block_store::ArrayData::I32(vec![1, 2]));
    store.insert(block_store::CHROMOSOMES, block_store::ArrayData::Strings(vec![String::from("1")]));
    store.insert(block_store::CHROMOSOME_INDICES, block_store::ArrayData::I32(vec![0, 0]));
    let list = BlockPositionList::new(Arc::new(store)).unwrap();
    let position = list.get(1).unwrap();
    assert_eq!(position.snp_id(), "S1_2", "Invalid default SNP id");
    assert!(position.maf().is_nan(), "Missing MAF is not NaN");
    assert_eq!(list.allele(AlleleType::Major, 0).unwrap(), support::UNKNOWN_ALLELE, "Missing allele is not unknown");

    let mut store = MemoryBlockStore::new();
    store.insert(block_store::POSITIONS, block_store::ArrayData::I32(vec![1]));
    store.insert(block_store::CHROMOSOMES, block_store::ArrayData::Strings(vec![String::from("1")]));
    store.insert(block_store::CHROMOSOME_INDICES, block_store::ArrayData::I32(vec![3]));
    let result = BlockPositionList::new(Arc::new(store));
    assert!(result.is_err(), "Accepted an invalid chromosome index");
}

//-----------------------------------------------------------------------------
