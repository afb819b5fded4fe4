use super::*;

use crate::ErrorKind;

use simple_sds::serialize;

use flate2::Compression;
use flate2::write::GzEncoder;

use rand::Rng;

use std::fs;
use std::io::{Cursor, Write};

//-----------------------------------------------------------------------------

const CHR1: &[u8] = b"ACGTACGTACGTNNACGT";
const CHR2: &[u8] = b"GGCCTTAA";
const CHR3: &[u8] = b"A";

fn example_store() -> SequenceStore {
    let filename = support::get_test_data("example.fa");
    let store = SequenceStore::from_fasta(&filename, &FastaOptions::default());
    if let Err(err) = store {
        panic!("Failed to read {}: {}", filename.display(), err);
    }
    store.unwrap()
}

fn chromosome(name: &str) -> Chromosome {
    Chromosome::parse(name).unwrap()
}

fn check_error<T>(result: Result<T>, kind: ErrorKind, name: &str) {
    assert!(result.is_err(), "{}: The query succeeded", name);
    assert_eq!(result.err().unwrap().kind(), kind, "{}: Invalid error kind", name);
}

//-----------------------------------------------------------------------------

#[test]
fn single_record() {
    let store = SequenceStore::from_reader(Cursor::new(">1\nACGT\n"), &FastaOptions::default()).unwrap();
    assert_eq!(store.number_of_chromosomes(), 1, "Invalid number of chromosomes");
    let chr = &store.chromosomes()[0];
    assert_eq!(chr.name(), "1", "Invalid chromosome name");
    assert_eq!(chr.length(), 4, "Invalid chromosome length");
    assert_eq!(store.sequence(chr, 1, 4).unwrap(), vec![support::A_ALLELE, support::C_ALLELE, support::G_ALLELE, support::T_ALLELE], "Invalid sequence");
    assert_eq!(store.packed(chr).unwrap(), &[0x01, 0x23], "Invalid packed sequence");
}

#[test]
fn fasta_file() {
    let store = example_store();
    let names: Vec<&str> = store.chromosomes().iter().map(|chr| chr.name()).collect();
    assert_eq!(names, vec!["1", "2", "SCAFFOLD_3"], "Invalid chromosomes");
    let lengths: Vec<i32> = store.chromosomes().iter().map(|chr| chr.length()).collect();
    assert_eq!(lengths, vec![18, 8, 1], "Invalid chromosome lengths");
    assert_eq!(store.genome_size(), 27, "Invalid genome size");
    assert!(store.header().is_set(SequencePayload::FLAG_DESCRIPTIONS), "Description flag is not set");

    let chr1 = &store.chromosomes()[0];
    assert_eq!(
        chr1.annotations().first_text(chromosome::DESCRIPTION_KEY), Some("first test chromosome"),
        "Invalid chromosome description"
    );
    assert_eq!(store.chromosome_by_name("chr2"), Some(&store.chromosomes()[1]), "Invalid chromosome by name");
    assert_eq!(store.chromosome_size(&chromosome("2")), Some(8), "Invalid size for a parsed chromosome");
    assert_eq!(store.chromosome_size(&chromosome("4")), None, "Found a size for a missing chromosome");

    for (name, truth) in [("1", CHR1), ("2", CHR2), ("scaffold_3", CHR3)] {
        let chr = chromosome(name);
        assert_eq!(store.chromosome_sequence(&chr).unwrap(), support::encode_sequence(truth), "Invalid sequence for chromosome {}", name);
        assert_eq!(
            store.sequence_as_string(&chr, 1, truth.len() as i32).unwrap(), String::from_utf8_lossy(truth),
            "Invalid string for chromosome {}", name
        );
    }
}

#[test]
fn ranges_and_genotypes() {
    let store = example_store();
    let chr1 = chromosome("1");
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let start = rng.gen_range(1..=CHR1.len());
        let last = rng.gen_range(start..=CHR1.len());
        let truth = support::encode_sequence(&CHR1[start - 1..last]);
        assert_eq!(store.sequence(&chr1, start as i32, last as i32).unwrap(), truth, "Invalid sequence for {}..={}", start, last);
    }
    assert!(store.sequence(&chr1, 5, 4).unwrap().is_empty(), "Non-empty sequence for an empty range");

    assert_eq!(store.genotype(&chr1, 4).unwrap(), support::T_ALLELE, "Invalid genotype");
    assert_eq!(store.genotype(&chr1, 13).unwrap(), support::UNKNOWN_ALLELE, "Invalid genotype for N");
    assert_eq!(store.genotype_as_string(&chr1, 13).unwrap(), "N", "Invalid genotype string for N");
    assert_eq!(store.genotype_as_string(&chr1, 2).unwrap(), "C", "Invalid genotype string");
}

#[test]
fn invalid_queries() {
    let store = example_store();
    let chr1 = chromosome("1");
    check_error(store.sequence(&chr1, 0, 10), ErrorKind::InvalidArgument, "Start 0");
    check_error(store.sequence(&chr1, -5, 10), ErrorKind::InvalidArgument, "Negative start");
    check_error(store.sequence(&chromosome("7"), 1, 2), ErrorKind::InvalidArgument, "Missing chromosome");
    check_error(store.sequence(&chr1, 1, 19), ErrorKind::InvalidArgument, "Past the end");
    check_error(store.sequence(&chr1, 19, 20), ErrorKind::InvalidArgument, "Start past the end");
    check_error(store.genotype(&chr1, 0), ErrorKind::InvalidArgument, "Genotype at 0");
    check_error(store.chromosome_sequence(&chromosome("7")), ErrorKind::InvalidArgument, "Missing chromosome sequence");
}

//-----------------------------------------------------------------------------

#[test]
fn global_coordinates() {
    let store = example_store();
    let genome: Vec<u8> = [CHR1, CHR2, CHR3].concat();
    assert_eq!(store.global_sequence(0, 26).unwrap(), support::encode_sequence(&genome), "Invalid full genome");
    assert_eq!(store.global_sequence(16, 19).unwrap(), support::encode_sequence(b"GTGG"), "Invalid range across chromosomes");
    assert_eq!(store.global_sequence(26, 26).unwrap(), support::encode_sequence(b"A"), "Invalid single base");
    assert!(store.global_sequence(5, 4).unwrap().is_empty(), "Non-empty global sequence for an empty range");
    check_error(store.global_sequence(20, 27), ErrorKind::InvalidArgument, "Past the genome");
    check_error(store.global_sequence(0, i32::MAX as u64 + 1), ErrorKind::InvalidArgument, "Too long range");

    let coordinates: Vec<u64> = vec![0, 17, 18, 26, 17];
    let local = store.to_local_coordinates(&coordinates).unwrap();
    assert_eq!(local.len(), 4, "Invalid number of distinct coordinates");
    assert_eq!(local[&0], (chromosome("1"), 0), "Invalid local coordinate for 0");
    assert_eq!(local[&17], (chromosome("1"), 17), "Invalid local coordinate for 17");
    assert_eq!(local[&18], (chromosome("2"), 0), "Invalid local coordinate for 18");
    assert_eq!(local[&26], (chromosome("scaffold_3"), 0), "Invalid local coordinate for 26");
    check_error(store.to_local_coordinates(&[3, 27]), ErrorKind::InvalidArgument, "Local coordinate past the genome");
}

#[test]
fn empty_chromosome() {
    let store = SequenceStore::from_reader(Cursor::new(">1\n>2\nAC\n"), &FastaOptions::default()).unwrap();
    assert_eq!(store.number_of_chromosomes(), 2, "Invalid number of chromosomes");
    assert_eq!(store.chromosome_size(&chromosome("1")), Some(0), "Invalid length for an empty chromosome");
    assert!(store.chromosome_sequence(&chromosome("1")).unwrap().is_empty(), "Non-empty sequence for an empty chromosome");
    assert_eq!(store.global_sequence(0, 1).unwrap(), support::encode_sequence(b"AC"), "Empty chromosome was not skipped");
    let local = store.to_local_coordinates(&[0]).unwrap();
    assert_eq!(local[&0].0, chromosome("2"), "Coordinate mapped to an empty chromosome");
}

//-----------------------------------------------------------------------------

#[test]
fn remapping() {
    let options = FastaOptions::default().mask_lowercase();
    let store = SequenceStore::from_fasta(support::get_test_data("example.fa"), &options).unwrap();
    assert_eq!(store.sequence_as_string(&chromosome("2"), 1, 8).unwrap(), "NNNNTTAA", "Lower case bases were not masked");

    let options = FastaOptions::default().remap(b'T', b'-');
    let store = SequenceStore::from_sequence(&chromosome("1"), "ATTA").unwrap();
    assert_eq!(store.sequence_as_string(&chromosome("1"), 1, 4).unwrap(), "ATTA", "Remapped without options");
    let store = SequenceStore::from_reader(Cursor::new(">1\nATTA\n"), &options).unwrap();
    assert_eq!(store.sequence_as_string(&chromosome("1"), 1, 4).unwrap(), "A--A", "Invalid remapping");
}

#[test]
fn gzip_input() {
    let plain = fs::read(support::get_test_data("example.fa")).unwrap();
    let filename = serialize::temp_file_name("example-fasta-gz");
    let mut encoder = GzEncoder::new(fs::File::create(&filename).unwrap(), Compression::default());
    encoder.write_all(&plain).unwrap();
    encoder.finish().unwrap();

    let compressed = SequenceStore::from_fasta(&filename, &FastaOptions::default()).unwrap();
    assert_eq!(compressed, example_store(), "Compressed input produced a different store");
    fs::remove_file(&filename).unwrap();
}

#[test]
fn malformed_input() {
    check_error(
        SequenceStore::from_reader(Cursor::new("ACGT\n>1\nACGT\n"), &FastaOptions::default()),
        ErrorKind::MalformedInput, "Sequence before header"
    );
    check_error(
        SequenceStore::from_reader(Cursor::new(">1\nACGT\n>chr1\nAC\n"), &FastaOptions::default()),
        ErrorKind::IllegalState, "Duplicate chromosome"
    );
    check_error(
        SequenceStore::from_reader(Cursor::new(">\nACGT\n"), &FastaOptions::default()),
        ErrorKind::InvalidArgument, "Empty name"
    );
}

//-----------------------------------------------------------------------------

#[test]
fn serialize_store() {
    let store = example_store();
    serialize::test(&store, "sequence-store", None, true);

    let filename = serialize::temp_file_name("sequence-store-descriptions");
    serialize::serialize_to(&store, &filename).unwrap();
    assert!(Header::<SequencePayload>::found_in(&filename), "The file does not start with a sequence header");
    let loaded: SequenceStore = serialize::load_from(&filename).unwrap();
    let chr1 = &loaded.chromosomes()[0];
    assert_eq!(chr1.length(), 18, "Invalid length after loading");
    assert_eq!(
        chr1.annotations().first_text(chromosome::DESCRIPTION_KEY), Some("first test chromosome"),
        "Invalid description after loading"
    );
    assert!(loaded.chromosomes()[1].annotations().is_empty(), "Empty description was not preserved");
    fs::remove_file(&filename).unwrap();
}

//-----------------------------------------------------------------------------
