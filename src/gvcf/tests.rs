use super::*;

use crate::ErrorKind;

use simple_sds::serialize;

use flate2::Compression;
use flate2::write::GzEncoder;

use std::fs;
use std::io::{Cursor, Write};

//-----------------------------------------------------------------------------

const HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tsample";

fn example_track() -> PositionArrayList {
    let filename = support::get_test_data("example.gvcf");
    let track = GvcfReader::new().read_file(&filename);
    if let Err(err) = track {
        panic!("Failed to read {}: {}", filename.display(), err);
    }
    track.unwrap()
}

fn read_lines(lines: &[&str]) -> Result<PositionArrayList> {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    GvcfReader::new().read(Cursor::new(text))
}

fn check_error<T>(result: Result<T>, kind: ErrorKind, name: &str) {
    assert!(result.is_err(), "{}: The read succeeded", name);
    assert_eq!(result.err().unwrap().kind(), kind, "{}: Invalid error kind", name);
}

//-----------------------------------------------------------------------------

#[test]
fn header_columns() {
    let columns = HeaderColumns::parse(HEADER).unwrap();
    assert_eq!(columns.chromosome, 0, "Invalid chromosome column");
    assert_eq!(columns.position, 1, "Invalid position column");
    assert_eq!(columns.id, Some(2), "Invalid ID column");
    assert_eq!(columns.info, 7, "Invalid INFO column");
    assert_eq!(columns.format, Some(8), "Invalid FORMAT column");
    assert_eq!(columns.sample(), 9, "Invalid sample column");

    let columns = HeaderColumns::parse("#CHR\tPOS\tREF\tALT\tINFO").unwrap();
    assert_eq!(columns.chromosome, 0, "Invalid #CHR column");
    assert_eq!(columns.id, None, "Found a missing ID column");
    assert_eq!(columns.format, None, "Found a missing FORMAT column");

    check_error(HeaderColumns::parse("#CHROM\tPOS\tID\tREF\tQUAL\tINFO"), ErrorKind::MalformedInput, "Missing ALT");
    check_error(HeaderColumns::parse("POS\tREF\tALT\tINFO"), ErrorKind::MalformedInput, "Missing chromosome");
}

#[test]
fn example_file() {
    let track = example_track();
    assert_eq!(track.len(), 8, "Invalid number of records");
    assert_eq!(track.genome_version(), Some(DEFAULT_GENOME_VERSION), "Invalid genome version");
    assert_eq!(track.num_chromosomes(), 2, "Invalid number of chromosomes");
    assert_eq!(track.physical_positions(), vec![1, 5, 6, 9, 10, 15, 17, 1], "Invalid positions");

    let block = track.get(0).unwrap();
    assert_eq!(block.chromosome().name(), "1", "Invalid chromosome");
    assert_eq!(block.snp_id(), "S1_1", "Invalid default SNP id");
    assert_eq!(block.known_variants(), vec!["A", "<NON_REF>"], "Invalid block variants");
    assert_eq!(block.annotations().first_text(END_KEY), Some("4"), "Invalid END");
    assert_eq!(block.annotations().first_text(MIN_DP_KEY), Some("5"), "Invalid MIN_DP");
    assert_eq!(block.annotations().first_text(GT_KEY), Some("0/0"), "Invalid GT");
    assert_eq!(block.annotations().first_text(GQ_KEY), Some("30"), "Invalid GQ");
    assert!(!block.annotations().contains_key(AD_KEY), "Found AD in a block without it");

    let site = track.get(1).unwrap();
    assert_eq!(site.snp_id(), "rs5", "Invalid SNP name");
    assert_eq!(site.known_variants(), vec!["A", "G", "<NON_REF>"], "Invalid site variants");
    assert_eq!(site.annotations().first_text(AD_KEY), Some("0,6,0"), "Invalid AD");
    assert_eq!(site.annotations().text(DP_KEY), vec!["6", "6"], "INFO and sample DP were not both stored");
    assert!(!site.annotations().contains_key(END_KEY), "Site record has END");

    let phased = track.get(4).unwrap();
    assert_eq!(phased.annotations().first_text(GT_KEY), Some("0|0"), "Invalid phased GT");
    let deletion = track.get(5).unwrap();
    assert_eq!(deletion.known_variants()[0], "AC", "Invalid multi-base reference");
}

#[test]
fn info_tokens() {
    let track = read_lines(&[
        HEADER,
        "1\t10\t.\tA\tT\t.\t.\tDB;DP=5;AF=\tGT\t0/1",
    ]).unwrap();
    let site = track.get(0).unwrap();
    assert_eq!(site.annotations().first_text("DB"), Some(crate::position::FLAG_VALUE), "Flag was not stored");
    assert_eq!(site.annotations().first_text("AF"), Some(crate::position::FLAG_VALUE), "Empty value was not a flag");
    assert_eq!(site.annotations().first_text(DP_KEY), Some("5"), "Invalid INFO value");
    assert_eq!(site.annotations().first_text(GT_KEY), Some("0/1"), "Invalid GT");
}

#[test]
fn sorting_and_versions() {
    let text = format!("{}\n2\t5\t.\tA\tT\t.\t.\tDP=1\tGT\t1\n1\t7\t.\tC\tG\t.\t.\tDP=1\tGT\t1\n1\t3\t.\tG\tT\t.\t.\tDP=1\tGT\t0\n", HEADER);
    let track = GvcfReader::with_genome_version("AGPv3").read(Cursor::new(text)).unwrap();
    assert_eq!(track.genome_version(), Some("AGPv3"), "Invalid genome version");
    assert_eq!(track.chromosome_offsets(), vec![0, 2], "Invalid chromosome offsets");
    assert_eq!(track.physical_positions(), vec![3, 7, 5], "Records were not sorted");
}

//-----------------------------------------------------------------------------

#[test]
fn malformed_records() {
    check_error(read_lines(&["1\t10\t.\tA\tT\t.\t.\tDP=1\tGT\t0"]), ErrorKind::MalformedInput, "Missing header");
    check_error(
        read_lines(&[HEADER, "1\tten\t.\tA\tT\t.\t.\tDP=1\tGT\t0"]),
        ErrorKind::MalformedInput, "Invalid position"
    );
    check_error(read_lines(&[HEADER, "1\t10\t.\tA"]), ErrorKind::MalformedInput, "Too few columns");

    let result = read_lines(&[HEADER, "1\t10\t.\tA\tT\t.\t.\tDP=1\tGT\t0", "1\t12\t.\tA\tT\t.\t.\tDP=1\tDP:GT\t3:0"]);
    assert!(result.is_err(), "GT was accepted in the second FORMAT position");
    let msg = result.err().unwrap().to_string();
    assert!(msg.contains("GT field is not in first position of FORMAT"), "Invalid message: {}", msg);
    assert!(msg.contains("record 2"), "Missing record number: {}", msg);

    let result = read_lines(&[HEADER, "1\t10\t.\tA\tT\t.\t.\tDP=1\tDP:GQ\t3:10"]);
    assert!(result.is_err(), "FORMAT without GT was accepted");
    let msg = result.err().unwrap().to_string();
    assert!(msg.contains("Missing FORMAT tag"), "Invalid message: {}", msg);
}

#[test]
fn empty_lines_and_records() {
    let track = read_lines(&["##comment", HEADER, "", "1\t10\t.\tA\t<NON_REF>\t.\t.\tEND=12\tGT:DP\t0/0:3", ""]).unwrap();
    assert_eq!(track.len(), 1, "Empty lines were not skipped");
    let track = read_lines(&[HEADER]).unwrap();
    assert!(track.is_empty(), "A file without records produced sites");
}

#[test]
fn compressed_file() {
    let plain = fs::read(support::get_test_data("example.gvcf")).unwrap();
    let filename = serialize::temp_file_name("example-gvcf-gz");
    let mut encoder = GzEncoder::new(fs::File::create(&filename).unwrap(), Compression::default());
    encoder.write_all(&plain).unwrap();
    encoder.finish().unwrap();

    let compressed = GvcfReader::new().read_file(&filename).unwrap();
    let truth = example_track();
    assert_eq!(compressed.len(), truth.len(), "Invalid number of compressed records");
    for site in 0..truth.len() {
        let (a, b) = (compressed.get(site).unwrap(), truth.get(site).unwrap());
        assert_eq!(a, b, "Invalid position at site {}", site);
        assert_eq!(a.annotations(), b.annotations(), "Invalid annotations at site {}", site);
    }
    fs::remove_file(&filename).unwrap();
}

//-----------------------------------------------------------------------------
