use super::*;

use crate::interning::NoInterning;
use crate::ErrorKind;

use rand::Rng;
use rand::seq::SliceRandom;

//-----------------------------------------------------------------------------

#[test]
fn name_normalization() {
    let cases = vec![
        ("1", "1"),
        ("chr1", "1"),
        ("Chromosome10", "10"),
        ("  chrX  ", "X"),
        ("scaffold_2", "SCAFFOLD_2"),
        ("chr3 assembled from contigs", "3"),
        ("CHRCHR4", "CHR4"),
        ("mt", "MT"),
    ];
    for (raw, truth) in cases {
        let chromosome = Chromosome::new(raw).unwrap();
        assert_eq!(chromosome.name(), truth, "Invalid normalized name for {}", raw);
        assert_eq!(normalize_name(raw), truth, "Invalid normalization for {}", raw);
    }
}

#[test]
fn descriptions() {
    let chromosome = Chromosome::new("chr3 assembled from contigs").unwrap();
    assert_eq!(chromosome.annotations().first_text(DESCRIPTION_KEY), Some("assembled from contigs"), "Invalid description");

    let chromosome = Chromosome::new("chr3").unwrap();
    assert!(chromosome.annotations().is_empty(), "Description for a name without spaces");
}

#[test]
fn empty_names() {
    for raw in ["", "   "] {
        let result = Chromosome::new(raw);
        assert!(result.is_err(), "Created a chromosome with name {:?}", raw);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument, "Invalid error kind for name {:?}", raw);
    }
}

#[test]
fn numbers_and_lengths() {
    let chromosome = Chromosome::new("chr7").unwrap();
    assert_eq!(chromosome.number(), Some(7), "Invalid chromosome number");
    assert_eq!(chromosome.length(), UNKNOWN_LENGTH, "Length is not unknown");

    let chromosome = Chromosome::new("7A").unwrap();
    assert_eq!(chromosome.number(), None, "Number for a non-numeric name");
    assert_eq!(chromosome.number_or_sentinel(), NOT_A_NUMBER, "Invalid sentinel");
    assert_eq!(chromosome.compare_string(), "00007A", "Invalid comparison string");

    let longer = chromosome.with_new_length(1234);
    assert_eq!(longer.length(), 1234, "Length was not updated");
    assert_eq!(longer, chromosome, "Changing the length changed equality");
}

#[test]
fn ordering() {
    let chr2 = Chromosome::new("Chr2").unwrap();
    let chr10 = Chromosome::new("chr10").unwrap();
    assert!(chr2 < chr10, "Numeric chromosomes are not compared numerically");

    let s2 = Chromosome::new("scaffold_2").unwrap();
    let s10 = Chromosome::new("scaffold_10").unwrap();
    assert!(s10 < s2, "Non-numeric chromosomes are not compared as strings");

    // Mixed sets keep numeric prefixes in numeric order.
    let c9a = Chromosome::new("9A").unwrap();
    let c10a = Chromosome::new("10A").unwrap();
    assert!(c9a < c10a, "Padded numeric prefixes are not ordered");
    assert!(chr10 < c10a, "Numeric chromosome is not before its prefixed variant");

    let one = Chromosome::new("1").unwrap();
    let padded = Chromosome::new("01").unwrap();
    assert_ne!(one, padded, "Different names are equal");
    assert_ne!(one.cmp(&padded), Ordering::Equal, "Ordering is inconsistent with equality");
}

#[test]
fn random_numeric_order() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let a: i32 = rng.gen_range(0..100_000);
        let b: i32 = rng.gen_range(0..100_000);
        let first = Chromosome::new(&format!("chr{}", a)).unwrap();
        let second = Chromosome::new(&a.to_string()).unwrap();
        let third = Chromosome::new(&b.to_string()).unwrap();
        assert_eq!(first, second, "Prefix changed equality for {}", a);
        assert_eq!(second.cmp(&third), a.cmp(&b), "Invalid numeric comparison for {} and {}", a, b);
    }
}

#[test]
fn sorting() {
    let mut names = vec!["10", "2", "X", "1", "scaffold_10", "scaffold_2", "Mt"];
    names.shuffle(&mut rand::thread_rng());
    let mut chromosomes: Vec<Chromosome> = names.iter().map(|name| Chromosome::new(name).unwrap()).collect();
    chromosomes.sort();
    let sorted: Vec<&str> = chromosomes.iter().map(|chromosome| chromosome.name()).collect();
    assert_eq!(sorted, vec!["1", "2", "10", "MT", "SCAFFOLD_10", "SCAFFOLD_2", "X"], "Invalid sort order");
}

#[test]
fn canonical_instances() {
    let table: InternTable<ChromosomeData> = InternTable::with_capacity(10);
    let first = Chromosome::new("chr5").unwrap().canonicalize_with(&table);
    let second = Chromosome::new("5").unwrap().canonicalize_with(&table);
    assert!(first.ptr_eq(&second), "Equal chromosomes were not canonicalized to the same instance");

    let third = Chromosome::new("5").unwrap().canonicalize_with(&NoInterning);
    assert!(!third.ptr_eq(&first), "NoInterning returned a shared instance");
    assert_eq!(third, first, "Canonicalization changed equality");

    let global = Chromosome::parse("chr5").unwrap();
    let again = Chromosome::parse("CHR5").unwrap();
    assert_eq!(global, again, "Global canonical instances are not equal");
}

#[test]
fn shared_instances() {
    // Sharing by name goes through an injected table with a bounded capacity.
    let table: InternTable<ChromosomeData> = InternTable::with_capacity(2);
    let first = Chromosome::new("scaffold_7").unwrap().canonicalize_with(&table);
    let second = Chromosome::new("chrScaffold_7").unwrap().canonicalize_with(&table);
    assert!(first.ptr_eq(&second), "Chromosomes with the same name are not shared");

    let placeholder = Chromosome::unknown();
    assert_eq!(placeholder.name(), "UNKNOWN", "Invalid placeholder name");
    assert!(placeholder.ptr_eq(&Chromosome::unknown()), "The placeholder is not shared");
}

//-----------------------------------------------------------------------------
