use genostore::{Chromosome, SequenceStore};
use genostore::internal;

use simple_sds::serialize::Serialize;
use simple_sds::serialize;

use std::time::Instant;
use std::{env, process};

use getopts::{Matches, Options};
use rand::Rng;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let config = Config::new()?;

    eprintln!("Loading sequence store {}", config.filename);
    let store: SequenceStore = serialize::load_from(&config.filename).map_err(|x| x.to_string())?;
    let (size, units) = internal::readable_size(store.size_in_bytes());
    eprintln!("Store size: {:.3} {} for {} chromosomes", size, units, store.number_of_chromosomes());
    if store.genome_size() == 0 {
        return Err(String::from("Cannot perform benchmarks with an empty genome"));
    }
    eprintln!();

    let queries = generate_queries(&store, &config);
    local_queries(&store, &queries);

    let ranges = generate_global_queries(&store, &config);
    global_queries(&store, &ranges);

    internal::report_memory_usage();
    eprintln!();
    Ok(())
}

//-----------------------------------------------------------------------------

pub struct Config {
    pub filename: String,
    pub queries: usize,
    pub query_len: usize,
}

impl Config {
    const QUERIES: usize = 1000000;
    const QUERY_LEN: usize = 100;

    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("n", "queries", "number of queries (default 1000000)", "INT");
        opts.optopt("l", "query-len", "query length (default 100)", "INT");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        let header = format!("Usage: {} [options] genome.gst", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }
        if matches.free.is_empty() {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }

        Ok(Config {
            filename: matches.free[0].clone(),
            queries: positive_option(&matches, "queries", Self::QUERIES)?,
            query_len: positive_option(&matches, "query-len", Self::QUERY_LEN)?,
        })
    }
}

fn positive_option(matches: &Matches, name: &str, default: usize) -> Result<usize, String> {
    match matches.opt_str(name) {
        Some(s) => match s.parse::<usize>() {
            Ok(0) => Err(format!("--{}: value must be non-zero", name)),
            Ok(n) => Ok(n),
            Err(f) => Err(format!("--{}: {}", name, f)),
        },
        None => Ok(default),
    }
}

//-----------------------------------------------------------------------------

// Ranges are 1-based and inclusive, and may be shorter than `query_len` near the end of a chromosome.
fn generate_queries(store: &SequenceStore, config: &Config) -> Vec<(Chromosome, i32, i32)> {
    println!("Generating {} chromosome queries of length {}", config.queries, config.query_len);
    let chromosomes: Vec<(Chromosome, usize)> = store.chromosomes().iter()
        .map(|chr| (chr.clone(), store.chromosome_size(chr).unwrap_or(0)))
        .filter(|(_, len)| *len > 0)
        .collect();
    let mut queries: Vec<(Chromosome, i32, i32)> = Vec::with_capacity(config.queries);
    let mut rng = rand::thread_rng();

    while queries.len() < config.queries {
        let (chromosome, len) = &chromosomes[rng.gen_range(0..chromosomes.len())];
        let start = rng.gen_range(1..=*len);
        let last = (start + config.query_len - 1).min(*len);
        queries.push((chromosome.clone(), start as i32, last as i32));
    }

    println!();
    queries
}

fn local_queries(store: &SequenceStore, queries: &[(Chromosome, i32, i32)]) {
    println!("Running {} chromosome queries", queries.len());
    let now = Instant::now();
    let mut total_len = 0;
    for (chromosome, start, last) in queries {
        let sequence = store.sequence(chromosome, *start, *last).unwrap();
        total_len += sequence.len();
    }
    internal::report_results(queries.len(), total_len, now.elapsed());
}

// Ranges are 0-based and inclusive over the concatenated genome.
fn generate_global_queries(store: &SequenceStore, config: &Config) -> Vec<(u64, u64)> {
    println!("Generating {} genome queries of length {}", config.queries, config.query_len);
    let genome_size = store.genome_size();
    let mut rng = rand::thread_rng();
    let queries: Vec<(u64, u64)> = (0..config.queries).map(|_| {
        let start = rng.gen_range(0..genome_size);
        let last = (start + config.query_len as u64 - 1).min(genome_size - 1);
        (start, last)
    }).collect();
    println!();
    queries
}

fn global_queries(store: &SequenceStore, queries: &[(u64, u64)]) {
    println!("Running {} genome queries", queries.len());
    let now = Instant::now();
    let mut total_len = 0;
    for (start, last) in queries {
        let sequence = store.global_sequence(*start, *last).unwrap();
        total_len += sequence.len();
    }
    internal::report_results(queries.len(), total_len, now.elapsed());
}

//-----------------------------------------------------------------------------
