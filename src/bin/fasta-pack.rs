use genostore::internal;
use genostore::sequence::{FastaOptions, SequenceStore};

use simple_sds::serialize::Serialize;
use simple_sds::serialize;

use std::time::Instant;
use std::{env, process};

use getopts::Options;
use log::info;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start = Instant::now();
    let config = Config::new()?;
    internal::init_logging(config.verbose);

    info!("Reading FASTA file {}", config.input);
    let store = SequenceStore::from_fasta(&config.input, &config.options).map_err(|x| x.to_string())?;
    info!(
        "Packed {} chromosomes with {} bases in total",
        store.number_of_chromosomes(), store.genome_size()
    );
    for chromosome in store.chromosomes().iter() {
        let len = store.chromosome_size(chromosome).unwrap_or(0);
        log::debug!("{}: {} bases", chromosome, len);
    }

    info!("Writing sequence store {}", config.output);
    serialize::serialize_to(&store, &config.output).map_err(|x| x.to_string())?;
    let (size, unit) = internal::readable_size(store.size_in_bytes());
    info!("Store size: {:.3} {}", size, unit);

    info!("Finished in {:.3} seconds", start.elapsed().as_secs_f64());
    if config.verbose {
        internal::report_memory_usage();
    }
    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    input: String,
    output: String,
    options: FastaOptions,
    verbose: bool,
}

impl Config {
    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optflag("m", "mask-lowercase", "store soft-masked (lowercase) bases as N");
        opts.optflag("v", "verbose", "print per-chromosome statistics");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        let header = format!("Usage: {} [options] genome.fa genome.gst", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let mut options = FastaOptions::default();
        if matches.opt_present("m") {
            options = options.mask_lowercase();
        }

        if matches.free.len() != 2 {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }

        Ok(Config {
            input: matches.free[0].clone(),
            output: matches.free[1].clone(),
            options: options,
            verbose: matches.opt_present("v"),
        })
    }
}

//-----------------------------------------------------------------------------
