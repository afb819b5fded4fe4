use genostore::gvcf::GvcfReader;
use genostore::internal;
use genostore::sequence::{FastaOptions, SequenceStore};
use genostore::variant_store::{CallThresholds, Comparison, Mode, VariantAwareSequenceStore};

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;
use std::{env, io, process};

use getopts::Options;
use log::info;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start = Instant::now();
    let config = Config::new()?;
    internal::init_logging(config.verbose);
    rayon::ThreadPoolBuilder::new().num_threads(config.threads).build_global().map_err(|e| e.to_string())?;

    info!("Loading reference {}", config.fasta);
    let reference = SequenceStore::from_fasta(&config.fasta, &FastaOptions::default()).map_err(|x| x.to_string())?;
    info!("Loading variant calls {}", config.gvcf);
    let track = GvcfReader::new().read_file(&config.gvcf).map_err(|x| x.to_string())?;

    let mut store = VariantAwareSequenceStore::new(reference, Arc::new(track))
        .with_thresholds(config.thresholds).map_err(|x| x.to_string())?;
    for rule in config.rules.iter() {
        store = store.filter_and_mask(&rule.annotation, rule.comparison, rule.threshold, rule.mode).map_err(|x| x.to_string())?;
        info!(
            "Applied {:?} rule {}: {} records filtered, {} masked",
            rule.mode, rule.text, store.filter_bits().count_ones(), store.mask_bits().count_ones()
        );
    }

    write_fasta(&store, &config).map_err(|x| x.to_string())?;

    info!("Exported the sample in {:.3} seconds", start.elapsed().as_secs_f64());
    if config.verbose {
        internal::report_memory_usage();
    }
    Ok(())
}

//-----------------------------------------------------------------------------

struct Rule {
    text: String,
    annotation: String,
    comparison: Comparison,
    threshold: f64,
    mode: Mode,
}

impl Rule {
    // Parses `ANNO:OP:VALUE`.
    fn new(text: &str, mode: Mode) -> Result<Self, String> {
        let fields: Vec<&str> = text.split(':').collect();
        if fields.len() != 3 || fields[0].is_empty() {
            return Err(format!("invalid rule {} (expected ANNO:OP:VALUE)", text));
        }
        let comparison: Comparison = fields[1].parse().map_err(|x: genostore::Error| x.to_string())?;
        let threshold: f64 = fields[2].parse().map_err(|_| format!("invalid threshold {}", fields[2]))?;
        Ok(Rule {
            text: text.to_string(),
            annotation: fields[0].to_string(),
            comparison: comparison,
            threshold: threshold,
            mode: mode,
        })
    }
}

struct Config {
    fasta: String,
    gvcf: String,
    output: Option<String>,
    rules: Vec<Rule>,
    thresholds: CallThresholds,
    threads: usize,
    verbose: bool,
}

impl Config {
    const MIN_THREADS: usize = 1;
    const MAX_THREADS: usize = 64;

    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optmulti("f", "filter", "filter records failing the rule (ANNO:OP:VALUE, OP in lt, le, eq, ge, gt)", "RULE");
        opts.optflag("h", "help", "print this help");
        opts.optopt("", "high-depth", "minimum allele depth for emitting an alternate allele (default 3)", "INT");
        opts.optopt("", "low-depth", "low allele depth range (default 1-2)", "MIN-MAX");
        opts.optmulti("m", "mask", "mask records failing the rule (ANNO:OP:VALUE)", "RULE");
        opts.optopt("o", "output", "write the FASTA to a file instead of stdout", "FILE");
        opts.optopt("t", "threads", "number of threads (default 1)", "INT");
        opts.optflag("v", "verbose", "print progress information");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        if matches.opt_present("h") {
            let header = format!("Usage: {} [options] genome.fa sample.gvcf > sample.fa", program);
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let mut rules = Vec::new();
        for text in matches.opt_strs("f") {
            rules.push(Rule::new(&text, Mode::Filter).map_err(|x| format!("--filter: {}", x))?);
        }
        for text in matches.opt_strs("m") {
            rules.push(Rule::new(&text, Mode::Mask).map_err(|x| format!("--mask: {}", x))?);
        }

        let mut thresholds = CallThresholds::default();
        if let Some(s) = matches.opt_str("low-depth") {
            let bounds: Vec<&str> = s.split('-').collect();
            if bounds.len() != 2 {
                return Err(format!("--low-depth: invalid range {}", s));
            }
            thresholds.low_depth_min = bounds[0].parse::<u64>().map_err(|f| format!("--low-depth: {}", f))?;
            thresholds.low_depth_max = bounds[1].parse::<u64>().map_err(|f| format!("--low-depth: {}", f))?;
        }
        if let Some(s) = matches.opt_str("high-depth") {
            thresholds.high_depth_min = s.parse::<u64>().map_err(|f| format!("--high-depth: {}", f))?;
        }

        let mut threads = Self::MIN_THREADS;
        if let Some(s) = matches.opt_str("t") {
            match s.parse::<usize>() {
                Ok(n) => {
                    if !(Self::MIN_THREADS..=Self::MAX_THREADS).contains(&n) {
                        return Err(format!("--threads: number of threads must be between {} and {}", Self::MIN_THREADS, Self::MAX_THREADS));
                    }
                    threads = n;
                },
                Err(f) => {
                    return Err(format!("--threads: {}", f));
                },
            }
        }

        if matches.free.len() != 2 {
            let header = format!("Usage: {} [options] genome.fa sample.gvcf > sample.fa", program);
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }

        Ok(Config {
            fasta: matches.free[0].clone(),
            gvcf: matches.free[1].clone(),
            output: matches.opt_str("o"),
            rules: rules,
            thresholds: thresholds,
            threads: threads,
            verbose: matches.opt_present("v"),
        })
    }
}

//-----------------------------------------------------------------------------

fn write_fasta(store: &VariantAwareSequenceStore, config: &Config) -> genostore::Result<()> {
    if let Some(filename) = config.output.as_ref() {
        let mut options = OpenOptions::new();
        let file = options.create(true).write(true).truncate(true).open(filename)?;
        write_fasta_impl(store, file)
    } else {
        write_fasta_impl(store, io::stdout())
    }
}

fn write_fasta_impl<T: Write>(store: &VariantAwareSequenceStore, output: T) -> genostore::Result<()> {
    let mut buffer = BufWriter::new(output);
    store.write_fasta(&mut buffer)?;
    buffer.flush()?;
    Ok(())
}

//-----------------------------------------------------------------------------
