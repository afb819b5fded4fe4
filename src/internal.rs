use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use std::time::Duration;

//-----------------------------------------------------------------------------

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

pub fn readable_size(bytes: usize) -> (f64, &'static str) {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    (value, UNITS[unit])
}

// Linux reports `ru_maxrss` in kilobytes and macOS in bytes.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn peak_memory_usage() -> Result<usize, &'static str> {
    let scale = if cfg!(target_os = "linux") { 1024 } else { 1 };
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let status = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if status != 0 {
        return Err("getrusage failed");
    }
    let usage = unsafe { usage.assume_init() };
    Ok(usage.ru_maxrss as usize * scale)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn peak_memory_usage() -> Result<usize, &'static str> {
    Err("Peak memory usage is not available on this platform")
}

//-----------------------------------------------------------------------------

// Logs to stderr at `Info` or, with `verbose`, at `Debug`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    if TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto).is_err() {
        eprintln!("Logger was already initialized");
    }
}

pub fn report_results(queries: usize, total_len: usize, duration: Duration) {
    let us = (duration.as_micros() as f64) / (queries as f64);
    let ns = (duration.as_nanos() as f64) / (total_len as f64);
    eprintln!("Time:        {:.3} seconds ({:.3} us/query, {:.1} ns/base)", duration.as_secs_f64(), us, ns);
    eprintln!("Bases:       {} total ({:.1} per query)", total_len, (total_len as f64) / (queries as f64));
    eprintln!();
}

pub fn report_memory_usage() {
    match peak_memory_usage() {
        Ok(bytes) => {
            let (size, unit) = readable_size(bytes);
            eprintln!("Peak memory usage: {:.3} {}", size, unit);
        },
        Err(f) => {
            eprintln!("{}", f);
        },
    }
}

//-----------------------------------------------------------------------------
