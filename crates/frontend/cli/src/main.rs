use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};
use std::io::{self, Write};
use std::path::PathBuf;
use z80bench::{
    parse_hex_u16, run_benchmark, write_report, BenchmarkSpec, FileDescriptor, DEFAULT_MAX_CYCLES,
};
use z80bench_core::logging::{LogCategory, LogConfig, LogLevel};

/// Exit code for parse errors, runaway programs and any other failure
const FAILURE_EXIT_CODE: i32 = -1;

#[derive(Parser, Debug)]
#[command(
    name = "z80bench",
    version,
    about = "Run Z80 code against a Master System VDP, count cycles and check memory",
    override_usage = "z80bench <filename@offset> [additional files] [options]"
)]
struct Args {
    /// Program and data to load, later files overwriting earlier ones
    #[arg(required = true, value_name = "filename[@offset]", value_parser = parse_descriptor)]
    files: Vec<FileDescriptor>,

    /// Execution start address (hex)
    #[arg(long, value_name = "offset", value_parser = parse_hex_u16, default_value = "0")]
    execute: u16,

    /// Initial stack pointer (hex)
    #[arg(long, value_name = "offset", value_parser = parse_hex_u16, default_value = "dff0")]
    stack_pointer: u16,

    /// Cycle ceiling before the run is treated as runaway
    #[arg(long, value_name = "count", default_value_t = DEFAULT_MAX_CYCLES)]
    max_cycles: u64,

    /// Expected VRAM contents
    #[arg(long = "vram-compare", value_name = "filename[@offset]", value_parser = parse_descriptor)]
    vram_compare: Vec<FileDescriptor>,

    /// Expected RAM contents
    #[arg(long = "ram-compare", value_name = "filename[@offset]", value_parser = parse_descriptor)]
    ram_compare: Vec<FileDescriptor>,

    /// Print the result as JSON instead of the text report
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Harness log level: off, error, warn, info, debug, trace
    #[arg(long, value_name = "level", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Level for one harness component, e.g. `vdp=trace` (repeatable)
    #[arg(long = "log-category", value_name = "category=level", value_parser = parse_category_level)]
    log_category: Vec<(LogCategory, LogLevel)>,

    /// Messages per second allowed for each log category
    #[arg(long, value_name = "count")]
    log_rate_limit: Option<usize>,

    /// Write harness logs to this file instead of stderr
    #[arg(long, value_name = "path")]
    log_file: Option<PathBuf>,
}

fn parse_descriptor(s: &str) -> Result<FileDescriptor, z80bench::BenchError> {
    s.parse()
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::from_str(s).ok_or_else(|| format!("unknown log level \"{}\"", s))
}

fn parse_category_level(s: &str) -> Result<(LogCategory, LogLevel), String> {
    let (category, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected category=level, got \"{}\"", s))?;
    let category = LogCategory::from_str(category)
        .ok_or_else(|| format!("unknown log category \"{}\"", category))?;
    Ok((category, parse_log_level(level)?))
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    if let Some(level) = args.log_level {
        config.set_global_level(level);
    }
    for &(category, level) in &args.log_category {
        config.set_level(category, level);
    }
    if let Some(limit) = args.log_rate_limit {
        config.set_rate_limit(limit);
    }
    if let Some(path) = args.log_file.as_ref() {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

/// Run the benchmark and report; returns the total mismatch count
fn run(args: &Args) -> Result<usize> {
    configure_logging(args)?;

    let spec = BenchmarkSpec::from_descriptors(&args.files, &args.ram_compare, &args.vram_compare)
        .context("loading benchmark files")?
        .with_execution_address(args.execute)
        .with_stack_pointer(args.stack_pointer)
        .with_max_cycles(args.max_cycles);
    info!(
        "{} file(s) loaded, executing at {:04X} with SP={:04X}",
        spec.memory().len(),
        spec.execution_address(),
        spec.stack_pointer()
    );

    let result = run_benchmark(&spec)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &result)?;
        writeln!(out)?;
    } else {
        write_report(&mut out, &spec, &result)?;
    }
    Ok(result.total_mismatches())
}

fn exit_code(outcome: &Result<usize>) -> i32 {
    match outcome {
        Ok(mismatches) => i32::try_from(*mismatches).unwrap_or(i32::MAX),
        Err(_) => FAILURE_EXIT_CODE,
    }
}

fn main() {
    env_logger::init();

    let code = match Args::try_parse() {
        Ok(args) => {
            let outcome = run(&args);
            if let Err(err) = &outcome {
                error!("{:#}", err);
                eprintln!("Error: {:#}", err);
            }
            exit_code(&outcome)
        }
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => FAILURE_EXIT_CODE,
            }
        }
    };
    // process::exit skips destructors; drain the log writer first
    LogConfig::global().clear_log_file();
    std::process::exit(code);
}
