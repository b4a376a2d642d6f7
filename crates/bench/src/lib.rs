//! Z80 benchmark harness
//!
//! Loads machine code into a Z80 engine with a Sega Master System VDP on the
//! video ports, runs it until it returns from its entry point, counts cycles
//! against a runaway ceiling, then checks RAM and VRAM against expected
//! contents.
//!
//! ```no_run
//! use z80bench::{run_benchmark, BenchmarkSpec, FileDescriptor, MemoryBlob};
//!
//! # fn main() -> Result<(), z80bench::BenchError> {
//! let program = MemoryBlob::load(&"program.bin@0".parse::<FileDescriptor>()?)?;
//! let spec = BenchmarkSpec::new(vec![program])?.with_max_cycles(10_000);
//! let result = run_benchmark(&spec)?;
//! println!("{} cycles", result.cycles);
//! # Ok(())
//! # }
//! ```

mod clock;
mod compare;
mod descriptor;
mod error;
mod report;
mod runner;
mod spec;

pub use clock::CycleLimiter;
pub use compare::{compare_region, Mismatch};
pub use descriptor::{parse_hex_u16, FileDescriptor};
pub use error::{BenchError, Region};
pub use report::write_report;
pub use runner::{run_benchmark, run_benchmark_on, BenchmarkResult};
pub use spec::{
    BenchmarkSpec, MemoryBlob, ADDRESS_SPACE, DEFAULT_EXECUTION_ADDRESS, DEFAULT_MAX_CYCLES,
    DEFAULT_STACK_POINTER,
};
