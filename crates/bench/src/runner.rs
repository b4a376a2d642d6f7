//! Runs one benchmark on a CPU engine with the SMS VDP attached

use crate::clock::CycleLimiter;
use crate::compare::{compare_region, Mismatch};
use crate::error::{BenchError, Region};
use crate::spec::{BenchmarkSpec, ADDRESS_SPACE};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use z80bench_core::cpu_z80::Z80Engine;
use z80bench_core::engine::{CpuEngine, StopReason};
use z80bench_core::logging::{log, LogCategory, LogLevel};
use z80bench_sms::{SmsPorts, Vdp};

/// Interrupt mode the program starts in
const INTERRUPT_MODE: u8 = 1;

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    /// Cycles counted by the limiter
    pub cycles: u64,
    /// Wall-clock time spent executing (comparisons excluded)
    pub elapsed: Duration,
    pub ram_mismatches: Vec<Mismatch>,
    pub vram_mismatches: Vec<Mismatch>,
}

impl BenchmarkResult {
    pub fn total_mismatches(&self) -> usize {
        self.ram_mismatches.len() + self.vram_mismatches.len()
    }
}

/// Run `spec` on a fresh Z80 engine
pub fn run_benchmark(spec: &BenchmarkSpec) -> Result<BenchmarkResult, BenchError> {
    let mut engine = Z80Engine::new();
    run_benchmark_on(&mut engine, spec)
}

/// Run `spec` on the given engine.
///
/// The engine is reset, loaded and wired to a new VDP. A run stopped by the
/// cycle ceiling fails with [`BenchError::RunawayExecution`].
pub fn run_benchmark_on<E: CpuEngine>(
    engine: &mut E,
    spec: &BenchmarkSpec,
) -> Result<BenchmarkResult, BenchError> {
    let vdp = Rc::new(RefCell::new(Vdp::new()));

    engine.reset();
    for blob in spec.memory() {
        log(LogCategory::Runner, LogLevel::Debug, || {
            format!("Loading {} bytes at {:04X}", blob.data().len(), blob.offset())
        });
        engine.load(blob.offset(), blob.data());
    }

    engine.set_port_hooks(Box::new(SmsPorts::new(Rc::clone(&vdp))));
    engine.set_auto_stop_on_ret_with_stack_empty(true);
    engine.set_interrupt_mode(INTERRUPT_MODE);
    engine.set_stack_pointer(spec.stack_pointer());
    engine.set_program_counter(spec.execution_address());

    let mut limiter = CycleLimiter::new(spec.max_cycles());
    log(LogCategory::Runner, LogLevel::Info, || {
        format!(
            "Executing from {:04X} with SP={:04X}, limit {} cycles",
            spec.execution_address(),
            spec.stack_pointer(),
            spec.max_cycles()
        )
    });

    let start = Instant::now();
    let reason = engine.execute(&mut limiter);
    let elapsed = start.elapsed();

    if reason == StopReason::StopInvoked {
        return Err(BenchError::RunawayExecution {
            cycles: limiter.cycles(),
        });
    }

    let vram_mismatches =
        compare_region(Region::Vram, &vdp.borrow().vram()[..], spec.vram_comparisons())?;

    let ram_mismatches = if spec.ram_comparisons().is_empty() {
        Vec::new()
    } else {
        let ram: Vec<u8> = (0..ADDRESS_SPACE)
            .map(|addr| engine.read_memory(addr as u16))
            .collect();
        compare_region(Region::Ram, &ram, spec.ram_comparisons())?
    };

    let result = BenchmarkResult {
        cycles: limiter.cycles(),
        elapsed,
        ram_mismatches,
        vram_mismatches,
    };
    log(LogCategory::Runner, LogLevel::Info, || {
        format!(
            "Finished: {} cycles in {:?}, {} mismatch(es)",
            result.cycles,
            result.elapsed,
            result.total_mismatches()
        )
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::MemoryBlob;

    fn spec_for(program: &[u8]) -> BenchmarkSpec {
        BenchmarkSpec::new(vec![MemoryBlob::new(0, program.to_vec()).unwrap()]).unwrap()
    }

    #[test]
    fn test_sample_program_cycle_count() {
        // ld a,7; add a,4; inc a; ret
        let spec = spec_for(&[0x3E, 0x07, 0xC6, 0x04, 0x3C, 0xC9]).with_max_cycles(28);
        let result = run_benchmark(&spec).unwrap();
        assert_eq!(result.cycles, 28);
        assert_eq!(result.total_mismatches(), 0);
    }

    #[test]
    fn test_sample_program_runaway_one_cycle_short() {
        let spec = spec_for(&[0x3E, 0x07, 0xC6, 0x04, 0x3C, 0xC9]).with_max_cycles(27);
        let err = run_benchmark(&spec).unwrap_err();
        assert!(matches!(err, BenchError::RunawayExecution { cycles: 28 }));
    }

    #[test]
    fn test_ram_comparison_reports_mismatches() {
        // ld a,0x42; ld (0xC000),a; ret
        let spec = spec_for(&[0x3E, 0x42, 0x32, 0x00, 0xC0, 0xC9])
            .with_ram_comparison(MemoryBlob::new(0xC000, vec![0x42, 0x01]).unwrap());
        let result = run_benchmark(&spec).unwrap();
        assert_eq!(
            result.ram_mismatches,
            vec![Mismatch {
                offset: 0xC001,
                expected: 0x01,
                actual: 0x00
            }]
        );
        assert!(result.vram_mismatches.is_empty());
    }

    #[test]
    fn test_total_mismatches_counts_both_regions() {
        let m = Mismatch {
            offset: 0,
            expected: 1,
            actual: 0,
        };
        let result = BenchmarkResult {
            cycles: 0,
            elapsed: Duration::ZERO,
            ram_mismatches: vec![m, m],
            vram_mismatches: vec![m],
        };
        assert_eq!(result.total_mismatches(), 3);
    }
}
