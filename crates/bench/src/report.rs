//! Human-readable benchmark report

use crate::compare::Mismatch;
use crate::error::Region;
use crate::runner::BenchmarkResult;
use crate::spec::BenchmarkSpec;
use std::io::{self, Write};

/// Write the comparison sections (VRAM first, then RAM) and the summary line.
///
/// A region is only reported when the benchmark has comparisons for it.
pub fn write_report<W: Write>(
    out: &mut W,
    spec: &BenchmarkSpec,
    result: &BenchmarkResult,
) -> io::Result<()> {
    if !spec.vram_comparisons().is_empty() {
        write_region(out, Region::Vram, &result.vram_mismatches)?;
    }
    if !spec.ram_comparisons().is_empty() {
        write_region(out, Region::Ram, &result.ram_mismatches)?;
    }
    writeln!(out, "Executed {} cycles in {:?}", result.cycles, result.elapsed)
}

fn write_region<W: Write>(out: &mut W, region: Region, mismatches: &[Mismatch]) -> io::Result<()> {
    if mismatches.is_empty() {
        return writeln!(out, "{} comparison: pass", region);
    }
    writeln!(out, "{} comparison: fail", region)?;
    writeln!(out, "Address: Expected Actual")?;
    for mismatch in mismatches {
        writeln!(out, "{}", mismatch)?;
    }
    Ok(())
}
