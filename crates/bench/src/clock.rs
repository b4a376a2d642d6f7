//! Cycle counting with a runaway ceiling

use z80bench_core::engine::{ClockSignal, ClockSynchronizer};
use z80bench_core::logging::{log, LogCategory, LogLevel};

/// Counts cycles reported by the engine and requests a stop once the total
/// passes `max_cycles`.
///
/// The engine finishes the instruction in flight before stopping, so the
/// final count may exceed the ceiling by one instruction's worth of cycles.
#[derive(Debug, Clone)]
pub struct CycleLimiter {
    cycles: u64,
    max_cycles: u64,
    stop_requested: bool,
}

impl CycleLimiter {
    pub fn new(max_cycles: u64) -> Self {
        Self {
            cycles: 0,
            max_cycles,
            stop_requested: false,
        }
    }

    /// Cycles counted so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn max_cycles(&self) -> u64 {
        self.max_cycles
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

impl ClockSynchronizer for CycleLimiter {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn tick(&mut self, period_cycles: u32) -> ClockSignal {
        self.cycles += period_cycles as u64;
        if self.cycles > self.max_cycles {
            if !self.stop_requested {
                log(LogCategory::Clock, LogLevel::Warn, || {
                    format!(
                        "Cycle limit {} exceeded at {} cycles, stopping",
                        self.max_cycles, self.cycles
                    )
                });
            }
            self.stop_requested = true;
            ClockSignal::StopRequested
        } else {
            ClockSignal::Continue
        }
    }
}
