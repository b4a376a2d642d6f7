//! CPU engine contract used by the benchmark harness.
//!
//! The harness never looks inside instruction semantics. It talks to an engine
//! through this narrow surface: flat memory access, port interception, a few
//! registers, and a clock callback that receives the cycles spent after every
//! instruction. [`crate::cpu_z80::Z80Engine`] is the real implementation; tests
//! drive the harness with scripted engines.

/// Port interception installed on an engine.
///
/// Reads are offered to the hooks *before* the engine's default port space is
/// touched; returning `Some` supplies the value and suppresses the default
/// access. Writes land in the default port space first and are then reported.
pub trait PortHooks {
    /// Intercept a port read. `None` falls through to the engine's port space.
    fn before_port_read(&mut self, port: u8) -> Option<u8>;

    /// Observe a completed port write.
    fn after_port_write(&mut self, port: u8, value: u8);
}

/// What a clock wants the engine to do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    Continue,
    /// Finish the current instruction and stop with [`StopReason::StopInvoked`].
    StopRequested,
}

/// Clock synchronization callback driven by the engine.
pub trait ClockSynchronizer {
    /// Called once before the first instruction executes
    fn start(&mut self);

    /// Called once after execution ends, whatever the reason
    fn stop(&mut self);

    /// Report cycles spent by the quantum that just finished
    fn tick(&mut self, period_cycles: u32) -> ClockSignal;
}

/// Why [`CpuEngine::execute`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A return instruction popped the stack base: the program finished.
    RetWithStackEmpty,
    /// The clock synchronizer asked the engine to stop.
    StopInvoked,
}

/// An 8-bit CPU engine with a flat 16-bit address space.
pub trait CpuEngine {
    /// Reset registers to power-on state. Memory is left untouched.
    fn reset(&mut self);

    /// Copy `data` into memory starting at `offset`, wrapping at 64 KiB.
    fn load(&mut self, offset: u16, data: &[u8]) {
        let mut addr = offset;
        for &byte in data {
            self.write_memory(addr, byte);
            addr = addr.wrapping_add(1);
        }
    }

    fn read_memory(&self, addr: u16) -> u8;

    fn write_memory(&mut self, addr: u16, value: u8);

    /// Install port hooks, replacing any previous ones
    fn set_port_hooks(&mut self, hooks: Box<dyn PortHooks>);

    /// Stop when a return instruction executes with an empty stack
    fn set_auto_stop_on_ret_with_stack_empty(&mut self, enabled: bool);

    fn set_interrupt_mode(&mut self, mode: u8);

    fn set_stack_pointer(&mut self, sp: u16);

    fn set_program_counter(&mut self, pc: u16);

    /// Run until a stop condition is met.
    fn execute(&mut self, clock: &mut dyn ClockSynchronizer) -> StopReason;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatEngine {
        ram: Vec<u8>,
    }

    impl CpuEngine for FlatEngine {
        fn reset(&mut self) {}

        fn read_memory(&self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }

        fn write_memory(&mut self, addr: u16, value: u8) {
            self.ram[addr as usize] = value;
        }

        fn set_port_hooks(&mut self, _hooks: Box<dyn PortHooks>) {}

        fn set_auto_stop_on_ret_with_stack_empty(&mut self, _enabled: bool) {}

        fn set_interrupt_mode(&mut self, _mode: u8) {}

        fn set_stack_pointer(&mut self, _sp: u16) {}

        fn set_program_counter(&mut self, _pc: u16) {}

        fn execute(&mut self, _clock: &mut dyn ClockSynchronizer) -> StopReason {
            StopReason::RetWithStackEmpty
        }
    }

    #[test]
    fn test_default_load_wraps_at_top_of_memory() {
        let mut engine = FlatEngine {
            ram: vec![0; 0x10000],
        };
        engine.load(0xFFFE, &[1, 2, 3]);
        assert_eq!(engine.read_memory(0xFFFE), 1);
        assert_eq!(engine.read_memory(0xFFFF), 2);
        assert_eq!(engine.read_memory(0x0000), 3);
    }

    #[test]
    fn test_later_load_overwrites_earlier() {
        let mut engine = FlatEngine {
            ram: vec![0; 0x10000],
        };
        engine.load(0x100, &[0xAA, 0xAA, 0xAA]);
        engine.load(0x101, &[0x55]);
        assert_eq!(engine.read_memory(0x100), 0xAA);
        assert_eq!(engine.read_memory(0x101), 0x55);
        assert_eq!(engine.read_memory(0x102), 0xAA);
    }
}
