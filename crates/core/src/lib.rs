//! Core CPU engine primitives for the Z80 benchmark harness.

pub mod cpu_z80;
pub mod engine;
pub mod logging;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_z80::{CpuZ80, MemoryZ80};

    struct Nops;

    impl MemoryZ80 for Nops {
        fn read(&self, _addr: u16) -> u8 {
            0x00
        }

        fn write(&mut self, _addr: u16, _val: u8) {}
    }

    fn run_steps<C: Cpu>(cpu: &mut C, steps: usize) -> u64 {
        cpu.reset();
        (0..steps).map(|_| cpu.step() as u64).sum()
    }

    #[test]
    fn z80_through_cpu_trait() {
        let mut cpu = CpuZ80::new(Nops);
        assert_eq!(run_steps(&mut cpu, 3), 12);
        assert_eq!(cpu.pc, 3);
    }
}
