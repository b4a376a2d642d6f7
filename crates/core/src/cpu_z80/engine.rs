//! [`CpuEngine`] implementation around [`CpuZ80`].

use super::{CpuZ80, MemoryZ80};
use crate::engine::{ClockSignal, ClockSynchronizer, CpuEngine, PortHooks, StopReason};
use crate::logging::{log, LogCategory, LogLevel};

const MEMORY_SIZE: usize = 0x10000;

/// Flat 64 KiB memory plus a 256-byte port space with optional hooks
pub struct EngineBus {
    ram: Vec<u8>,
    ports: [u8; 256],
    hooks: Option<Box<dyn PortHooks>>,
}

impl EngineBus {
    pub fn new() -> Self {
        Self {
            ram: vec![0; MEMORY_SIZE],
            ports: [0; 256],
            hooks: None,
        }
    }

    /// Current value of the default port space, ignoring hooks
    pub fn port(&self, port: u8) -> u8 {
        self.ports[port as usize]
    }
}

impl Default for EngineBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryZ80 for EngineBus {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }

    fn io_read(&mut self, port: u8) -> u8 {
        if let Some(hooks) = self.hooks.as_mut() {
            if let Some(val) = hooks.before_port_read(port) {
                return val;
            }
        }
        self.ports[port as usize]
    }

    fn io_write(&mut self, port: u8, val: u8) {
        self.ports[port as usize] = val;
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.after_port_write(port, val);
        }
    }
}

/// The Z80 as a benchmark engine
pub struct Z80Engine {
    cpu: CpuZ80<EngineBus>,
    auto_stop_on_ret: bool,
}

impl Z80Engine {
    pub fn new() -> Self {
        Self {
            cpu: CpuZ80::new(EngineBus::new()),
            auto_stop_on_ret: false,
        }
    }

    /// Register and memory state, for inspection after a run
    pub fn cpu(&self) -> &CpuZ80<EngineBus> {
        &self.cpu
    }
}

impl Default for Z80Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuEngine for Z80Engine {
    fn reset(&mut self) {
        self.cpu.reset();
    }

    fn read_memory(&self, addr: u16) -> u8 {
        self.cpu.memory.read(addr)
    }

    fn write_memory(&mut self, addr: u16, value: u8) {
        self.cpu.memory.write(addr, value);
    }

    fn set_port_hooks(&mut self, hooks: Box<dyn PortHooks>) {
        self.cpu.memory.hooks = Some(hooks);
    }

    fn set_auto_stop_on_ret_with_stack_empty(&mut self, enabled: bool) {
        self.auto_stop_on_ret = enabled;
    }

    fn set_interrupt_mode(&mut self, mode: u8) {
        self.cpu.im = mode;
    }

    fn set_stack_pointer(&mut self, sp: u16) {
        self.cpu.sp = sp;
    }

    fn set_program_counter(&mut self, pc: u16) {
        self.cpu.pc = pc;
    }

    fn execute(&mut self, clock: &mut dyn ClockSynchronizer) -> StopReason {
        self.cpu.stack_base = self.cpu.sp;
        log(LogCategory::Cpu, LogLevel::Info, || {
            format!(
                "Z80: execute from PC={:04X} SP={:04X} IM={}",
                self.cpu.pc, self.cpu.sp, self.cpu.im
            )
        });

        clock.start();
        let reason = loop {
            let pc = self.cpu.pc;
            let cycles = self.cpu.step();
            log(LogCategory::Cpu, LogLevel::Trace, || {
                format!("Z80: PC={:04X} took {} cycles", pc, cycles)
            });

            if clock.tick(cycles) == ClockSignal::StopRequested {
                break StopReason::StopInvoked;
            }
            if self.auto_stop_on_ret && self.cpu.returned_from() == Some(self.cpu.stack_base) {
                break StopReason::RetWithStackEmpty;
            }
        };
        clock.stop();

        log(LogCategory::Cpu, LogLevel::Info, || {
            format!(
                "Z80: stopped ({:?}) at PC={:04X} after {} cycles",
                reason, self.cpu.pc, self.cpu.cycles
            )
        });
        reason
    }
}
