//! Harness wiring checked against a scripted engine
//!
//! The engine below does no instruction decoding: it replays a fixed list of
//! clock ticks and port accesses, which isolates the runner's setup order,
//! port routing and stop handling from CPU behaviour.

use z80bench::{run_benchmark_on, BenchError, BenchmarkSpec, MemoryBlob};
use z80bench_core::engine::{ClockSignal, ClockSynchronizer, CpuEngine, PortHooks, StopReason};

#[derive(Debug, Clone, Copy)]
enum Step {
    Tick(u32),
    Out(u8, u8),
    In(u8),
    Ret,
}

struct ScriptedEngine {
    ram: Vec<u8>,
    ports: [u8; 256],
    hooks: Option<Box<dyn PortHooks>>,
    script: Vec<Step>,
    events: Vec<&'static str>,
    port_reads: Vec<u8>,
    sp: u16,
    pc: u16,
    im: u8,
    auto_stop: bool,
}

impl ScriptedEngine {
    fn new(script: Vec<Step>) -> Self {
        Self {
            ram: vec![0xEE; 0x10000],
            ports: [0xFF; 256],
            hooks: None,
            script,
            events: Vec::new(),
            port_reads: Vec::new(),
            sp: 0,
            pc: 0,
            im: 0,
            auto_stop: false,
        }
    }
}

impl CpuEngine for ScriptedEngine {
    fn reset(&mut self) {
        self.events.push("reset");
        self.sp = 0xFFFF;
        self.pc = 0;
        self.im = 0;
    }

    fn read_memory(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write_memory(&mut self, addr: u16, value: u8) {
        if self.events.last() != Some(&"load") {
            self.events.push("load");
        }
        self.ram[addr as usize] = value;
    }

    fn set_port_hooks(&mut self, hooks: Box<dyn PortHooks>) {
        self.events.push("hooks");
        self.hooks = Some(hooks);
    }

    fn set_auto_stop_on_ret_with_stack_empty(&mut self, enabled: bool) {
        self.auto_stop = enabled;
    }

    fn set_interrupt_mode(&mut self, mode: u8) {
        self.im = mode;
    }

    fn set_stack_pointer(&mut self, sp: u16) {
        self.sp = sp;
    }

    fn set_program_counter(&mut self, pc: u16) {
        self.pc = pc;
    }

    fn execute(&mut self, clock: &mut dyn ClockSynchronizer) -> StopReason {
        self.events.push("execute");
        clock.start();
        let mut reason = StopReason::RetWithStackEmpty;
        for step in self.script.clone() {
            match step {
                Step::Tick(cycles) => {
                    if clock.tick(cycles) == ClockSignal::StopRequested {
                        reason = StopReason::StopInvoked;
                        break;
                    }
                }
                Step::Out(port, value) => {
                    self.ports[port as usize] = value;
                    if let Some(hooks) = self.hooks.as_mut() {
                        hooks.after_port_write(port, value);
                    }
                }
                Step::In(port) => {
                    let hooked = self.hooks.as_mut().and_then(|h| h.before_port_read(port));
                    self.port_reads.push(hooked.unwrap_or(self.ports[port as usize]));
                }
                Step::Ret if self.auto_stop => break,
                Step::Ret => {}
            }
        }
        clock.stop();
        reason
    }
}

fn spec() -> BenchmarkSpec {
    BenchmarkSpec::new(vec![MemoryBlob::new(0, vec![0x00]).unwrap()]).unwrap()
}

#[test]
fn test_engine_is_configured_before_execution() {
    let mut engine = ScriptedEngine::new(vec![Step::Tick(4), Step::Ret]);
    let spec = spec()
        .with_execution_address(0x4000)
        .with_stack_pointer(0xC123);
    let result = run_benchmark_on(&mut engine, &spec).unwrap();

    assert_eq!(engine.events, vec!["reset", "load", "hooks", "execute"]);
    assert_eq!(engine.pc, 0x4000);
    assert_eq!(engine.sp, 0xC123);
    assert_eq!(engine.im, 1);
    assert!(engine.auto_stop);
    assert_eq!(result.cycles, 4);
}

#[test]
fn test_overlapping_blobs_last_one_wins() {
    let mut engine = ScriptedEngine::new(vec![Step::Ret]);
    let spec = BenchmarkSpec::new(vec![
        MemoryBlob::new(0x100, vec![0x01, 0x01, 0x01]).unwrap(),
        MemoryBlob::new(0x101, vec![0x02]).unwrap(),
    ])
    .unwrap()
    .with_ram_comparison(MemoryBlob::new(0x100, vec![0x01, 0x02, 0x01]).unwrap());
    let result = run_benchmark_on(&mut engine, &spec).unwrap();
    assert!(result.ram_mismatches.is_empty());
    assert_eq!(engine.read_memory(0x0FF), 0xEE);
}

#[test]
fn test_video_ports_reach_the_vdp() {
    let mut engine = ScriptedEngine::new(vec![
        Step::Out(0xBF, 0x10),
        Step::Out(0xBF, 0x40), // write mode, address 0x0010
        Step::Out(0xBE, 0xAA),
        Step::Out(0xBE, 0xBB),
        Step::Out(0xBF, 0x10),
        Step::Out(0xBF, 0x00), // read mode, address 0x0010
        Step::In(0xBE),
        Step::In(0xBF),
        Step::Ret,
    ]);
    let spec = spec().with_vram_comparison(MemoryBlob::new(0x10, vec![0xAA, 0xBB]).unwrap());
    let result = run_benchmark_on(&mut engine, &spec).unwrap();

    assert!(result.vram_mismatches.is_empty());
    assert_eq!(engine.port_reads, vec![0xAA, 0x80]);
}

#[test]
fn test_other_ports_use_engine_default() {
    let mut engine = ScriptedEngine::new(vec![
        Step::Out(0x3E, 0x12),
        Step::In(0x3E),
        Step::In(0xDC),
        Step::Ret,
    ]);
    run_benchmark_on(&mut engine, &spec()).unwrap();
    assert_eq!(engine.port_reads, vec![0x12, 0xFF]);
}

#[test]
fn test_stop_request_is_runaway() {
    let mut engine = ScriptedEngine::new(vec![Step::Tick(600), Step::Tick(600), Step::Ret]);
    let err = run_benchmark_on(&mut engine, &spec().with_max_cycles(1_000)).unwrap_err();
    assert!(matches!(err, BenchError::RunawayExecution { cycles: 1_200 }));
}

#[test]
fn test_reaching_ceiling_exactly_is_not_runaway() {
    let mut engine = ScriptedEngine::new(vec![Step::Tick(600), Step::Tick(400), Step::Ret]);
    let result = run_benchmark_on(&mut engine, &spec().with_max_cycles(1_000)).unwrap();
    assert_eq!(result.cycles, 1_000);
}

#[test]
fn test_vram_comparison_past_end_is_an_error() {
    let mut engine = ScriptedEngine::new(vec![Step::Ret]);
    let spec = spec().with_vram_comparison(MemoryBlob::new(0x3FFE, vec![0, 0, 0]).unwrap());
    let err = run_benchmark_on(&mut engine, &spec).unwrap_err();
    assert!(matches!(
        err,
        BenchError::ComparisonOutOfRange { offset: 0x4000, .. }
    ));
}
