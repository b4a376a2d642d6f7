use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use z80bench_core::cpu_z80::{CpuZ80, MemoryZ80, Z80Engine};
use z80bench_core::engine::{ClockSignal, ClockSynchronizer, CpuEngine};
use z80bench_core::Cpu;

/// Flat 64K RAM with a small arithmetic loop at 0x0000
struct BenchMemory {
    ram: Vec<u8>,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];
        ram[..LOOP_PROGRAM.len()].copy_from_slice(&LOOP_PROGRAM);
        Self { ram }
    }
}

impl MemoryZ80 for BenchMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }
}

const LOOP_PROGRAM: [u8; 16] = [
    0x3E, 0x42, // LD A,0x42
    0x06, 0x10, // LD B,0x10
    0x21, 0x00, 0xC0, // LD HL,0xC000
    0x77, // loop: LD (HL),A
    0x23, // INC HL
    0xC6, 0x01, // ADD A,1
    0xCB, 0x27, // SLA A
    0x10, 0xF8, // DJNZ loop
    0xC9, // RET
];

/// Stops once `limit` cycles have run
struct FreeRunningClock {
    cycles: u64,
    limit: u64,
}

impl ClockSynchronizer for FreeRunningClock {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn tick(&mut self, period_cycles: u32) -> ClockSignal {
        self.cycles += period_cycles as u64;
        if self.cycles > self.limit {
            ClockSignal::StopRequested
        } else {
            ClockSignal::Continue
        }
    }
}

/// Steps any `Cpu` from reset, returning the cycles consumed
fn run_steps<C: Cpu>(cpu: &mut C, count: usize) -> u64 {
    cpu.reset();
    (0..count).map(|_| cpu.step() as u64).sum()
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_z80_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = CpuZ80::new(BenchMemory::new());
            cpu.step();
            black_box(cpu.a);
        });
    });

    group.finish();
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_z80_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = CpuZ80::new(BenchMemory::new());
                    black_box(run_steps(&mut cpu, count));
                });
            },
        );
    }

    group.finish();
}

fn bench_engine_execute(c: &mut Criterion) {
    c.bench_function("z80_engine_tight_loop", |b| {
        b.iter(|| {
            let mut engine = Z80Engine::new();
            // loop: JR loop
            engine.load(0, &[0x18, 0xFE]);
            engine.set_stack_pointer(0xDFF0);
            let mut clock = FreeRunningClock {
                cycles: 0,
                limit: 100_000,
            };
            black_box(engine.execute(&mut clock));
            black_box(clock.cycles);
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_cpu_multiple_steps,
    bench_engine_execute
);
criterion_main!(benches);
