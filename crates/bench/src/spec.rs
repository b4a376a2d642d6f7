//! Benchmark description: memory images, registers and expected results

use crate::descriptor::FileDescriptor;
use crate::error::BenchError;
use z80bench_core::logging::{log, LogCategory, LogLevel};

/// Size of the flat Z80 address space
pub const ADDRESS_SPACE: usize = 0x10000;

pub const DEFAULT_EXECUTION_ADDRESS: u16 = 0x0000;
pub const DEFAULT_STACK_POINTER: u16 = 0xDFF0;
pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000_000;

/// Bytes placed at (or compared from) an offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlob {
    offset: u16,
    data: Vec<u8>,
}

impl MemoryBlob {
    /// Fails if the blob would run past the top of the address space
    pub fn new(offset: u16, data: Vec<u8>) -> Result<Self, BenchError> {
        if offset as usize + data.len() > ADDRESS_SPACE {
            return Err(BenchError::BlobOutOfRange {
                offset,
                len: data.len(),
            });
        }
        Ok(Self { offset, data })
    }

    /// Read the descriptor's file
    pub fn load(descriptor: &FileDescriptor) -> Result<Self, BenchError> {
        let data = std::fs::read(&descriptor.filename).map_err(|source| BenchError::Io {
            path: descriptor.filename.clone(),
            source,
        })?;
        log(LogCategory::Runner, LogLevel::Debug, || {
            format!(
                "Loaded {} bytes from {} for offset {:04X}",
                data.len(),
                descriptor.filename.display(),
                descriptor.offset
            )
        });
        Self::new(descriptor.offset, data)
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One benchmark run, fixed once built
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    execution_address: u16,
    stack_pointer: u16,
    max_cycles: u64,
    /// Loaded in order; later blobs overwrite earlier ones where they overlap
    memory: Vec<MemoryBlob>,
    ram_comparisons: Vec<MemoryBlob>,
    vram_comparisons: Vec<MemoryBlob>,
}

impl BenchmarkSpec {
    /// A spec with default registers and cycle ceiling; `memory` must not be empty
    pub fn new(memory: Vec<MemoryBlob>) -> Result<Self, BenchError> {
        if memory.is_empty() {
            return Err(BenchError::MissingProgram);
        }
        Ok(Self {
            execution_address: DEFAULT_EXECUTION_ADDRESS,
            stack_pointer: DEFAULT_STACK_POINTER,
            max_cycles: DEFAULT_MAX_CYCLES,
            memory,
            ram_comparisons: Vec::new(),
            vram_comparisons: Vec::new(),
        })
    }

    /// Load every blob list from files
    pub fn from_descriptors(
        memory: &[FileDescriptor],
        ram_comparisons: &[FileDescriptor],
        vram_comparisons: &[FileDescriptor],
    ) -> Result<Self, BenchError> {
        let load_all = |descriptors: &[FileDescriptor]| -> Result<Vec<MemoryBlob>, BenchError> {
            descriptors.iter().map(MemoryBlob::load).collect()
        };

        let mut spec = Self::new(load_all(memory)?)?;
        spec.ram_comparisons = load_all(ram_comparisons)?;
        spec.vram_comparisons = load_all(vram_comparisons)?;
        Ok(spec)
    }

    pub fn with_execution_address(mut self, address: u16) -> Self {
        self.execution_address = address;
        self
    }

    pub fn with_stack_pointer(mut self, sp: u16) -> Self {
        self.stack_pointer = sp;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_ram_comparison(mut self, blob: MemoryBlob) -> Self {
        self.ram_comparisons.push(blob);
        self
    }

    pub fn with_vram_comparison(mut self, blob: MemoryBlob) -> Self {
        self.vram_comparisons.push(blob);
        self
    }

    pub fn execution_address(&self) -> u16 {
        self.execution_address
    }

    pub fn stack_pointer(&self) -> u16 {
        self.stack_pointer
    }

    pub fn max_cycles(&self) -> u64 {
        self.max_cycles
    }

    pub fn memory(&self) -> &[MemoryBlob] {
        &self.memory
    }

    pub fn ram_comparisons(&self) -> &[MemoryBlob] {
        &self.ram_comparisons
    }

    pub fn vram_comparisons(&self) -> &[MemoryBlob] {
        &self.vram_comparisons
    }
}
