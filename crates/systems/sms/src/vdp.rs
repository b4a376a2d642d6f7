//! Sega Master System Video Display Processor (VDP), port protocol only
//!
//! The VDP is reached through two ports: data (0xBE) and control (0xBF).
//! This model covers what a benchmark can observe through them: 16 KiB of
//! VRAM, the two-byte latched address/code write, and the read-ahead buffer.
//! Registers, CRAM, rendering and interrupts are not modeled.
//!
//! # Quirks reproduced
//! - Data port reads return a buffer filled by the *previous* access, then
//!   refill it from VRAM and advance the address.
//! - Data port writes load the read buffer with the written value.
//! - Any data access or control read resets the control-port latch.

use z80bench_core::logging::{log, LogCategory, LogLevel};

pub const VRAM_SIZE: usize = 0x4000;
const ADDRESS_MASK: u16 = 0x3FFF;

/// Status byte returned by every control port read
pub const STATUS: u8 = 0b1000_0000;

/// Code register value (bits 6-7 of the second control byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    /// Accepted but has no effect here
    RegisterWrite,
    /// Accepted but has no effect here
    PaletteWrite,
}

impl Mode {
    fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Mode::Read,
            1 => Mode::Write,
            2 => Mode::RegisterWrite,
            _ => Mode::PaletteWrite,
        }
    }
}

/// VDP port state and VRAM
pub struct Vdp {
    // Video RAM (16KB)
    vram: [u8; VRAM_SIZE],

    // 14-bit address register
    address: u16,
    mode: Mode,
    read_buffer: u8,
    latched: bool,
}

impl Vdp {
    /// Create a new VDP with cleared VRAM
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            address: 0,
            mode: Mode::Read,
            read_buffer: 0,
            latched: false,
        }
    }

    /// Read from VDP data port (0xBE)
    pub fn read_data(&mut self) -> u8 {
        let value = self.read_buffer;
        self.buffer_read();
        self.latched = false;
        log(LogCategory::Vdp, LogLevel::Trace, || {
            format!("VDP: data read {:02X}, next address {:04X}", value, self.address)
        });
        value
    }

    /// Write to VDP data port (0xBE)
    pub fn write_data(&mut self, value: u8) {
        if self.mode == Mode::Write {
            self.vram[self.address as usize] = value;
            self.address = (self.address + 1) & ADDRESS_MASK;
        } else {
            log(LogCategory::Vdp, LogLevel::Debug, || {
                format!("VDP: data write {:02X} ignored in {:?} mode", value, self.mode)
            });
        }
        self.read_buffer = value;
        self.latched = false;
    }

    /// Write to VDP control port (0xBF)
    pub fn write_control(&mut self, value: u8) {
        if !self.latched {
            // First byte - lower 8 bits of address
            self.address = (self.address & 0x3F00) | value as u16;
            self.latched = true;
        } else {
            // Second byte - upper 6 bits of address + code
            self.address = (self.address & 0x00FF) | ((value as u16 & 0x3F) << 8);
            self.latched = false;
            self.mode = Mode::from_code(value >> 6);
            log(LogCategory::Vdp, LogLevel::Debug, || {
                format!("VDP: address {:04X}, {:?} mode", self.address, self.mode)
            });

            if self.mode == Mode::Read {
                self.buffer_read();
            }
        }
    }

    /// Read from VDP control/status port (0xBF)
    pub fn read_control(&mut self) -> u8 {
        self.latched = false;
        STATUS
    }

    /// Video RAM contents
    pub fn vram(&self) -> &[u8; VRAM_SIZE] {
        &self.vram
    }

    /// Current 14-bit address register
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True between the first and second control byte
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    fn buffer_read(&mut self) {
        self.read_buffer = self.vram[self.address as usize];
        self.address = (self.address + 1) & ADDRESS_MASK;
    }
}

impl Default for Vdp {
    fn default() -> Self {
        Self::new()
    }
}
