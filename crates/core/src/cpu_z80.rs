//! Zilog Z80 CPU core implementation
//!
//! The Z80 extends the 8080 with shadow registers, index registers and the
//! CB/ED/DD/FD prefixed instruction groups. This module implements the full
//! documented instruction set with documented T-state timings, plus the
//! commonly relied-on undocumented pieces (IXH/IXL/IYH/IYL access, SLL, the
//! DDCB register copy, flag bits 3 and 5).
//!
//! Interrupts are never delivered: the interrupt mode and flip-flops are kept
//! as state only.

use crate::logging::{log, LogCategory, LogLevel};

mod engine;

pub use engine::{EngineBus, Z80Engine};

/// Memory interface trait for the Z80 CPU
pub trait MemoryZ80 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Read from I/O port
    fn io_read(&mut self, port: u8) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to I/O port
    fn io_write(&mut self, port: u8, val: u8) {
        let _ = (port, val);
    }
}

// Flag bit positions
const FLAG_C: u8 = 0x01; // Carry
const FLAG_N: u8 = 0x02; // Add/subtract
const FLAG_PV: u8 = 0x04; // Parity/overflow
const FLAG_X: u8 = 0x08; // Undocumented, copy of bit 3
const FLAG_H: u8 = 0x10; // Half carry
const FLAG_Y: u8 = 0x20; // Undocumented, copy of bit 5
const FLAG_Z: u8 = 0x40; // Zero
const FLAG_S: u8 = 0x80; // Sign

/// Index register selected by a DD or FD prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    IX,
    IY,
}

/// Zilog Z80 CPU state
#[derive(Debug)]
pub struct CpuZ80<M: MemoryZ80> {
    /// Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    /// Shadow registers
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,

    /// Index registers
    pub ix: u16,
    pub iy: u16,

    /// Special registers
    pub i: u8, // Interrupt vector
    pub r: u8, // Memory refresh

    /// Stack pointer
    pub sp: u16,
    /// Program counter
    pub pc: u16,

    /// Interrupt flags
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8, // Interrupt mode (0, 1, or 2)

    /// State
    pub halted: bool,
    pub cycles: u64,

    /// Value of SP at the last `LD SP,...` (or as set by the owner)
    pub stack_base: u16,

    /// SP before the pop, when the last instruction was a taken return
    returned_from: Option<u16>,

    /// Memory interface
    pub memory: M,
}

impl<M: MemoryZ80> CpuZ80<M> {
    /// Create a new Z80 CPU
    pub fn new(memory: M) -> Self {
        let mut cpu = Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_prime: 0,
            f_prime: 0,
            b_prime: 0,
            c_prime: 0,
            d_prime: 0,
            e_prime: 0,
            h_prime: 0,
            l_prime: 0,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            sp: 0,
            pc: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            cycles: 0,
            stack_base: 0,
            returned_from: None,
            memory,
        };
        cpu.reset();
        cpu
    }

    /// Reset the CPU. AF and SP come up as 0xFFFF like the real part.
    pub fn reset(&mut self) {
        self.a = 0xFF;
        self.f = 0xFF;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.e = 0;
        self.h = 0;
        self.l = 0;
        self.ix = 0xFFFF;
        self.iy = 0xFFFF;
        self.i = 0;
        self.r = 0;
        self.sp = 0xFFFF;
        self.pc = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.halted = false;
        self.cycles = 0;
        self.stack_base = self.sp;
        self.returned_from = None;
    }

    /// Execute one instruction and return the T-states it took
    pub fn step(&mut self) -> u32 {
        self.returned_from = None;
        let cycles = if self.halted {
            // HALT executes NOPs until an interrupt, which never comes here
            self.bump_r();
            4
        } else {
            let opcode = self.fetch_opcode();
            self.execute(opcode)
        };
        self.cycles += cycles as u64;
        cycles
    }

    /// SP before the pop if the last instruction was a taken RET/RETI/RETN
    pub fn returned_from(&self) -> Option<u16> {
        self.returned_from
    }

    // Helper methods
    fn bump_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    fn fetch_opcode(&mut self) -> u8 {
        let val = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.bump_r();
        val
    }

    fn read_pc(&mut self) -> u8 {
        let val = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn read_pc_u16(&mut self) -> u16 {
        let lo = self.read_pc() as u16;
        let hi = self.read_pc() as u16;
        (hi << 8) | lo
    }

    fn read_u16(&self, addr: u16) -> u16 {
        let lo = self.memory.read(addr) as u16;
        let hi = self.memory.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write_u16(&mut self, addr: u16, val: u16) {
        self.memory.write(addr, val as u8);
        self.memory.write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn push_u16(&mut self, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, val as u8);
    }

    fn pop_u16(&mut self) -> u16 {
        let lo = self.memory.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.memory.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn ret(&mut self) {
        self.returned_from = Some(self.sp);
        self.pc = self.pop_u16();
    }

    fn call(&mut self, addr: u16) {
        self.push_u16(self.pc);
        self.pc = addr;
    }

    fn jump_relative(&mut self, offset: i8) {
        self.pc = self.pc.wrapping_add(offset as i16 as u16);
    }

    // Register pair accessors
    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | (self.f as u16)
    }

    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8;
    }

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | (self.c as u16)
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | (self.e as u16)
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | (self.l as u16)
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    /// BC, DE, HL, SP by the two-bit pair field
    fn rp(&self, p: u8) -> u16 {
        match p & 0x03 {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn set_rp(&mut self, p: u8, val: u16) {
        match p & 0x03 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    /// `LD SP,...` forms; the empty-stack mark follows the new stack
    fn load_sp(&mut self, val: u16) {
        self.sp = val;
        self.stack_base = val;
    }

    /// BC, DE, HL, AF by the two-bit pair field (PUSH/POP)
    fn rp2(&self, p: u8) -> u16 {
        match p & 0x03 {
            3 => self.af(),
            p => self.rp(p),
        }
    }

    fn set_rp2(&mut self, p: u8, val: u16) {
        match p & 0x03 {
            3 => self.set_af(val),
            p => self.set_rp(p, val),
        }
    }

    /// 8-bit register by the three-bit field; 6 ((HL)) is handled by callers
    fn reg8(&self, r: u8) -> u8 {
        match r {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            7 => self.a,
            _ => unreachable!("(HL) operand is not a register"),
        }
    }

    fn set_reg8(&mut self, r: u8, val: u8) {
        match r {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            7 => self.a = val,
            _ => unreachable!("(HL) operand is not a register"),
        }
    }

    fn index(&self, idx: Index) -> u16 {
        match idx {
            Index::IX => self.ix,
            Index::IY => self.iy,
        }
    }

    fn set_index(&mut self, idx: Index, val: u16) {
        match idx {
            Index::IX => self.ix = val,
            Index::IY => self.iy = val,
        }
    }

    /// Register field under a DD/FD prefix: H and L become the index halves
    fn index_reg8(&self, idx: Index, r: u8) -> u8 {
        match r {
            4 => (self.index(idx) >> 8) as u8,
            5 => self.index(idx) as u8,
            r => self.reg8(r),
        }
    }

    fn set_index_reg8(&mut self, idx: Index, r: u8, val: u8) {
        let cur = self.index(idx);
        match r {
            4 => self.set_index(idx, (cur & 0x00FF) | ((val as u16) << 8)),
            5 => self.set_index(idx, (cur & 0xFF00) | val as u16),
            r => self.set_reg8(r, val),
        }
    }

    /// Fetch the displacement byte and form IX+d / IY+d
    fn index_addr(&mut self, idx: Index) -> u16 {
        let d = self.read_pc() as i8;
        self.index(idx).wrapping_add(d as i16 as u16)
    }

    // Flag operations
    fn get_flag(&self, flag: u8) -> bool {
        (self.f & flag) != 0
    }

    fn sz53(val: u8) -> u8 {
        let mut f = val & (FLAG_S | FLAG_Y | FLAG_X);
        if val == 0 {
            f |= FLAG_Z;
        }
        f
    }

    fn parity(val: u8) -> u8 {
        if val.count_ones() % 2 == 0 {
            FLAG_PV
        } else {
            0
        }
    }

    /// NZ, Z, NC, C, PO, PE, P, M
    fn condition(&self, cc: u8) -> bool {
        match cc & 0x07 {
            0 => !self.get_flag(FLAG_Z),
            1 => self.get_flag(FLAG_Z),
            2 => !self.get_flag(FLAG_C),
            3 => self.get_flag(FLAG_C),
            4 => !self.get_flag(FLAG_PV),
            5 => self.get_flag(FLAG_PV),
            6 => !self.get_flag(FLAG_S),
            _ => self.get_flag(FLAG_S),
        }
    }

    // Arithmetic operations
    fn add_a(&mut self, val: u8, carry: bool) {
        let c = if carry && self.get_flag(FLAG_C) { 1 } else { 0 };
        let a = self.a;
        let sum = a as u16 + val as u16 + c as u16;
        let result = sum as u8;

        let mut f = Self::sz53(result);
        if (a & 0x0F) + (val & 0x0F) + c > 0x0F {
            f |= FLAG_H;
        }
        if (a ^ val) & 0x80 == 0 && (a ^ result) & 0x80 != 0 {
            f |= FLAG_PV;
        }
        if sum > 0xFF {
            f |= FLAG_C;
        }
        self.a = result;
        self.f = f;
    }

    /// A - val (- carry); sets flags and returns the difference
    fn sub_flags(&mut self, val: u8, carry: bool) -> u8 {
        let c = if carry && self.get_flag(FLAG_C) { 1 } else { 0 };
        let a = self.a;
        let diff = a as i16 - val as i16 - c as i16;
        let result = diff as u8;

        let mut f = Self::sz53(result) | FLAG_N;
        if (a & 0x0F) < (val & 0x0F) + c {
            f |= FLAG_H;
        }
        if (a ^ val) & 0x80 != 0 && (a ^ result) & 0x80 != 0 {
            f |= FLAG_PV;
        }
        if diff < 0 {
            f |= FLAG_C;
        }
        self.f = f;
        result
    }

    fn sub_a(&mut self, val: u8, carry: bool) {
        self.a = self.sub_flags(val, carry);
    }

    fn cp_a(&mut self, val: u8) {
        self.sub_flags(val, false);
        // CP takes bits 3 and 5 from the operand, not the result
        self.f = (self.f & !(FLAG_Y | FLAG_X)) | (val & (FLAG_Y | FLAG_X));
    }

    fn and_a(&mut self, val: u8) {
        self.a &= val;
        self.f = Self::sz53(self.a) | Self::parity(self.a) | FLAG_H;
    }

    fn xor_a(&mut self, val: u8) {
        self.a ^= val;
        self.f = Self::sz53(self.a) | Self::parity(self.a);
    }

    fn or_a(&mut self, val: u8) {
        self.a |= val;
        self.f = Self::sz53(self.a) | Self::parity(self.a);
    }

    /// ADD/ADC/SUB/SBC/AND/XOR/OR/CP by the three-bit op field
    fn alu(&mut self, op: u8, val: u8) {
        match op & 0x07 {
            0 => self.add_a(val, false),
            1 => self.add_a(val, true),
            2 => self.sub_a(val, false),
            3 => self.sub_a(val, true),
            4 => self.and_a(val),
            5 => self.xor_a(val),
            6 => self.or_a(val),
            _ => self.cp_a(val),
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        let mut f = (self.f & FLAG_C) | Self::sz53(result);
        if val & 0x0F == 0x0F {
            f |= FLAG_H;
        }
        if val == 0x7F {
            f |= FLAG_PV;
        }
        self.f = f;
        result
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        let mut f = (self.f & FLAG_C) | Self::sz53(result) | FLAG_N;
        if val & 0x0F == 0 {
            f |= FLAG_H;
        }
        if val == 0x80 {
            f |= FLAG_PV;
        }
        self.f = f;
        result
    }

    /// 16-bit ADD: S, Z and P/V are preserved
    fn add16(&mut self, a: u16, b: u16) -> u16 {
        let sum = a as u32 + b as u32;
        let result = sum as u16;

        let mut f = self.f & (FLAG_S | FLAG_Z | FLAG_PV);
        f |= ((result >> 8) as u8) & (FLAG_Y | FLAG_X);
        if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
            f |= FLAG_H;
        }
        if sum > 0xFFFF {
            f |= FLAG_C;
        }
        self.f = f;
        result
    }

    fn adc_hl(&mut self, val: u16) {
        let c = if self.get_flag(FLAG_C) { 1u32 } else { 0 };
        let hl = self.hl();
        let sum = hl as u32 + val as u32 + c;
        let result = sum as u16;

        let mut f = ((result >> 8) as u8) & (FLAG_S | FLAG_Y | FLAG_X);
        if result == 0 {
            f |= FLAG_Z;
        }
        if (hl as u32 & 0x0FFF) + (val as u32 & 0x0FFF) + c > 0x0FFF {
            f |= FLAG_H;
        }
        if (hl ^ val) & 0x8000 == 0 && (hl ^ result) & 0x8000 != 0 {
            f |= FLAG_PV;
        }
        if sum > 0xFFFF {
            f |= FLAG_C;
        }
        self.f = f;
        self.set_hl(result);
    }

    fn sbc_hl(&mut self, val: u16) {
        let c = if self.get_flag(FLAG_C) { 1i32 } else { 0 };
        let hl = self.hl();
        let diff = hl as i32 - val as i32 - c;
        let result = diff as u16;

        let mut f = (((result >> 8) as u8) & (FLAG_S | FLAG_Y | FLAG_X)) | FLAG_N;
        if result == 0 {
            f |= FLAG_Z;
        }
        if ((hl & 0x0FFF) as i32) < ((val & 0x0FFF) as i32) + c {
            f |= FLAG_H;
        }
        if (hl ^ val) & 0x8000 != 0 && (hl ^ result) & 0x8000 != 0 {
            f |= FLAG_PV;
        }
        if diff < 0 {
            f |= FLAG_C;
        }
        self.f = f;
        self.set_hl(result);
    }

    fn daa(&mut self) {
        let a = self.a;
        let subtract = self.get_flag(FLAG_N);
        let mut correction = 0u8;
        let mut carry = self.get_flag(FLAG_C);
        if self.get_flag(FLAG_H) || (a & 0x0F) > 9 {
            correction |= 0x06;
        }
        if carry || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let result = if subtract {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        let half = if subtract {
            self.get_flag(FLAG_H) && (a & 0x0F) < 6
        } else {
            (a & 0x0F) > 9
        };

        let mut f = Self::sz53(result) | Self::parity(result) | (self.f & FLAG_N);
        if half {
            f |= FLAG_H;
        }
        if carry {
            f |= FLAG_C;
        }
        self.a = result;
        self.f = f;
    }

    // Accumulator rotates only touch H, N, C (and the undocumented bits)
    fn rotate_a_flags(&mut self, carry: bool) {
        let mut f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | (self.a & (FLAG_Y | FLAG_X));
        if carry {
            f |= FLAG_C;
        }
        self.f = f;
    }

    // CB-prefixed rotates and shifts
    fn shift_flags(&mut self, result: u8, carry: bool) -> u8 {
        let mut f = Self::sz53(result) | Self::parity(result);
        if carry {
            f |= FLAG_C;
        }
        self.f = f;
        result
    }

    /// RLC/RRC/RL/RR/SLA/SRA/SLL/SRL by the three-bit op field
    fn shift_op(&mut self, op: u8, val: u8) -> u8 {
        let carry_in = self.get_flag(FLAG_C);
        match op & 0x07 {
            0 => self.shift_flags(val.rotate_left(1), val & 0x80 != 0),
            1 => self.shift_flags(val.rotate_right(1), val & 0x01 != 0),
            2 => self.shift_flags((val << 1) | carry_in as u8, val & 0x80 != 0),
            3 => self.shift_flags((val >> 1) | ((carry_in as u8) << 7), val & 0x01 != 0),
            4 => self.shift_flags(val << 1, val & 0x80 != 0),
            5 => self.shift_flags((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => self.shift_flags((val << 1) | 0x01, val & 0x80 != 0),
            _ => self.shift_flags(val >> 1, val & 0x01 != 0),
        }
    }

    /// BIT b,val. `xy` supplies the undocumented bits 3 and 5.
    fn bit(&mut self, bit: u8, val: u8, xy: u8) {
        let set = val & (1 << bit) != 0;
        let mut f = (self.f & FLAG_C) | FLAG_H | (xy & (FLAG_Y | FLAG_X));
        if !set {
            f |= FLAG_Z | FLAG_PV;
        }
        if bit == 7 && set {
            f |= FLAG_S;
        }
        self.f = f;
    }

    /// Dispatch one (possibly prefixed) instruction
    fn execute(&mut self, opcode: u8) -> u32 {
        match opcode {
            // NOP
            0x00 => 4,

            // LD rr,nn
            0x01 | 0x11 | 0x21 => {
                let val = self.read_pc_u16();
                self.set_rp(opcode >> 4, val);
                10
            }
            0x31 => {
                let val = self.read_pc_u16();
                self.load_sp(val);
                10
            }

            // LD (BC),A / LD (DE),A
            0x02 => {
                self.memory.write(self.bc(), self.a);
                7
            }
            0x12 => {
                self.memory.write(self.de(), self.a);
                7
            }

            // INC rr / DEC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                let val = self.rp(opcode >> 4).wrapping_add(1);
                self.set_rp(opcode >> 4, val);
                6
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let val = self.rp(opcode >> 4).wrapping_sub(1);
                self.set_rp(opcode >> 4, val);
                6
            }

            // INC (HL) / DEC (HL) / LD (HL),n
            0x34 => {
                let addr = self.hl();
                let val = self.memory.read(addr);
                let result = self.inc8(val);
                self.memory.write(addr, result);
                11
            }
            0x35 => {
                let addr = self.hl();
                let val = self.memory.read(addr);
                let result = self.dec8(val);
                self.memory.write(addr, result);
                11
            }
            0x36 => {
                let val = self.read_pc();
                self.memory.write(self.hl(), val);
                10
            }

            // INC r / DEC r / LD r,n
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let result = self.inc8(self.reg8(r));
                self.set_reg8(r, result);
                4
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let result = self.dec8(self.reg8(r));
                self.set_reg8(r, result);
                4
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let val = self.read_pc();
                self.set_reg8((opcode >> 3) & 0x07, val);
                7
            }

            // RLCA / RRCA / RLA / RRA
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.rotate_a_flags(carry);
                4
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.rotate_a_flags(carry);
                4
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | self.get_flag(FLAG_C) as u8;
                self.rotate_a_flags(carry);
                4
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | ((self.get_flag(FLAG_C) as u8) << 7);
                self.rotate_a_flags(carry);
                4
            }

            // EX AF,AF'
            0x08 => {
                std::mem::swap(&mut self.a, &mut self.a_prime);
                std::mem::swap(&mut self.f, &mut self.f_prime);
                4
            }

            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let val = self.rp(opcode >> 4);
                let result = self.add16(self.hl(), val);
                self.set_hl(result);
                11
            }

            // LD A,(BC) / LD A,(DE)
            0x0A => {
                self.a = self.memory.read(self.bc());
                7
            }
            0x1A => {
                self.a = self.memory.read(self.de());
                7
            }

            // DJNZ e
            0x10 => {
                let offset = self.read_pc() as i8;
                self.b = self.b.wrapping_sub(1);
                if self.b != 0 {
                    self.jump_relative(offset);
                    13
                } else {
                    8
                }
            }

            // JR e / JR cc,e
            0x18 => {
                let offset = self.read_pc() as i8;
                self.jump_relative(offset);
                12
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.read_pc() as i8;
                if self.condition((opcode >> 3) & 0x03) {
                    self.jump_relative(offset);
                    12
                } else {
                    7
                }
            }

            // LD (nn),HL / LD HL,(nn) / LD (nn),A / LD A,(nn)
            0x22 => {
                let addr = self.read_pc_u16();
                self.write_u16(addr, self.hl());
                16
            }
            0x2A => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.set_hl(val);
                16
            }
            0x32 => {
                let addr = self.read_pc_u16();
                self.memory.write(addr, self.a);
                13
            }
            0x3A => {
                let addr = self.read_pc_u16();
                self.a = self.memory.read(addr);
                13
            }

            // DAA / CPL / SCF / CCF
            0x27 => {
                self.daa();
                4
            }
            0x2F => {
                self.a = !self.a;
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C))
                    | FLAG_H
                    | FLAG_N
                    | (self.a & (FLAG_Y | FLAG_X));
                4
            }
            0x37 => {
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | FLAG_C | (self.a & (FLAG_Y | FLAG_X));
                4
            }
            0x3F => {
                let carry = self.get_flag(FLAG_C);
                let mut f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | (self.a & (FLAG_Y | FLAG_X));
                if carry {
                    f |= FLAG_H;
                } else {
                    f |= FLAG_C;
                }
                self.f = f;
                4
            }

            // HALT
            0x76 => {
                self.halted = true;
                4
            }

            // LD r,r' / LD r,(HL) / LD (HL),r
            0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                if src == 6 {
                    let val = self.memory.read(self.hl());
                    self.set_reg8(dst, val);
                    7
                } else if dst == 6 {
                    self.memory.write(self.hl(), self.reg8(src));
                    7
                } else {
                    self.set_reg8(dst, self.reg8(src));
                    4
                }
            }

            // ADD/ADC/SUB/SBC/AND/XOR/OR/CP r
            0x80..=0xBF => {
                let reg = opcode & 0x07;
                if reg == 6 {
                    let val = self.memory.read(self.hl());
                    self.alu(opcode >> 3, val);
                    7
                } else {
                    self.alu(opcode >> 3, self.reg8(reg));
                    4
                }
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition(opcode >> 3) {
                    self.ret();
                    11
                } else {
                    5
                }
            }

            // POP rr / PUSH rr
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop_u16();
                self.set_rp2((opcode >> 4) & 0x03, val);
                10
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.push_u16(self.rp2((opcode >> 4) & 0x03));
                11
            }

            // JP cc,nn / JP nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = self.read_pc_u16();
                if self.condition(opcode >> 3) {
                    self.pc = addr;
                }
                10
            }
            0xC3 => {
                self.pc = self.read_pc_u16();
                10
            }

            // CALL cc,nn / CALL nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let addr = self.read_pc_u16();
                if self.condition(opcode >> 3) {
                    self.call(addr);
                    17
                } else {
                    10
                }
            }
            0xCD => {
                let addr = self.read_pc_u16();
                self.call(addr);
                17
            }

            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.read_pc();
                self.alu(opcode >> 3, val);
                7
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.call((opcode & 0x38) as u16);
                11
            }

            // RET
            0xC9 => {
                self.ret();
                10
            }

            // OUT (n),A / IN A,(n)
            0xD3 => {
                let port = self.read_pc();
                self.memory.io_write(port, self.a);
                11
            }
            0xDB => {
                let port = self.read_pc();
                self.a = self.memory.io_read(port);
                11
            }

            // EXX
            0xD9 => {
                std::mem::swap(&mut self.b, &mut self.b_prime);
                std::mem::swap(&mut self.c, &mut self.c_prime);
                std::mem::swap(&mut self.d, &mut self.d_prime);
                std::mem::swap(&mut self.e, &mut self.e_prime);
                std::mem::swap(&mut self.h, &mut self.h_prime);
                std::mem::swap(&mut self.l, &mut self.l_prime);
                4
            }

            // EX (SP),HL
            0xE3 => {
                let val = self.read_u16(self.sp);
                self.write_u16(self.sp, self.hl());
                self.set_hl(val);
                19
            }

            // JP (HL)
            0xE9 => {
                self.pc = self.hl();
                4
            }

            // EX DE,HL
            0xEB => {
                let de = self.de();
                let hl = self.hl();
                self.set_de(hl);
                self.set_hl(de);
                4
            }

            // DI / EI
            0xF3 => {
                self.iff1 = false;
                self.iff2 = false;
                4
            }
            0xFB => {
                self.iff1 = true;
                self.iff2 = true;
                4
            }

            // LD SP,HL
            0xF9 => {
                self.load_sp(self.hl());
                6
            }

            // Prefixes
            0xCB => {
                let op = self.fetch_opcode();
                self.execute_cb(op)
            }
            0xED => {
                let op = self.fetch_opcode();
                self.execute_ed(op)
            }
            0xDD => self.execute_index(Index::IX),
            0xFD => self.execute_index(Index::IY),
        }
    }

    fn execute_cb(&mut self, opcode: u8) -> u32 {
        let reg = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;

        let val = if reg == 6 {
            self.memory.read(self.hl())
        } else {
            self.reg8(reg)
        };

        let result = match opcode >> 6 {
            0 => self.shift_op(bit, val),
            1 => {
                self.bit(bit, val, val);
                return if reg == 6 { 12 } else { 8 };
            }
            2 => val & !(1 << bit), // RES
            _ => val | (1 << bit),  // SET
        };

        if reg == 6 {
            self.memory.write(self.hl(), result);
            15
        } else {
            self.set_reg8(reg, result);
            8
        }
    }

    fn execute_ed(&mut self, opcode: u8) -> u32 {
        match opcode {
            // IN r,(C); 0x70 only sets flags
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let val = self.memory.io_read(self.c);
                let r = (opcode >> 3) & 0x07;
                if r != 6 {
                    self.set_reg8(r, val);
                }
                self.f = (self.f & FLAG_C) | Self::sz53(val) | Self::parity(val);
                12
            }

            // OUT (C),r; 0x71 outputs zero
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let r = (opcode >> 3) & 0x07;
                let val = if r == 6 { 0 } else { self.reg8(r) };
                self.memory.io_write(self.c, val);
                12
            }

            // SBC HL,rr / ADC HL,rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                self.sbc_hl(self.rp(opcode >> 4));
                15
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                self.adc_hl(self.rp(opcode >> 4));
                15
            }

            // LD (nn),rr / LD rr,(nn)
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.read_pc_u16();
                self.write_u16(addr, self.rp(opcode >> 4));
                20
            }
            0x4B | 0x5B | 0x6B => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.set_rp(opcode >> 4, val);
                20
            }
            0x7B => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.load_sp(val);
                20
            }

            // NEG
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let val = self.a;
                self.a = 0;
                self.sub_a(val, false);
                8
            }

            // RETN / RETI
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.iff1 = self.iff2;
                self.ret();
                14
            }

            // IM 0 / IM 1 / IM 2
            0x46 | 0x4E | 0x66 | 0x6E => {
                self.im = 0;
                8
            }
            0x56 | 0x76 => {
                self.im = 1;
                8
            }
            0x5E | 0x7E => {
                self.im = 2;
                8
            }

            // LD I,A / LD R,A / LD A,I / LD A,R
            0x47 => {
                self.i = self.a;
                9
            }
            0x4F => {
                self.r = self.a;
                9
            }
            0x57 => {
                self.a = self.i;
                self.f = (self.f & FLAG_C) | Self::sz53(self.a) | if self.iff2 { FLAG_PV } else { 0 };
                9
            }
            0x5F => {
                self.a = self.r;
                self.f = (self.f & FLAG_C) | Self::sz53(self.a) | if self.iff2 { FLAG_PV } else { 0 };
                9
            }

            // RRD / RLD
            0x67 => {
                let addr = self.hl();
                let m = self.memory.read(addr);
                self.memory.write(addr, (self.a << 4) | (m >> 4));
                self.a = (self.a & 0xF0) | (m & 0x0F);
                self.f = (self.f & FLAG_C) | Self::sz53(self.a) | Self::parity(self.a);
                18
            }
            0x6F => {
                let addr = self.hl();
                let m = self.memory.read(addr);
                self.memory.write(addr, (m << 4) | (self.a & 0x0F));
                self.a = (self.a & 0xF0) | (m >> 4);
                self.f = (self.f & FLAG_C) | Self::sz53(self.a) | Self::parity(self.a);
                18
            }

            // Block transfer, compare, input and output
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                self.block_load(opcode & 0x08 == 0);
                self.repeat_if(opcode & 0x10 != 0 && self.bc() != 0)
            }
            0xA1 | 0xA9 | 0xB1 | 0xB9 => {
                let matched = self.block_compare(opcode & 0x08 == 0);
                self.repeat_if(opcode & 0x10 != 0 && self.bc() != 0 && !matched)
            }
            0xA2 | 0xAA | 0xB2 | 0xBA => {
                self.block_in(opcode & 0x08 == 0);
                self.repeat_if(opcode & 0x10 != 0 && self.b != 0)
            }
            0xA3 | 0xAB | 0xB3 | 0xBB => {
                self.block_out(opcode & 0x08 == 0);
                self.repeat_if(opcode & 0x10 != 0 && self.b != 0)
            }

            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!(
                        "Z80: undefined ED {:02X} at PC={:04X}, treated as NOP",
                        opcode,
                        self.pc.wrapping_sub(2)
                    )
                });
                8
            }
        }
    }

    /// Rewind onto the block instruction when it has more work to do
    fn repeat_if(&mut self, repeat: bool) -> u32 {
        if repeat {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    fn step_hl(&mut self, increment: bool) {
        let hl = self.hl();
        self.set_hl(if increment {
            hl.wrapping_add(1)
        } else {
            hl.wrapping_sub(1)
        });
    }

    /// LDI / LDD
    fn block_load(&mut self, increment: bool) {
        let val = self.memory.read(self.hl());
        self.memory.write(self.de(), val);
        self.step_hl(increment);
        let de = self.de();
        self.set_de(if increment {
            de.wrapping_add(1)
        } else {
            de.wrapping_sub(1)
        });
        self.set_bc(self.bc().wrapping_sub(1));

        let n = val.wrapping_add(self.a);
        let mut f = (self.f & (FLAG_S | FLAG_Z | FLAG_C)) | (n & FLAG_X) | ((n << 4) & FLAG_Y);
        if self.bc() != 0 {
            f |= FLAG_PV;
        }
        self.f = f;
    }

    /// CPI / CPD; returns whether A matched (HL)
    fn block_compare(&mut self, increment: bool) -> bool {
        let val = self.memory.read(self.hl());
        let result = self.a.wrapping_sub(val);
        self.step_hl(increment);
        self.set_bc(self.bc().wrapping_sub(1));

        let mut f = (self.f & FLAG_C) | FLAG_N | (result & FLAG_S);
        if result == 0 {
            f |= FLAG_Z;
        }
        if (self.a & 0x0F) < (val & 0x0F) {
            f |= FLAG_H;
        }
        if self.bc() != 0 {
            f |= FLAG_PV;
        }
        self.f = f;
        result == 0
    }

    /// INI / IND
    fn block_in(&mut self, increment: bool) {
        let val = self.memory.io_read(self.c);
        self.memory.write(self.hl(), val);
        self.step_hl(increment);
        self.b = self.b.wrapping_sub(1);
        self.f = (self.f & FLAG_C) | Self::sz53(self.b) | FLAG_N;
    }

    /// OUTI / OUTD; B is decremented before the port sees it
    fn block_out(&mut self, increment: bool) {
        let val = self.memory.read(self.hl());
        self.b = self.b.wrapping_sub(1);
        self.memory.io_write(self.c, val);
        self.step_hl(increment);
        self.f = (self.f & FLAG_C) | Self::sz53(self.b) | FLAG_N;
    }

    fn execute_index(&mut self, idx: Index) -> u32 {
        let opcode = self.fetch_opcode();
        match opcode {
            // DDCB d op / FDCB d op
            0xCB => {
                let addr = self.index_addr(idx);
                let op = self.read_pc();
                self.execute_index_cb(addr, op)
            }

            // Another prefix: this one only costs a NOP and the next is decoded fresh
            0xDD | 0xED | 0xFD => {
                self.pc = self.pc.wrapping_sub(1);
                self.r = (self.r & 0x80) | (self.r.wrapping_sub(1) & 0x7F);
                4
            }

            // ADD IX,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let val = match (opcode >> 4) & 0x03 {
                    2 => self.index(idx),
                    p => self.rp(p),
                };
                let result = self.add16(self.index(idx), val);
                self.set_index(idx, result);
                15
            }

            // LD IX,nn / LD (nn),IX / LD IX,(nn)
            0x21 => {
                let val = self.read_pc_u16();
                self.set_index(idx, val);
                14
            }
            0x22 => {
                let addr = self.read_pc_u16();
                self.write_u16(addr, self.index(idx));
                20
            }
            0x2A => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.set_index(idx, val);
                20
            }

            // INC IX / DEC IX
            0x23 => {
                self.set_index(idx, self.index(idx).wrapping_add(1));
                10
            }
            0x2B => {
                self.set_index(idx, self.index(idx).wrapping_sub(1));
                10
            }

            // INC/DEC/LD on IXH and IXL
            0x24 | 0x2C => {
                let r = (opcode >> 3) & 0x07;
                let result = self.inc8(self.index_reg8(idx, r));
                self.set_index_reg8(idx, r, result);
                8
            }
            0x25 | 0x2D => {
                let r = (opcode >> 3) & 0x07;
                let result = self.dec8(self.index_reg8(idx, r));
                self.set_index_reg8(idx, r, result);
                8
            }
            0x26 | 0x2E => {
                let val = self.read_pc();
                self.set_index_reg8(idx, (opcode >> 3) & 0x07, val);
                11
            }

            // INC (IX+d) / DEC (IX+d) / LD (IX+d),n
            0x34 => {
                let addr = self.index_addr(idx);
                let val = self.memory.read(addr);
                let result = self.inc8(val);
                self.memory.write(addr, result);
                23
            }
            0x35 => {
                let addr = self.index_addr(idx);
                let val = self.memory.read(addr);
                let result = self.dec8(val);
                self.memory.write(addr, result);
                23
            }
            0x36 => {
                let addr = self.index_addr(idx);
                let val = self.read_pc();
                self.memory.write(addr, val);
                19
            }

            0x76 => {
                self.halted = true;
                8
            }

            // LD r,(IX+d) / LD (IX+d),r use the real H and L; otherwise H/L mean IXH/IXL
            0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                if src == 6 {
                    let addr = self.index_addr(idx);
                    let val = self.memory.read(addr);
                    self.set_reg8(dst, val);
                    19
                } else if dst == 6 {
                    let addr = self.index_addr(idx);
                    self.memory.write(addr, self.reg8(src));
                    19
                } else {
                    let val = self.index_reg8(idx, src);
                    self.set_index_reg8(idx, dst, val);
                    8
                }
            }

            // ALU with (IX+d), IXH, IXL
            0x80..=0xBF => {
                let reg = opcode & 0x07;
                if reg == 6 {
                    let addr = self.index_addr(idx);
                    let val = self.memory.read(addr);
                    self.alu(opcode >> 3, val);
                    19
                } else {
                    self.alu(opcode >> 3, self.index_reg8(idx, reg));
                    8
                }
            }

            // POP IX / EX (SP),IX / PUSH IX / JP (IX) / LD SP,IX
            0xE1 => {
                let val = self.pop_u16();
                self.set_index(idx, val);
                14
            }
            0xE3 => {
                let val = self.read_u16(self.sp);
                self.write_u16(self.sp, self.index(idx));
                self.set_index(idx, val);
                23
            }
            0xE5 => {
                self.push_u16(self.index(idx));
                15
            }
            0xE9 => {
                self.pc = self.index(idx);
                8
            }
            0xF9 => {
                self.load_sp(self.index(idx));
                10
            }

            // Anything else ignores the prefix and pays 4 extra T-states for it
            _ => self.execute(opcode) + 4,
        }
    }

    fn execute_index_cb(&mut self, addr: u16, opcode: u8) -> u32 {
        let reg = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        let val = self.memory.read(addr);

        let result = match opcode >> 6 {
            0 => self.shift_op(bit, val),
            1 => {
                self.bit(bit, val, (addr >> 8) as u8);
                return 20;
            }
            2 => val & !(1 << bit),
            _ => val | (1 << bit),
        };

        self.memory.write(addr, result);
        // Undocumented: the result is also copied to the register field
        if reg != 6 {
            self.set_reg8(reg, result);
        }
        23
    }
}

impl<M: MemoryZ80> crate::Cpu for CpuZ80<M> {
    fn reset(&mut self) {
        self.reset();
    }

    fn step(&mut self) -> u32 {
        self.step()
    }
}
