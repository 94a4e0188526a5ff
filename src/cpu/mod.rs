//! The Sharp SM83-class CPU core implementation.

use crate::memory_bus::{InterruptSource, MemoryBus};
use crate::memory_map; // Use qualified paths for memory map constants
use crate::memory_map::{
    INTERRUPT_MASK, JOYPAD_INTERRUPT_BIT, LCD_STAT_INTERRUPT_BIT, SERIAL_INTERRUPT_BIT,
    TIMER_INTERRUPT_BIT, VBLANK_INTERRUPT_BIT,
};
use instruction::{CB_INSTRUCTIONS, INSTRUCTIONS};
use log;
use std::fmt;

// Declare submodules
mod constants;
#[macro_use]
mod ops_macros;
mod instruction;
mod ops_alu;
mod ops_cb;
mod ops_control;
mod ops_load;
mod ops_rot_shift;

// Re-export public constants if needed by external modules
pub use constants::*;
pub use instruction::Instruction;

// Type alias for CPU operation results
pub type CpuResult<T> = Result<T, String>;

/// The CPU register file, interrupt state, and execution logic.
///
/// `step` returns machine cycles (one machine cycle = four clocks); the
/// host advances its peripherals by the returned count before stepping
/// again.
#[derive(Debug, Clone)]
pub struct Cpu {
    // --- 8-bit Registers ---
    a: u8, // Accumulator
    f: u8, // Flags (ZNHC----)
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,

    // --- 16-bit Registers ---
    sp: u16, // Stack Pointer
    pc: u16, // Program Counter

    // --- CPU State Flags ---
    ime: bool,            // Interrupt Master Enable flag (enabled/disabled)
    halted: bool,         // CPU is in HALT state (waiting for interrupt)
    stop_requested: bool, // CPU received STOP instruction (low power state)
    ime_scheduled: bool,  // IME will be enabled after the next instruction

    // --- Internal Timing/Execution State ---
    total_cycles: u64,   // Total machine cycles executed since start/reset
    fetched_opcode: u8,  // Last opcode fetched (for error reporting/debugging)
    instruction_pc: u16, // PC at the start of the current instruction (for operand reads)
}

// Core CPU logic (new, step, interrupts, helpers, accessors) remains here
impl Cpu {
    /// Creates a new CPU instance in the post-boot-ROM state.
    pub fn new() -> Self {
        let mut cpu = Cpu {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
            ime: false,
            halted: false,
            stop_requested: false,
            ime_scheduled: false,
            total_cycles: 0,
            fetched_opcode: 0,
            instruction_pc: 0,
        };
        cpu.reset();
        cpu
    }

    /// Restores the power-on register state.
    /// Values based on Pandocs post-boot section for DMG.
    pub fn reset(&mut self) {
        self.a = 0x01;
        self.f = 0xB0 & FLAG_MASK; // Ensure lower bits are zero
        self.b = 0x00;
        self.c = 0x13;
        self.d = 0x00;
        self.e = 0xD8;
        self.h = 0x01;
        self.l = 0x4D;
        self.sp = 0xFFFE;
        self.pc = 0x0100; // Entry point for cartridges
        self.ime = false;
        self.halted = false;
        self.stop_requested = false;
        self.ime_scheduled = false;
        self.total_cycles = 0;
        self.fetched_opcode = 0;
        self.instruction_pc = 0;
    }

    /// Executes a single CPU instruction cycle (fetch, decode, execute).
    /// Returns the number of machine cycles consumed.
    pub fn step(&mut self, memory_bus: &mut MemoryBus) -> CpuResult<u16> {
        // --- Interrupt Handling Phase ---
        // EI takes effect one instruction late: the flag set by the EI
        // handler becomes IME here, and interrupt servicing is suppressed
        // until the following instruction has run.
        let mut ime_just_enabled = false;
        if self.ime_scheduled {
            self.ime = true;
            self.ime_scheduled = false;
            ime_just_enabled = true;
        }

        let interrupt_cycles = if self.ime && !ime_just_enabled {
            self.handle_interrupts(memory_bus)
        } else {
            0
        };

        if interrupt_cycles > 0 {
            self.halted = false;
            self.stop_requested = false;
            self.total_cycles = self.total_cycles.wrapping_add(interrupt_cycles as u64);
            return Ok(interrupt_cycles);
        }

        // --- Halted/Stopped Phase ---
        if self.halted {
            if Self::pending_interrupts(memory_bus) != 0 {
                // Wake regardless of IME; with IME clear execution simply
                // resumes at the next instruction.
                self.halted = false;
            }
            self.total_cycles = self.total_cycles.wrapping_add(1);
            return Ok(1);
        }
        if self.stop_requested {
            if Self::pending_interrupts(memory_bus) & (1 << JOYPAD_INTERRUPT_BIT) != 0 {
                self.stop_requested = false;
            }
            self.total_cycles = self.total_cycles.wrapping_add(1);
            return Ok(1);
        }

        // --- Fetch Phase ---
        self.instruction_pc = self.pc;
        self.fetched_opcode = memory_bus.read_byte(self.pc);

        // --- Decode Phase ---
        let instruction = &INSTRUCTIONS[self.fetched_opcode as usize];

        // --- Advance PC Phase ---
        self.pc = self.pc.wrapping_add(instruction.length as u16);

        // --- Execute Phase ---
        // Handlers return the extra machine cycles beyond the table cost
        // (branch-taken surcharge, CB sub-table cost).
        let execute_result = (instruction.execute)(self, memory_bus);

        debug_assert!(
            (self.f & !FLAG_MASK) == 0,
            "low nibble of F must read as zero (F={:#04X})",
            self.f
        );

        // --- Process Result ---
        match execute_result {
            Ok(additional_cycles) => {
                let total_instruction_cycles =
                    (instruction.cycles as u16).wrapping_add(additional_cycles);
                self.total_cycles = self
                    .total_cycles
                    .wrapping_add(total_instruction_cycles as u64);
                Ok(total_instruction_cycles)
            }
            Err(error_message) => {
                let wrapped = format!(
                    "CPU fault at PC={:#06X} (opcode {:#04X}): {}",
                    self.instruction_pc, self.fetched_opcode, error_message
                );
                log::error!("{}", wrapped);
                self.total_cycles = self.total_cycles.wrapping_add(instruction.cycles as u64);
                Err(wrapped)
            }
        }
    }

    /// Checks for and handles pending interrupts if IME is enabled.
    /// Returns the number of machine cycles taken if an interrupt was
    /// dispatched (5), otherwise 0.
    fn handle_interrupts(&mut self, memory_bus: &mut MemoryBus) -> u16 {
        let pending = Self::pending_interrupts(memory_bus);
        if pending == 0 {
            return 0;
        }

        self.ime = false;
        self.ime_scheduled = false;

        // Priority order is the bit order, V-Blank first.
        let (vector, interrupt_bit) = if pending & (1 << VBLANK_INTERRUPT_BIT) != 0 {
            (VBLANK_VECTOR, VBLANK_INTERRUPT_BIT)
        } else if pending & (1 << LCD_STAT_INTERRUPT_BIT) != 0 {
            (LCD_STAT_VECTOR, LCD_STAT_INTERRUPT_BIT)
        } else if pending & (1 << TIMER_INTERRUPT_BIT) != 0 {
            (TIMER_VECTOR, TIMER_INTERRUPT_BIT)
        } else if pending & (1 << SERIAL_INTERRUPT_BIT) != 0 {
            (SERIAL_VECTOR, SERIAL_INTERRUPT_BIT)
        } else if pending & (1 << JOYPAD_INTERRUPT_BIT) != 0 {
            (JOYPAD_VECTOR, JOYPAD_INTERRUPT_BIT)
        } else {
            unreachable!();
        };

        let current_if = memory_bus.read_byte(memory_map::IF_ADDR);
        memory_bus.write_byte(memory_map::IF_ADDR, current_if & !(1 << interrupt_bit));
        self.push_word(self.pc, memory_bus);
        self.pc = vector;
        log::trace!("Dispatching interrupt bit {} to {:#06X}", interrupt_bit, vector);
        INTERRUPT_DISPATCH_CYCLES
    }

    /// Latches an interrupt request in IF. Peripheral-facing convenience;
    /// whether and when it dispatches is decided inside `step`.
    pub fn raise_interrupt(&mut self, memory_bus: &mut MemoryBus, source: InterruptSource) {
        memory_bus.request_interrupt(source);
    }

    #[inline(always)]
    fn pending_interrupts(memory_bus: &MemoryBus) -> u8 {
        let ie = memory_bus.read_byte(memory_map::INTERRUPT_ENABLE_REGISTER);
        let iflags = memory_bus.read_byte(memory_map::IF_ADDR);
        ie & iflags & INTERRUPT_MASK
    }

    // --- Memory Access Helpers ---
    #[inline(always)]
    fn read_d8(&self, memory_bus: &MemoryBus) -> u8 {
        memory_bus.read_byte(self.instruction_pc.wrapping_add(1))
    }
    #[inline(always)]
    fn read_d16(&self, memory_bus: &MemoryBus) -> u16 {
        let lo = memory_bus.read_byte(self.instruction_pc.wrapping_add(1));
        let hi = memory_bus.read_byte(self.instruction_pc.wrapping_add(2));
        u16::from_le_bytes([lo, hi])
    }
    #[inline(always)]
    fn read_r8(&self, memory_bus: &MemoryBus) -> i8 {
        memory_bus.read_byte(self.instruction_pc.wrapping_add(1)) as i8
    }

    // --- Stack Operations ---
    // High byte at SP-1, low byte at SP-2: the stored word is little-endian.
    #[inline(always)]
    fn push_word(&mut self, value: u16, memory_bus: &mut MemoryBus) {
        self.sp = self.sp.wrapping_sub(1);
        memory_bus.write_byte(self.sp, (value >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        memory_bus.write_byte(self.sp, (value & 0xFF) as u8);
    }
    #[inline(always)]
    fn pop_word(&mut self, memory_bus: &mut MemoryBus) -> u16 {
        let low = memory_bus.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let high = memory_bus.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (high << 8) | low
    }

    // --- Flag/Register Pair Helpers ---
    #[inline(always)]
    fn get_af(&self) -> u16 {
        ((self.a as u16) << 8) | (self.f as u16)
    }
    #[inline(always)]
    fn set_af(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.f = (value as u8) & FLAG_MASK;
    }
    #[inline(always)]
    fn get_bc(&self) -> u16 {
        u16::from_le_bytes([self.c, self.b])
    }
    #[inline(always)]
    fn set_bc(&mut self, value: u16) {
        let bytes = value.to_le_bytes();
        self.c = bytes[0];
        self.b = bytes[1];
    }
    #[inline(always)]
    fn get_de(&self) -> u16 {
        u16::from_le_bytes([self.e, self.d])
    }
    #[inline(always)]
    fn set_de(&mut self, value: u16) {
        let bytes = value.to_le_bytes();
        self.e = bytes[0];
        self.d = bytes[1];
    }
    #[inline(always)]
    fn get_hl(&self) -> u16 {
        u16::from_le_bytes([self.l, self.h])
    }
    #[inline(always)]
    fn set_hl(&mut self, value: u16) {
        let bytes = value.to_le_bytes();
        self.l = bytes[0];
        self.h = bytes[1];
    }
    #[inline(always)]
    fn set_flag(&mut self, flag_mask: u8, set: bool) {
        if set {
            self.f |= flag_mask;
        } else {
            self.f &= !flag_mask;
        }
        self.f &= FLAG_MASK;
    }
    #[inline(always)]
    fn get_flag(&self, flag_mask: u8) -> bool {
        (self.f & flag_mask) != 0
    }

    // --- ALU and Bit Operation Helpers ---
    // (Keep these internal helpers within the main impl block)
    fn inc_u8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (value & 0x0F) == 0x0F);
        result
    }
    fn dec_u8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, (value & 0x0F) == 0x00);
        result
    }
    fn add_hl(&mut self, value: u16) {
        // Z is preserved; H is the carry out of bit 11.
        let hl = self.get_hl();
        let (result, carry) = hl.overflowing_add(value);
        let half_carry = (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF;
        self.set_hl(result);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, half_carry);
        self.set_flag(FLAG_C, carry);
    }
    /// Shared by ADD SP,e8 and LD HL,SP+e8: sign-extended add to SP with
    /// H and C computed on the unsigned low byte of SP.
    fn add_sp_e8(&mut self, offset: i8) -> u16 {
        let sp = self.sp;
        let unsigned = offset as u8 as u16;
        let half_carry = (sp & 0x000F) + (unsigned & 0x000F) > 0x000F;
        let carry = (sp & 0x00FF) + (unsigned & 0x00FF) > 0x00FF;
        let result = sp.wrapping_add(offset as i16 as u16);
        self.set_flag(FLAG_Z | FLAG_N, false);
        self.set_flag(FLAG_H, half_carry);
        self.set_flag(FLAG_C, carry);
        result
    }
    fn add_a(&mut self, value: u8, use_carry: bool) {
        let carry_in = if use_carry && self.get_flag(FLAG_C) {
            1
        } else {
            0
        };
        let (res1, c1) = self.a.overflowing_add(value);
        let (result, c2) = res1.overflowing_add(carry_in);
        let carry_out = c1 || c2;
        let half_carry = (self.a & 0x0F) + (value & 0x0F) + carry_in > 0x0F;
        self.a = result;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, half_carry);
        self.set_flag(FLAG_C, carry_out);
    }
    fn sub_a(&mut self, value: u8, use_carry: bool) {
        let carry_in = if use_carry && self.get_flag(FLAG_C) {
            1
        } else {
            0
        };
        let (res1, b1) = self.a.overflowing_sub(value);
        let (result, b2) = res1.overflowing_sub(carry_in);
        let borrow_out = b1 || b2;
        // Borrow test widened so the subtraction cannot wrap.
        let half_borrow = (self.a & 0x0F) < (value & 0x0F) + carry_in;
        self.a = result;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, half_borrow);
        self.set_flag(FLAG_C, borrow_out);
    }
    fn and_a(&mut self, value: u8, _use_carry: bool) {
        self.a &= value;
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_N | FLAG_C, false);
        self.set_flag(FLAG_H, true);
    }
    fn xor_a(&mut self, value: u8, _use_carry: bool) {
        self.a ^= value;
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_N | FLAG_H | FLAG_C, false);
    }
    fn or_a(&mut self, value: u8, _use_carry: bool) {
        self.a |= value;
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_N | FLAG_H | FLAG_C, false);
    }
    fn cp_a(&mut self, value: u8, _use_carry: bool) {
        let temp_a = self.a;
        self.sub_a(value, false);
        self.a = temp_a;
    }
    fn rlc(&mut self, value: u8) -> u8 {
        let carry = (value >> 7) & 1;
        let result = value.rotate_left(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, carry != 0);
        result
    }
    fn rrc(&mut self, value: u8) -> u8 {
        let carry = value & 1;
        let result = value.rotate_right(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, carry != 0);
        result
    }
    fn rl(&mut self, value: u8) -> u8 {
        let old_carry = self.get_flag(FLAG_C) as u8;
        let new_carry = (value >> 7) & 1;
        let result = (value << 1) | old_carry;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, new_carry != 0);
        result
    }
    fn rr(&mut self, value: u8) -> u8 {
        let old_carry = self.get_flag(FLAG_C) as u8;
        let new_carry = value & 1;
        let result = (value >> 1) | (old_carry << 7);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, new_carry != 0);
        result
    }
    fn sla(&mut self, value: u8) -> u8 {
        let carry = (value >> 7) & 1;
        let result = value << 1;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, carry != 0);
        result
    }
    fn sra(&mut self, value: u8) -> u8 {
        let carry = value & 1;
        let result = (value >> 1) | (value & 0x80);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, carry != 0);
        result
    }
    fn swap(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H | FLAG_C, false);
        result
    }
    fn srl(&mut self, value: u8) -> u8 {
        let carry = value & 1;
        let result = value >> 1;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N | FLAG_H, false);
        self.set_flag(FLAG_C, carry != 0);
        result
    }
    fn op_bit(&mut self, bit: u8, value: u8) {
        let result_zero = (value >> bit) & 1 == 0;
        self.set_flag(FLAG_Z, result_zero);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, true);
    }
    fn daa(&mut self) {
        let mut adjustment = 0u8;
        let mut set_carry = false;
        let n_flag = self.get_flag(FLAG_N);
        let h_flag = self.get_flag(FLAG_H);
        let c_flag = self.get_flag(FLAG_C);
        if !n_flag {
            if c_flag || self.a > 0x99 {
                adjustment |= 0x60;
                set_carry = true;
            }
            if h_flag || (self.a & 0x0F) > 0x09 {
                adjustment |= 0x06;
            }
            self.a = self.a.wrapping_add(adjustment);
        } else {
            if c_flag {
                adjustment |= 0x60;
                set_carry = true;
            }
            if h_flag {
                adjustment |= 0x06;
            }
            self.a = self.a.wrapping_sub(adjustment);
        }
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_H, false);
        self.set_flag(FLAG_C, set_carry);
    }

    // --- Public accessors ---
    #[inline(always)]
    pub fn pc(&self) -> u16 {
        self.pc
    }
    #[inline(always)]
    pub fn sp(&self) -> u16 {
        self.sp
    }
    /// Returns `(A, F, B, C, D, E, H, L)`.
    #[inline(always)]
    pub fn registers(&self) -> (u8, u8, u8, u8, u8, u8, u8, u8) {
        (
            self.a, self.f, self.b, self.c, self.d, self.e, self.h, self.l,
        )
    }
    #[inline(always)]
    pub fn af(&self) -> u16 {
        self.get_af()
    }
    #[inline(always)]
    pub fn bc(&self) -> u16 {
        self.get_bc()
    }
    #[inline(always)]
    pub fn de(&self) -> u16 {
        self.get_de()
    }
    #[inline(always)]
    pub fn hl(&self) -> u16 {
        self.get_hl()
    }
    #[inline(always)]
    pub fn ime(&self) -> bool {
        self.ime
    }
    #[inline(always)]
    pub fn halted(&self) -> bool {
        self.halted
    }
    #[inline(always)]
    pub fn stopped(&self) -> bool {
        self.stop_requested
    }
    #[inline(always)]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    // --- Debugging Helpers ---
    /// Renders the instruction at `address` as a mnemonic with its decoded
    /// operand, and returns its byte length.
    pub fn disassemble_instruction(&self, address: u16, bus: &MemoryBus) -> (String, u8) {
        let opcode = bus.peek(address);
        if opcode == 0xCB {
            let cb_opcode = bus.peek(address.wrapping_add(1));
            let cb_instr = &CB_INSTRUCTIONS[cb_opcode as usize];
            (cb_instr.mnemonic.to_string(), 2)
        } else {
            let instr = &INSTRUCTIONS[opcode as usize];
            let operand_str = match instr.length {
                2 => {
                    let d8 = bus.peek(address.wrapping_add(1));
                    if instr.mnemonic.starts_with("JR")
                        || instr.mnemonic == "ADD SP, r8"
                        || instr.mnemonic == "LD HL, SP+r8"
                    {
                        format!("{:+}", d8 as i8)
                    } else {
                        format!("${:02X}", d8)
                    }
                }
                3 => {
                    let lo = bus.peek(address.wrapping_add(1));
                    let hi = bus.peek(address.wrapping_add(2));
                    format!("${:04X}", u16::from_le_bytes([lo, hi]))
                }
                _ => String::new(),
            };
            let formatted_mnemonic = instr
                .mnemonic
                .replace("d16", &operand_str)
                .replace("a16", &operand_str)
                .replace("d8", &operand_str)
                .replace("a8", &operand_str)
                .replace("r8", &operand_str)
                .trim_end()
                .to_string();
            (formatted_mnemonic, instr.length)
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let z = if self.get_flag(FLAG_Z) { 'Z' } else { '-' };
        let n = if self.get_flag(FLAG_N) { 'N' } else { '-' };
        let h = if self.get_flag(FLAG_H) { 'H' } else { '-' };
        let c = if self.get_flag(FLAG_C) { 'C' } else { '-' };
        write!(
            f,
            "A:{:02X} B:{:02X} C:{:02X} D:{:02X} E:{:02X} H:{:02X} L:{:02X} PC:{:04X} SP:{:04X} Flags:[{}{}{}{}] IME:{}",
            self.a,
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
            self.pc,
            self.sp,
            z,
            n,
            h,
            c,
            if self.ime { "ON" } else { "OFF" },
        )
    }
}
