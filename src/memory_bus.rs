use crate::cartridge::{Cartridge, RomOnlyCartridge};
use crate::io::{IoDevice, IoRegisters};
use crate::memory_map::*;
use std::fmt;

/// The five interrupt sources, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl InterruptSource {
    /// Bit position of this source in the IF and IE registers.
    pub fn bit(self) -> u8 {
        match self {
            InterruptSource::VBlank => VBLANK_INTERRUPT_BIT,
            InterruptSource::LcdStat => LCD_STAT_INTERRUPT_BIT,
            InterruptSource::Timer => TIMER_INTERRUPT_BIT,
            InterruptSource::Serial => SERIAL_INTERRUPT_BIT,
            InterruptSource::Joypad => JOYPAD_INTERRUPT_BIT,
        }
    }
}

/// Routes the 64 KiB address space to its regions.
///
/// The bus owns VRAM, both work RAM banks, OAM, and HRAM directly.
/// The cartridge-mapped windows (ROM, external RAM) and the I/O register
/// window delegate to collaborator traits, so mappers and peripherals
/// stay outside the core. Echo RAM re-enters the router at
/// `addr - 0x2000`, which keeps the mirror exact by construction.
pub struct MemoryBus {
    cartridge: Box<dyn Cartridge>,
    io: Box<dyn IoDevice>,

    vram: Box<[u8; VRAM_SIZE]>,
    wram_bank_0: Box<[u8; WRAM_BANK_0_SIZE]>,
    wram_bank_n: Box<[u8; WRAM_BANK_N_SIZE]>,
    oam: Box<[u8; OAM_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,
    interrupt_enable: u8, // FFFF (IE Register)
}

impl MemoryBus {
    pub fn new() -> Self {
        MemoryBus {
            cartridge: Box::new(RomOnlyCartridge::new(&[])),
            io: Box::new(IoRegisters::new()),
            vram: Box::new([0; VRAM_SIZE]),
            wram_bank_0: Box::new([0; WRAM_BANK_0_SIZE]),
            wram_bank_n: Box::new([0; WRAM_BANK_N_SIZE]),
            oam: Box::new([0; OAM_SIZE]),
            hram: Box::new([0; HRAM_SIZE]),
            interrupt_enable: 0x00, // IE register starts at 0x00
        }
    }

    /// Installs a fresh flat cartridge holding `rom_data`.
    pub fn load_rom(&mut self, rom_data: &[u8]) {
        log::info!("Loaded ROM: {} bytes (flat mapping)", rom_data.len());
        self.cartridge = Box::new(RomOnlyCartridge::new(rom_data));
    }

    /// Replaces the cartridge collaborator (e.g. with a real mapper model).
    pub fn set_cartridge(&mut self, cartridge: Box<dyn Cartridge>) {
        self.cartridge = cartridge;
    }

    /// Replaces the I/O collaborator (e.g. with a peripheral complex).
    pub fn set_io_device(&mut self, io: Box<dyn IoDevice>) {
        self.io = io;
    }

    // --- Interrupt Request Helper ---
    /// Latches an interrupt request by setting its bit in IF (0xFF0F).
    pub fn request_interrupt(&mut self, source: InterruptSource) {
        let current_if = self.io.io_read(IF_ADDR);
        self.io.io_write(IF_ADDR, current_if | (1 << source.bit()));
    }

    // --- Read/Write ---

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            // ROM (cartridge-mapped, banks included)
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge.map_read(addr),
            // Video RAM (VRAM)
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize],
            // External RAM (cartridge-mapped, gating included)
            EXT_RAM_START..=EXT_RAM_END => self.cartridge.map_read(addr),
            // Work RAM Bank 0
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize]
            }
            // Work RAM Bank N (Fixed Bank 1 on DMG)
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize]
            }
            // Echo RAM
            ECHO_RAM_START..=ECHO_RAM_END => self.read_byte(addr - ECHO_RAM_OFFSET),
            // OAM
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            // Not Usable Area
            NOT_USABLE_START..=NOT_USABLE_END => 0xFF,
            // I/O Registers (collaborator-owned, reads may have side effects)
            IO_REGISTERS_START..=IO_REGISTERS_END => self.io.io_read(addr),
            // High RAM (HRAM)
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            // Interrupt Enable Register (IE)
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        match addr {
            // ROM ranges: forwarded to the cartridge as bank-control hints,
            // never stored.
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge.map_write(addr, value),
            VRAM_START..=VRAM_END => {
                self.vram[(addr - VRAM_START) as usize] = value;
            }
            EXT_RAM_START..=EXT_RAM_END => self.cartridge.map_write(addr, value),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize] = value;
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize] = value;
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.write_byte(addr - ECHO_RAM_OFFSET, value),
            OAM_START..=OAM_END => {
                self.oam[(addr - OAM_START) as usize] = value;
            }
            NOT_USABLE_START..=NOT_USABLE_END => { /* Write Ignored */ }
            IO_REGISTERS_START..=IO_REGISTERS_END => self.io.io_write(addr, value),
            HRAM_START..=HRAM_END => {
                self.hram[(addr - HRAM_START) as usize] = value;
            }
            INTERRUPT_ENABLE_REGISTER => {
                self.interrupt_enable = value & INTERRUPT_MASK; // Only lower 5 bits used
            }
        }
    }

    /// Reads a 16-bit word (Little Endian).
    pub fn read_word(&self, addr: u16) -> u16 {
        let low = self.read_byte(addr) as u16;
        let high = self.read_byte(addr.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Writes a 16-bit word (Little Endian).
    pub fn write_word(&mut self, addr: u16, value: u16) {
        let low = (value & 0xFF) as u8;
        let high = (value >> 8) as u8;
        self.write_byte(addr, low);
        self.write_byte(addr.wrapping_add(1), high);
    }

    // --- Diagnostic Access ---

    /// Reads a byte without triggering collaborator side effects.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge.peek(addr),
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize],
            EXT_RAM_START..=EXT_RAM_END => self.cartridge.peek(addr),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize]
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize]
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.peek(addr - ECHO_RAM_OFFSET),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            NOT_USABLE_START..=NOT_USABLE_END => 0xFF,
            IO_REGISTERS_START..=IO_REGISTERS_END => self.io.peek(addr),
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable,
        }
    }

    /// Writes a byte without triggering collaborator side effects.
    pub fn poke(&mut self, addr: u16, value: u8) {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge.poke(addr, value),
            VRAM_START..=VRAM_END => {
                self.vram[(addr - VRAM_START) as usize] = value;
            }
            EXT_RAM_START..=EXT_RAM_END => self.cartridge.poke(addr, value),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize] = value;
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize] = value;
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.poke(addr - ECHO_RAM_OFFSET, value),
            OAM_START..=OAM_END => {
                self.oam[(addr - OAM_START) as usize] = value;
            }
            NOT_USABLE_START..=NOT_USABLE_END => { /* Write Ignored */ }
            IO_REGISTERS_START..=IO_REGISTERS_END => self.io.poke(addr, value),
            HRAM_START..=HRAM_END => {
                self.hram[(addr - HRAM_START) as usize] = value;
            }
            INTERRUPT_ENABLE_REGISTER => {
                self.interrupt_enable = value & INTERRUPT_MASK;
            }
        }
    }

    /// Stages a byte sequence at `addr` through `poke`, for debuggers and
    /// test fixtures that need to plant code or data anywhere in the map.
    pub fn poke_slice(&mut self, addr: u16, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.poke(addr.wrapping_add(i as u16), *byte);
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("IE", &format_args!("{:#04X}", self.interrupt_enable))
            .field("IF", &format_args!("{:#04X}", self.io.peek(IF_ADDR)))
            // Avoid printing large arrays
            .finish_non_exhaustive()
    }
}
