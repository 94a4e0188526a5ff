use crate::memory_map::*;
use log;

/// Collaborator owning the cartridge-mapped windows of the address space:
/// ROM (`0x0000-0x7FFF`) and external RAM (`0xA000-0xBFFF`).
///
/// The bus forwards every access in those windows here, including writes
/// into the ROM ranges - on real hardware those are bank-control signals,
/// and a mapper implementation decides what they mean.
pub trait Cartridge {
    /// Reads a byte from a cartridge-mapped address.
    fn map_read(&self, addr: u16) -> u8;

    /// Handles a write to a cartridge-mapped address. Writes into the ROM
    /// ranges are control hints (RAM enable, bank select); writes into the
    /// external RAM range store data if the cartridge allows it.
    fn map_write(&mut self, addr: u16, value: u8);

    /// Side-effect-free read for debuggers. Defaults to `map_read`.
    fn peek(&self, addr: u16) -> u8 {
        self.map_read(addr)
    }

    /// Side-effect-free write for debuggers. Defaults to `map_write`;
    /// implementations should override to bypass control semantics.
    fn poke(&mut self, addr: u16, value: u8) {
        self.map_write(addr, value);
    }
}

/// Flat 32 KiB cartridge with one optional external RAM bank and no mapper.
///
/// Writes into `0x0000-0x1FFF` gate the RAM (`0x0A` in the low nibble
/// enables, anything else disables); the remaining ROM-range writes are
/// accepted and ignored, since there are no banks to select.
pub struct RomOnlyCartridge {
    rom: Vec<u8>,
    ram: Box<[u8; EXT_RAM_SIZE]>,
    ram_enabled: bool,
}

impl RomOnlyCartridge {
    pub fn new(rom_data: &[u8]) -> Self {
        RomOnlyCartridge {
            rom: rom_data.to_vec(),
            ram: Box::new([0; EXT_RAM_SIZE]),
            ram_enabled: false,
        }
    }

    /// Replaces the ROM image, keeping RAM contents and gating state.
    pub fn load_rom(&mut self, rom_data: &[u8]) {
        self.rom = rom_data.to_vec();
    }
}

impl Cartridge for RomOnlyCartridge {
    fn map_read(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => {
                // Reads beyond the actual image float high, like an
                // unconnected data bus.
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            EXT_RAM_START..=EXT_RAM_END => {
                if self.ram_enabled {
                    self.ram[(addr - EXT_RAM_START) as usize]
                } else {
                    0xFF
                }
            }
            _ => 0xFF, // Not a cartridge-mapped address
        }
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => {
                self.ram_enabled = (value & 0x0F) == 0x0A;
            }
            0x2000..=0x7FFF => {
                // Bank-select hints; a flat cartridge has nothing to switch.
                log::trace!(
                    "Ignoring bank-control write {:#04X} at {:#06X} (no mapper)",
                    value,
                    addr
                );
            }
            EXT_RAM_START..=EXT_RAM_END => {
                if self.ram_enabled {
                    self.ram[(addr - EXT_RAM_START) as usize] = value;
                }
            }
            _ => {}
        }
    }

    fn poke(&mut self, addr: u16, value: u8) {
        // Debugger access patches the raw storage: ROM bytes in place,
        // RAM regardless of the enable gate.
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => {
                if let Some(byte) = self.rom.get_mut(addr as usize) {
                    *byte = value;
                }
            }
            EXT_RAM_START..=EXT_RAM_END => {
                self.ram[(addr - EXT_RAM_START) as usize] = value;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_ram_reads_open_bus() {
        let mut cart = RomOnlyCartridge::new(&[]);
        cart.map_write(0xA123, 0x55);
        assert_eq!(cart.map_read(0xA123), 0xFF, "disabled RAM should float high");
    }

    #[test]
    fn ram_enable_gate() {
        let mut cart = RomOnlyCartridge::new(&[]);
        cart.map_write(0x0000, 0x0A); // enable
        cart.map_write(0xA000, 0x42);
        assert_eq!(cart.map_read(0xA000), 0x42);

        cart.map_write(0x0000, 0x00); // disable
        assert_eq!(cart.map_read(0xA000), 0xFF);

        cart.map_write(0x1FFF, 0x1A); // low nibble 0x0A re-enables
        assert_eq!(cart.map_read(0xA000), 0x42, "RAM contents survive gating");
    }

    #[test]
    fn rom_is_not_writable_through_map_write() {
        let mut cart = RomOnlyCartridge::new(&[0x00, 0x11, 0x22]);
        cart.map_write(0x0002, 0x99);
        assert_eq!(cart.map_read(0x0002), 0x22);
    }

    #[test]
    fn poke_patches_rom() {
        let mut cart = RomOnlyCartridge::new(&[0x00; 16]);
        cart.poke(0x0004, 0x76);
        assert_eq!(cart.map_read(0x0004), 0x76);
    }

    #[test]
    fn reads_past_image_end_float_high() {
        let cart = RomOnlyCartridge::new(&[0xAB]);
        assert_eq!(cart.map_read(0x0000), 0xAB);
        assert_eq!(cart.map_read(0x7FFF), 0xFF);
    }
}
