use crate::cpu::{Cpu, CpuResult};
use crate::memory_bus::MemoryBus;
use log;

/// A hardware block advanced in lockstep with the CPU.
///
/// After every instruction the machine hands each peripheral the
/// machine-cycle count that instruction consumed. Peripherals latch
/// interrupts by writing IF through the bus; the CPU samples them between
/// instructions.
pub trait Peripheral {
    fn tick(&mut self, cycles: u16, bus: &mut MemoryBus);
}

/// The CPU, the bus, and the peripherals wired together.
///
/// Everything is single-threaded and synchronous: `step` runs exactly one
/// instruction (or one interrupt dispatch, or one idle cycle) and then
/// advances every peripheral by the cycles it took.
pub struct Machine {
    pub cpu: Cpu,
    pub bus: MemoryBus,
    peripherals: Vec<Box<dyn Peripheral>>,
}

impl Machine {
    /// Builds a machine with `rom` mapped in and everything at reset state.
    pub fn new(rom: &[u8]) -> Self {
        let mut bus = MemoryBus::new();
        bus.load_rom(rom);
        Machine {
            cpu: Cpu::new(),
            bus,
            peripherals: Vec::new(),
        }
    }

    pub fn add_peripheral(&mut self, peripheral: Box<dyn Peripheral>) {
        self.peripherals.push(peripheral);
    }

    /// Runs one instruction and advances every peripheral by the cycles
    /// it consumed. Returns that cycle count.
    pub fn step(&mut self) -> CpuResult<u16> {
        let cycles = self.cpu.step(&mut self.bus)?;
        for peripheral in &mut self.peripherals {
            peripheral.tick(cycles, &mut self.bus);
        }
        Ok(cycles)
    }

    /// Steps up to `max_steps` instructions, stopping early on a CPU
    /// fault. Returns the total machine cycles executed.
    pub fn run(&mut self, max_steps: u64) -> CpuResult<u64> {
        let mut total_cycles: u64 = 0;
        for _ in 0..max_steps {
            total_cycles += self.step()? as u64;
        }
        log::debug!("Ran {} machine cycles", total_cycles);
        Ok(total_cycles)
    }
}
