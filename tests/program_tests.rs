//! End-to-end programs run from the reset state, entry point 0x0100.

use matcha::cpu::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};
use matcha::machine::{Machine, Peripheral};
use matcha::memory_bus::MemoryBus;
use matcha::memory_map::{IF_ADDR, INTERRUPT_ENABLE_REGISTER};
use std::cell::Cell;
use std::rc::Rc;

fn machine_with(program: &[u8]) -> Machine {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    Machine::new(&rom)
}

fn flags(cpu: &Cpu) -> u8 {
    let (_, f, ..) = cpu.registers();
    f
}

#[test]
fn test_hello_arithmetic() {
    // LD A,10; LD B,5; ADD A,B; LD B,A
    let mut machine = machine_with(&[0x3E, 0x0A, 0x06, 0x05, 0x80, 0x47]);
    for _ in 0..4 {
        machine.step().unwrap();
    }
    let (a, f, b, ..) = machine.cpu.registers();
    assert_eq!(a, 0x0F);
    assert_eq!(b, 0x0F);
    assert_eq!(f & (FLAG_Z | FLAG_N | FLAG_H | FLAG_C), 0);
}

#[test]
fn test_half_carry_program() {
    // LD A,0x0F; INC A
    let mut machine = machine_with(&[0x3E, 0x0F, 0x3C]);
    let carry_before = flags(&machine.cpu) & FLAG_C;
    machine.step().unwrap();
    machine.step().unwrap();
    let (a, f, ..) = machine.cpu.registers();
    assert_eq!(a, 0x10);
    assert_eq!(f & FLAG_Z, 0);
    assert_eq!(f & FLAG_N, 0);
    assert_ne!(f & FLAG_H, 0);
    assert_eq!(f & FLAG_C, carry_before);
}

#[test]
fn test_call_and_return() {
    // 0x0100: CALL 0x0108; HALT ... 0x0108: RET
    let mut program = vec![0xCD, 0x08, 0x01, 0x76];
    program.resize(8, 0x00);
    program.push(0xC9);
    let mut machine = machine_with(&program);

    machine.step().unwrap(); // CALL
    assert_eq!(machine.cpu.pc(), 0x0108);
    assert_eq!(machine.cpu.sp(), 0xFFFC);
    machine.step().unwrap(); // RET
    assert_eq!(machine.cpu.pc(), 0x0103);
    assert_eq!(machine.cpu.sp(), 0xFFFE);
}

#[test]
fn test_push_pop_round_trip() {
    // LD BC,0x1234; PUSH BC; POP HL
    let mut machine = machine_with(&[0x01, 0x34, 0x12, 0xC5, 0xE1]);
    for _ in 0..3 {
        machine.step().unwrap();
    }
    assert_eq!(machine.cpu.hl(), 0x1234);
    assert_eq!(machine.cpu.sp(), 0xFFFE);
}

#[test]
fn test_vblank_dispatch() {
    // EI; NOP to let IME settle, then a NOP that gets hijacked.
    let mut machine = machine_with(&[0xFB, 0x00, 0x00, 0x00]);
    machine.step().unwrap();
    machine.step().unwrap();
    assert!(machine.cpu.ime());

    machine.bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x01);
    machine.bus.write_byte(IF_ADDR, 0x01);
    let cycles = machine.step().unwrap();
    assert_eq!(cycles, 5);
    assert_eq!(machine.cpu.pc(), 0x0040);
    assert!(!machine.cpu.ime());
    assert_eq!(machine.bus.read_byte(IF_ADDR) & 0x01, 0);
}

#[test]
fn test_daa_after_subtract() {
    // LD A,0x45; SUB 0x17; DAA
    let mut machine = machine_with(&[0x3E, 0x45, 0xD6, 0x17, 0x27]);
    for _ in 0..3 {
        machine.step().unwrap();
    }
    let (a, f, ..) = machine.cpu.registers();
    assert_eq!(a, 0x28);
    assert_ne!(f & FLAG_N, 0);
    assert_eq!(f & FLAG_Z, 0);
    assert_eq!(f & FLAG_C, 0);
}

/// Counts every cycle the machine hands it; used to check that peripherals
/// advance in exact lockstep with the CPU.
struct CountingClock {
    total: Rc<Cell<u64>>,
}

impl Peripheral for CountingClock {
    fn tick(&mut self, cycles: u16, _bus: &mut MemoryBus) {
        self.total.set(self.total.get() + cycles as u64);
    }
}

#[test]
fn test_peripherals_advance_in_lockstep() {
    // A mix of costs: loads, a taken jump, a push, idle HALT cycles.
    let mut machine = machine_with(&[
        0x3E, 0x0A, // LD A, d8
        0x01, 0x34, 0x12, // LD BC, d16
        0xC5, // PUSH BC
        0xC3, 0x0A, 0x01, // JP 0x010A
        0x00, // (skipped)
        0x76, // HALT at 0x010A
    ]);
    let total = Rc::new(Cell::new(0u64));
    machine.add_peripheral(Box::new(CountingClock {
        total: Rc::clone(&total),
    }));

    let mut reported = 0u64;
    for _ in 0..8 {
        reported += machine.step().unwrap() as u64;
    }
    assert_eq!(
        total.get(),
        reported,
        "every returned cycle is handed to the peripherals"
    );
    assert_eq!(reported, machine.cpu.total_cycles());
}

#[test]
fn test_peripheral_raises_interrupt_through_the_bus() {
    /// Requests a timer interrupt once a fixed number of cycles has passed.
    struct OneShotTimer {
        remaining: i64,
    }
    impl Peripheral for OneShotTimer {
        fn tick(&mut self, cycles: u16, bus: &mut MemoryBus) {
            if self.remaining > 0 {
                self.remaining -= cycles as i64;
                if self.remaining <= 0 {
                    bus.request_interrupt(matcha::memory_bus::InterruptSource::Timer);
                }
            }
        }
    }

    // EI; then spin on NOPs until the timer fires.
    let mut machine = machine_with(&[0xFB, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    machine.bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x04);
    machine.bus.write_byte(IF_ADDR, 0x00);
    machine.add_peripheral(Box::new(OneShotTimer { remaining: 4 }));

    let mut dispatched = false;
    for _ in 0..8 {
        machine.step().unwrap();
        if machine.cpu.pc() == 0x0050 {
            dispatched = true;
            break;
        }
    }
    assert!(dispatched, "the latched timer interrupt reached its vector");
}
