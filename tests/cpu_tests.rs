use matcha::cpu::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};
use matcha::memory_bus::MemoryBus;
use matcha::memory_map::{IF_ADDR, INTERRUPT_ENABLE_REGISTER};

const NOP: u8 = 0x00;
const HALT: u8 = 0x76;
const INC_A: u8 = 0x3C;
const EI: u8 = 0xFB;

/// Builds a reset CPU and a bus whose ROM carries `program` at the
/// 0x0100 entry point.
fn bootstrap(program: &[u8]) -> (Cpu, MemoryBus) {
    // RUST_LOG=trace cargo test -- --nocapture
    // let _ = env_logger::builder().is_test(true).try_init();
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    let mut bus = MemoryBus::new();
    bus.load_rom(&rom);
    (Cpu::new(), bus)
}

fn flags(cpu: &Cpu) -> u8 {
    let (_, f, ..) = cpu.registers();
    f
}

#[test]
fn test_ei_delay_timing() {
    let (mut cpu, mut bus) = bootstrap(&[EI, NOP, NOP]);
    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x01);
    bus.write_byte(IF_ADDR, 0x01);

    cpu.step(&mut bus).unwrap(); // EI
    assert!(!cpu.ime(), "IME should not be enabled immediately after EI");

    let cycles = cpu.step(&mut bus).unwrap(); // the following NOP still runs
    assert_eq!(cycles, 1, "the instruction after EI executes normally");
    assert!(cpu.ime(), "IME should be enabled after the instruction following EI");
    assert_eq!(cpu.pc(), 0x0102, "no dispatch yet, NOP completed");

    let cycles = cpu.step(&mut bus).unwrap(); // now the interrupt hijacks
    assert_eq!(cycles, 5, "interrupt dispatch costs 5 machine cycles");
    assert_eq!(cpu.pc(), 0x0040, "PC should be at the V-Blank vector");
}

#[test]
fn test_interrupt_dispatch_state() {
    let (mut cpu, mut bus) = bootstrap(&[EI, NOP, NOP, NOP]);
    cpu.step(&mut bus).unwrap(); // EI
    cpu.step(&mut bus).unwrap(); // NOP; IME now set
    assert!(cpu.ime());

    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x01);
    bus.write_byte(IF_ADDR, 0x01);
    let sp_before = cpu.sp();

    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 5);
    assert_eq!(cpu.pc(), 0x0040);
    assert!(!cpu.ime(), "dispatch clears IME");
    assert_eq!(
        bus.read_byte(IF_ADDR) & 0x01,
        0,
        "the serviced bit is acknowledged in IF"
    );
    assert_eq!(cpu.sp(), sp_before.wrapping_sub(2));
    assert_eq!(
        bus.read_word(cpu.sp()),
        0x0102,
        "the interrupted PC is on the stack"
    );
}

#[test]
fn test_interrupt_priority_vblank_first() {
    let (mut cpu, mut bus) = bootstrap(&[EI, NOP, NOP]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();

    // All five sources pending and enabled: V-Blank wins.
    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x1F);
    bus.write_byte(IF_ADDR, 0x1F);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc(), 0x0040);
    assert_eq!(bus.read_byte(IF_ADDR) & 0x1F, 0x1E, "only bit 0 acknowledged");
}

#[test]
fn test_halt_idles_then_wakes_without_dispatch() {
    let (mut cpu, mut bus) = bootstrap(&[HALT, INC_A]);

    cpu.step(&mut bus).unwrap(); // HALT
    assert!(cpu.halted());

    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 1, "a parked CPU idles at one cycle per step");
    assert!(cpu.halted());

    // An interrupt becomes pending while IME is clear: the CPU wakes but
    // does not dispatch.
    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x04);
    bus.write_byte(IF_ADDR, 0x04);
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 1, "wake-up costs one cycle");
    assert!(!cpu.halted());
    assert_eq!(cpu.pc(), 0x0101, "execution resumes after HALT");

    cpu.step(&mut bus).unwrap(); // INC A runs normally
    let (a, ..) = cpu.registers();
    assert_eq!(a, 0x02);
    assert_eq!(cpu.pc(), 0x0102, "no vector was taken");
}

#[test]
fn test_halt_with_pending_interrupt_and_ime_clear_skips_halting() {
    let (mut cpu, mut bus) = bootstrap(&[HALT, INC_A]);
    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x01);
    bus.write_byte(IF_ADDR, 0x01);

    cpu.step(&mut bus).unwrap();
    assert!(!cpu.halted(), "HALT with IME=0 and a pending interrupt does not park");

    cpu.step(&mut bus).unwrap();
    let (a, ..) = cpu.registers();
    assert_eq!(a, 0x02, "the next instruction executed immediately");
}

#[test]
fn test_stop_parks_until_joypad() {
    // STOP is two bytes; the operand byte is skipped.
    let (mut cpu, mut bus) = bootstrap(&[0x10, 0x00, INC_A]);
    cpu.step(&mut bus).unwrap();
    assert!(cpu.stopped());
    assert_eq!(cpu.pc(), 0x0102);

    // A non-joypad interrupt does not end STOP.
    bus.write_byte(INTERRUPT_ENABLE_REGISTER, 0x1F);
    bus.write_byte(IF_ADDR, 0x04);
    assert_eq!(cpu.step(&mut bus).unwrap(), 1);
    assert!(cpu.stopped());

    bus.write_byte(IF_ADDR, 0x10); // joypad
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.stopped());
}

#[test]
fn test_reti_enables_ime_immediately() {
    let mut program = vec![0xCD, 0x08, 0x01, NOP]; // CALL 0x0108
    program.resize(8, NOP);
    program.push(0xD9); // RETI at 0x0108
    let (mut cpu, mut bus) = bootstrap(&program);

    cpu.step(&mut bus).unwrap(); // CALL
    assert_eq!(cpu.pc(), 0x0108);
    let cycles = cpu.step(&mut bus).unwrap(); // RETI
    assert_eq!(cycles, 4);
    assert_eq!(cpu.pc(), 0x0103);
    assert!(cpu.ime(), "RETI sets IME without the EI delay");
}

#[test]
fn test_di_clears_ime() {
    let (mut cpu, mut bus) = bootstrap(&[EI, NOP, 0xF3, NOP]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.ime());
    cpu.step(&mut bus).unwrap(); // DI
    assert!(!cpu.ime());
}

#[test]
fn test_inc_wraps_with_half_carry() {
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0xFF, INC_A]); // LD A,0xFF; INC A
    let carry_before = flags(&cpu) & FLAG_C;
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x00);
    assert_ne!(f & FLAG_Z, 0);
    assert_ne!(f & FLAG_H, 0);
    assert_eq!(f & FLAG_N, 0);
    assert_eq!(f & FLAG_C, carry_before, "INC never touches the carry");
}

#[test]
fn test_dec_wraps_with_half_borrow() {
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x00, 0x3D]); // LD A,0x00; DEC A
    let carry_before = flags(&cpu) & FLAG_C;
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0xFF);
    assert_eq!(f & FLAG_Z, 0);
    assert_ne!(f & FLAG_H, 0);
    assert_ne!(f & FLAG_N, 0);
    assert_eq!(f & FLAG_C, carry_before, "DEC never touches the carry");
}

#[test]
fn test_add_a_a_half_carry_boundary() {
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x08, 0x87]); // LD A,0x08; ADD A,A
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x10);
    assert_ne!(f & FLAG_H, 0, "carry out of bit 3");
    assert_eq!(f & FLAG_C, 0);
    assert_eq!(f & FLAG_Z, 0);
}

#[test]
fn test_add_sp_negative_offset() {
    // LD SP,0x0001; ADD SP,-1
    let (mut cpu, mut bus) = bootstrap(&[0x31, 0x01, 0x00, 0xE8, 0xFF]);
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 4);
    assert_eq!(cpu.sp(), 0x0000);
    let f = flags(&cpu);
    assert_ne!(f & FLAG_H, 0, "H from the unsigned low-byte add");
    assert_ne!(f & FLAG_C, 0, "C from the unsigned low-byte add");
    assert_eq!(f & FLAG_Z, 0, "Z is forced clear even though SP is zero");
    assert_eq!(f & FLAG_N, 0);
}

#[test]
fn test_ld_hl_sp_offset() {
    // LD SP,0xFFF8; LD HL,SP+8
    let (mut cpu, mut bus) = bootstrap(&[0x31, 0xF8, 0xFF, 0xF8, 0x08]);
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 3);
    assert_eq!(cpu.hl(), 0x0000);
    assert_eq!(cpu.sp(), 0xFFF8, "SP itself is untouched");
    let f = flags(&cpu);
    assert_ne!(f & FLAG_H, 0);
    assert_ne!(f & FLAG_C, 0);
    assert_eq!(f & (FLAG_Z | FLAG_N), 0);
}

#[test]
fn test_add_hl_preserves_zero_flag() {
    // XOR A sets Z; ADD HL,BC must leave it alone.
    let (mut cpu, mut bus) = bootstrap(&[0xAF, 0x01, 0xFF, 0x0F, 0x09]); // XOR A; LD BC,0x0FFF; ADD HL,BC
    cpu.step(&mut bus).unwrap();
    assert_ne!(flags(&cpu) & FLAG_Z, 0);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let f = flags(&cpu);
    assert_ne!(f & FLAG_Z, 0, "ADD HL,rr preserves Z");
    // HL was 0x014D at reset: 0x014D + 0x0FFF = 0x114C, carry out of bit 11.
    assert_eq!(cpu.hl(), 0x114C);
    assert_ne!(f & FLAG_H, 0);
    assert_eq!(f & FLAG_C, 0);
}

#[test]
fn test_daa_packs_bcd_after_addition() {
    // LD A,0x15; ADD A,0x27; DAA -> 15 + 27 = 42 in BCD
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x15, 0xC6, 0x27, 0x27]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x42);
    assert_eq!(f & FLAG_C, 0);
}

#[test]
fn test_daa_after_add_with_half_carry() {
    // LD A,0x38; ADD A,A; DAA -> 38 + 38 = 76 in BCD
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x38, 0x87, 0x27]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, ..) = cpu.registers();
    assert_eq!(a, 0x76);
}

#[test]
fn test_daa_after_subtraction() {
    // LD A,0x45; SUB 0x17; DAA -> 45 - 17 = 28 in BCD
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x45, 0xD6, 0x17, 0x27]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x28);
    assert_ne!(f & FLAG_N, 0, "DAA leaves N alone");
    assert_eq!(f & FLAG_Z, 0);
    assert_eq!(f & FLAG_C, 0);
}

#[test]
fn test_cpl_twice_is_identity() {
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x5A, 0x2F, 0x2F]); // LD A,0x5A; CPL; CPL
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x5A);
    assert_ne!(f & FLAG_N, 0);
    assert_ne!(f & FLAG_H, 0);
}

#[test]
fn test_scf_then_ccf() {
    let (mut cpu, mut bus) = bootstrap(&[0x37, 0x3F]); // SCF; CCF
    cpu.step(&mut bus).unwrap();
    assert_ne!(flags(&cpu) & FLAG_C, 0);
    cpu.step(&mut bus).unwrap();
    let f = flags(&cpu);
    assert_eq!(f & FLAG_C, 0, "CCF toggles the carry back off");
    assert_eq!(f & (FLAG_N | FLAG_H), 0);
}

#[test]
fn test_rotate_a_clears_zero_flag() {
    // XOR A leaves A=0 and Z=1; RLCA must clear Z even on a zero result.
    let (mut cpu, mut bus) = bootstrap(&[0xAF, 0x07]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x00);
    assert_eq!(f & FLAG_Z, 0, "RLCA always clears Z");
}

#[test]
fn test_rra_uses_old_carry() {
    // SCF; LD A,0x00; RRA -> the old carry rotates into bit 7.
    let (mut cpu, mut bus) = bootstrap(&[0x37, 0x3E, 0x00, 0x1F]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x80);
    assert_eq!(f & FLAG_C, 0, "bit 0 of 0x00 shifts out");
}

#[test]
fn test_cb_rlc_rrc_round_trip() {
    // LD B,0x81; RLC B; RRC B -> B back to 0x81
    let (mut cpu, mut bus) = bootstrap(&[0x06, 0x81, 0xCB, 0x00, 0xCB, 0x08]);
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 2, "CB register ops cost two machine cycles");
    let (_, _, b, ..) = cpu.registers();
    assert_eq!(b, 0x03, "RLC 0x81 -> 0x03 with carry");
    assert_ne!(flags(&cpu) & FLAG_C, 0);
    cpu.step(&mut bus).unwrap();
    let (_, _, b, ..) = cpu.registers();
    assert_eq!(b, 0x81, "RRC undoes RLC");
}

#[test]
fn test_cb_bit_checks_register() {
    // BIT 7,H with H=0x01 (reset value): bit clear -> Z set, H flag set.
    let (mut cpu, mut bus) = bootstrap(&[0xCB, 0x7C]);
    let carry_before = flags(&cpu) & FLAG_C;
    cpu.step(&mut bus).unwrap();
    let f = flags(&cpu);
    assert_ne!(f & FLAG_Z, 0);
    assert_eq!(f & FLAG_N, 0);
    assert_ne!(f & FLAG_H, 0);
    assert_eq!(f & FLAG_C, carry_before, "BIT leaves the carry alone");
}

#[test]
fn test_cb_swap_clears_carry() {
    let (mut cpu, mut bus) = bootstrap(&[0x37, 0x3E, 0xF0, 0xCB, 0x37]); // SCF; LD A,0xF0; SWAP A
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x0F);
    assert_eq!(f & FLAG_C, 0, "SWAP clears the carry");
    assert_eq!(f & FLAG_Z, 0);
}

#[test]
fn test_cb_set_res_on_memory() {
    // LD HL,0xC000; SET 3,(HL); RES 3,(HL)
    let (mut cpu, mut bus) = bootstrap(&[0x21, 0x00, 0xC0, 0xCB, 0xDE, 0xCB, 0x9E]);
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 4, "CB read-modify-write on (HL) costs four cycles");
    assert_eq!(bus.read_byte(0xC000), 0x08);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read_byte(0xC000), 0x00);
}

#[test]
fn test_cb_bit_hl_cycle_cost() {
    let (mut cpu, mut bus) = bootstrap(&[0x21, 0x00, 0xC0, 0xCB, 0x46]); // LD HL,0xC000; BIT 0,(HL)
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 3, "BIT on (HL) reads but never writes back");
}

#[test]
fn test_conditional_jr_costs() {
    // XOR A sets Z. JR NZ (not taken) then JR Z (taken, -2 lands on itself).
    let (mut cpu, mut bus) = bootstrap(&[0xAF, 0x20, 0x02, 0x28, 0xFE]);
    cpu.step(&mut bus).unwrap();
    let not_taken = cpu.step(&mut bus).unwrap();
    assert_eq!(not_taken, 2);
    assert_eq!(cpu.pc(), 0x0103, "fall through past the operand");
    let taken = cpu.step(&mut bus).unwrap();
    assert_eq!(taken, 3);
    assert_eq!(cpu.pc(), 0x0103, "JR Z,-2 re-enters itself");
}

#[test]
fn test_conditional_call_and_ret_costs() {
    // XOR A sets Z: CALL NZ not taken (3), CALL Z taken (6),
    // then at the target RET NC taken (5).
    let mut program = vec![0xAF, 0xC4, 0x00, 0x02, 0xCC, 0x10, 0x01];
    program.resize(0x10, NOP);
    program.push(0xD0); // RET NC at 0x0110
    let (mut cpu, mut bus) = bootstrap(&program);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 3, "CALL NZ falls through");
    assert_eq!(cpu.pc(), 0x0104);
    assert_eq!(cpu.step(&mut bus).unwrap(), 6, "CALL Z branches");
    assert_eq!(cpu.pc(), 0x0110);
    assert_eq!(cpu.step(&mut bus).unwrap(), 5, "RET NC branches");
    assert_eq!(cpu.pc(), 0x0107);
    assert_eq!(cpu.sp(), 0xFFFE);
}

#[test]
fn test_jp_hl_costs_one_cycle() {
    let (mut cpu, mut bus) = bootstrap(&[0x21, 0x00, 0x02, 0xE9]); // LD HL,0x0200; JP HL
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(cpu.pc(), 0x0200);
}

#[test]
fn test_ld_r_r_same_register_is_motionless() {
    let (mut cpu, mut bus) = bootstrap(&[0x40]); // LD B,B
    let before = cpu.registers();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(cpu.registers(), before, "registers and flags unchanged");
    assert_eq!(cpu.pc(), 0x0101);
}

#[test]
fn test_push_little_endian_stack_layout() {
    let (mut cpu, mut bus) = bootstrap(&[0x01, 0x34, 0x12, 0xC5]); // LD BC,0x1234; PUSH BC
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 4);
    assert_eq!(cpu.sp(), 0xFFFC);
    assert_eq!(bus.read_byte(0xFFFC), 0x34, "low byte at SP");
    assert_eq!(bus.read_byte(0xFFFD), 0x12, "high byte at SP+1");
}

#[test]
fn test_pop_af_masks_flag_low_nibble() {
    // LD BC,0x12FF; PUSH BC; POP AF
    let (mut cpu, mut bus) = bootstrap(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x12);
    assert_eq!(f, 0xF0, "low nibble of F reads as zero");
}

#[test]
fn test_push_af_pop_af_round_trip() {
    // LD A,0x3C; PUSH AF; POP AF
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x3C, 0xF5, 0xF1]);
    cpu.step(&mut bus).unwrap();
    let f_before = flags(&cpu);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let (a, f, ..) = cpu.registers();
    assert_eq!(a, 0x3C);
    assert_eq!(f, f_before & 0xF0);
    assert_eq!(cpu.sp(), 0xFFFE);
}

#[test]
fn test_ld_a16_sp_stores_full_word() {
    // LD SP,0xBEEF... SP is 0xFFFE at reset; store it to WRAM.
    let (mut cpu, mut bus) = bootstrap(&[0x08, 0x00, 0xC0]); // LD (0xC000),SP
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 5);
    assert_eq!(bus.read_byte(0xC000), 0xFE, "low byte first");
    assert_eq!(bus.read_byte(0xC001), 0xFF);
}

#[test]
fn test_ldh_window() {
    // LD A,0x5A; LDH (0x80),A; LDH A,(0x80) targets HRAM at 0xFF80.
    let (mut cpu, mut bus) = bootstrap(&[0x3E, 0x5A, 0xE0, 0x80, 0xF0, 0x80]);
    cpu.step(&mut bus).unwrap();
    let cycles = cpu.step(&mut bus).unwrap();
    assert_eq!(cycles, 3);
    assert_eq!(bus.read_byte(0xFF80), 0x5A);
    cpu.step(&mut bus).unwrap();
    let (a, ..) = cpu.registers();
    assert_eq!(a, 0x5A);
}

#[test]
fn test_hl_post_increment_and_decrement() {
    // LD HL,0xC000; LD (HL+),A; LD (HL-),A
    let (mut cpu, mut bus) = bootstrap(&[0x21, 0x00, 0xC0, 0x22, 0x32]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.hl(), 0xC001, "HL moved after the store");
    assert_eq!(bus.read_byte(0xC000), 0x01);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.hl(), 0xC000);
    assert_eq!(bus.read_byte(0xC001), 0x01);
}

#[test]
fn test_unimplemented_opcodes_report_faults() {
    for opcode in [
        0xD3u8, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ] {
        let (mut cpu, mut bus) = bootstrap(&[opcode]);
        let result = cpu.step(&mut bus);
        let err = result.expect_err("undefined opcodes must fault");
        assert!(
            err.contains("unimplemented opcode"),
            "fault message should name the condition, got: {}",
            err
        );
        assert!(
            err.contains("0x0100"),
            "fault message should carry the PC, got: {}",
            err
        );
    }
}

#[test]
fn test_pc_advance_matches_operand_length() {
    // One instruction of each length, none of which branch.
    let (mut cpu, mut bus) = bootstrap(&[NOP, 0x3E, 0x07, 0x01, 0x34, 0x12]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc(), 0x0101);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc(), 0x0103);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc(), 0x0106);
}

#[test]
fn test_total_cycles_accumulates() {
    let (mut cpu, mut bus) = bootstrap(&[NOP, 0x01, 0x34, 0x12, 0xC5]); // NOP; LD BC; PUSH BC
    let mut sum = 0u64;
    for _ in 0..3 {
        sum += cpu.step(&mut bus).unwrap() as u64;
    }
    assert_eq!(sum, 8);
    assert_eq!(cpu.total_cycles(), 8);
}

#[test]
fn test_disassembler_formats_operands() {
    let (cpu, bus) = bootstrap(&[0x3E, 0x0A, 0xC3, 0x00, 0x02, 0xCB, 0x37]);
    let (text, len) = cpu.disassemble_instruction(0x0100, &bus);
    assert_eq!(text, "LD A, $0A");
    assert_eq!(len, 2);
    let (text, len) = cpu.disassemble_instruction(0x0102, &bus);
    assert_eq!(text, "JP $0200");
    assert_eq!(len, 3);
    let (text, len) = cpu.disassemble_instruction(0x0105, &bus);
    assert_eq!(text, "SWAP A");
    assert_eq!(len, 2);
}
