use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::{MemoryMapper, Mmu};
use crate::hardware::GameBoyModel;

/// Places `bytes` at 0x0100, the post-boot program counter, so `Cpu::new` lands on them
/// immediately without a boot ROM to jump through.
fn cpu_with_rom(bytes: &[u8]) -> Cpu<Mmu> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x100..0x100 + bytes.len()].copy_from_slice(bytes);
    Cpu::new(Mmu::new(rom, None, GameBoyModel::Dmg, 44_100))
}

#[test]
fn nop_sled_advances_pc_and_enters_vblank_once_per_frame() {
    let mut cpu = cpu_with_rom(&[]); // an all-zero ROM is an all-NOP program
    let start_sp = cpu.registers().sp;
    let start_pc = cpu.registers().pc;

    let mut vblanks = 0;
    while cpu.cycles_performed < 70_224 {
        cpu.step();
        if cpu.mmu.take_frame_complete() {
            vblanks += 1;
        }
    }

    assert_eq!(vblanks, 1);
    assert_eq!(cpu.cycles_performed, 70_224);
    assert_eq!(cpu.registers().sp, start_sp);
    assert_eq!(cpu.registers().pc, start_pc.wrapping_add(17_556));
}

#[test]
fn xor_a_clears_accumulator_and_sets_zero_flag() {
    let mut cpu = cpu_with_rom(&[0xAF]); // XOR A
    let start_pc = cpu.registers().pc;
    cpu.step();

    assert_eq!(cpu.registers().a, 0x00);
    assert_eq!(cpu.registers().f(), 0x80);
    assert_eq!(cpu.registers().pc, start_pc.wrapping_add(1));
}

#[test]
fn add_a_a_from_0x80_sets_zero_and_carry_but_not_half_carry() {
    let mut cpu = cpu_with_rom(&[0x87]); // ADD A,A
    cpu.set_a_for_test(0x80);
    cpu.step();

    assert_eq!(cpu.registers().a, 0x00);
    // low nibble sum is 0+0, so H is clear; only Z and C are set.
    assert_eq!(cpu.registers().f(), 0x90);
}

#[test]
fn daa_corrects_bcd_after_an_overflowing_add() {
    let mut cpu = cpu_with_rom(&[0xC6, 0x38, 0x27]); // ADD A,0x38 ; DAA
    cpu.set_a_for_test(0x45);

    cpu.step(); // ADD A,0x38
    assert_eq!(cpu.registers().a, 0x7D);
    assert_eq!(cpu.registers().f(), 0x20);

    cpu.step(); // DAA
    assert_eq!(cpu.registers().a, 0x83);
    assert_eq!(cpu.registers().f(), 0x00);
}

#[test]
fn add_sp_wraps_with_a_negative_offset_and_clears_flags_on_zero_low_byte() {
    let mut cpu = cpu_with_rom(&[0xE8, 0x80]); // ADD SP,-128
    cpu.step();

    assert_eq!(cpu.registers().sp, 0xFF80);
    assert_eq!(cpu.registers().f(), 0x00);
}

impl<M: crate::hardware::mmu::MemoryMapper> Cpu<M> {
    /// Test-only helper: most scenarios need to seed `A` without depending on a preceding `LD`.
    fn set_a_for_test(&mut self, value: u8) {
        use crate::hardware::cpu::traits::SetU8;
        self.set_u8_value(crate::hardware::cpu::registers::Reg8::A, value);
    }
}
