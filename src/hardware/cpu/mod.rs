//! The Sharp LR35902 core: fetch/decode/execute loop, the full opcode table, and interrupt
//! dispatch. Every memory access ticks the rest of the hardware via [`MemoryMapper::tick`], so
//! there is no separate event scheduler: the CPU is the master clock.

use crate::hardware::cpu::execute::{InstructionAddress, JumpModifier, WrapperEnum};
use crate::hardware::cpu::registers::{Reg16, Reg8, Registers};
use crate::hardware::cpu::registers::Reg8::A;
use crate::hardware::cpu::traits::{SetU16, SetU8, ToU16, ToU8};
use crate::hardware::mmu::MemoryMapper;

use std::fmt::Debug;

mod alu;
pub mod execute;
mod fetch;
pub mod registers;
mod traits;

#[cfg(test)]
mod tests;

#[derive(Debug)]
pub struct Cpu<M: MemoryMapper> {
    pub cycles_performed: u64,
    pub ime: bool,
    pub halted: bool,
    pub mmu: M,
    opcode: u8,
    registers: Registers,
    /// EI's effect is delayed until after the instruction following it has executed.
    delayed_ime: bool,
    /// Set when HALT is executed with IME=0 and an interrupt already pending: the byte
    /// following HALT is fetched twice because PC fails to advance the first time.
    halt_bug: bool,
}

impl<M: MemoryMapper> Cpu<M> {
    pub fn new(mmu: M) -> Self {
        Cpu {
            opcode: 0,
            registers: Registers::post_boot(),
            mmu,
            halted: false,
            cycles_performed: 0,
            ime: false,
            delayed_ime: false,
            halt_bug: false,
        }
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// `(af, bc, de, hl, sp, pc)` for save-state serialization.
    pub fn register_snapshot(&self) -> (u16, u16, u16, u16, u16, u16) {
        (
            self.registers.af(),
            self.registers.bc(),
            self.registers.de(),
            self.registers.hl(),
            self.registers.sp,
            self.registers.pc,
        )
    }

    pub fn restore_registers(&mut self, af: u16, bc: u16, de: u16, hl: u16, sp: u16, pc: u16) {
        self.registers.set_af(af);
        self.registers.set_bc(bc);
        self.registers.set_de(de);
        self.registers.set_hl(hl);
        self.registers.sp = sp;
        self.registers.pc = pc;
    }

    /// Restores the register file to the post-boot state; the rest of the machine (cartridge,
    /// WRAM, VRAM) is untouched, matching the external reset contract.
    pub fn reset_registers(&mut self) {
        self.registers = Registers::post_boot();
        self.ime = false;
        self.delayed_ime = false;
        self.halted = false;
        self.halt_bug = false;
        self.cycles_performed = 0;
    }

    /// Fetches and executes one instruction, or advances one tick while halted.
    pub fn step(&mut self) {
        if self.delayed_ime {
            self.ime = true;
            self.delayed_ime = false;
        }

        if self.halted {
            self.add_cycles();
            if self.handle_interrupts() {
                self.halted = false;
            }
            return;
        }

        self.handle_interrupts();

        self.opcode = self.get_instr_u8();
        if self.halt_bug {
            self.registers.pc = self.registers.pc.wrapping_sub(1);
            self.halt_bug = false;
        }

        self.execute(self.opcode);
    }

    fn nop(&mut self) {}

    fn load_16bit<T: Copy, U: Copy>(&mut self, destination: T, source: U)
    where
        Self: SetU16<T>,
        Self: ToU16<U>,
    {
        let source_value = self.read_u16_value(source);
        self.set_u16_value(destination, source_value);
    }

    /// `ld` never sets any flags.
    fn load_8bit<T: Copy, U: Copy>(&mut self, destination: T, source: U)
    where
        T: Debug,
        Self: SetU8<T>,
        Self: ToU8<U>,
    {
        let source_value = self.read_u8_value(source);
        self.set_u8_value(destination, source_value);
    }

    /// Flags: z0h-
    fn increment<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let old_value = self.read_u8_value(target);
        let new_value = old_value.wrapping_add(1);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_h((old_value & 0xF) + 0x1 > 0xF);

        self.set_u8_value(target, new_value);
    }

    fn increment16(&mut self, target: Reg16) {
        let new_value = self.read_u16_value(target).wrapping_add(1);
        self.set_u16_value(target, new_value);
        self.add_cycles();
    }

    /// Flags: 000C
    fn rlca(&mut self) {
        self.rotate_left(A);
        self.registers.set_zf(false);
    }

    /// Flags: -0hc
    fn add16(&mut self, target: Reg16) {
        let old_value = self.read_u16_value(target);
        let (result, overflowed) = old_value.overflowing_add(self.registers.hl());
        self.registers.set_n(false);
        self.registers.set_cf(overflowed);
        self.registers
            .set_h((old_value & 0x0FFF) + (self.registers.hl() & 0x0FFF) > 0x0FFF);

        self.registers.set_hl(result);
        self.add_cycles();
    }

    /// Flags: z1h-
    fn decrement<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let old_value = self.read_u8_value(target);
        let new_value = old_value.wrapping_sub(1);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(true);
        self.registers.set_h(old_value & 0xF == 0);

        self.set_u8_value(target, new_value);
    }

    fn decrement16(&mut self, target: Reg16) {
        let new_value = self.read_u16_value(target).wrapping_sub(1);
        self.set_u16_value(target, new_value);
        self.add_cycles();
    }

    /// Flags: 000C
    fn rrca(&mut self) {
        self.rotate_right(A);
        self.registers.set_zf(false);
    }

    /// Resets DIV and halts the CPU. Speed-switching and the full button-press wake condition
    /// are CGB/hardware-timing details this core does not model; STOP behaves as a deeper HALT.
    fn stop(&mut self) {
        self.mmu.reset_div();
        self.halted = true;
    }

    /// Flags: 000C
    fn rla(&mut self) {
        self.rotate_left_carry(A);
        self.registers.set_zf(false);
    }

    fn relative_jump(&mut self, condition: JumpModifier) {
        let offset = self.get_instr_u8() as i8;
        if self.matches_jmp_condition(condition) {
            self.registers.pc = self.registers.pc.wrapping_add(offset as u16);
            self.add_cycles();
        }
    }

    /// Flags: 000C
    fn rra(&mut self) {
        self.rotate_right_carry(A);
        self.registers.set_zf(false);
    }

    /// Flags: Z-0C
    fn daa(&mut self) {
        if !self.registers.n() {
            if self.registers.cf() || self.registers.a > 0x99 {
                self.registers.a = self.registers.a.wrapping_add(0x60);
                self.registers.set_cf(true);
            }
            if self.registers.hf() || (self.registers.a & 0x0F) > 0x09 {
                self.registers.a = self.registers.a.wrapping_add(0x06);
            }
        } else {
            if self.registers.cf() {
                self.registers.a = self.registers.a.wrapping_sub(0x60);
            }
            if self.registers.hf() {
                self.registers.a = self.registers.a.wrapping_sub(0x06);
            }
        }

        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_h(false);
    }

    /// Flags: -11-
    fn cpl(&mut self) {
        self.registers.a = !self.registers.a;
        self.registers.set_n(true);
        self.registers.set_h(true);
    }

    /// Flags: -001
    fn scf(&mut self) {
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf(true);
    }

    /// Flags: -00i
    fn ccf(&mut self) {
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.toggle_cf();
    }

    fn halt(&mut self) {
        let pending = !self.mmu.interrupts().triggered().is_empty();
        if !self.ime && pending {
            self.halt_bug = true;
        } else {
            self.halted = true;
        }
    }

    /// Flags: Z0HC
    fn add<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let (new_value, overflowed) = self.registers.a.overflowing_add(value);
        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_cf(overflowed);
        self.registers.set_h((self.registers.a & 0xF) + (value & 0xF) > 0xF);

        self.registers.a = new_value;
    }

    /// Flags: Z0HC
    fn adc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let carry = self.registers.cf() as u8;
        let new_value = self.registers.a.wrapping_add(value).wrapping_add(carry);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_h((self.registers.a & 0xF) + (value & 0xF) + carry > 0xF);
        self.registers
            .set_cf((self.registers.a as u16) + (value as u16) + carry as u16 > 0xFF);

        self.registers.a = new_value;
    }

    /// Flags: Z1HC
    fn sub<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = self.registers.a.wrapping_sub(value);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(true);
        self.registers
            .set_h((self.registers.a & 0xF).wrapping_sub(value & 0xF) & 0x10 != 0);
        self.registers.set_cf(value > self.registers.a);

        self.registers.a = new_value;
    }

    /// Flags: Z1HC
    fn sbc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let carry = self.registers.cf() as u8;
        let new_value = self.registers.a.wrapping_sub(value).wrapping_sub(carry);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(true);
        self.registers
            .set_h((self.registers.a & 0xF).wrapping_sub(value & 0xF).wrapping_sub(carry) & 0x10 != 0);
        self.registers
            .set_cf((value as u16 + carry as u16) > self.registers.a as u16);

        self.registers.a = new_value;
    }

    /// Flags: Z010
    fn and<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a &= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_n(false);
        self.registers.set_h(true);
        self.registers.set_cf(false);
    }

    /// Flags: Z000
    fn xor<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a ^= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf(false);
    }

    /// Flags: Z000
    fn or<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a |= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf(false);
    }

    /// Subtract without storing the result. Flags: Z1HC
    fn compare<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = self.registers.a.wrapping_sub(value);
        self.registers.set_zf(new_value == 0);
        self.registers.set_n(true);
        self.registers.set_cf(value > self.registers.a);
        self.registers
            .set_h((self.registers.a & 0xF).wrapping_sub(value & 0xF) & 0x10 != 0);
    }

    fn ret(&mut self, target: JumpModifier) {
        self.add_cycles();
        if self.matches_jmp_condition(target) {
            self.registers.pc = self.read_short_cycle(self.registers.sp);
            self.registers.sp = self.registers.sp.wrapping_add(2);
            self.add_cycles();
        }
    }

    fn pop(&mut self, target: Reg16) {
        let value = self.read_short_cycle(self.registers.sp);
        self.set_u16_value(target, value);
        self.registers.sp = self.registers.sp.wrapping_add(2);
    }

    fn jump(&mut self, condition: JumpModifier) {
        let value = self.get_instr_u16();

        if self.matches_jmp_condition(condition) {
            self.registers.pc = if let JumpModifier::Hl = condition {
                self.registers.hl()
            } else {
                value
            };
            self.add_cycles();
        }
    }

    fn matches_jmp_condition(&self, condition: JumpModifier) -> bool {
        match condition {
            JumpModifier::NotZero => !self.registers.zf(),
            JumpModifier::Zero => self.registers.zf(),
            JumpModifier::NotCarry => !self.registers.cf(),
            JumpModifier::Carry => self.registers.cf(),
            JumpModifier::Always => true,
            JumpModifier::Hl => true,
        }
    }

    fn call(&mut self, target: JumpModifier) {
        let address = self.get_instr_u16();
        if self.matches_jmp_condition(target) {
            self.push_helper(self.registers.pc);
            self.registers.pc = address;
        }
    }

    fn push(&mut self, target: Reg16) {
        let value = self.read_u16_value(target);
        self.push_helper(value);
    }

    fn push_helper(&mut self, value: u16) {
        self.registers.sp = self.registers.sp.wrapping_sub(2);
        self.write_short_cycle(self.registers.sp, value);
        self.add_cycles();
    }

    fn rst(&mut self, vec: u8) {
        self.push_helper(self.registers.pc);
        self.registers.pc = vec as u16;
    }

    fn reti(&mut self) {
        self.ime = true;
        self.registers.pc = self.read_short_cycle(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(2);
        self.add_cycles();
    }

    /// Flags: 00HC
    fn add_sp(&mut self) {
        let value = self.get_instr_u8() as i8 as u16;
        let new_value = self.registers.sp.wrapping_add(value);

        self.registers.set_zf(false);
        self.registers.set_n(false);
        self.registers.set_h((self.registers.sp & 0xF) + (value & 0xF) > 0xF);
        self.registers.set_cf((self.registers.sp & 0xFF) + (value & 0xFF) > 0xFF);

        self.registers.sp = new_value;

        self.add_cycles();
        self.add_cycles();
    }

    fn di(&mut self) {
        self.ime = false;
        self.delayed_ime = false;
    }

    /// Flags: 00HC
    fn load_sp_i(&mut self) {
        let value = self.get_instr_u8() as i8 as u16;
        let new_value = self.registers.sp.wrapping_add(value);

        self.registers.set_hl(new_value);
        self.registers.set_zf(false);
        self.registers.set_n(false);
        self.registers.set_h((self.registers.sp & 0xF) + (value & 0xF) > 0xF);
        self.registers.set_cf((self.registers.sp & 0xFF) + (value & 0xFF) > 0xFF);

        self.add_cycles();
    }

    fn load_sp_hl(&mut self) {
        self.registers.sp = self.registers.hl();
        self.add_cycles();
    }

    /// The flag is only set after the instruction following EI.
    fn ei(&mut self) {
        self.delayed_ime = true;
    }

    /*
       Prefixed instructions.
    */

    /// Flags: Z00C
    fn rlc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_left(target);
    }

    /// Flags: Z00C
    fn rrc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_right(target);
    }

    /// Flags: Z00C
    fn rl<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_left_carry(target);
    }

    /// Flags: Z00C
    fn rr<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_right_carry(target);
    }

    /// Flags: Z00C
    fn sla<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.shift_left(target);
    }

    /// [7] -> [7 -> 0] -> C. Flags: Z00C
    fn sra<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = (value & 0x80) | value.wrapping_shr(1);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf((value & 0x1) != 0);

        self.set_u8_value(target, new_value);
    }

    /// Flags: Z000
    fn swap<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = ((value & 0x0F) << 4) | ((value & 0xF0) >> 4);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf(false);

        self.set_u8_value(target, new_value);
    }

    /// Flags: Z00C
    fn srl<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.shift_right(target);
    }

    /// Flags: Z01-
    fn bit<T: Copy + Debug>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let bitmask = 1 << bit;

        self.registers.set_zf((value & bitmask) == 0);
        self.registers.set_n(false);
        self.registers.set_h(true)
    }

    fn set<T: Copy>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let value = self.read_u8_value(target);
        self.set_u8_value(target, value | (1 << bit));
    }

    fn res<T: Copy>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let value = self.read_u8_value(target);
        self.set_u8_value(target, value & !(1 << bit));
    }
}

/*
    Operand resolution: every addressing mode an opcode can use collapses onto the same small
    set of traits so `load_8bit`, `add`, `inc` etc. can stay generic over their operand.
*/

impl<M: MemoryMapper> ToU8<Reg8> for Cpu<M> {
    fn read_u8_value(&mut self, target: Reg8) -> u8 {
        match target {
            Reg8::A => self.registers.a,
            Reg8::B => self.registers.b,
            Reg8::C => self.registers.c,
            Reg8::D => self.registers.d,
            Reg8::E => self.registers.e,
            Reg8::H => self.registers.h,
            Reg8::L => self.registers.l,
        }
    }
}

impl<M: MemoryMapper> SetU8<Reg8> for Cpu<M> {
    fn set_u8_value(&mut self, target: Reg8, value: u8) {
        match target {
            Reg8::A => self.registers.a = value,
            Reg8::B => self.registers.b = value,
            Reg8::C => self.registers.c = value,
            Reg8::D => self.registers.d = value,
            Reg8::E => self.registers.e = value,
            Reg8::H => self.registers.h = value,
            Reg8::L => self.registers.l = value,
        }
    }
}

impl<M: MemoryMapper> ToU8<InstructionAddress> for Cpu<M> {
    fn read_u8_value(&mut self, target: InstructionAddress) -> u8 {
        match target {
            InstructionAddress::BcIndirect => self.read_byte_cycle(self.registers.bc()),
            InstructionAddress::DeIndirect => self.read_byte_cycle(self.registers.de()),
            InstructionAddress::HlIndirect => self.read_byte_cycle(self.registers.hl()),
            InstructionAddress::HlIndirectInc => {
                let address = self.registers.hl();
                let result = self.read_byte_cycle(address);
                self.registers.set_hl(address.wrapping_add(1));
                result
            }
            InstructionAddress::HlIndirectDec => {
                let address = self.registers.hl();
                let result = self.read_byte_cycle(address);
                self.registers.set_hl(address.wrapping_sub(1));
                result
            }
            InstructionAddress::Direct8 => self.get_instr_u8(),
            InstructionAddress::Direct16 | InstructionAddress::DirectMem => {
                let address = self.get_instr_u16();
                self.read_byte_cycle(address)
            }
            InstructionAddress::IoDirect => {
                let offset = self.get_instr_u8();
                self.read_byte_cycle(0xFF00 | offset as u16)
            }
            InstructionAddress::IoC => self.read_byte_cycle(0xFF00 | self.registers.c as u16),
        }
    }
}

impl<M: MemoryMapper> SetU8<InstructionAddress> for Cpu<M> {
    fn set_u8_value(&mut self, target: InstructionAddress, value: u8) {
        match target {
            InstructionAddress::BcIndirect => self.write_byte_cycle(self.registers.bc(), value),
            InstructionAddress::DeIndirect => self.write_byte_cycle(self.registers.de(), value),
            InstructionAddress::HlIndirect => self.write_byte_cycle(self.registers.hl(), value),
            InstructionAddress::HlIndirectInc => {
                let address = self.registers.hl();
                self.write_byte_cycle(address, value);
                self.registers.set_hl(address.wrapping_add(1));
            }
            InstructionAddress::HlIndirectDec => {
                let address = self.registers.hl();
                self.write_byte_cycle(address, value);
                self.registers.set_hl(address.wrapping_sub(1));
            }
            InstructionAddress::DirectMem => {
                let address = self.get_instr_u16();
                self.write_byte_cycle(address, value);
            }
            InstructionAddress::IoDirect => {
                let offset = self.get_instr_u8();
                self.write_byte_cycle(0xFF00 | offset as u16, value);
            }
            InstructionAddress::IoC => self.write_byte_cycle(0xFF00 | self.registers.c as u16, value),
            InstructionAddress::Direct8 => unreachable!("an immediate is never a write destination"),
            InstructionAddress::Direct16 => unreachable!("an immediate is never a write destination"),
        }
    }
}

impl<M: MemoryMapper> ToU8<WrapperEnum> for Cpu<M> {
    fn read_u8_value(&mut self, target: WrapperEnum) -> u8 {
        match target {
            WrapperEnum::Reg8(reg) => self.read_u8_value(reg),
            WrapperEnum::InstructionAddress(addr) => self.read_u8_value(addr),
        }
    }
}

impl<M: MemoryMapper> SetU8<WrapperEnum> for Cpu<M> {
    fn set_u8_value(&mut self, target: WrapperEnum, value: u8) {
        match target {
            WrapperEnum::Reg8(reg) => self.set_u8_value(reg, value),
            WrapperEnum::InstructionAddress(addr) => self.set_u8_value(addr, value),
        }
    }
}

impl<M: MemoryMapper> ToU16<Reg16> for Cpu<M> {
    fn read_u16_value(&mut self, target: Reg16) -> u16 {
        match target {
            Reg16::AF => self.registers.af(),
            Reg16::BC => self.registers.bc(),
            Reg16::DE => self.registers.de(),
            Reg16::HL => self.registers.hl(),
            Reg16::SP => self.registers.sp,
        }
    }
}

impl<M: MemoryMapper> SetU16<Reg16> for Cpu<M> {
    fn set_u16_value(&mut self, target: Reg16, value: u16) {
        match target {
            Reg16::AF => self.registers.set_af(value),
            Reg16::BC => self.registers.set_bc(value),
            Reg16::DE => self.registers.set_de(value),
            Reg16::HL => self.registers.set_hl(value),
            Reg16::SP => self.registers.sp = value,
        }
    }
}

impl<M: MemoryMapper> ToU16<InstructionAddress> for Cpu<M> {
    fn read_u16_value(&mut self, target: InstructionAddress) -> u16 {
        match target {
            InstructionAddress::Direct16 => self.get_instr_u16(),
            _ => unreachable!("only an immediate 16-bit operand is read this way"),
        }
    }
}

impl<M: MemoryMapper> SetU16<InstructionAddress> for Cpu<M> {
    fn set_u16_value(&mut self, target: InstructionAddress, value: u16) {
        match target {
            InstructionAddress::DirectMem => {
                let address = self.get_instr_u16();
                self.write_short_cycle(address, value);
            }
            _ => unreachable!("only a direct memory destination is written this way"),
        }
    }
}
