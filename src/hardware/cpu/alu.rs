//! Rotate/shift helpers shared between the unprefixed accumulator-only opcodes (RLCA, RRCA, RLA,
//! RRA) and their general-operand CB-prefixed counterparts (RLC, RRC, RL, RR, SLA, SRL).

use crate::hardware::cpu::traits::{SetU8, ToU8};
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;

/// The bit that falls out of a left shift/rotate and becomes the new carry.
const LEFT_CARRY_BIT: u8 = 0x80;
/// The bit that falls out of a right shift/rotate and becomes the new carry.
const RIGHT_CARRY_BIT: u8 = 0x01;

impl<M: MemoryMapper> Cpu<M> {
    /// Applies one of the six bit-rotate/shift operands to `target`, writes the result back, and
    /// sets `Z00C` from the bit that fell out. `op` computes the new byte from the old one; the
    /// out-of-scope carry bit is read from `value & carry_bit` before `op` runs.
    fn rotate_or_shift<T: Copy>(&mut self, target: T, carry_bit: u8, op: impl FnOnce(u8, bool) -> u8)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let carry_in = self.registers.cf();
        let new_value = op(value, carry_in);

        self.registers.set_zf(new_value == 0);
        self.registers.set_n(false);
        self.registers.set_h(false);
        self.registers.set_cf(value & carry_bit != 0);
        self.set_u8_value(target, new_value);
    }

    /// C <- [7 <- 0] <- [7].
    pub(crate) fn rotate_left<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, LEFT_CARRY_BIT, |value, _| value.rotate_left(1));
    }

    /// C <- [7 <- 0] <- C.
    pub(crate) fn rotate_left_carry<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, LEFT_CARRY_BIT, |value, carry_in| {
            value.wrapping_shl(1) | carry_in as u8
        });
    }

    /// C <- [7 <- 0] <- 0.
    pub(crate) fn shift_left<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, LEFT_CARRY_BIT, |value, _| value.wrapping_shl(1));
    }

    /// [0] -> [7 -> 0] -> C.
    pub(crate) fn rotate_right<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, RIGHT_CARRY_BIT, |value, _| value.rotate_right(1));
    }

    /// C -> [7 -> 0] -> C.
    pub(crate) fn rotate_right_carry<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, RIGHT_CARRY_BIT, |value, carry_in| {
            ((carry_in as u8) << 7) | value.wrapping_shr(1)
        });
    }

    /// 0 -> [7 -> 0] -> C.
    pub(crate) fn shift_right<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
        Self: SetU8<T>,
    {
        self.rotate_or_shift(target, RIGHT_CARRY_BIT, |value, _| value.wrapping_shr(1));
    }
}
