//! Bus access helpers, interrupt dispatch, and the fixed 4-T-cycle tick that every memory access
//! or internal-only step advances the rest of the hardware by.

use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;
use crate::io::interrupts::Interrupt;

impl<M: MemoryMapper> Cpu<M> {
    /// Advance every other subsystem (PPU, timer, APU, DMA/HDMA) by one machine cycle.
    pub fn add_cycles(&mut self) {
        self.cycles_performed += 4;
        self.mmu.tick(4);
    }

    pub fn cb_prefix_call(&mut self) {
        self.opcode = self.get_instr_u8();
        self.execute_prefix(self.opcode);
    }

    /// Services at most one pending, enabled interrupt. Returns true if one was dispatched.
    ///
    /// A HALTed CPU with no IME still wakes on a pending-but-disabled interrupt without
    /// servicing it (the "HALT exits on IE&IF, not IME" quirk).
    pub fn handle_interrupts(&mut self) -> bool {
        let pending = !self.mmu.interrupts().triggered().is_empty();

        if !self.ime {
            if pending {
                self.halted = false;
            }
            return false;
        }

        if let Some(interrupt) = self.mmu.interrupts().highest_priority_triggered() {
            self.mmu.interrupts_mut().clear(interrupt);
            self.interrupt_routine(interrupt);
            true
        } else {
            false
        }
    }

    /// Pushes PC, disables IME, and jumps to the interrupt's fixed vector. Takes 5 machine cycles
    /// total (2 internal wait cycles plus the 3 spent by the push).
    fn interrupt_routine(&mut self, interrupt: Interrupt) {
        self.add_cycles();
        self.add_cycles();

        self.ime = false;
        self.halted = false;
        self.push_helper(self.registers.pc);
        self.registers.pc = interrupt.vector();
    }

    /// Reads the byte at PC and advances PC by one.
    pub fn get_instr_u8(&mut self) -> u8 {
        let result = self.read_byte_cycle(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        result
    }

    /// Reads a little-endian u16 at PC and advances PC by two.
    pub fn get_instr_u16(&mut self) -> u16 {
        let low = self.get_instr_u8() as u16;
        let high = self.get_instr_u8() as u16;
        (high << 8) | low
    }

    pub fn read_byte_cycle(&mut self, address: u16) -> u8 {
        self.add_cycles();
        self.mmu.read_byte(address)
    }

    pub fn write_byte_cycle(&mut self, address: u16, value: u8) {
        self.add_cycles();
        self.mmu.write_byte(address, value);
    }

    pub fn read_short_cycle(&mut self, address: u16) -> u16 {
        let low = self.read_byte_cycle(address) as u16;
        let high = self.read_byte_cycle(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    pub fn write_short_cycle(&mut self, address: u16, value: u16) {
        self.write_byte_cycle(address, (value & 0xFF) as u8);
        self.write_byte_cycle(address.wrapping_add(1), (value >> 8) as u8);
    }
}
