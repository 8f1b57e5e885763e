use bitflags::bitflags;

#[derive(Debug, Copy, Clone, PartialOrd, PartialEq)]
pub enum Interrupt {
    VBlank = 0b0000_0001,
    LcdStat = 0b0000_0010,
    Timer = 0b0000_0100,
    Serial = 0b0000_1000,
    Joypad = 0b0001_0000,
}

impl Interrupt {
    /// Fixed priority order, VBlank highest.
    pub fn iter() -> impl Iterator<Item = Interrupt> {
        use Interrupt::*;
        [VBlank, LcdStat, Timer, Serial, Joypad].iter().copied()
    }

    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::LcdStat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }
}

bitflags! {
    #[derive(Default)]
    pub struct InterruptFlags: u8 {
        const VBLANK  = 0b0000_0001;
        const LCD     = 0b0000_0010;
        const TIMER   = 0b0000_0100;
        const SERIAL  = 0b0000_1000;
        const JOYPAD  = 0b0001_0000;
        const UNUSED  = 0b1110_0000;
    }
}

impl InterruptFlags {
    pub fn from_interrupt(interrupt: Interrupt) -> Self {
        InterruptFlags::from_bits_truncate(interrupt as u8)
    }

    pub fn contains_interrupt(&self, interrupt: Interrupt) -> bool {
        self.contains(InterruptFlags::from_interrupt(interrupt))
    }
}

/// Holds IE (0xFFFF) and IF (0xFF0F). IF's high three bits always read as 1.
#[derive(Default, Debug, Clone)]
pub struct InterruptModule {
    pub interrupt_enable: InterruptFlags,
    pub interrupt_flag: InterruptFlags,
}

impl InterruptModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.interrupt_flag.insert(InterruptFlags::from_interrupt(interrupt));
    }

    pub fn request_flags(&mut self, flags: InterruptFlags) {
        self.interrupt_flag.insert(flags);
    }

    pub fn read_if(&self) -> u8 {
        0xE0 | self.interrupt_flag.bits()
    }

    pub fn write_if(&mut self, value: u8) {
        self.interrupt_flag = InterruptFlags::from_bits_truncate(value);
    }

    pub fn read_ie(&self) -> u8 {
        self.interrupt_enable.bits()
    }

    pub fn write_ie(&mut self, value: u8) {
        self.interrupt_enable = InterruptFlags::from_bits_truncate(value);
    }

    /// Bits set in both IE and IF, masked to the five real sources.
    pub fn triggered(&self) -> InterruptFlags {
        self.interrupt_enable & self.interrupt_flag & !InterruptFlags::UNUSED
    }

    /// Lowest-priority-bit interrupt currently triggered, if any.
    pub fn highest_priority_triggered(&self) -> Option<Interrupt> {
        let triggered = self.triggered();
        Interrupt::iter().find(|i| triggered.contains_interrupt(*i))
    }

    pub fn clear(&mut self, interrupt: Interrupt) {
        self.interrupt_flag.remove(InterruptFlags::from_interrupt(interrupt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_matches_bit_position() {
        let ordered = [
            Interrupt::VBlank,
            Interrupt::LcdStat,
            Interrupt::Timer,
            Interrupt::Serial,
            Interrupt::Joypad,
        ];
        for (i, interrupt) in Interrupt::iter().enumerate() {
            assert_eq!(ordered[i], interrupt);
        }
    }

    #[test]
    fn if_high_bits_read_as_one() {
        let module = InterruptModule::new();
        assert_eq!(module.read_if(), 0xE0);
    }

    #[test]
    fn triggered_requires_both_enable_and_flag() {
        let mut module = InterruptModule::new();
        module.request(Interrupt::Timer);
        assert!(module.triggered().is_empty());
        module.write_ie(InterruptFlags::TIMER.bits());
        assert_eq!(module.triggered(), InterruptFlags::TIMER);
        assert_eq!(module.highest_priority_triggered(), Some(Interrupt::Timer));
    }
}
