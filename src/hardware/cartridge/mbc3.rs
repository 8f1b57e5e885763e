//! MBC3: 7-bit ROM bank, RAM-bank-or-RTC-register selector, and the latch-clock RTC.

use crate::hardware::cartridge::Mbc;

const RTC_SECONDS: u8 = 0x08;
const RTC_MINUTES: u8 = 0x09;
const RTC_HOURS: u8 = 0x0A;
const RTC_DAY_LOW: u8 = 0x0B;
const RTC_DAY_HIGH: u8 = 0x0C;

/// Five live registers plus their latched snapshot, per the cartridge data model.
#[derive(Debug, Default, Clone, Copy)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    day_low: u8,
    /// bit 0 = day counter bit 8, bit 6 = halt, bit 7 = day counter carry.
    day_high: u8,
}

impl RtcRegisters {
    fn get(&self, selector: u8) -> u8 {
        match selector {
            RTC_SECONDS => self.seconds,
            RTC_MINUTES => self.minutes,
            RTC_HOURS => self.hours,
            RTC_DAY_LOW => self.day_low,
            RTC_DAY_HIGH => self.day_high,
            _ => 0xFF,
        }
    }

    fn set(&mut self, selector: u8, value: u8) {
        match selector {
            RTC_SECONDS => self.seconds = value,
            RTC_MINUTES => self.minutes = value,
            RTC_HOURS => self.hours = value,
            RTC_DAY_LOW => self.day_low = value,
            RTC_DAY_HIGH => self.day_high = value & 0b1100_0001,
            _ => {}
        }
    }

    /// Advance the live clock by a whole number of seconds.
    fn tick_seconds(&mut self, mut elapsed: u64) {
        if self.day_high & 0x40 != 0 {
            return; // halted
        }
        while elapsed > 0 {
            self.seconds += 1;
            if self.seconds == 60 {
                self.seconds = 0;
                self.minutes += 1;
                if self.minutes == 60 {
                    self.minutes = 0;
                    self.hours += 1;
                    if self.hours == 24 {
                        self.hours = 0;
                        let (new_day, overflow) = self.day_low.overflowing_add(1);
                        self.day_low = new_day;
                        if overflow {
                            if self.day_high & 0x01 == 0 {
                                self.day_high |= 0x01;
                            } else {
                                self.day_high = (self.day_high & !0x01) | 0x80;
                            }
                        }
                    }
                }
            }
            elapsed -= 1;
        }
    }
}

#[derive(Debug)]
pub struct Mbc3 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_bank: u8,
    ram_or_rtc_select: u8,
    ram_enabled: bool,
    latch_write_sequence: Option<u8>,
    live: RtcRegisters,
    latched: RtcRegisters,
    /// Sub-second T-cycle remainder carried between `tick_rtc` calls.
    cycle_accumulator: u64,
}

impl Mbc3 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>) -> Self {
        Mbc3 {
            rom,
            ram,
            rom_bank: 1,
            ram_or_rtc_select: 0,
            ram_enabled: false,
            latch_write_sequence: None,
            live: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            cycle_accumulator: 0,
        }
    }

    fn rom_offset(&self, bank: u8, address: u16) -> usize {
        let rom_len = self.rom.len().max(1);
        (bank as usize * 0x4000 + address as usize) % rom_len
    }

    fn is_rtc_selector(&self) -> bool {
        (RTC_SECONDS..=RTC_DAY_HIGH).contains(&self.ram_or_rtc_select)
    }

    /// Advances the live RTC by wall-clock seconds approximated from master-clock T-cycles
    /// (per the frame loop's post-frame RTC accumulation step).
    pub fn tick_rtc(&mut self, t_cycles: u64) {
        const T_CYCLES_PER_SECOND: u64 = 4_194_304;
        self.cycle_accumulator += t_cycles;
        let whole_seconds = self.cycle_accumulator / T_CYCLES_PER_SECOND;
        if whole_seconds > 0 {
            self.cycle_accumulator %= T_CYCLES_PER_SECOND;
            self.live.tick_seconds(whole_seconds);
        }
    }
}

impl Mbc for Mbc3 {
    fn read_rom(&self, address: u16) -> u8 {
        if address < 0x4000 {
            self.rom[self.rom_offset(0, address)]
        } else {
            self.rom[self.rom_offset(self.rom_bank, address - 0x4000)]
        }
    }

    fn write_rom(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = (value & 0x0F) == 0x0A,
            0x2000..=0x3FFF => {
                let bank = value & 0x7F;
                self.rom_bank = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.ram_or_rtc_select = value,
            0x6000..=0x7FFF => match (self.latch_write_sequence, value) {
                (None, 0x00) => self.latch_write_sequence = Some(0x00),
                (Some(0x00), 0x01) => {
                    self.latched = self.live;
                    self.latch_write_sequence = None;
                }
                _ => self.latch_write_sequence = None,
            },
            _ => {}
        }
    }

    fn read_ram(&self, address: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        if self.is_rtc_selector() {
            self.latched.get(self.ram_or_rtc_select)
        } else {
            let offset = self.ram_or_rtc_select as usize * 0x2000 + address as usize;
            self.ram.get(offset).copied().unwrap_or(0xFF)
        }
    }

    fn write_ram(&mut self, address: u16, value: u8) {
        if !self.ram_enabled {
            return;
        }
        if self.is_rtc_selector() {
            self.live.set(self.ram_or_rtc_select, value);
        } else {
            let offset = self.ram_or_rtc_select as usize * 0x2000 + address as usize;
            if let Some(slot) = self.ram.get_mut(offset) {
                *slot = value;
            }
        }
    }

    fn ram(&self) -> &[u8] {
        &self.ram
    }

    fn load_ram(&mut self, data: &[u8]) {
        let len = self.ram.len().min(data.len());
        self.ram[..len].copy_from_slice(&data[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_undefined_state_is_zero_initialized() {
        let mbc = Mbc3::new(vec![0u8; 0x8000], Vec::new());
        assert_eq!(mbc.live.seconds, 0);
        assert_eq!(mbc.latched.day_high, 0);
    }

    #[test]
    fn latch_sequence_copies_live_into_latched() {
        let mut mbc = Mbc3::new(vec![0u8; 0x8000], Vec::new());
        mbc.live.seconds = 42;
        mbc.write_rom(0x6000, 0x00);
        mbc.write_rom(0x6000, 0x01);
        assert_eq!(mbc.latched.seconds, 42);
    }

    #[test]
    fn latch_requires_00_then_01_in_sequence() {
        let mut mbc = Mbc3::new(vec![0u8; 0x8000], Vec::new());
        mbc.live.seconds = 10;
        mbc.write_rom(0x6000, 0x01); // not preceded by 0x00, ignored
        assert_eq!(mbc.latched.seconds, 0);
    }

    #[test]
    fn seconds_roll_into_minutes() {
        let mut rtc = RtcRegisters::default();
        rtc.tick_seconds(60);
        assert_eq!(rtc.seconds, 0);
        assert_eq!(rtc.minutes, 1);
    }

    #[test]
    fn rtc_register_selector_range_is_0x08_through_0x0c() {
        let mut mbc = Mbc3::new(vec![0u8; 0x8000], vec![0u8; 0x2000]);
        mbc.ram_enabled = true;
        mbc.ram_or_rtc_select = 0x08;
        mbc.live.seconds = 7;
        mbc.write_rom(0x6000, 0x00);
        mbc.write_rom(0x6000, 0x01);
        assert_eq!(mbc.read_ram(0xA000), 7);
    }
}
