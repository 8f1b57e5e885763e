pub mod header;
mod mbc;
mod mbc3;

use crate::hardware::cartridge::header::{CartridgeHeader, MbcKind};
use crate::hardware::cartridge::mbc::{Mbc1, Mbc2, Mbc5, NoMbc};
use crate::hardware::cartridge::mbc3::Mbc3;

/// Bank-controller behavior shared by every cartridge kind. Addresses passed to ROM methods are
/// the full 16-bit bus address (0x0000-0x7FFF); addresses passed to RAM methods are relative to
/// 0xA000 (i.e. already had 0xA000 subtracted).
pub trait Mbc: std::fmt::Debug {
    fn read_rom(&self, address: u16) -> u8;
    fn write_rom(&mut self, address: u16, value: u8);
    fn read_ram(&self, address: u16) -> u8;
    fn write_ram(&mut self, address: u16, value: u8);
    fn ram(&self) -> &[u8];
    fn load_ram(&mut self, data: &[u8]);

    /// Only MBC3 implements this; all other controllers are no-ops.
    fn tick_rtc(&mut self, _t_cycles: u64) {}
}

#[derive(Debug)]
pub struct Cartridge {
    header: CartridgeHeader,
    mbc: Box<dyn Mbc>,
}

impl Cartridge {
    /// ROM must be at least large enough to contain the header (0x150 bytes).
    pub fn new(rom: Vec<u8>, saved_ram: Option<Vec<u8>>) -> Self {
        let header = CartridgeHeader::parse(&rom);
        let ram_size = header.ram_size_bytes.max(if header.mbc_kind == MbcKind::Mbc2 { 512 } else { 0 });
        let mut ram = vec![0xFFu8; ram_size];
        if let Some(saved) = &saved_ram {
            let len = ram.len().min(saved.len());
            ram[..len].copy_from_slice(&saved[..len]);
        }

        let mbc: Box<dyn Mbc> = match header.mbc_kind {
            MbcKind::None => Box::new(NoMbc::new(rom.clone(), ram)),
            MbcKind::Mbc1 => Box::new(Mbc1::new(rom.clone(), ram)),
            MbcKind::Mbc2 => Box::new(Mbc2::new(rom.clone())),
            MbcKind::Mbc3 => Box::new(Mbc3::new(rom.clone(), ram)),
            MbcKind::Mbc5 => Box::new(Mbc5::new(rom.clone(), ram)),
        };

        Cartridge { header, mbc }
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn read_rom(&self, address: u16) -> u8 {
        self.mbc.read_rom(address)
    }

    pub fn write_rom(&mut self, address: u16, value: u8) {
        self.mbc.write_rom(address, value);
    }

    pub fn read_ram(&self, address: u16) -> u8 {
        self.mbc.read_ram(address - 0xA000)
    }

    pub fn write_ram(&mut self, address: u16, value: u8) {
        self.mbc.write_ram(address - 0xA000, value);
    }

    pub fn ram(&self) -> &[u8] {
        self.mbc.ram()
    }

    pub fn load_ram(&mut self, data: &[u8]) {
        self.mbc.load_ram(data);
    }

    pub fn tick_rtc(&mut self, t_cycles: u64) {
        self.mbc.tick_rtc(t_cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_cartridge_type(cartridge_type: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = cartridge_type;
        rom
    }

    #[test]
    fn mbc0_rom_never_mutates_on_write() {
        let mut cart = Cartridge::new(rom_with_cartridge_type(0x00), None);
        let before = cart.read_rom(0x0000);
        cart.write_rom(0x2000, 0xFF);
        assert_eq!(cart.read_rom(0x0000), before);
    }

    #[test]
    fn mbc1_cartridge_routes_through_trait_object() {
        let mut rom = rom_with_cartridge_type(0x01);
        rom.resize(0x40000, 0);
        let mut cart = Cartridge::new(rom, None);
        cart.write_rom(0x2000, 0x05);
        // Just confirm no panic and a stable read from the newly selected bank.
        let _ = cart.read_rom(0x4000);
    }
}
