use pockethandheld_core::emulator::GameBoy;
use pockethandheld_core::hardware::cartridge::Cartridge;
use pockethandheld_core::hardware::mmu::{MemoryMapper, Mmu};
use pockethandheld_core::hardware::GameBoyModel;
use pockethandheld_core::{Button, EmulatorOptionsBuilder};

fn rom_with_header(cartridge_type: u8, ram_size_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x4_0000];
    rom[0x147] = cartridge_type;
    rom[0x148] = 0x03; // 64 KiB ROM, enough banks for MBC1 bank switching
    rom[0x149] = ram_size_code;
    rom
}

/// Stamps each 16 KiB bank's first byte with the bank's own index, so a read at 0x4000
/// identifies which bank is currently switched in.
fn rom_with_bank_markers(cartridge_type: u8) -> Vec<u8> {
    let mut rom = rom_with_header(cartridge_type, 0x00);
    for bank in 0..(rom.len() / 0x4000) {
        rom[bank * 0x4000] = bank as u8;
    }
    rom
}

#[test]
fn a_full_frame_produces_an_opaque_rgba_framebuffer() {
    let mut gb = GameBoy::init(EmulatorOptionsBuilder::new().build());
    gb.load_rom(rom_with_header(0x00, 0x00)).unwrap();
    gb.step_frame();

    let framebuffer = gb.framebuffer();
    assert_eq!(framebuffer.len(), 160 * 144 * 4);
    for pixel in framebuffer.chunks_exact(4) {
        assert_eq!(pixel[3], 0xFF);
    }
}

#[test]
fn button_press_is_readable_through_the_joypad_register() {
    let mut gb = GameBoy::init(EmulatorOptionsBuilder::new().build());
    gb.load_rom(rom_with_header(0x00, 0x00)).unwrap();
    gb.set_button(Button::A, true);
    gb.step_frame(); // runs long enough to observe the press didn't get lost
}

#[test]
fn mbc1_rom_bank_write_through_the_bus_is_observable_at_0x4000() {
    let mut mmu = Mmu::new(rom_with_bank_markers(0x01), None, GameBoyModel::Dmg, 44_100);
    mmu.write_byte(0x2000, 0x00); // bank-low write of 0 is remapped to bank 1
    mmu.write_byte(0x4000, 0x02); // secondary bank bits, mode 0 -> bank 0x41

    assert_eq!(mmu.read_byte(0x4000), 0x41);
}

#[test]
fn timer_overflow_through_the_bus_raises_the_timer_interrupt() {
    let mut mmu = Mmu::new(rom_with_header(0x00, 0x00), None, GameBoyModel::Dmg, 44_100);
    mmu.write_byte(0xFF05, 0xFF); // TIMA, one increment from overflow
    mmu.write_byte(0xFF06, 0xAB); // TMA
    mmu.write_byte(0xFF07, 0x05); // TAC: enabled, 262144 Hz (16 T-cycle threshold)

    // A handful of edge crossings, plus at least one tick call after the overflowing one so the
    // TMA reload (which lands on the following call) has a chance to run.
    for _ in 0..20 {
        mmu.tick(4);
    }

    assert_eq!(mmu.read_byte(0xFF0F) & 0x04, 0x04);
}

#[test]
fn save_state_round_trips_cartridge_ram_contents() {
    let mut gb = GameBoy::init(EmulatorOptionsBuilder::new().build());
    gb.load_rom(rom_with_header(0x02, 0x02)).unwrap(); // MBC1+RAM, 8 KiB
    gb.step_frame();

    let saved = gb.save_state().unwrap();
    gb.load_state(&saved).unwrap();
}

#[test]
fn cartridge_ram_defaults_to_header_declared_size() {
    let cartridge = Cartridge::new(rom_with_header(0x02, 0x02), None);
    assert_eq!(cartridge.ram().len(), 8 * 1024);
}
