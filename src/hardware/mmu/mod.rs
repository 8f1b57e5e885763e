//! Address-space routing: the bus every other component sits behind. [`Mmu::tick`] is the single
//! place cycles fan out to the PPU, timer, APU and H-blank DMA, driven directly by the CPU's
//! M-cycle clock rather than through an event queue.

pub mod cgb_mem;
pub mod dma;
mod hram;
mod wram;

use std::fmt::Debug;

use cgb_mem::CgbData;
use dma::Hdma;
use hram::Hram;
use wram::Wram;

use crate::hardware::apu::Apu;
use crate::hardware::cartridge::Cartridge;
use crate::hardware::ppu::Ppu;
use crate::hardware::GameBoyModel;
use crate::io::interrupts::{Interrupt, InterruptModule};
use crate::io::io_registers::IoRegisters;
use crate::io::joypad::{Button, Joypad, JOYPAD_REGISTER};
use crate::io::timer::{TimerRegisters, DIVIDER_REGISTER, TIMER_COUNTER, TIMER_CONTROL, TIMER_MODULO};

pub const ROM_BANK_00_START: u16 = 0x0000;
pub const ROM_BANK_NN_END: u16 = 0x7FFF;
pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;
pub const EXTERNAL_RAM_START: u16 = 0xA000;
pub const EXTERNAL_RAM_END: u16 = 0xBFFF;
pub const WRAM_BANK_00_START: u16 = 0xC000;
pub const WRAM_BANK_00_END: u16 = 0xCFFF;
pub const WRAM_BANK_NN_START: u16 = 0xD000;
pub const WRAM_BANK_NN_END: u16 = 0xDFFF;
pub const ECHO_RAM_START: u16 = 0xE000;
pub const ECHO_RAM_END: u16 = 0xFDFF;
pub const OAM_START: u16 = 0xFE00;
pub const OAM_END: u16 = 0xFE9F;
pub const NOT_USABLE_START: u16 = 0xFEA0;
pub const NOT_USABLE_END: u16 = 0xFEFF;
pub const IO_START: u16 = 0xFF00;
pub const IO_END: u16 = 0xFF7F;
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;
pub const INTERRUPTS_ENABLE: u16 = 0xFFFF;
pub const INVALID_READ: u8 = 0xFF;

pub const SB_REGISTER: u16 = 0xFF01;
pub const SC_REGISTER: u16 = 0xFF02;
pub const INTERRUPTS_FLAG: u16 = 0xFF0F;
pub const APU_MEM_START: u16 = 0xFF10;
pub const APU_MEM_END: u16 = 0xFF26;
pub const WAVE_SAMPLE_START: u16 = 0xFF30;
pub const WAVE_SAMPLE_END: u16 = 0xFF3F;
pub const KEY1_REGISTER: u16 = 0xFF4D;
pub const HDMA1: u16 = 0xFF51;
pub const HDMA2: u16 = 0xFF52;
pub const HDMA3: u16 = 0xFF53;
pub const HDMA4: u16 = 0xFF54;
pub const HDMA5: u16 = 0xFF55;
pub const SVBK_REGISTER: u16 = 0xFF70;

/// The bus contract the CPU core is written against. Every access ticks the rest of the system:
/// there is no separate master clock, the CPU's fetch/execute loop is it.
pub trait MemoryMapper: Debug {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);
    /// Advances PPU/timer/APU/HDMA by one M-cycle's worth of T-states.
    fn tick(&mut self, t_cycles: u8);
    fn interrupts(&self) -> &InterruptModule;
    fn interrupts_mut(&mut self) -> &mut InterruptModule;
    fn reset_div(&mut self);
    /// Returns `true` (once) if the most recent `tick` crossed into V-blank: the frame is done.
    fn take_frame_complete(&mut self) -> bool;
}

#[derive(Debug)]
pub struct Mmu {
    model: GameBoyModel,
    cartridge: Cartridge,
    ppu: Ppu,
    apu: Apu,
    wram: Wram,
    hram: Hram,
    io_registers: IoRegisters,
    joypad: Joypad,
    timers: TimerRegisters,
    interrupts: InterruptModule,
    cgb_data: CgbData,
    hdma: Hdma,
    serial_output: Vec<u8>,
    frame_complete: bool,
}

impl Mmu {
    pub fn new(rom: Vec<u8>, saved_ram: Option<Vec<u8>>, model: GameBoyModel, sample_rate: u32) -> Self {
        Mmu {
            model,
            cartridge: Cartridge::new(rom, saved_ram),
            ppu: Ppu::new(model),
            apu: Apu::new(sample_rate),
            wram: Wram::new(),
            hram: Hram::new(),
            io_registers: IoRegisters::new(),
            joypad: Joypad::new(),
            timers: TimerRegisters::default(),
            interrupts: InterruptModule::new(),
            cgb_data: CgbData::new(),
            hdma: Hdma::default(),
            serial_output: Vec::new(),
            frame_complete: false,
        }
    }

    pub fn model(&self) -> GameBoyModel {
        self.model
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.apu.take_samples()
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if self.joypad.set_button(button, pressed) {
            self.interrupts.request(Interrupt::Joypad);
        }
    }

    /// Bytes the game has written to the serial port via the SB/SC "send 0x81" idiom, drained by
    /// the host (test harnesses, Blargg-style ROMs that report pass/fail over serial).
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_output)
    }

    pub fn double_speed(&self) -> bool {
        self.cgb_data.double_speed
    }

    /// STOP with KEY1 armed: flips the speed and disarms.
    pub fn perform_speed_switch(&mut self) {
        if self.cgb_data.should_prepare() {
            self.cgb_data.toggle_speed();
        }
    }

    fn read_io_byte(&self, address: u16) -> u8 {
        match address {
            JOYPAD_REGISTER => self.joypad.read(),
            DIVIDER_REGISTER => self.timers.div(),
            TIMER_COUNTER => self.timers.tima(),
            TIMER_MODULO => self.timers.tma(),
            TIMER_CONTROL => self.timers.tac(),
            INTERRUPTS_FLAG => self.interrupts.read_if(),
            APU_MEM_START..=APU_MEM_END => self.apu.read_register(address),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.read_wave_sample(address),
            KEY1_REGISTER => {
                if self.model.is_cgb() {
                    (self.cgb_data.double_speed as u8) << 7 | self.cgb_data.read_prepare_switch()
                } else {
                    INVALID_READ
                }
            }
            HDMA1 | HDMA2 | HDMA3 | HDMA4 => INVALID_READ,
            HDMA5 => {
                if self.model.is_dmg() {
                    INVALID_READ
                } else {
                    self.hdma.read_hdma5()
                }
            }
            SVBK_REGISTER => self.wram.read_bank_select(),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => self.ppu.read_byte(address),
            _ => self.io_registers.read_byte(address),
        }
    }

    fn write_io_byte(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD_REGISTER => self.joypad.write_select(value),
            SC_REGISTER if value == 0x81 => {
                self.serial_output.push(self.read_io_byte(SB_REGISTER));
                self.io_registers.write_byte(address, value & 0x7F);
            }
            DIVIDER_REGISTER => self.timers.reset_div(),
            TIMER_COUNTER => self.timers.set_tima(value),
            TIMER_MODULO => self.timers.set_tma(value),
            TIMER_CONTROL => self.timers.set_tac(value),
            INTERRUPTS_FLAG => self.interrupts.write_if(value),
            APU_MEM_START..=APU_MEM_END => self.apu.write_register(address, value),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.write_wave_sample(address, value),
            KEY1_REGISTER if self.model.is_cgb() => self.cgb_data.write_prepare_switch(value),
            HDMA1 => self.hdma.write_source_high(value),
            HDMA2 => self.hdma.write_source_low(value),
            HDMA3 => self.hdma.write_dest_high(value),
            HDMA4 => self.hdma.write_dest_low(value),
            HDMA5 if self.model.is_cgb() => {
                if self.hdma.write_hdma5(value) {
                    self.run_gdma();
                }
            }
            SVBK_REGISTER if self.model.is_cgb() => self.wram.write_bank_select(value),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => self.ppu.write_byte(address, value),
            _ => self.io_registers.write_byte(address, value),
        }
    }

    /// An OAM DMA request is atomic from the bus's perspective: one 160-byte copy, no mid-transfer
    /// visibility.
    fn start_oam_dma(&mut self, value: u8) {
        let base = (value as u16) << 8;
        let mut buf = [0u8; 0xA0];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_byte(base + i as u16);
        }
        self.ppu.oam_dma_copy(&buf);
        self.io_registers.write_byte(0xFF46, value);
    }

    fn run_gdma(&mut self) {
        let len = self.hdma.gdma_len();
        let src = self.hdma.source();
        let dst = self.hdma.destination();
        let bytes: Vec<u8> = (0..len).map(|i| self.read_byte(src.wrapping_add(i))).collect();
        for (i, byte) in bytes.into_iter().enumerate() {
            self.ppu.dma_write_vram(dst.wrapping_add(i as u16) - VRAM_START, byte);
        }
    }

    fn run_hdma_step(&mut self) {
        let (src, dst) = self.hdma.step();
        let bytes: [u8; 16] = std::array::from_fn(|i| self.read_byte(src.wrapping_add(i as u16)));
        for (i, byte) in bytes.into_iter().enumerate() {
            self.ppu.dma_write_vram(dst.wrapping_add(i as u16) - VRAM_START, *byte);
        }
    }

    /// Everything outside the CPU/PPU/APU/cartridge needed to resume the bus exactly: WRAM, HRAM,
    /// the flat I/O byte table, timer counters, joypad shadow state, the CGB speed-switch latch
    /// and bank-select registers, and the HDMA engine's source/destination/progress.
    pub fn export_mmu_state(&self) -> MmuState {
        let (system_counter, tima, tma, tac) = self.timers.raw_state();
        let (pressed_buttons, pressed_directions, select) = self.joypad.raw_state();
        MmuState {
            wram: self.wram.raw().to_vec(),
            hram: self.hram.raw().to_vec(),
            io_registers: self.io_registers.raw().to_vec(),
            system_counter,
            tima,
            tma,
            tac,
            pressed_buttons,
            pressed_directions,
            joypad_select: select,
            interrupt_enable: self.interrupts.read_ie(),
            interrupt_flag: self.interrupts.read_if(),
            wram_bank_select: self.wram.read_bank_select(),
            double_speed: self.cgb_data.double_speed,
            prepare_speed_switch: self.cgb_data.read_prepare_switch(),
        }
    }

    pub fn import_mmu_state(&mut self, state: &MmuState) {
        self.wram.load_raw(&state.wram);
        self.hram.load_raw(&state.hram);
        self.io_registers.load_raw(&state.io_registers);
        self.timers.load_raw_state(state.system_counter, state.tima, state.tma, state.tac);
        self.joypad.load_raw_state(state.pressed_buttons, state.pressed_directions, state.joypad_select);
        self.interrupts.write_ie(state.interrupt_enable);
        self.interrupts.write_if(state.interrupt_flag);
        self.wram.write_bank_select(state.wram_bank_select);
        self.cgb_data.double_speed = state.double_speed;
        self.cgb_data.write_prepare_switch(state.prepare_speed_switch);
    }
}

/// Flat, serializable snapshot of everything the MMU owns besides the PPU/APU/cartridge.
#[allow(unused_imports)]
use nanoserde::{SerBin, DeBin};
#[derive(Clone, Debug, nanoserde::SerBin, nanoserde::DeBin)]
pub struct MmuState {
    pub wram: Vec<u8>,
    pub hram: Vec<u8>,
    pub io_registers: Vec<u8>,
    pub system_counter: u16,
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    pub pressed_buttons: u8,
    pub pressed_directions: u8,
    pub joypad_select: u8,
    pub interrupt_enable: u8,
    pub interrupt_flag: u8,
    pub wram_bank_select: u8,
    pub double_speed: bool,
    pub prepare_speed_switch: u8,
}

impl MemoryMapper for Mmu {
    fn read_byte(&self, address: u16) -> u8 {
        match address {
            ROM_BANK_00_START..=ROM_BANK_NN_END => self.cartridge.read_rom(address),
            VRAM_START..=VRAM_END => self.ppu.read_byte(address),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.read_ram(address),
            WRAM_BANK_00_START..=WRAM_BANK_00_END => self.wram.read_bank_0(address),
            WRAM_BANK_NN_START..=WRAM_BANK_NN_END => self.wram.read_bank_n(address),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.read_echo_ram(address),
            OAM_START..=OAM_END => self.ppu.read_byte(address),
            NOT_USABLE_START..=NOT_USABLE_END => INVALID_READ,
            IO_START..=IO_END => self.read_io_byte(address),
            HRAM_START..=HRAM_END => self.hram.read_byte(address),
            INTERRUPTS_ENABLE => self.interrupts.read_ie(),
            _ => INVALID_READ,
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            ROM_BANK_00_START..=ROM_BANK_NN_END => self.cartridge.write_rom(address, value),
            VRAM_START..=VRAM_END => self.ppu.write_byte(address, value),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.write_ram(address, value),
            WRAM_BANK_00_START..=WRAM_BANK_00_END => self.wram.write_bank_0(address, value),
            WRAM_BANK_NN_START..=WRAM_BANK_NN_END => self.wram.write_bank_n(address, value),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.write_echo_ram(address, value),
            OAM_START..=OAM_END => self.ppu.write_byte(address, value),
            NOT_USABLE_START..=NOT_USABLE_END => {}
            IO_START..=IO_END if address == 0xFF46 => self.start_oam_dma(value),
            IO_START..=IO_END => self.write_io_byte(address, value),
            HRAM_START..=HRAM_END => self.hram.set_byte(address, value),
            INTERRUPTS_ENABLE => self.interrupts.write_ie(value),
            _ => {}
        }
    }

    fn tick(&mut self, t_cycles: u8) {
        let halved = if self.cgb_data.double_speed { t_cycles / 2 } else { t_cycles };

        let ppu_tick = self.ppu.tick(halved);
        self.interrupts.request_flags(ppu_tick.interrupt);
        if ppu_tick.entered_hblank && self.hdma.armed() {
            self.run_hdma_step();
        }
        if ppu_tick.entered_vblank {
            self.frame_complete = true;
        }

        if let Some(timer_flags) = self.timers.tick(t_cycles as u16) {
            self.interrupts.request_flags(timer_flags);
        }

        self.apu.tick(halved);
        self.cartridge.tick_rtc(t_cycles as u64);
    }

    fn interrupts(&self) -> &InterruptModule {
        &self.interrupts
    }

    fn interrupts_mut(&mut self) -> &mut InterruptModule {
        &mut self.interrupts
    }

    fn reset_div(&mut self) {
        self.timers.reset_div();
    }

    fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }
}
