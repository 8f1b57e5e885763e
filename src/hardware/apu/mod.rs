//! The 4-channel audio unit: two duty-cycle squares, a wave channel and a noise channel, mixed
//! through a shared 512 Hz frame sequencer into a floating point sample ring.

mod channel_features;
mod noise_channel;
mod square_channel;
mod wave_channel;

use noise_channel::NoiseChannel;
use square_channel::SquareChannel;
use wave_channel::WaveChannel;

/// T-cycles between frame-sequencer steps (512 Hz at the unscaled 4 MiHz clock).
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
/// Ring buffer capacity; about 93 ms at 44100 Hz, comfortably more than one frame's worth.
const SAMPLE_BUFFER_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct Apu {
    square1: SquareChannel,
    square2: SquareChannel,
    wave: WaveChannel,
    noise: NoiseChannel,

    power: bool,
    left_volume: u8,
    right_volume: u8,
    panning: u8,

    frame_sequencer_cycles: u32,
    frame_sequencer_step: u8,

    sample_rate: u32,
    sample_cycles: u32,
    sample_buffer: Vec<f32>,
}

impl Default for Apu {
    fn default() -> Self {
        Apu::new(44_100)
    }
}

/// Capacity of the internal sample ring, exposed so the host can size its own playback buffer.
pub const fn sample_buffer_capacity() -> usize {
    SAMPLE_BUFFER_CAPACITY
}

impl Apu {
    pub fn new(sample_rate: u32) -> Self {
        Apu {
            square1: SquareChannel::with_sweep(),
            square2: SquareChannel::default(),
            wave: WaveChannel::default(),
            noise: NoiseChannel::default(),
            power: true,
            left_volume: 7,
            right_volume: 7,
            panning: 0xF3,
            frame_sequencer_cycles: 0,
            frame_sequencer_step: 0,
            sample_rate,
            sample_cycles: 0,
            sample_buffer: Vec::with_capacity(SAMPLE_BUFFER_CAPACITY),
        }
    }

    pub fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.sample_buffer)
    }

    pub fn tick(&mut self, t_cycles: u8) {
        if !self.power {
            return;
        }
        self.square1.tick_timer(t_cycles);
        self.square2.tick_timer(t_cycles);
        self.wave.tick_timer(t_cycles);
        self.noise.tick_timer(t_cycles);

        self.frame_sequencer_cycles += t_cycles as u32;
        while self.frame_sequencer_cycles >= FRAME_SEQUENCER_PERIOD {
            self.frame_sequencer_cycles -= FRAME_SEQUENCER_PERIOD;
            self.step_frame_sequencer();
        }

        let cycles_per_sample = 4_194_304 / self.sample_rate.max(1);
        self.sample_cycles += t_cycles as u32;
        while self.sample_cycles >= cycles_per_sample {
            self.sample_cycles -= cycles_per_sample;
            self.push_sample();
        }
    }

    fn step_frame_sequencer(&mut self) {
        match self.frame_sequencer_step {
            0 | 4 => self.tick_length(),
            2 | 6 => {
                self.tick_length();
                self.tick_sweep();
            }
            7 => self.tick_envelope(),
            _ => {}
        }
        self.frame_sequencer_step = (self.frame_sequencer_step + 1) % 8;
    }

    fn tick_length(&mut self) {
        self.square1.tick_length();
        self.square2.tick_length();
        self.wave.tick_length();
        self.noise.tick_length();
    }

    fn tick_sweep(&mut self) {
        self.square1.tick_sweep();
    }

    fn tick_envelope(&mut self) {
        self.square1.tick_envelope();
        self.square2.tick_envelope();
        self.noise.tick_envelope();
    }

    fn push_sample(&mut self) {
        let outputs = [
            self.square1.output(),
            self.square2.output(),
            self.wave.output(),
            self.noise.output(),
        ];
        let left_mask = [self.panning & 0x10, self.panning & 0x20, self.panning & 0x40, self.panning & 0x80];
        let right_mask = [self.panning & 0x01, self.panning & 0x02, self.panning & 0x04, self.panning & 0x08];

        let mut left = 0.0f32;
        let mut right = 0.0f32;
        let mut left_count = 0u32;
        let mut right_count = 0u32;
        for i in 0..4 {
            if left_mask[i] != 0 {
                left += outputs[i];
                left_count += 1;
            }
            if right_mask[i] != 0 {
                right += outputs[i];
                right_count += 1;
            }
        }
        let left_sample = if left_count > 0 { left / left_count as f32 } else { 0.0 };
        let right_sample = if right_count > 0 { right / right_count as f32 } else { 0.0 };

        let left_scale = (self.left_volume as f32 + 1.0) / 8.0;
        let right_scale = (self.right_volume as f32 + 1.0) / 8.0;

        if self.sample_buffer.len() + 2 <= self.sample_buffer.capacity() {
            self.sample_buffer.push(left_sample * left_scale);
            self.sample_buffer.push(right_sample * right_scale);
        }
    }

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            0xFF10 => self.square1.read_sweep(),
            0xFF11 => self.square1.read_duty_length(),
            0xFF12 => self.square1.read_envelope(),
            0xFF13 => 0xFF,
            0xFF14 => self.square1.read_freq_high(),
            0xFF15 => 0xFF,
            0xFF16 => self.square2.read_duty_length(),
            0xFF17 => self.square2.read_envelope(),
            0xFF18 => 0xFF,
            0xFF19 => self.square2.read_freq_high(),
            0xFF1A => self.wave.read_nr30(),
            0xFF1B => 0xFF,
            0xFF1C => self.wave.read_nr32(),
            0xFF1D => 0xFF,
            0xFF1E => self.wave.read_nr34(),
            0xFF1F => 0xFF,
            0xFF20 => 0xFF,
            0xFF21 => self.noise.read_nr42(),
            0xFF22 => self.noise.read_nr43(),
            0xFF23 => self.noise.read_nr44(),
            0xFF24 => (self.left_volume << 4) | self.right_volume,
            0xFF25 => self.panning,
            0xFF26 => self.read_nr52(),
            0xFF27..=0xFF2F => 0xFF,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        if !self.power && address != 0xFF26 {
            return;
        }
        match address {
            0xFF10 => self.square1.write_sweep(value),
            0xFF11 => self.square1.write_duty_length(value),
            0xFF12 => self.square1.write_envelope(value),
            0xFF13 => self.square1.write_freq_low(value),
            0xFF14 => self.square1.write_freq_high(value),
            0xFF16 => self.square2.write_duty_length(value),
            0xFF17 => self.square2.write_envelope(value),
            0xFF18 => self.square2.write_freq_low(value),
            0xFF19 => self.square2.write_freq_high(value),
            0xFF1A => self.wave.write_nr30(value),
            0xFF1B => self.wave.write_nr31(value),
            0xFF1C => self.wave.write_nr32(value),
            0xFF1D => self.wave.write_nr33(value),
            0xFF1E => self.wave.write_nr34(value),
            0xFF20 => self.noise.write_nr41(value),
            0xFF21 => self.noise.write_nr42(value),
            0xFF22 => self.noise.write_nr43(value),
            0xFF23 => self.noise.write_nr44(value),
            0xFF24 => {
                self.left_volume = (value >> 4) & 0x7;
                self.right_volume = value & 0x7;
            }
            0xFF25 => self.panning = value,
            0xFF26 => self.write_nr52(value),
            _ => {}
        }
    }

    pub fn read_wave_sample(&self, address: u16) -> u8 {
        let offset = (address - 0xFF30) as usize;
        self.wave.read_wave_ram(offset)
    }

    pub fn write_wave_sample(&mut self, address: u16, value: u8) {
        let offset = (address - 0xFF30) as usize;
        self.wave.write_wave_ram(offset, value);
    }

    fn read_nr52(&self) -> u8 {
        0x70
            | if self.power { 0x80 } else { 0 }
            | if self.noise.enabled() { 0x8 } else { 0 }
            | if self.wave.enabled() { 0x4 } else { 0 }
            | if self.square2.enabled() { 0x2 } else { 0 }
            | if self.square1.enabled() { 0x1 } else { 0 }
    }

    fn write_nr52(&mut self, value: u8) {
        let was_powered = self.power;
        self.power = value & 0x80 != 0;
        if was_powered && !self.power {
            self.square1 = SquareChannel::with_sweep();
            self.square2 = SquareChannel::default();
            self.wave = WaveChannel::default();
            self.noise = NoiseChannel::default();
            self.left_volume = 0;
            self.right_volume = 0;
            self.panning = 0;
            self.frame_sequencer_step = 0;
        }
    }

    /// Captures the register-visible state; channel-internal timers/LFSR phase are not preserved,
    /// so a loaded save state resumes audio with the same settings but a freshly re-triggered
    /// phase rather than bit-exact continuation mid-note.
    pub fn export_state(&self) -> ApuState {
        let registers = (0xFF10..=0xFF26).map(|a| self.read_register(a)).collect();
        let wave_ram = (0xFF30..=0xFF3F).map(|a| self.read_wave_sample(a)).collect();
        ApuState { power: self.power, registers, wave_ram }
    }

    pub fn import_state(&mut self, state: &ApuState) {
        self.power = true;
        for (i, address) in (0xFF10u16..=0xFF26).enumerate() {
            self.write_register(address, state.registers[i]);
        }
        for (i, address) in (0xFF30u16..=0xFF3F).enumerate() {
            self.write_wave_sample(address, state.wave_ram[i]);
        }
        self.write_nr52(state.registers[0xFF26 - 0xFF10]);
    }
}

/// Flat, serializable snapshot of the APU's register-visible state.
#[allow(unused_imports)]
use nanoserde::{SerBin, DeBin};
#[derive(Clone, Debug, nanoserde::SerBin, nanoserde::DeBin)]
pub struct ApuState {
    pub power: bool,
    pub registers: Vec<u8>,
    pub wave_ram: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_off_clears_registers_and_blocks_writes() {
        let mut apu = Apu::new(44_100);
        apu.write_register(0xFF11, 0x3F);
        apu.write_nr52(0x00);
        apu.write_register(0xFF11, 0x3F);
        assert_eq!(apu.square1.read_duty_length() & 0x3F, 0x3F);
    }

    #[test]
    fn frame_sequencer_clocks_length_every_other_step() {
        let mut apu = Apu::new(44_100);
        apu.write_register(0xFF11, 0x3E); // duty + length load 62
        apu.write_register(0xFF14, 0xC0); // trigger, length enable
        for _ in 0..(2 * FRAME_SEQUENCER_PERIOD / 4) {
            apu.tick(4);
        }
        assert!(apu.square1.enabled());
    }

    #[test]
    fn nr52_reports_channel_status_bits() {
        let mut apu = Apu::new(44_100);
        apu.write_register(0xFF12, 0xF0); // max volume, DAC on
        apu.write_register(0xFF14, 0x80); // trigger square1
        assert_eq!(apu.read_nr52() & 0x1, 0x1);
    }
}
