//! A cycle-stepped Game Boy / Game Boy Color emulation core. The crate root exposes the
//! configuration and error types a host embeds this with; [`emulator::GameBoy`] is the machine
//! itself.

use std::fmt;

pub mod emulator;
pub mod hardware;
mod io;

pub use crate::hardware::GameBoyModel;
pub use crate::io::joypad::Button;
pub use crate::io::palette::DmgShade;

/// Configuration a [`emulator::GameBoy`] is constructed with. Boot ROM execution is out of scope
/// for this core (see DESIGN.md): the CPU always starts from the documented post-boot register
/// state instead of stepping through a boot image.
#[derive(Debug, Default)]
pub struct EmulatorOptions {
    /// Battery-backed RAM recovered from a prior session; consumed by the next `load_rom` call.
    pub saved_ram: Option<Vec<u8>>,
    /// Sample rate the APU mixes its output at. Falls back to 44100 Hz when left at 0.
    pub sample_rate: u32,
}

#[derive(Debug, Default)]
pub struct EmulatorOptionsBuilder {
    saved_ram: Option<Vec<u8>>,
    sample_rate: u32,
}

impl EmulatorOptionsBuilder {
    pub fn new() -> Self {
        EmulatorOptionsBuilder::default()
    }

    pub fn saved_ram(mut self, saved_ram: Option<Vec<u8>>) -> Self {
        self.saved_ram = saved_ram;
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn build(self) -> EmulatorOptions {
        EmulatorOptions {
            saved_ram: self.saved_ram,
            sample_rate: if self.sample_rate == 0 { 44_100 } else { self.sample_rate },
        }
    }
}

impl From<EmulatorOptions> for EmulatorOptionsBuilder {
    fn from(options: EmulatorOptions) -> Self {
        EmulatorOptionsBuilder { saved_ram: options.saved_ram, sample_rate: options.sample_rate }
    }
}

/// Failures that can surface from the two entry points that read host-supplied buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EmulatorError {
    /// The supplied ROM is smaller than the 0x150-byte header it must contain.
    RomTooSmall,
    /// The header describes a cartridge configuration this core cannot build (e.g. an
    /// unsupported MBC kind).
    InvalidHeader,
    /// A `load_state` buffer didn't deserialize to the expected layout.
    StateSizeMismatch,
    /// A `load_state` buffer deserialized fine but names a different cartridge (title or RAM
    /// size) than the one currently loaded.
    StateCartridgeMismatch,
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulatorError::RomTooSmall => write!(f, "ROM is smaller than a valid cartridge header"),
            EmulatorError::InvalidHeader => write!(f, "cartridge header describes an unsupported configuration"),
            EmulatorError::StateSizeMismatch => write!(f, "save state buffer is malformed"),
            EmulatorError::StateCartridgeMismatch => write!(f, "save state does not match the loaded cartridge"),
        }
    }
}

impl std::error::Error for EmulatorError {}
