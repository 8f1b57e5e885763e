//! Joypad register (0xFF00). The register exposes whichever row (direction or action) was most
//! recently selected by a write to bits 4/5; the actual button state is tracked separately so
//! that switching rows doesn't lose presses made while the other row was selected.

use bitflags::bitflags;

pub const JOYPAD_REGISTER: u16 = 0xFF00;

/// Host-facing button identifiers, matching the external-interface button table.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Eq, Hash)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
}

impl Button {
    fn row_flag(self) -> JoypadFlags {
        match self {
            Button::Right | Button::A => JoypadFlags::RIGHT_A,
            Button::Left | Button::B => JoypadFlags::LEFT_B,
            Button::Up | Button::Select => JoypadFlags::UP_SELECT,
            Button::Down | Button::Start => JoypadFlags::DOWN_START,
        }
    }

    fn is_direction(self) -> bool {
        matches!(self, Button::Up | Button::Down | Button::Left | Button::Right)
    }
}

bitflags! {
    #[derive(Default)]
    struct JoypadFlags: u8 {
        const RIGHT_A        = 0b0000_0001;
        const LEFT_B         = 0b0000_0010;
        const UP_SELECT      = 0b0000_0100;
        const DOWN_START     = 0b0000_1000;
        const SELECT_DIRECTION = 0b0001_0000;
        const SELECT_BUTTON    = 0b0010_0000;
    }
}

#[derive(Debug, Clone)]
pub struct Joypad {
    pressed_buttons: JoypadFlags,
    pressed_directions: JoypadFlags,
    /// Bits 4-5 of the register as last written by the game; 1 means "not selected".
    select: JoypadFlags,
}

impl Joypad {
    pub fn new() -> Self {
        Joypad {
            pressed_buttons: JoypadFlags::empty(),
            pressed_directions: JoypadFlags::empty(),
            select: JoypadFlags::SELECT_DIRECTION | JoypadFlags::SELECT_BUTTON,
        }
    }

    /// High nibble echoes the selects (plus the two unused top bits reading 1); low nibble is
    /// the AND of whichever selected row(s) are active, 0 meaning pressed.
    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if !self.select.contains(JoypadFlags::SELECT_BUTTON) {
            low &= !self.pressed_buttons.bits();
        }
        if !self.select.contains(JoypadFlags::SELECT_DIRECTION) {
            low &= !self.pressed_directions.bits();
        }
        0xC0 | self.select.bits() | low
    }

    /// Only bits 4-5 are writable; the rest are discarded.
    pub fn write_select(&mut self, value: u8) {
        self.select = JoypadFlags::from_bits_truncate(value & 0b0011_0000);
    }

    /// Sets pressed state for `button`; returns true if this caused a selected line to fall
    /// from 1 to 0 (the joypad interrupt condition).
    pub fn set_button(&mut self, button: Button, pressed: bool) -> bool {
        let before = self.read() & 0x0F;

        let row = if button.is_direction() {
            &mut self.pressed_directions
        } else {
            &mut self.pressed_buttons
        };
        if pressed {
            row.insert(button.row_flag());
        } else {
            row.remove(button.row_flag());
        }

        let after = self.read() & 0x0F;
        (before & !after) != 0
    }

    /// `(pressed_buttons, pressed_directions, select)` bit patterns for save-state serialization.
    pub fn raw_state(&self) -> (u8, u8, u8) {
        (self.pressed_buttons.bits(), self.pressed_directions.bits(), self.select.bits())
    }

    pub fn load_raw_state(&mut self, pressed_buttons: u8, pressed_directions: u8, select: u8) {
        self.pressed_buttons = JoypadFlags::from_bits_truncate(pressed_buttons);
        self.pressed_directions = JoypadFlags::from_bits_truncate(pressed_directions);
        self.select = JoypadFlags::from_bits_truncate(select);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_selected_row_reads_low_nibble_as_unset() {
        let mut pad = Joypad::new();
        pad.write_select(0b0011_0000);
        assert_eq!(pad.read() & 0x0F, 0x0F);
    }

    #[test]
    fn press_on_selected_row_clears_bit_and_raises_edge() {
        let mut pad = Joypad::new();
        // Bit 4 low selects the direction row.
        pad.write_select(0b0010_0000);
        let edge = pad.set_button(Button::Right, true);
        assert!(edge);
        assert_eq!(pad.read() & 0x01, 0);
    }

    #[test]
    fn release_does_not_raise_edge() {
        let mut pad = Joypad::new();
        pad.write_select(0b0010_0000);
        pad.set_button(Button::Up, true);
        let edge = pad.set_button(Button::Up, false);
        assert!(!edge);
    }
}
