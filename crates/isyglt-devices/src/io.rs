//! Register layouts of the switching and sensing devices.
use bitflags::bitflags;
use heapless::Vec;

use crate::light::low_byte;

pub const IO_CHANNELS: u8 = 8;
pub const GRID_BUTTONS: u8 = 6;
pub const MOTION_ZONES: u8 = 4;

bitflags! {
    /// CH0 of a motion sensor
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MotionFlags: u8 {
        const ZONE1 = 0b0000_0001;
        const ZONE2 = 0b0000_0010;
        const ZONE3 = 0b0000_0100;
        const ZONE4 = 0b0000_1000;
        const LED   = 0b1000_0000;

        const ZONES = Self::ZONE1.bits() | Self::ZONE2.bits()
            | Self::ZONE3.bits() | Self::ZONE4.bits();
    }
}

bitflags! {
    /// CH1 of a button grid
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct GridLeds: u8 {
        const LED1      = 0b0000_0001;
        const LED2      = 0b0000_0010;
        const LED3      = 0b0000_0100;
        const LED4      = 0b0000_1000;
        const LED5      = 0b0001_0000;
        const LED6      = 0b0010_0000;
        const BACKLIGHT = 0b0100_0000;
    }
}

/// Mask of a 1-based channel number.
pub(crate) fn bit_mask(channel: u8) -> u8 {
    1 << (channel - 1)
}

/// Eight outputs on CH0, eight inputs on CH1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoState {
    pub outputs: u8,
    pub inputs: u8,
}

impl IoState {
    pub fn decode(ch0: u16, ch1: u16) -> Self {
        Self { outputs: low_byte(ch0), inputs: low_byte(ch1) }
    }

    /// State of output `1..=8`.
    pub fn output(&self, output: u8) -> bool {
        self.outputs & bit_mask(output) != 0
    }

    /// State of input `1..=8`.
    pub fn input(&self, input: u8) -> bool {
        self.inputs & bit_mask(input) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionState {
    pub flags: u8,
    /// Lux, `None` until the first illuminance read succeeds.
    pub illuminance: Option<f64>,
}

impl MotionState {
    fn motion(&self) -> MotionFlags {
        MotionFlags::from_bits_retain(self.flags)
    }

    /// Presence in zone `1..=4`.
    pub fn zone(&self, zone: u8) -> bool {
        self.flags & bit_mask(zone) != 0
    }

    /// Presence in any zone.
    pub fn presence(&self) -> bool {
        self.motion().intersects(MotionFlags::ZONES)
    }

    pub fn led(&self) -> bool {
        self.motion().contains(MotionFlags::LED)
    }
}

/// Illuminance from CH1 (high byte) and CH2 (low byte).
pub fn decode_illuminance(ch1: u16, ch2: u16, prescaler: f64) -> f64 {
    let raw = (u16::from(low_byte(ch1)) << 8) | u16::from(low_byte(ch2));
    f64::from(raw) / prescaler
}

/// A button that went from released to pressed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonPress {
    /// Button number `1..=6`.
    pub button: u8,
}

pub type ButtonPresses = Vec<ButtonPress, { GRID_BUTTONS as usize }>;

/// Six buttons on CH0; their LEDs and the backlight on CH1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonGridState {
    pub buttons: u8,
    pub leds: u8,
}

impl ButtonGridState {
    pub fn decode(ch0: u16, ch1: u16) -> Self {
        Self { buttons: low_byte(ch0) & 0x3F, leds: low_byte(ch1) }
    }

    pub fn pressed(&self, button: u8) -> bool {
        self.buttons & bit_mask(button) != 0
    }

    pub fn led(&self, button: u8) -> bool {
        self.leds & bit_mask(button) != 0
    }

    pub fn backlight(&self) -> bool {
        GridLeds::from_bits_retain(self.leds).contains(GridLeds::BACKLIGHT)
    }

    /// Buttons pressed in `self` that were released in `previous`.
    pub fn presses_since(&self, previous: &Self) -> ButtonPresses {
        let rising = self.buttons & !previous.buttons;
        (1..=GRID_BUTTONS)
            .filter(|&button| rising & bit_mask(button) != 0)
            .map(|button| ButtonPress { button })
            .collect()
    }
}

/// One configured bit of a group channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupState {
    pub on: bool,
}

impl GroupState {
    pub fn decode(ch0: u16, bit: u8) -> Self {
        Self { on: low_byte(ch0) & bit_mask(bit) != 0 }
    }
}

/// Apply `on` to the bits in `mask` of a channel value.
pub fn switch_bits(value: u16, mask: u8, on: bool) -> u16 {
    let value = low_byte(value);
    u16::from(if on { value | mask } else { value & !mask })
}
