//! Register layouts of the light fixtures.
//!
//! Every channel carries its value in the low byte of one holding register.
use bitflags::bitflags;

/// Brightness reported when the fixture's dimming stage is bypassed.
pub const FULL_BRIGHTNESS: u8 = 255;
/// Colour temperature value that leaves the fixture's CCT setting alone.
pub const CCT_UNCHANGED: u8 = 127;

pub(crate) fn low_byte(word: u16) -> u8 {
    (word & 0xFF) as u8
}

bitflags! {
    /// CH0 of a DMX RGB fixture
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct RgbFlags: u8 {
        const POWER    = 0b0000_0001;
        const DIM_EN   = 0b0000_0010;
        const COLOR_EN = 0b0000_0100;
    }
}

bitflags! {
    /// CH0 of a tunable white fixture
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct WhiteFlags: u8 {
        const POWER  = 0b0000_0001;
        const CCT_EN = 0b0000_0010;
        const DIM_EN = 0b0000_0100;
    }
}

bitflags! {
    /// CH0 of a dimmer
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DimmerFlags: u8 {
        const POWER  = 0b0000_0001;
        const DIM_EN = 0b0000_0010;
    }
}

/// Requested light state. Unset fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightCommand {
    pub on: bool,
    pub brightness: Option<u8>,
    pub rgb: Option<[u8; 3]>,
    /// Colour temperature in Kelvin.
    pub kelvin: Option<u16>,
}

impl LightCommand {
    pub fn on() -> Self {
        Self { on: true, ..Default::default() }
    }

    pub fn off() -> Self {
        Self::default()
    }

    pub fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn rgb(mut self, rgb: [u8; 3]) -> Self {
        self.rgb = Some(rgb);
        self
    }

    pub fn kelvin(mut self, kelvin: u16) -> Self {
        self.kelvin = Some(kelvin);
        self
    }
}

// ---------------------------------------------------------------------------
// RGB: CH0 flags, CH1 dim, CH2..CH4 red, green, blue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RgbState {
    pub on: bool,
    pub brightness: u8,
    pub rgb: [u8; 3],
    /// The fixture follows the colour channels rather than its own program.
    pub color_enabled: bool,
}

impl Default for RgbState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: FULL_BRIGHTNESS,
            rgb: [255, 255, 255],
            color_enabled: false,
        }
    }
}

impl RgbState {
    pub fn decode(regs: &[u16; 5]) -> Self {
        let flags = RgbFlags::from_bits_retain(low_byte(regs[0]));
        Self {
            on: flags.contains(RgbFlags::POWER),
            brightness: if flags.contains(RgbFlags::DIM_EN) {
                low_byte(regs[1])
            } else {
                FULL_BRIGHTNESS
            },
            rgb: [low_byte(regs[2]), low_byte(regs[3]), low_byte(regs[4])],
            color_enabled: flags.contains(RgbFlags::COLOR_EN),
        }
    }

    /// Registers that switch the fixture on with this state's colour and
    /// brightness.
    pub fn encode_on(&self) -> [u16; 5] {
        let mut flags = RgbFlags::POWER | RgbFlags::COLOR_EN;
        if self.brightness != FULL_BRIGHTNESS {
            flags |= RgbFlags::DIM_EN;
        }
        [
            u16::from(flags.bits()),
            u16::from(self.brightness),
            u16::from(self.rgb[0]),
            u16::from(self.rgb[1]),
            u16::from(self.rgb[2]),
        ]
    }

    /// Apply `command` to a copy of this state.
    pub fn apply(&self, command: &LightCommand) -> Self {
        Self {
            on: command.on,
            brightness: command.brightness.unwrap_or(self.brightness),
            rgb: command.rgb.unwrap_or(self.rgb),
            color_enabled: self.color_enabled || command.on,
        }
    }
}

/// Clear the power bit of CH0 and keep the other channels as read.
pub fn rgb_power_off(regs: &mut [u16; 5]) {
    let flags = RgbFlags::from_bits_retain(low_byte(regs[0]));
    regs[0] = u16::from((flags - RgbFlags::POWER).bits());
}

// ---------------------------------------------------------------------------
// White: CH0 flags, CH1 colour temperature, CH2 dim
// ---------------------------------------------------------------------------

/// Colour temperature range of a tunable white fixture, in Kelvin.
///
/// The CCT channel runs backwards: 0 is the coldest (`max`) and 255 the
/// warmest (`min`) setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CctRange {
    pub min: u16,
    pub max: u16,
}

impl CctRange {
    fn span(&self) -> u32 {
        u32::from(self.max.saturating_sub(self.min))
    }

    pub fn midpoint(&self) -> u16 {
        self.min + self.max.saturating_sub(self.min) / 2
    }

    pub fn to_kelvin(&self, value: u8) -> u16 {
        // Round the offset up so the result truncates toward `min`.
        let offset = (self.span() * u32::from(value)).div_ceil(255);
        self.max - offset as u16
    }

    /// An empty or inverted range maps every temperature to 0.
    pub fn to_value(&self, kelvin: u16) -> u8 {
        if self.min >= self.max {
            return 0;
        }
        let kelvin = kelvin.clamp(self.min, self.max);
        let value = u32::from(self.max - kelvin) * 255 / self.span();
        value.min(255) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WhiteState {
    pub on: bool,
    pub brightness: u8,
    pub kelvin: u16,
}

impl WhiteState {
    pub fn new(range: &CctRange) -> Self {
        Self {
            on: false,
            brightness: FULL_BRIGHTNESS,
            kelvin: range.midpoint(),
        }
    }

    /// Decode CH0..CH2. The colour temperature is only reported while the
    /// CCT channel is enabled; otherwise `self.kelvin` is kept.
    pub fn decode(&self, regs: &[u16; 3], range: &CctRange) -> Self {
        let flags = WhiteFlags::from_bits_retain(low_byte(regs[0]));
        Self {
            on: flags.contains(WhiteFlags::POWER),
            brightness: if flags.contains(WhiteFlags::DIM_EN) {
                low_byte(regs[2])
            } else {
                FULL_BRIGHTNESS
            },
            kelvin: if flags.contains(WhiteFlags::CCT_EN) {
                range.to_kelvin(low_byte(regs[1]))
            } else {
                self.kelvin
            },
        }
    }

    pub fn encode(&self, range: &CctRange) -> [u16; 3] {
        let cct = range.to_value(self.kelvin);
        let mut flags = WhiteFlags::empty();
        flags.set(WhiteFlags::POWER, self.on);
        flags.set(WhiteFlags::CCT_EN, cct != CCT_UNCHANGED);
        flags.set(WhiteFlags::DIM_EN, self.brightness != FULL_BRIGHTNESS);
        [
            u16::from(flags.bits()),
            u16::from(cct),
            u16::from(self.brightness),
        ]
    }

    pub fn apply(&self, command: &LightCommand) -> Self {
        Self {
            on: command.on,
            brightness: command.brightness.unwrap_or(self.brightness),
            kelvin: command.kelvin.unwrap_or(self.kelvin),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimmer: CH0 flags, CH1 dim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DimmerState {
    pub on: bool,
    pub brightness: u8,
}

impl Default for DimmerState {
    fn default() -> Self {
        Self { on: false, brightness: FULL_BRIGHTNESS }
    }
}

impl DimmerState {
    pub fn decode(regs: &[u16; 2]) -> Self {
        let flags = DimmerFlags::from_bits_retain(low_byte(regs[0]));
        Self {
            on: flags.contains(DimmerFlags::POWER),
            brightness: if flags.contains(DimmerFlags::DIM_EN) {
                low_byte(regs[1])
            } else {
                FULL_BRIGHTNESS
            },
        }
    }

    pub fn encode(&self) -> [u16; 2] {
        let mut flags = DimmerFlags::empty();
        flags.set(DimmerFlags::POWER, self.on);
        flags.set(DimmerFlags::DIM_EN, self.brightness != FULL_BRIGHTNESS);
        [u16::from(flags.bits()), u16::from(self.brightness)]
    }

    pub fn apply(&self, command: &LightCommand) -> Self {
        Self {
            on: command.on,
            brightness: command.brightness.unwrap_or(self.brightness),
        }
    }
}
