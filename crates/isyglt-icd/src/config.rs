use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::bulk::{bulk_ranges, BulkRange};
use crate::error::ConfigError;
use crate::{
    DEFAULT_CCT_MAX, DEFAULT_CCT_MIN, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_PRESCALER, MAX_NAME_LEN, MAX_POLL_INTERVAL_SECS,
    MIN_POLL_INTERVAL_SECS, MIN_PRESCALER,
};

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// DMX RGB fixture: flags, dim, red, green, blue.
    DmxRgb,
    /// Tunable white fixture: flags, colour temperature, dim.
    WhiteLight,
    /// Four-zone presence sensor with illuminance and an indicator LED.
    MotionSensor,
    /// Six push buttons with one LED each and a backlight.
    ButtonGrid,
    /// Eight outputs on the first channel, eight inputs on the second.
    IoModule,
    Dimmer,
    /// One bit of a shared group channel.
    GroupSwitch,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 7] = [
        DeviceKind::DmxRgb,
        DeviceKind::WhiteLight,
        DeviceKind::MotionSensor,
        DeviceKind::ButtonGrid,
        DeviceKind::IoModule,
        DeviceKind::Dimmer,
        DeviceKind::GroupSwitch,
    ];

    /// Consecutive holding registers the device occupies.
    pub const fn register_count(self) -> u16 {
        match self {
            DeviceKind::DmxRgb => 5,
            DeviceKind::WhiteLight => 3,
            DeviceKind::Dimmer
            | DeviceKind::MotionSensor
            | DeviceKind::ButtonGrid
            | DeviceKind::IoModule => 2,
            DeviceKind::GroupSwitch => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceKind::DmxRgb => "dmx_rgb",
            DeviceKind::WhiteLight => "white_light",
            DeviceKind::MotionSensor => "motion_sensor",
            DeviceKind::ButtonGrid => "button_grid",
            DeviceKind::IoModule => "io_module",
            DeviceKind::Dimmer => "dimmer",
            DeviceKind::GroupSwitch => "group_switch",
        }
    }

    pub const fn is_light(self) -> bool {
        matches!(
            self,
            DeviceKind::DmxRgb | DeviceKind::WhiteLight | DeviceKind::Dimmer
        )
    }
}

impl core::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_cct_min() -> u16 {
    DEFAULT_CCT_MIN
}

fn default_cct_max() -> u16 {
    DEFAULT_CCT_MAX
}

fn default_prescaler() -> f64 {
    DEFAULT_PRESCALER
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub name: String,
    /// First holding register of the device.
    pub address: u16,
    /// Warmest colour temperature in Kelvin (white lights).
    #[serde(default = "default_cct_min")]
    pub cct_min: u16,
    /// Coldest colour temperature in Kelvin (white lights).
    #[serde(default = "default_cct_max")]
    pub cct_max: u16,
    /// Divisor applied to the raw illuminance (motion sensors).
    #[serde(default = "default_prescaler")]
    pub prescaler: f64,
    /// Bit 1..=8 of the group channel (group switches).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<u8>,
}

impl DeviceConfig {
    pub fn new(kind: DeviceKind, name: &str, address: u16) -> Self {
        Self {
            kind,
            name: String::from(name),
            address,
            cct_min: DEFAULT_CCT_MIN,
            cct_max: DEFAULT_CCT_MAX,
            prescaler: DEFAULT_PRESCALER,
            bit: None,
        }
    }

    pub fn register_count(&self) -> u16 {
        self.kind.register_count()
    }

    /// `(first register, register count)`.
    pub fn span(&self) -> (u16, u16) {
        (self.address, self.register_count())
    }

    /// Group bit, 1 when not configured.
    pub fn group_bit(&self) -> u8 {
        self.bit.unwrap_or(1)
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(ConfigError::InvalidDeviceName { index });
        }
        let end = u32::from(self.address) + u32::from(self.register_count());
        if end - 1 > u32::from(u16::MAX) {
            return Err(ConfigError::SpanOverflow { index });
        }
        if let Some(bit) = self.bit {
            if !(1..=8).contains(&bit) {
                return Err(ConfigError::BitOutOfRange { index, bit });
            }
        }
        if self.prescaler.is_nan() || self.prescaler < MIN_PRESCALER {
            return Err(ConfigError::PrescalerTooSmall { index });
        }
        if self.kind == DeviceKind::WhiteLight && self.cct_min >= self.cct_max
        {
            return Err(ConfigError::InvertedCctRange { index });
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    /// Modbus hub the devices are reached through. Also the bus id.
    pub hub: String,
    pub devices: Vec<DeviceConfig>,
    /// Poll cycle in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
}

impl HubConfig {
    pub fn new(hub: &str, devices: Vec<DeviceConfig>) -> Self {
        Self {
            hub: String::from(hub),
            devices,
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.is_empty() || self.hub.len() > MAX_NAME_LEN {
            return Err(ConfigError::InvalidHubName);
        }
        if self.poll_interval.is_nan()
            || self.poll_interval < MIN_POLL_INTERVAL_SECS
        {
            return Err(ConfigError::PollIntervalTooShort);
        }
        if self.poll_interval > MAX_POLL_INTERVAL_SECS {
            return Err(ConfigError::PollIntervalTooLong);
        }
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        let mut seen = BTreeSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            device.validate(index)?;
            if !seen.insert(self.unique_id(device)) {
                return Err(ConfigError::DuplicateDevice { index });
            }
        }
        Ok(())
    }

    /// Poll cycle, clamped to [`MAX_POLL_INTERVAL_SECS`].
    pub fn poll_interval(&self) -> Duration {
        let secs = self.poll_interval.clamp(0.0, MAX_POLL_INTERVAL_SECS);
        Duration::from_micros((secs * 1_000_000.0) as u64)
    }

    /// Poll period of one device: two poll cycles.
    pub fn scan_interval(&self) -> Duration {
        self.poll_interval() * 2
    }

    /// Poll period of the illuminance reading: two and a half poll cycles.
    pub fn illuminance_scan_interval(&self) -> Duration {
        self.poll_interval() * 5 / 2
    }

    /// Delay between a write and the "registers updated" broadcast.
    pub fn settle_delay(&self) -> Duration {
        self.poll_interval() * 2
    }

    /// Stable identifier of a device: `{hub}_{slug(name)}_{type}`.
    pub fn unique_id(&self, device: &DeviceConfig) -> String {
        let mut id = String::with_capacity(
            self.hub.len() + device.name.len() + device.kind.as_str().len() + 2,
        );
        id.push_str(&self.hub);
        id.push('_');
        id.push_str(&slugify(&device.name));
        id.push('_');
        id.push_str(device.kind.as_str());
        id
    }

    /// Coalesced register ranges covering every configured device.
    pub fn bulk_ranges(&self) -> Vec<BulkRange> {
        let spans: Vec<_> =
            self.devices.iter().map(DeviceConfig::span).collect();
        bulk_ranges(&spans)
    }
}

/// Lowercase ASCII alphanumerics joined by single underscores.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('_');
            }
            gap = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("unknown");
    }
    slug
}
