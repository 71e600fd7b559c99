use alloc::string::String;
use core::convert::Infallible;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use isyglt_icd::{DeviceConfig, DeviceKind, HubConfig};
use modbus_queue::{BusError, Registers};

use crate::error::DeviceError;
use crate::io::{
    bit_mask, decode_illuminance, switch_bits, ButtonGridState, ButtonPress,
    ButtonPresses, GridLeds, GroupState, IoState, MotionFlags, MotionState,
    GRID_BUTTONS, IO_CHANNELS,
};
use crate::light::{
    low_byte, rgb_power_off, CctRange, DimmerState, LightCommand, RgbState,
    WhiteState,
};

/// Last decoded state of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    Rgb(RgbState),
    White(WhiteState),
    Dimmer(DimmerState),
    Motion(MotionState),
    ButtonGrid(ButtonGridState),
    Io(IoState),
    Group(GroupState),
}

impl DeviceState {
    pub fn initial(config: &DeviceConfig) -> Self {
        match config.kind {
            DeviceKind::DmxRgb => DeviceState::Rgb(RgbState::default()),
            DeviceKind::WhiteLight => {
                DeviceState::White(WhiteState::new(&cct_range(config)))
            }
            DeviceKind::Dimmer => DeviceState::Dimmer(DimmerState::default()),
            DeviceKind::MotionSensor => {
                DeviceState::Motion(MotionState::default())
            }
            DeviceKind::ButtonGrid => {
                DeviceState::ButtonGrid(ButtonGridState::default())
            }
            DeviceKind::IoModule => DeviceState::Io(IoState::default()),
            DeviceKind::GroupSwitch => {
                DeviceState::Group(GroupState::default())
            }
        }
    }
}

/// A single switchable bit of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitTarget {
    /// Output `1..=8` of an IO module.
    Output(u8),
    /// LED of button `1..=6` of a button grid.
    ButtonLed(u8),
    /// Backlight of a button grid.
    Backlight,
    /// Indicator LED of a motion sensor.
    MotionLed,
    /// The configured bit of a group switch.
    Group,
}

fn cct_range(config: &DeviceConfig) -> CctRange {
    CctRange { min: config.cct_min, max: config.cct_max }
}

/// Poll and command driver for one configured device.
///
/// All register traffic goes through the device's own [`Registers`], so
/// devices on the same hub share one bus queue and identical reads
/// collapse into one transaction.
pub struct Device<M: RawMutex> {
    config: DeviceConfig,
    unique_id: String,
    regs: Registers<M>,
    state: DeviceState,
    available: bool,
    scan_interval: Duration,
    illuminance_interval: Duration,
    illuminance_due: Option<Instant>,
}

impl<M: RawMutex> Device<M> {
    pub fn new(
        hub: &HubConfig,
        config: DeviceConfig,
        regs: Registers<M>,
    ) -> Self {
        Self {
            unique_id: hub.unique_id(&config),
            state: DeviceState::initial(&config),
            config,
            regs,
            available: false,
            scan_interval: hub.scan_interval(),
            illuminance_interval: hub.illuminance_scan_interval(),
            illuminance_due: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Whether the last refresh succeeded.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn registers(&mut self) -> &mut Registers<M> {
        &mut self.regs
    }

    fn address(&self, offset: u16) -> Result<u16, BusError> {
        self.config.address.checked_add(offset).ok_or(
            BusError::AddressOverflow {
                address: self.config.address,
                length: usize::from(offset) + 1,
            },
        )
    }

    async fn read<const N: usize>(
        &mut self,
        offset: u16,
    ) -> Result<[u16; N], BusError> {
        let address = self.address(offset)?;
        let words = self.regs.read(address, N).await?;
        let received = words.len();
        words.try_into().map_err(|_| BusError::ShortResponse {
            expected: N as u16,
            received,
        })
    }

    async fn write(
        &mut self,
        offset: u16,
        values: &[u16],
    ) -> Result<(), BusError> {
        let address = self.address(offset)?;
        self.regs.write(address, values).await
    }

    /// Read the device's registers and update its state.
    ///
    /// Returns the buttons pressed since the previous refresh. On failure the
    /// device turns unavailable and keeps its last state.
    pub async fn refresh(&mut self) -> Result<ButtonPresses, DeviceError> {
        match self.poll().await {
            Ok((state, presses)) => {
                if !self.available {
                    info!("{}: available", self.unique_id.as_str());
                }
                self.available = true;
                self.state = state;
                for press in presses.iter() {
                    debug!(
                        "{}: button {} pressed",
                        self.unique_id.as_str(),
                        press.button
                    );
                }
                Ok(presses)
            }
            Err(err) => {
                if self.available {
                    warn!("{}: unavailable: {}", self.unique_id.as_str(), err);
                }
                self.available = false;
                Err(err.into())
            }
        }
    }

    async fn poll(&mut self) -> Result<(DeviceState, ButtonPresses), BusError> {
        let mut presses = ButtonPresses::new();
        let state = match self.state {
            DeviceState::Rgb(_) => {
                DeviceState::Rgb(RgbState::decode(&self.read(0).await?))
            }
            DeviceState::White(previous) => {
                let regs = self.read(0).await?;
                let range = cct_range(&self.config);
                DeviceState::White(previous.decode(&regs, &range))
            }
            DeviceState::Dimmer(_) => {
                DeviceState::Dimmer(DimmerState::decode(&self.read(0).await?))
            }
            DeviceState::Motion(previous) => {
                let [ch0] = self.read(0).await?;
                let mut illuminance = previous.illuminance;
                let now = Instant::now();
                if self.illuminance_due.map_or(true, |due| now >= due) {
                    let [ch1, ch2] = self.read(1).await?;
                    illuminance = Some(decode_illuminance(
                        ch1,
                        ch2,
                        self.config.prescaler,
                    ));
                    self.illuminance_due =
                        Some(now + self.illuminance_interval);
                }
                DeviceState::Motion(MotionState {
                    flags: low_byte(ch0),
                    illuminance,
                })
            }
            DeviceState::ButtonGrid(previous) => {
                let [ch0, ch1] = self.read(0).await?;
                let current = ButtonGridState::decode(ch0, ch1);
                presses = current.presses_since(&previous);
                DeviceState::ButtonGrid(current)
            }
            DeviceState::Io(_) => {
                let [ch0, ch1] = self.read(0).await?;
                DeviceState::Io(IoState::decode(ch0, ch1))
            }
            DeviceState::Group(_) => {
                let [ch0] = self.read(0).await?;
                DeviceState::Group(GroupState::decode(
                    ch0,
                    self.config.group_bit(),
                ))
            }
        };
        Ok((state, presses))
    }

    /// Switch a light on or off.
    ///
    /// The new state is only assumed once the write succeeded.
    pub async fn set_light(
        &mut self,
        command: LightCommand,
    ) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Rgb(current) if command.on => {
                let next = current.apply(&command);
                self.write(0, &next.encode_on()).await?;
                self.state = DeviceState::Rgb(next);
            }
            DeviceState::Rgb(current) => {
                // Power off leaves dim and colour channels as they are.
                let mut regs = self.read(0).await?;
                rgb_power_off(&mut regs);
                self.write(0, &regs).await?;
                self.state =
                    DeviceState::Rgb(RgbState { on: false, ..current });
            }
            DeviceState::White(current) => {
                let next = current.apply(&command);
                let range = cct_range(&self.config);
                self.write(0, &next.encode(&range)).await?;
                self.state = DeviceState::White(next);
            }
            DeviceState::Dimmer(current) => {
                let next = current.apply(&command);
                self.write(0, &next.encode()).await?;
                self.state = DeviceState::Dimmer(next);
            }
            _ => return Err(DeviceError::Unsupported(self.config.kind)),
        }
        debug!(
            "{}: light {}",
            self.unique_id.as_str(),
            if command.on { "on" } else { "off" }
        );
        Ok(())
    }

    fn locate(&self, target: BitTarget) -> Result<(u16, u8), DeviceError> {
        let check = |channel: u8, count: u8| {
            if (1..=count).contains(&channel) {
                Ok(bit_mask(channel))
            } else {
                Err(DeviceError::InvalidChannel(channel))
            }
        };
        match (self.config.kind, target) {
            (DeviceKind::IoModule, BitTarget::Output(output)) => {
                Ok((0, check(output, IO_CHANNELS)?))
            }
            (DeviceKind::ButtonGrid, BitTarget::ButtonLed(button)) => {
                Ok((1, check(button, GRID_BUTTONS)?))
            }
            (DeviceKind::ButtonGrid, BitTarget::Backlight) => {
                Ok((1, GridLeds::BACKLIGHT.bits()))
            }
            (DeviceKind::MotionSensor, BitTarget::MotionLed) => {
                Ok((0, MotionFlags::LED.bits()))
            }
            (DeviceKind::GroupSwitch, BitTarget::Group) => {
                Ok((0, check(self.config.group_bit(), 8)?))
            }
            (kind, _) => Err(DeviceError::Unsupported(kind)),
        }
    }

    /// Set or clear one bit with a read-modify-write of its channel.
    ///
    /// If the read fails nothing is written.
    pub async fn set_bit(
        &mut self,
        target: BitTarget,
        on: bool,
    ) -> Result<(), DeviceError> {
        let (offset, mask) = self.locate(target)?;
        let [current] = self.read(offset).await?;
        let value = switch_bits(current, mask, on);
        self.write(offset, &[value]).await?;

        let channel = low_byte(value);
        match &mut self.state {
            DeviceState::Io(io) => io.outputs = channel,
            DeviceState::ButtonGrid(grid) => grid.leds = channel,
            DeviceState::Motion(motion) => motion.flags = channel,
            DeviceState::Group(group) => group.on = on,
            _ => {}
        }
        debug!(
            "{}: {:?} {}",
            self.unique_id.as_str(),
            target,
            if on { "on" } else { "off" }
        );
        Ok(())
    }

    /// Refresh on every scan interval and whenever the bus reports updated
    /// registers, calling `on_refresh` after each attempt. Never returns.
    pub async fn run<F>(&mut self, mut on_refresh: F) -> Infallible
    where
        F: FnMut(&Self, &[ButtonPress]),
    {
        let bus = self.regs.bus().clone();
        let mut listener = bus.listener();
        loop {
            let presses = self.refresh().await.unwrap_or_default();
            on_refresh(self, &presses);

            if let Either::Second(count) =
                select(Timer::after(self.scan_interval), listener.changed())
                    .await
            {
                trace!(
                    "{}: registers updated ({})",
                    self.unique_id.as_str(),
                    count
                );
            }
        }
    }
}
