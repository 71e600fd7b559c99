use derive_more::From;
use isyglt_icd::DeviceKind;
use modbus_queue::BusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// Register access failed; the device is unavailable.
    #[from]
    Bus(BusError),
    /// The command does not apply to this kind of device.
    Unsupported(DeviceKind),
    /// Output, button or group bit number outside the device's range.
    InvalidChannel(u8),
}

impl core::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceError::Bus(err) => write!(f, "bus error: {}", err),
            DeviceError::Unsupported(kind) => {
                write!(f, "command not supported by {}", kind)
            }
            DeviceError::InvalidChannel(channel) => {
                write!(f, "invalid channel {}", channel)
            }
        }
    }
}
