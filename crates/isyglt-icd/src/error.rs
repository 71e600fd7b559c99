/// Reasons a [`HubConfig`](crate::HubConfig) is rejected.
///
/// `index` is the position of the offending entry in `devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    InvalidHubName,
    NoDevices,
    PollIntervalTooShort,
    PollIntervalTooLong,
    InvalidDeviceName { index: usize },
    PrescalerTooSmall { index: usize },
    BitOutOfRange { index: usize, bit: u8 },
    InvertedCctRange { index: usize },
    SpanOverflow { index: usize },
    DuplicateDevice { index: usize },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidHubName => {
                write!(f, "hub name must be 1 to {} bytes", crate::MAX_NAME_LEN)
            }
            ConfigError::NoDevices => write!(f, "no devices configured"),
            ConfigError::PollIntervalTooShort => write!(
                f,
                "poll interval must be at least {} s",
                crate::MIN_POLL_INTERVAL_SECS
            ),
            ConfigError::PollIntervalTooLong => write!(
                f,
                "poll interval must be at most {} s",
                crate::MAX_POLL_INTERVAL_SECS
            ),
            ConfigError::InvalidDeviceName { index } => write!(
                f,
                "device {}: name must be 1 to {} bytes",
                index,
                crate::MAX_NAME_LEN
            ),
            ConfigError::PrescalerTooSmall { index } => write!(
                f,
                "device {}: prescaler must be at least {}",
                index,
                crate::MIN_PRESCALER
            ),
            ConfigError::BitOutOfRange { index, bit } => {
                write!(f, "device {}: bit {} outside 1..=8", index, bit)
            }
            ConfigError::InvertedCctRange { index } => {
                write!(f, "device {}: cct_min must be below cct_max", index)
            }
            ConfigError::SpanOverflow { index } => write!(
                f,
                "device {}: registers run past the address space",
                index
            ),
            ConfigError::DuplicateDevice { index } => write!(
                f,
                "device {}: same name and type as an earlier device",
                index
            ),
        }
    }
}

#[cfg(feature = "use-std")]
impl std::error::Error for ConfigError {}
