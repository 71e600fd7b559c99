use derive_more::From;

/// Failures reported by a [`Transport`](crate::Transport) for one
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The addressed device did not answer.
    NoResponse,
    /// A reply arrived but could not be decoded.
    Malformed,
    /// The device answered with a Modbus exception code.
    Exception(u8),
    /// The link to the gateway is down.
    Link,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::NoResponse => write!(f, "device did not respond"),
            TransportError::Malformed => write!(f, "malformed response"),
            TransportError::Exception(code) => {
                write!(f, "modbus exception code {}", code)
            }
            TransportError::Link => write!(f, "link down"),
        }
    }
}

/// Errors surfaced to callers of the queue and the register facade.
///
/// Every waiter of a failed command observes the same value, so the type is
/// cheap to clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The transport failed the transaction.
    #[from]
    Transport(TransportError),
    /// The transport returned fewer registers than requested.
    ShortResponse { expected: u16, received: usize },
    /// Register count is zero or above the per-transaction ceiling.
    InvalidLength(usize),
    /// The addressed span runs past the end of the 16-bit address space.
    AddressOverflow { address: u16, length: usize },
    /// Bus identifier is empty or longer than
    /// [`MAX_BUS_ID_LEN`](crate::MAX_BUS_ID_LEN).
    InvalidBusId,
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::Transport(err) => write!(f, "transport error: {}", err),
            BusError::ShortResponse { expected, received } => write!(
                f,
                "short response: expected {} registers, received {}",
                expected, received
            ),
            BusError::InvalidLength(len) => {
                write!(f, "invalid register count: {}", len)
            }
            BusError::AddressOverflow { address, length } => write!(
                f,
                "span of {} registers at {} overflows the address space",
                length, address
            ),
            BusError::InvalidBusId => write!(f, "invalid bus identifier"),
        }
    }
}
