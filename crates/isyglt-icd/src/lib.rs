#![cfg_attr(not(feature = "use-std"), no_std)]
//! Configuration shared by everything that talks to an ISYGLT hub.
//!
//! A [`HubConfig`] names the Modbus hub, its poll cycle and the devices
//! behind it. Deserialize it with any serde format, then call
//! [`HubConfig::validate`] before wiring devices to a bus.
extern crate alloc;

mod bulk;
pub use bulk::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

// Constants
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.1;
pub const MAX_POLL_INTERVAL_SECS: f64 = 3600.0;
pub const DEFAULT_CCT_MIN: u16 = 2512;
pub const DEFAULT_CCT_MAX: u16 = 5000;
pub const DEFAULT_PRESCALER: f64 = 1.0;
pub const MIN_PRESCALER: f64 = 0.0001;
/// Longest hub or device name. Hub names double as bus identifiers.
pub const MAX_NAME_LEN: usize = 32;
