#![no_std]
//! Field devices behind an ISYGLT Modbus hub.
//!
//! [`light`] and [`io`] hold the register codecs of every device kind;
//! [`Device`] drives one configured device over a shared bus queue, polling
//! it on its scan interval and whenever the bus reports updated registers.
extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod device;
mod error;
pub mod io;
pub mod light;

pub use device::{BitTarget, Device, DeviceState};
pub use error::DeviceError;
pub use io::{ButtonPress, ButtonPresses};
pub use light::LightCommand;
