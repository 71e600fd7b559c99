use derive_more::{Display, From};
use isyglt_devices::DeviceError;
use isyglt_icd::ConfigError;
use modbus_queue::BusError;

#[derive(Debug, Display, From)]
pub enum HostError {
    #[display("cannot read configuration: {_0}")]
    Io(std::io::Error),
    #[display("malformed configuration: {_0}")]
    Json(serde_json::Error),
    #[display("invalid configuration: {_0}")]
    Config(ConfigError),
    #[display("bus error: {_0}")]
    Bus(BusError),
    #[display("device error: {_0}")]
    Device(DeviceError),
}

impl std::error::Error for HostError {}
