//! Host side of the ISYGLT hub: configuration loading, logging setup and a
//! simulated gateway to run devices against.
use std::path::Path;

use tracing_subscriber::EnvFilter;

mod error;
pub mod field;
pub mod hub;

pub use error::HostError;
pub use field::RegisterFile;
pub use hub::{Hub, HostMutex, RoundReport};
pub use isyglt_devices as devices;
pub use isyglt_icd as icd;

/// Parse and validate a hub configuration file.
pub fn load_config(path: &Path) -> Result<icd::HubConfig, HostError> {
    let text = std::fs::read_to_string(path)?;
    let config: icd::HubConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// Route `tracing` and `log` records to stderr, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
