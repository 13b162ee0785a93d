// Connection module - device lifecycle shared by audio and MIDI transports

pub mod manager;
pub mod port;
pub mod reconnect;
pub mod status;

pub use manager::DeviceManager;
pub use port::{DevicePort, FaultReporter, PortConnector};
pub use reconnect::{CancellationToken, ReconnectPolicy};
pub use status::{AtomicDeviceStatus, DeviceStatus};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Device '{0}' not found")]
    NotFound(String),

    #[error("Failed to open '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Device stopped with error: {0}")]
    Stream(String),

    #[error("No port configured for {0}")]
    Unroutable(String),

    #[error("Device manager disposed")]
    Disposed,
}
