// Opaque hardware port abstraction shared by audio and MIDI transports

use super::DeviceError;
use std::sync::{Arc, Weak};

/// An open connection to one device
pub trait DevicePort: Send + 'static {
    /// Outbound message type; `Infallible` for ports that take no messages
    type Message: Send + 'static;

    fn send(&mut self, message: &Self::Message) -> Result<(), DeviceError>;
}

/// Opens ports by device name
pub trait PortConnector: Send + Sync + 'static {
    type Port: DevicePort;

    /// Open `name`. Asynchronous driver failures are reported through `faults`.
    fn open(&self, name: &str, faults: FaultReporter) -> Result<Self::Port, DeviceError>;

    /// Names of the devices currently visible to the driver
    fn available(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Receiver of asynchronous fault reports
pub(crate) trait FaultTarget: Send + Sync {
    fn report_fault(&self, port: &str, generation: u64, error: DeviceError);
}

/// Handed to a port when it is opened, so driver callbacks ("stopped with
/// error") can flag the port as faulted. Reports from a stale handle are ignored.
#[derive(Clone)]
pub struct FaultReporter {
    target: Option<Weak<dyn FaultTarget>>,
    port: Arc<str>,
    generation: u64,
}

impl FaultReporter {
    pub(crate) fn new(target: Weak<dyn FaultTarget>, port: &str, generation: u64) -> Self {
        Self {
            target: Some(target),
            port: Arc::from(port),
            generation,
        }
    }

    /// A reporter wired to nothing, for ports opened outside a manager
    pub fn detached(port: &str) -> Self {
        Self {
            target: None,
            port: Arc::from(port),
            generation: 0,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn report(&self, error: DeviceError) {
        match self.target.as_ref().and_then(Weak::upgrade) {
            Some(target) => target.report_fault(&self.port, self.generation, error),
            None => log::warn!("Unhandled fault on '{}': {}", self.port, error),
        }
    }
}

impl std::fmt::Debug for FaultReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultReporter")
            .field("port", &self.port)
            .field("generation", &self.generation)
            .finish()
    }
}
