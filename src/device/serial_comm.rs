use super::Result;
use crate::config::PortSettings;

/// Access requested when opening a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    /// No other open of the same device is allowed while this one lives
    pub exclusive: bool,
}

impl OpenOptions {
    pub fn new(read: bool, write: bool, exclusive: bool) -> Self {
        OpenOptions {
            read,
            write,
            exclusive,
        }
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions::new(true, true, true)
    }
}

/// State of the modem input lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineStatus {
    pub cts: bool,
    pub dsr: bool,
    pub dcd: bool,
    pub ri: bool,
}

/// An API to communicate with a serial device
pub trait SerialComm: Send {
    /// Write as much of `data` as the device accepts right now
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever is already received, without waiting
    ///
    /// Returns `Ok(0)` when nothing is available.
    fn read(&mut self, data: &mut [u8]) -> Result<usize>;

    /// Put a complete, already validated line configuration on the device
    fn apply(&mut self, settings: &PortSettings) -> Result<()>;

    /// Whether flow control currently allows the device to transmit
    fn can_transmit(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn line_status(&mut self) -> Result<LineStatus>;

    fn purge_buffers(&mut self) -> Result<()>;
}

/// Opens devices by path
pub trait Connector: Send + Sync {
    fn open(&self, path: &str, options: OpenOptions) -> Result<Box<dyn SerialComm>>;
}
