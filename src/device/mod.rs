//! Device layer: the native drivers a port session talks through

mod serial_comm;
pub use serial_comm::{Connector, LineStatus, OpenOptions, SerialComm};

mod loopback;
pub use loopback::{Loopback, LoopbackDevice};

#[cfg(feature = "serialport_comm")]
mod serialport_comm;
#[cfg(feature = "serialport_comm")]
pub use serialport_comm::{SerialPort, SystemPorts};

type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "serialport_comm")]
    #[error("Serialport error: `{0:?}`")]
    Serialport(serialport::Error),
    #[error("IO error: `{0:?}`")]
    IO(std::io::Error),
    #[error("No such device: `{0}`")]
    NotFound(String),
    #[error("Access denied: `{0}`")]
    AccessDenied(String),
    #[error("Framing not supported by driver: `{0}`")]
    UnsupportedFraming(String),
    #[error("Baud rate not supported by driver: `{0}`")]
    UnsupportedBaudRate(String),
    #[error("Line control not supported by driver: `{0}`")]
    UnsupportedControl(String),
    #[error("Device timed out")]
    Timeout,
    #[error("Device disconnected: `{0}`")]
    Disconnected(String),
}

#[cfg(feature = "serialport_comm")]
impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => Error::NotFound(e.description),
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                Error::NotFound(e.description)
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                Error::AccessDenied(e.description)
            }
            _ => Error::Serialport(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::IO(e),
        }
    }
}
