use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// The category of a failed serial operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The handle is unknown, or was closed (possibly while the call was waiting)
    InvalidHandle,
    /// The port path does not resolve to a device
    DeviceNotFound,
    /// The device refused access, or the port was opened without the needed direction
    AccessDenied,
    /// The port is already open in this process in a way that conflicts with the request
    AlreadyOpen,
    /// The (data bits, stop bits, parity) combination cannot be put on the wire
    InvalidFraming,
    /// The baud rate is outside the representable range
    UnsupportedBaudRate,
    /// The flow control settings contradict each other
    ConflictingFlowControl,
    /// A transfer was attempted before the port was fully configured
    NotConfigured,
    /// The peer did not drain the line before the write deadline
    WriteTimeout,
    /// The device went away or rejected the operation
    PortUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidHandle => "invalid handle",
            ErrorKind::DeviceNotFound => "device not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::AlreadyOpen => "already open",
            ErrorKind::InvalidFraming => "invalid framing",
            ErrorKind::UnsupportedBaudRate => "unsupported baud rate",
            ErrorKind::ConflictingFlowControl => "conflicting flow control",
            ErrorKind::NotConfigured => "not configured",
            ErrorKind::WriteTimeout => "write timeout",
            ErrorKind::PortUnavailable => "port unavailable",
        };
        f.write_str(name)
    }
}

/// An error from a serial port operation
///
/// Every error carries an [ErrorKind] to match on and a message describing what went wrong.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_handle(handle: crate::PortHandle) -> Self {
        Error::new(
            ErrorKind::InvalidHandle,
            format!("handle {} is not open", handle),
        )
    }
}

impl From<crate::device::Error> for Error {
    fn from(e: crate::device::Error) -> Self {
        use crate::device::Error as DeviceError;

        let kind = match &e {
            DeviceError::NotFound(_) => ErrorKind::DeviceNotFound,
            DeviceError::AccessDenied(_) => ErrorKind::AccessDenied,
            DeviceError::UnsupportedFraming(_) => ErrorKind::InvalidFraming,
            DeviceError::UnsupportedBaudRate(_) => ErrorKind::UnsupportedBaudRate,
            DeviceError::UnsupportedControl(_) => ErrorKind::ConflictingFlowControl,
            DeviceError::Timeout => ErrorKind::WriteTimeout,
            DeviceError::Disconnected(_) | DeviceError::IO(_) => ErrorKind::PortUnavailable,
            #[cfg(feature = "serialport_comm")]
            DeviceError::Serialport(_) => ErrorKind::PortUnavailable,
        };
        Error::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device;

    #[test]
    fn display_includes_kind_and_message() {
        let e = Error::new(ErrorKind::NotConfigured, "configure_data has not succeeded");
        assert_eq!(
            e.to_string(),
            "not configured: configure_data has not succeeded"
        );
    }

    #[test]
    fn device_errors_map_to_kinds() {
        let e: Error = device::Error::NotFound("/dev/ttyUSB9".to_owned()).into();
        assert_eq!(e.kind(), ErrorKind::DeviceNotFound);
        assert!(e.message().contains("/dev/ttyUSB9"));

        let e: Error = device::Error::Timeout.into();
        assert_eq!(e.kind(), ErrorKind::WriteTimeout);

        let e: Error =
            device::Error::IO(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).into();
        assert_eq!(e.kind(), ErrorKind::PortUnavailable);
    }
}
