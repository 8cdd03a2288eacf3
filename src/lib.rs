//! Crate for opening serial ports, configuring their lines and checking that data gets across
//!
//! Ports are reached through a [Connector](device::Connector): the operating system's ports with
//! the `serialport_comm` feature, or in-memory [Loopback](device::Loopback) pairs.
//!
//! # Usage
//! ```
//! use serialcom::{
//!     config::{BaudRate, DataBits, FlowControl, Parity, StopBits},
//!     device::Loopback,
//!     SerialComManager,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), serialcom::Error> {
//!     let bus = Loopback::new();
//!     bus.add_pair("/dev/pts/1", "/dev/pts/3");
//!     let scm = SerialComManager::new(bus);
//!
//!     let a = scm.open("/dev/pts/1", true, true, true)?;
//!     let b = scm.open("/dev/pts/3", true, true, true)?;
//!     for handle in [a, b] {
//!         scm.configure_data(handle, DataBits::Eight, StopBits::One, Parity::None, BaudRate::B9600)?;
//!         scm.configure_control(handle, FlowControl::None, b'x', b'x', false, false)?;
//!     }
//!
//!     scm.write(a, b"testing", 0)?;
//!     let data = scm.read_timeout(b, 1024, Duration::from_millis(500))?;
//!     assert_eq!(data, b"testing");
//!
//!     scm.close(a)?;
//!     scm.close(b)?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod config;

pub mod device;

mod error;
pub use error::{Error, ErrorKind};
use error::Result;

mod cancel;

mod looper;
pub use looper::{DataListener, LineEvent, LineListener};

mod manager;
pub use manager::{ManagerConfig, OsType, SerialComManager, DEFAULT_READ_SIZE};

mod registry;
pub use registry::{PortHandle, SessionState};

mod transfer;
