use log::{debug, info, warn};
use std::time::{Duration, Instant};

mod settings;
pub use settings::ManagerConfig;

use crate::{
    cancel::Cancel,
    config::{
        BaudRate, ControlConfig, DataBits, DataConfig, FlowControl, Parity, PortSettings, StopBits,
    },
    device::{Connector, LineStatus, OpenOptions},
    looper::{self, DataListener, LineListener},
    registry::{PortHandle, PortState, Registry, SessionState},
    transfer, Error, ErrorKind, Result,
};

/// Read size used by [read_string](SerialComManager::read_string)
pub const DEFAULT_READ_SIZE: usize = 1024;

/// Operating system the crate was built for
///
/// Lets callers pick platform specific port names such as `/dev/ttyUSB0` or `COM51`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Linux,
    Windows,
    MacOsX,
    Solaris,
    Other,
}

impl OsType {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            OsType::Linux
        } else if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(target_os = "macos") {
            OsType::MacOsX
        } else if cfg!(target_os = "solaris") || cfg!(target_os = "illumos") {
            OsType::Solaris
        } else {
            OsType::Other
        }
    }
}

/// Opens, configures and drives serial ports by handle
///
/// Wraps a [Connector] that reaches the actual devices. Each port is guarded by its own lock, so
/// configuration and transfers on one handle never overlap while different handles run fully in
/// parallel. The manager is `Sync` and can be shared between threads behind an `Arc`.
///
/// A port accepts transfers once both [configure_data](Self::configure_data) and
/// [configure_control](Self::configure_control) have succeeded on it.
pub struct SerialComManager<C: Connector> {
    connector: C,
    registry: Registry,
    config: ManagerConfig,
}

impl<C: Connector + Default> Default for SerialComManager<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: Connector> SerialComManager<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, ManagerConfig::default())
    }

    pub fn with_config(connector: C, config: ManagerConfig) -> Self {
        SerialComManager {
            connector,
            registry: Registry::default(),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn os_type(&self) -> OsType {
        OsType::current()
    }

    /// Open the device at `path`
    ///
    /// With `exclusive`, no other handle of this manager may have the same path open at the same
    /// time, and the driver is asked to lock out other processes where it can.
    pub fn open(
        &self,
        path: &str,
        read: bool,
        write: bool,
        exclusive: bool,
    ) -> Result<PortHandle> {
        self.open_with(path, OpenOptions::new(read, write, exclusive))
    }

    pub fn open_with(&self, path: &str, options: OpenOptions) -> Result<PortHandle> {
        self.registry.open(&self.connector, path, options)
    }

    /// Close a port, interrupting any read or write waiting on it
    pub fn close(&self, handle: PortHandle) -> Result<()> {
        self.registry.close(handle)
    }

    /// Handles currently open, oldest first
    pub fn open_handles(&self) -> Vec<PortHandle> {
        self.registry.handles()
    }

    pub fn session_state(&self, handle: PortHandle) -> Result<SessionState> {
        match self.registry.lookup(handle) {
            Ok(entry) => match entry.lock() {
                Ok(state) => Ok(state.stage),
                Err(_) => Ok(SessionState::Closed),
            },
            Err(_) if self.registry.issued(handle) => Ok(SessionState::Closed),
            Err(e) => Err(e),
        }
    }

    /// The committed configuration, `None` until both halves are set
    pub fn settings(&self, handle: PortHandle) -> Result<Option<PortSettings>> {
        let entry = self.registry.lookup(handle)?;
        let state = entry.lock()?;
        Ok(state.settings())
    }

    /// Set framing and speed
    ///
    /// Nothing changes unless the whole set is accepted, first by the validator and then by the
    /// driver. [BaudRate::B0] keeps the current speed and drops DTR.
    pub fn configure_data(
        &self,
        handle: PortHandle,
        data_bits: DataBits,
        stop_bits: StopBits,
        parity: Parity,
        baud_rate: BaudRate,
    ) -> Result<()> {
        let data = DataConfig::new(data_bits, stop_bits, parity, baud_rate);
        self.configure(handle, Change::Data(data))?;
        info!("Configured {} data: {}", handle, data);
        Ok(())
    }

    /// Set flow control and the manual RTS/DTR lines
    ///
    /// `xon`/`xoff` only matter for [FlowControl::Software]. Nothing changes unless the whole set
    /// is accepted.
    pub fn configure_control(
        &self,
        handle: PortHandle,
        flow_control: FlowControl,
        xon: u8,
        xoff: u8,
        rts: bool,
        dtr: bool,
    ) -> Result<()> {
        let control = ControlConfig::new(flow_control, xon, xoff, rts, dtr);
        self.configure(handle, Change::Control(control))?;
        info!("Configured {} control: {:?}", handle, control);
        Ok(())
    }

    fn configure(&self, handle: PortHandle, change: Change) -> Result<()> {
        let entry = self.registry.lookup(handle)?;
        let mut state = entry.lock()?;

        let validated = match change {
            Change::Data(data) => data.validate(),
            Change::Control(control) => control.validate(),
        };
        if let Err(e) = validated {
            debug!("configure: rejected for {}: {}", handle, e);
            return Err(e);
        }

        // the driver always gets a full line setup, the half not yet configured uses defaults
        let settings = match change {
            Change::Data(data) => PortSettings {
                data,
                control: state.control.unwrap_or_default(),
            },
            Change::Control(control) => PortSettings {
                data: state.data.unwrap_or_default(),
                control,
            },
        };
        state.device()?.apply(&settings)?;

        match change {
            Change::Data(data) => state.data = Some(data),
            Change::Control(control) => state.control = Some(control),
        }
        state.stage = if state.settings().is_some() {
            SessionState::Configured
        } else {
            SessionState::Opened
        };
        Ok(())
    }

    pub fn clear_buffers(&self, handle: PortHandle) -> Result<()> {
        self.transfer(handle, |state, _| Ok(state.device()?.purge_buffers()?))
    }

    pub fn line_status(&self, handle: PortHandle) -> Result<LineStatus> {
        let entry = self.registry.lookup(handle)?;
        let mut state = entry.lock()?;
        Ok(state.device()?.line_status()?)
    }

    /// Write all of `data`
    ///
    /// With `delay_between_bytes_ms > 0` bytes are sent one at a time with that pause in between.
    /// Blocks while flow control holds the line, failing with
    /// [WriteTimeout](ErrorKind::WriteTimeout) once the line has been held for
    /// [ManagerConfig::write_timeout].
    pub fn write(
        &self,
        handle: PortHandle,
        data: &[u8],
        delay_between_bytes_ms: u64,
    ) -> Result<usize> {
        let delay = Duration::from_millis(delay_between_bytes_ms);
        let config = &self.config;
        self.transfer(handle, |state, cancel| {
            transfer::write(state, cancel, data, delay, config)
        })
    }

    pub fn write_string(
        &self,
        handle: PortHandle,
        data: &str,
        delay_between_bytes_ms: u64,
    ) -> Result<usize> {
        self.write(handle, data.as_bytes(), delay_between_bytes_ms)
    }

    /// Read up to `max_bytes` that have already arrived; may be empty
    pub fn read(&self, handle: PortHandle, max_bytes: usize) -> Result<Vec<u8>> {
        self.transfer(handle, |state, _| transfer::read(state, max_bytes))
    }

    /// Wait up to `timeout` for data
    ///
    /// An empty result means nothing arrived in time. [Duration::MAX] waits without a deadline.
    /// Closing the port from another thread ends
    /// the wait with [InvalidHandle](ErrorKind::InvalidHandle).
    pub fn read_timeout(
        &self,
        handle: PortHandle,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let config = &self.config;
        self.transfer(handle, |state, cancel| {
            transfer::read_timeout(state, cancel, max_bytes, timeout, config)
        })
    }

    /// Read what has arrived as text, replacing invalid UTF-8
    pub fn read_string(&self, handle: PortHandle) -> Result<String> {
        let data = self.read(handle, DEFAULT_READ_SIZE)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Send `payload` on `tx` and check that exactly it arrives on `rx` within `timeout`
    ///
    /// `Ok(false)` means the ports work but the bytes did not make it across intact, which is
    /// what mismatched line settings look like.
    pub fn round_trip(
        &self,
        tx: PortHandle,
        rx: PortHandle,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<bool> {
        self.write(tx, payload, 0)?;

        // no deadline when the timeout does not fit on the clock
        let deadline = Instant::now().checked_add(timeout);
        let mut received = Vec::with_capacity(payload.len());
        while received.len() < payload.len() {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                break;
            }
            let chunk = self.read_timeout(rx, payload.len() - received.len(), remaining)?;
            if chunk.is_empty() {
                break;
            }
            received.extend(chunk);
        }
        let trailing = self.read(rx, DEFAULT_READ_SIZE)?;

        let matched = received == payload && trailing.is_empty();
        if matched {
            debug!("round_trip: {} -> {}: {} bytes ok", tx, rx, payload.len());
        } else {
            warn!(
                "round_trip: {} -> {}: sent {:?}, received {:?} (+{} trailing)",
                tx,
                rx,
                payload,
                received,
                trailing.len()
            );
        }
        Ok(matched)
    }

    /// Hand every chunk of incoming data to `listener` from a background thread
    ///
    /// Only one data listener per port. Reads made by the caller while it runs compete with it
    /// for the same bytes.
    pub fn register_data_listener(
        &self,
        handle: PortHandle,
        listener: impl DataListener,
    ) -> Result<()> {
        let entry = self.registry.lookup(handle)?;
        entry.lock()?.require_configured()?;

        let mut listeners = entry.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if entry.cancel.is_cancelled() {
            return Err(Error::invalid_handle(handle));
        }
        if listeners.data.is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyOpen,
                format!("{} already has a data listener", handle),
            ));
        }
        let looper = looper::spawn_data_looper(
            entry.clone(),
            Box::new(listener),
            self.config.listener_poll_interval,
        )
        .map_err(|e| listener_thread_error(handle, e))?;
        listeners.data = Some(looper);

        info!("Registered data listener on {}", handle);
        Ok(())
    }

    /// Stop the data listener; `false` if there was none
    pub fn unregister_data_listener(&self, handle: PortHandle) -> Result<bool> {
        let entry = self.registry.lookup(handle)?;
        let looper = entry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .take();
        Ok(looper.map(|l| l.stop()).is_some())
    }

    /// Report changes of CTS, DSR, DCD and RI to `listener` from a background thread
    pub fn register_line_listener(
        &self,
        handle: PortHandle,
        listener: impl LineListener,
    ) -> Result<()> {
        let entry = self.registry.lookup(handle)?;
        let initial = entry.lock()?.device()?.line_status()?;

        let mut listeners = entry.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if entry.cancel.is_cancelled() {
            return Err(Error::invalid_handle(handle));
        }
        if listeners.line.is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyOpen,
                format!("{} already has a line listener", handle),
            ));
        }
        let looper = looper::spawn_line_looper(
            entry.clone(),
            Box::new(listener),
            self.config.listener_poll_interval,
            initial,
        )
        .map_err(|e| listener_thread_error(handle, e))?;
        listeners.line = Some(looper);

        info!("Registered line listener on {}", handle);
        Ok(())
    }

    /// Stop the line listener; `false` if there was none
    pub fn unregister_line_listener(&self, handle: PortHandle) -> Result<bool> {
        let entry = self.registry.lookup(handle)?;
        let looper = entry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .line
            .take();
        Ok(looper.map(|l| l.stop()).is_some())
    }

    /// Run a transfer under the port's lock, closing the port if its device is gone
    fn transfer<T>(
        &self,
        handle: PortHandle,
        op: impl FnOnce(&mut PortState, &Cancel) -> Result<T>,
    ) -> Result<T> {
        let entry = self.registry.lookup(handle)?;
        let result = {
            let mut state = entry.lock()?;
            op(&mut *state, &entry.cancel)
        };

        if let Err(e) = &result {
            if e.kind() == ErrorKind::PortUnavailable {
                warn!("{} ({}) is gone, closing: {}", handle, entry.path, e);
                if let Err(e) = self.registry.close(handle) {
                    debug!("transfer: {} already closed: {}", handle, e);
                }
            }
        }
        result
    }
}

#[derive(Clone, Copy)]
enum Change {
    Data(DataConfig),
    Control(ControlConfig),
}

fn listener_thread_error(handle: PortHandle, e: std::io::Error) -> Error {
    Error::new(
        ErrorKind::PortUnavailable,
        format!("could not start listener thread for {}: {}", handle, e),
    )
}
