//! Handle allocation and the state behind each open port

use log::{debug, info};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{
    cancel::Cancel,
    config::{ControlConfig, DataConfig, PortSettings},
    device::{Connector, OpenOptions, SerialComm},
    looper::Listeners,
    Error, ErrorKind, Result,
};

/// Opaque reference to one open port
///
/// Handles are never handed out twice, so a stale handle can never reach a port that was opened
/// later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortHandle(u64);

impl PortHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a port is in its open → configure → transfer → close life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Opened,
    Configured,
    Active,
    Closed,
}

/// Everything guarded by a port's lock
pub(crate) struct PortState {
    pub(crate) handle: PortHandle,
    pub(crate) path: String,
    pub(crate) options: OpenOptions,
    pub(crate) data: Option<DataConfig>,
    pub(crate) control: Option<ControlConfig>,
    pub(crate) stage: SessionState,
    device: Option<Box<dyn SerialComm>>,
}

impl PortState {
    /// The committed configuration, only once both halves are in place
    pub(crate) fn settings(&self) -> Option<PortSettings> {
        Some(PortSettings {
            data: self.data?,
            control: self.control?,
        })
    }

    pub(crate) fn device(&mut self) -> Result<&mut Box<dyn SerialComm>> {
        let handle = self.handle;
        self.device
            .as_mut()
            .ok_or_else(|| Error::invalid_handle(handle))
    }

    /// Fail unless the port is ready for reads and writes
    pub(crate) fn require_configured(&self) -> Result<()> {
        match self.stage {
            SessionState::Configured | SessionState::Active => Ok(()),
            SessionState::Closed => Err(Error::invalid_handle(self.handle)),
            _ => Err(Error::new(
                ErrorKind::NotConfigured,
                format!(
                    "{} ({}) needs both data and control configuration before transfers",
                    self.handle, self.path
                ),
            )),
        }
    }
}

pub(crate) struct PortEntry {
    pub(crate) handle: PortHandle,
    pub(crate) path: String,
    pub(crate) options: OpenOptions,
    pub(crate) cancel: Cancel,
    pub(crate) listeners: Mutex<Listeners>,
    state: Mutex<PortState>,
}

impl PortEntry {
    /// Take the port's lock, failing if it was closed in the meantime
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, PortState>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stage == SessionState::Closed {
            Err(Error::invalid_handle(self.handle))
        } else {
            Ok(state)
        }
    }
}

/// All open ports of a manager
pub(crate) struct Registry {
    next: AtomicU64,
    table: Mutex<Table>,
}

#[derive(Default)]
struct Table {
    ports: HashMap<PortHandle, Arc<PortEntry>>,
    /// Paths being opened right now, with whether the open is exclusive
    opening: Vec<(String, bool)>,
}

impl Table {
    fn conflict(&self, path: &str, exclusive: bool) -> Option<String> {
        if let Some(entry) = self
            .ports
            .values()
            .find(|entry| entry.path == path && (entry.options.exclusive || exclusive))
        {
            return Some(format!("{} is already open as {}", path, entry.handle));
        }
        self.opening
            .iter()
            .any(|(other, other_exclusive)| other == path && (*other_exclusive || exclusive))
            .then(|| format!("{} is being opened", path))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            next: AtomicU64::new(1),
            table: Mutex::new(Table::default()),
        }
    }
}

impl Registry {
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open `path` through `connector`
    ///
    /// The path is claimed before the native open and the registry is unlocked while the driver
    /// works, so a slow device never holds up other handles.
    pub(crate) fn open(
        &self,
        connector: &dyn Connector,
        path: &str,
        options: OpenOptions,
    ) -> Result<PortHandle> {
        {
            let mut table = self.table();
            if let Some(message) = table.conflict(path, options.exclusive) {
                return Err(Error::new(ErrorKind::AlreadyOpen, message));
            }
            table.opening.push((path.to_owned(), options.exclusive));
        }

        let opened = connector.open(path, options);

        let mut table = self.table();
        if let Some(claim) = table
            .opening
            .iter()
            .position(|(other, exclusive)| other == path && *exclusive == options.exclusive)
        {
            table.opening.swap_remove(claim);
        }
        let device = opened?;

        let handle = PortHandle(self.next.fetch_add(1, Ordering::Relaxed));
        let entry = PortEntry {
            handle,
            path: path.to_owned(),
            options,
            cancel: Cancel::new(),
            listeners: Mutex::new(Listeners::default()),
            state: Mutex::new(PortState {
                handle,
                path: path.to_owned(),
                options,
                data: None,
                control: None,
                stage: SessionState::Opened,
                device: Some(device),
            }),
        };
        table.ports.insert(handle, Arc::new(entry));

        info!("Opened {} as {} ({:?})", path, handle, options);
        Ok(handle)
    }

    pub(crate) fn lookup(&self, handle: PortHandle) -> Result<Arc<PortEntry>> {
        self.table()
            .ports
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::invalid_handle(handle))
    }

    /// Whether `handle` was ever handed out by this registry
    pub(crate) fn issued(&self, handle: PortHandle) -> bool {
        handle.0 > 0 && handle.0 < self.next.load(Ordering::Relaxed)
    }

    /// Unregister a port and release its device
    ///
    /// Anything waiting on the port is woken and fails with
    /// [InvalidHandle](ErrorKind::InvalidHandle); the device is dropped once the port's lock is
    /// free.
    pub(crate) fn close(&self, handle: PortHandle) -> Result<()> {
        let entry = self
            .table()
            .ports
            .remove(&handle)
            .ok_or_else(|| Error::invalid_handle(handle))?;

        entry.cancel.cancel();
        entry
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stop_all();

        let mut state = entry.state.lock().unwrap_or_else(|e| e.into_inner());
        state.stage = SessionState::Closed;
        state.device = None;
        debug!("close: released device for {}", handle);

        info!("Closed {} ({})", entry.path, handle);
        Ok(())
    }

    pub(crate) fn handles(&self) -> Vec<PortHandle> {
        let mut handles: Vec<_> = self.table().ports.keys().copied().collect();
        handles.sort();
        handles
    }
}
