//! Background listeners that watch a port for incoming data or modem line changes

use log::{debug, trace, warn};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{cancel::Cancel, device::LineStatus, registry::PortEntry};

/// Receives bytes as they arrive on a port
pub trait DataListener: Send + 'static {
    fn on_data(&mut self, data: &[u8]);
}

impl<F: FnMut(&[u8]) + Send + 'static> DataListener for F {
    fn on_data(&mut self, data: &[u8]) {
        self(data)
    }
}

/// A change on one or more modem input lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub previous: LineStatus,
    pub current: LineStatus,
}

impl LineEvent {
    pub fn cts_changed(&self) -> bool {
        self.previous.cts != self.current.cts
    }

    pub fn dsr_changed(&self) -> bool {
        self.previous.dsr != self.current.dsr
    }

    pub fn dcd_changed(&self) -> bool {
        self.previous.dcd != self.current.dcd
    }

    pub fn ri_changed(&self) -> bool {
        self.previous.ri != self.current.ri
    }
}

/// Receives modem line changes on a port
pub trait LineListener: Send + 'static {
    fn on_line_event(&mut self, event: LineEvent);
}

impl<F: FnMut(LineEvent) + Send + 'static> LineListener for F {
    fn on_line_event(&mut self, event: LineEvent) {
        self(event)
    }
}

/// A listener thread and the token that stops it
pub(crate) struct Looper {
    stop: Cancel,
    thread: Option<JoinHandle<()>>,
}

impl Looper {
    pub(crate) fn stop(mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            // a listener may close its own port from inside the callback
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                warn!("listener thread panicked");
            }
        }
    }
}

/// The listeners registered on one port
#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) data: Option<Looper>,
    pub(crate) line: Option<Looper>,
}

impl Listeners {
    pub(crate) fn stop_all(&mut self) {
        if let Some(looper) = self.data.take() {
            looper.stop();
        }
        if let Some(looper) = self.line.take() {
            looper.stop();
        }
    }
}

const DATA_CHUNK: usize = 1024;

pub(crate) fn spawn_data_looper(
    entry: Arc<PortEntry>,
    mut listener: Box<dyn DataListener>,
    interval: Duration,
) -> std::io::Result<Looper> {
    let stop = Cancel::new();
    let token = stop.clone();
    let thread = thread::Builder::new()
        .name(format!("serialcom-data-{}", entry.handle.id()))
        .spawn(move || {
            debug!("data looper for {} started", entry.handle);
            let mut buf = [0u8; DATA_CHUNK];
            while !token.is_cancelled() && !entry.cancel.is_cancelled() {
                let len = {
                    let Ok(mut state) = entry.lock() else { break };
                    match state.device().and_then(|d| Ok(d.read(&mut buf)?)) {
                        Ok(len) => len,
                        Err(e) => {
                            warn!("data looper for {} stopping: {}", entry.handle, e);
                            break;
                        }
                    }
                };
                if len > 0 {
                    trace!("data looper for {}: {:?}", entry.handle, &buf[..len]);
                    listener.on_data(&buf[..len]);
                } else if token.wait(interval) {
                    break;
                }
            }
            debug!("data looper for {} exited", entry.handle);
        })?;
    Ok(Looper {
        stop,
        thread: Some(thread),
    })
}

pub(crate) fn spawn_line_looper(
    entry: Arc<PortEntry>,
    mut listener: Box<dyn LineListener>,
    interval: Duration,
    initial: LineStatus,
) -> std::io::Result<Looper> {
    let stop = Cancel::new();
    let token = stop.clone();
    let thread = thread::Builder::new()
        .name(format!("serialcom-line-{}", entry.handle.id()))
        .spawn(move || {
            debug!("line looper for {} started", entry.handle);
            let mut previous = initial;
            while !token.wait(interval) && !entry.cancel.is_cancelled() {
                let current = {
                    let Ok(mut state) = entry.lock() else { break };
                    match state.device().and_then(|d| Ok(d.line_status()?)) {
                        Ok(status) => status,
                        Err(e) => {
                            warn!("line looper for {} stopping: {}", entry.handle, e);
                            break;
                        }
                    }
                };
                if current != previous {
                    trace!("line looper for {}: {:?} -> {:?}", entry.handle, previous, current);
                    listener.on_line_event(LineEvent { previous, current });
                    previous = current;
                }
            }
            debug!("line looper for {} exited", entry.handle);
        })?;
    Ok(Looper {
        stop,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_event_reports_changed_lines() {
        let previous = LineStatus::default();
        let current = LineStatus {
            cts: true,
            dcd: true,
            ..LineStatus::default()
        };
        let event = LineEvent { previous, current };
        assert!(event.cts_changed());
        assert!(event.dcd_changed());
        assert!(!event.dsr_changed());
        assert!(!event.ri_changed());
    }

    #[test]
    fn closures_are_listeners() {
        let mut listener = |data: &[u8]| assert_eq!(data, b"abc");
        listener.on_data(b"abc");

        let mut listener = |event: LineEvent| assert!(event.ri_changed());
        listener.on_line_event(LineEvent {
            previous: LineStatus::default(),
            current: LineStatus {
                ri: true,
                ..LineStatus::default()
            },
        });
    }
}
