//! Reads and writes against a configured port
//!
//! Callers hold the port's lock for the whole call, so a transfer never interleaves with a
//! configuration change or another transfer on the same port. Every wait sleeps on the port's
//! [Cancel] token so a concurrent close ends it at once.

use log::trace;
use std::time::{Duration, Instant};

use crate::{
    cancel::Cancel,
    registry::{PortState, SessionState},
    Error, ErrorKind, ManagerConfig, Result, DEFAULT_READ_SIZE,
};

fn require_access(state: &PortState, write: bool) -> Result<()> {
    let (allowed, direction) = if write {
        (state.options.write, "writing")
    } else {
        (state.options.read, "reading")
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::AccessDenied,
            format!("{} was not opened for {}", state.handle, direction),
        ))
    }
}

/// Write all of `data`, pacing bytes `delay` apart when it is non-zero
///
/// Waits while flow control holds the line. The write fails with
/// [WriteTimeout](ErrorKind::WriteTimeout) once no byte could be sent for
/// [ManagerConfig::write_timeout].
pub(crate) fn write(
    state: &mut PortState,
    cancel: &Cancel,
    data: &[u8],
    delay: Duration,
    config: &ManagerConfig,
) -> Result<usize> {
    state.require_configured()?;
    require_access(state, true)?;
    let handle = state.handle;
    let step = if delay.is_zero() { data.len() } else { 1 };

    let mut written = 0;
    let mut stalled_since = Instant::now();
    while written < data.len() {
        if cancel.is_cancelled() {
            return Err(Error::invalid_handle(handle));
        }

        let device = state.device()?;
        let end = (written + step).min(data.len());
        let sent = if device.can_transmit()? {
            device.write(&data[written..end])?
        } else {
            0
        };

        if sent > 0 {
            trace!("write: {} sent {:?}", handle, &data[written..written + sent]);
            written += sent;
            stalled_since = Instant::now();
            if !delay.is_zero() && written < data.len() && cancel.wait(delay) {
                return Err(Error::invalid_handle(handle));
            }
            continue;
        }

        if stalled_since.elapsed() >= config.write_timeout {
            return Err(Error::new(
                ErrorKind::WriteTimeout,
                format!(
                    "{} stalled for {:?} after {} of {} bytes",
                    handle,
                    config.write_timeout,
                    written,
                    data.len()
                ),
            ));
        }
        if cancel.wait(config.poll_interval) {
            return Err(Error::invalid_handle(handle));
        }
    }

    state.stage = SessionState::Active;
    Ok(written)
}

/// Read whatever has arrived, up to `max_bytes`, without waiting
pub(crate) fn read(state: &mut PortState, max_bytes: usize) -> Result<Vec<u8>> {
    state.require_configured()?;
    require_access(state, false)?;

    let mut buf = Vec::new();
    let mut chunk = [0u8; DEFAULT_READ_SIZE];
    let device = state.device()?;
    while buf.len() < max_bytes {
        let want = (max_bytes - buf.len()).min(chunk.len());
        let n = device.read(&mut chunk[..want])?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    if !buf.is_empty() {
        trace!("read: {} got {:?}", state.handle, buf);
    }
    state.stage = SessionState::Active;
    Ok(buf)
}

/// Wait up to `timeout` for data, then read what has arrived
///
/// Returns an empty buffer if nothing came in time. A timeout too large to put on the clock,
/// such as [Duration::MAX], waits until data arrives or the port is closed.
pub(crate) fn read_timeout(
    state: &mut PortState,
    cancel: &Cancel,
    max_bytes: usize,
    timeout: Duration,
    config: &ManagerConfig,
) -> Result<Vec<u8>> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let data = read(state, max_bytes)?;
        if !data.is_empty() {
            return Ok(data);
        }

        let pause = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    trace!("read_timeout: {} nothing within {:?}", state.handle, timeout);
                    return Ok(data);
                }
                config.poll_interval.min(remaining)
            }
            None => config.poll_interval,
        };
        if cancel.wait(pause) {
            return Err(Error::invalid_handle(state.handle));
        }
    }
}
