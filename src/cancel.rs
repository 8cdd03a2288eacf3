use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// A one-shot flag that wakes anyone sleeping on it when it is set
///
/// Waits inside transfers and listener loops sleep on the token instead of the clock, so closing
/// a port interrupts them right away rather than at the end of a poll interval.
#[derive(Clone, Default)]
pub(crate) struct Cancel {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Cancel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        signal.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `timeout` or until cancelled, whichever is first
    ///
    /// Returns `true` if the token is cancelled.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}
