use log::{debug, trace, warn};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use super::serial_comm::{Connector, LineStatus, OpenOptions, SerialComm};
use super::{Error, Result};
use crate::config::{ControlConfig, DataConfig, FlowControl, PortSettings};

const DEFAULT_RX_CAPACITY: usize = 4096;

/// Pairs of in-memory serial endpoints wired to each other
///
/// Each pair behaves like two UARTs joined by a null-modem cable: TX goes to the other side's RX,
/// RTS to CTS and DTR to DSR/DCD. Bytes only survive the trip when both ends run the same
/// framing and speed. Every endpoint has a bounded receive buffer; with hardware flow control the
/// receiver holds RTS low while it is full, with software flow control it "sends" XOFF at three
/// quarters full and XON again at one quarter. Without flow control, bytes that do not fit are
/// lost.
#[derive(Clone, Default)]
pub struct Loopback {
    endpoints: Arc<Mutex<HashMap<String, (Arc<Mutex<Wire>>, usize)>>>,
    rx_capacity: Option<usize>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive buffer size of endpoints added after this call
    pub fn with_rx_capacity(mut self, capacity: usize) -> Self {
        self.rx_capacity = Some(capacity.max(1));
        self
    }

    /// Wire two new endpoints to each other
    pub fn add_pair(&self, a: &str, b: &str) {
        let capacity = self.rx_capacity.unwrap_or(DEFAULT_RX_CAPACITY);
        let wire = Arc::new(Mutex::new(Wire {
            sides: [Side::new(a, capacity), Side::new(b, capacity)],
        }));
        let mut endpoints = lock(&self.endpoints);
        endpoints.insert(a.to_owned(), (wire.clone(), 0));
        endpoints.insert(b.to_owned(), (wire, 1));
        debug!("add_pair: wired {} <-> {}", a, b);
    }

    /// Pull the cable: every open device on `path` fails from now on
    pub fn unplug(&self, path: &str) {
        self.with_side(path, |side| side.unplugged = true);
    }

    /// Make the device look busy, as if another process held it
    pub fn hold(&self, path: &str) {
        self.with_side(path, |side| side.held = true);
    }

    pub fn release(&self, path: &str) {
        self.with_side(path, |side| side.held = false);
    }

    /// Number of bytes waiting in an endpoint's receive buffer
    pub fn pending(&self, path: &str) -> usize {
        let mut pending = 0;
        self.with_side(path, |side| pending = side.rx.len());
        pending
    }

    fn with_side(&self, path: &str, f: impl FnOnce(&mut Side)) {
        let endpoints = lock(&self.endpoints);
        if let Some((wire, index)) = endpoints.get(path) {
            f(&mut lock(wire).sides[*index]);
        }
    }
}

impl Connector for Loopback {
    fn open(&self, path: &str, options: OpenOptions) -> Result<Box<dyn SerialComm>> {
        let endpoints = lock(&self.endpoints);
        let (wire, index) = endpoints
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;

        let mut guard = lock(wire);
        let side = &mut guard.sides[*index];
        if side.unplugged {
            return Err(Error::NotFound(path.to_owned()));
        }
        if side.held {
            return Err(Error::AccessDenied(format!("{} is held by another process", path)));
        }
        if side.opens == 0 {
            side.rx.clear();
            side.xoff_sent = false;
        }
        side.opens += 1;

        trace!("open: {} ({:?})", path, options);
        Ok(Box::new(LoopbackDevice {
            wire: wire.clone(),
            index: *index,
        }))
    }
}

struct Wire {
    sides: [Side; 2],
}

struct Side {
    path: String,
    rx: VecDeque<u8>,
    capacity: usize,
    line: DataConfig,
    control: ControlConfig,
    /// Software flow control: this side has asked its peer to stop
    xoff_sent: bool,
    opens: usize,
    unplugged: bool,
    held: bool,
}

impl Side {
    fn new(path: &str, capacity: usize) -> Self {
        Side {
            path: path.to_owned(),
            rx: VecDeque::with_capacity(capacity),
            capacity,
            line: DataConfig::default(),
            control: ControlConfig::default(),
            xoff_sent: false,
            opens: 0,
            unplugged: false,
            held: false,
        }
    }

    fn rts(&self) -> bool {
        if self.opens == 0 || self.unplugged {
            return false;
        }
        match self.control.flow_control {
            FlowControl::Hardware => self.rx.len() < self.capacity,
            _ => self.control.rts,
        }
    }

    fn dtr(&self) -> bool {
        self.opens > 0 && !self.unplugged && self.control.dtr
    }

    fn high_water(&self) -> usize {
        (self.capacity * 3 / 4).max(1)
    }

    fn low_water(&self) -> usize {
        self.capacity / 4
    }

    /// Bytes the peer may still send before flow control stops it
    fn room(&self, sender_flow: FlowControl) -> usize {
        match sender_flow {
            FlowControl::Hardware if self.rts() => self.capacity - self.rx.len(),
            FlowControl::Hardware => 0,
            FlowControl::Software if self.xoff_sent => 0,
            FlowControl::Software => self.high_water().saturating_sub(self.rx.len()).max(1),
            FlowControl::None => usize::MAX,
        }
    }
}

/// One open endpoint of a [Loopback] pair
pub struct LoopbackDevice {
    wire: Arc<Mutex<Wire>>,
    index: usize,
}

impl LoopbackDevice {
    fn connected(&self, wire: &Wire) -> Result<()> {
        let side = &wire.sides[self.index];
        if side.unplugged {
            Err(Error::Disconnected(side.path.clone()))
        } else {
            Ok(())
        }
    }
}

impl SerialComm for LoopbackDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut wire = lock(&self.wire);
        self.connected(&wire)?;

        let (me, peer) = match self.index {
            0 => {
                let [a, b] = &mut wire.sides;
                (a, b)
            }
            _ => {
                let [a, b] = &mut wire.sides;
                (b, a)
            }
        };

        let len = data.len().min(peer.room(me.control.flow_control));
        let data = &data[..len];

        if peer.unplugged || peer.line != me.line {
            trace!(
                "write: {} bytes from {} lost ({} vs {})",
                len,
                me.path,
                me.line,
                peer.line
            );
            return Ok(len);
        }

        let free = peer.capacity - peer.rx.len();
        if data.len() > free {
            warn!(
                "write: receive overrun on {}, {} bytes dropped",
                peer.path,
                data.len() - free
            );
        }
        peer.rx.extend(&data[..data.len().min(free)]);
        if peer.control.flow_control == FlowControl::Software && peer.rx.len() >= peer.high_water()
        {
            trace!("write: {} sends XOFF", peer.path);
            peer.xoff_sent = true;
        }

        trace!("write: {} -> {}: {:?}", me.path, peer.path, data);
        Ok(len)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        let mut wire = lock(&self.wire);
        self.connected(&wire)?;

        let me = &mut wire.sides[self.index];
        let len = data.len().min(me.rx.len());
        for (slot, byte) in data.iter_mut().zip(me.rx.drain(..len)) {
            *slot = byte;
        }
        if me.xoff_sent && me.rx.len() <= me.low_water() {
            trace!("read: {} sends XON", me.path);
            me.xoff_sent = false;
        }
        Ok(len)
    }

    fn apply(&mut self, settings: &PortSettings) -> Result<()> {
        let mut wire = lock(&self.wire);
        self.connected(&wire)?;

        let me = &mut wire.sides[self.index];
        let mut line = settings.data;
        if line.baud_rate.is_hangup() {
            line.baud_rate = me.line.baud_rate;
            me.control = settings.control;
            me.control.dtr = false;
        } else {
            me.control = settings.control;
        }
        me.line = line;
        trace!("apply: {} now {} {:?}", me.path, me.line, me.control);
        Ok(())
    }

    fn can_transmit(&mut self) -> Result<bool> {
        let wire = lock(&self.wire);
        self.connected(&wire)?;

        let me = &wire.sides[self.index];
        let peer = &wire.sides[1 - self.index];
        Ok(peer.room(me.control.flow_control) > 0)
    }

    fn line_status(&mut self) -> Result<LineStatus> {
        let wire = lock(&self.wire);
        self.connected(&wire)?;

        let peer = &wire.sides[1 - self.index];
        Ok(LineStatus {
            cts: peer.rts(),
            dsr: peer.dtr(),
            dcd: peer.dtr(),
            ri: false,
        })
    }

    fn purge_buffers(&mut self) -> Result<()> {
        let mut wire = lock(&self.wire);
        self.connected(&wire)?;

        let me = &mut wire.sides[self.index];
        me.rx.clear();
        me.xoff_sent = false;
        Ok(())
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        let mut wire = lock(&self.wire);
        let me = &mut wire.sides[self.index];
        me.opens = me.opens.saturating_sub(1);
    }
}
