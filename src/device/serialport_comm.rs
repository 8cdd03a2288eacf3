use super::serial_comm::{Connector, LineStatus, OpenOptions, SerialComm};
use super::{Error, Result};
use crate::config::{
    BaudRate, DataBits, FlowControl, Parity, PortSettings, StopBits, DEFAULT_XOFF, DEFAULT_XON,
};
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::time::Duration;

/// Rate a freshly opened port runs at until it is configured
const INITIAL_BAUD_RATE: u32 = 9600;

/// How long the driver may block a single write while flow control holds the line
const DRIVER_WRITE_TIMEOUT: Duration = Duration::from_millis(10);

/// Communicate with a serial device using the
/// serialport library
///
/// /dev/tty* or similar on unix-like systems
/// COM devices on Windows systems
pub struct SerialPort {
    device: Box<dyn serialport::SerialPort>,
    path: String,
    /// What the driver was last successfully set to
    line: Line,
}

impl SerialPort {
    /// Opens a device at 9600 8N1 with no flow control
    pub fn new(
        path: &str,
        #[cfg_attr(not(unix), allow(unused_variables))] options: OpenOptions,
    ) -> Result<Self> {
        let builder = serialport::new(path, INITIAL_BAUD_RATE)
            .timeout(DRIVER_WRITE_TIMEOUT)
            .parity(serialport::Parity::None)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None);

        #[cfg(unix)]
        let device: Box<dyn serialport::SerialPort> = {
            let mut port = builder.open_native()?;
            port.set_exclusive(options.exclusive)?;
            Box::new(port)
        };
        // COM ports are always opened exclusively
        #[cfg(not(unix))]
        let device = builder.open()?;

        debug!("SerialPort::new: opened {}", path);
        Ok(Self {
            device,
            path: path.to_owned(),
            line: Line::initial(),
        })
    }
}

/// A configuration in the driver's terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line {
    /// `None` leaves the rate alone
    baud_rate: Option<u32>,
    data_bits: serialport::DataBits,
    stop_bits: serialport::StopBits,
    parity: serialport::Parity,
    flow_control: serialport::FlowControl,
    dtr: bool,
    /// `None` while hardware flow control drives RTS
    rts: Option<bool>,
}

impl Line {
    fn initial() -> Self {
        Line {
            baud_rate: Some(INITIAL_BAUD_RATE),
            data_bits: serialport::DataBits::Eight,
            stop_bits: serialport::StopBits::One,
            parity: serialport::Parity::None,
            flow_control: serialport::FlowControl::None,
            dtr: false,
            rts: Some(false),
        }
    }

    /// Convert settings, refusing anything the driver cannot express
    fn new(settings: &PortSettings) -> Result<Self> {
        let data = &settings.data;
        let control = &settings.control;

        if control.flow_control == FlowControl::Software
            && (control.xon != DEFAULT_XON || control.xoff != DEFAULT_XOFF)
        {
            return Err(Error::UnsupportedControl(format!(
                "custom XON/XOFF characters {:#04x}/{:#04x}",
                control.xon, control.xoff
            )));
        }

        let hangup = data.baud_rate == BaudRate::B0;
        Ok(Line {
            baud_rate: (!hangup).then(|| data.baud_rate.rate()),
            data_bits: data_bits(data.data_bits),
            stop_bits: stop_bits(data.stop_bits)?,
            parity: parity(data.parity)?,
            flow_control: flow_control(control.flow_control),
            dtr: control.dtr && !hangup,
            rts: (control.flow_control != FlowControl::Hardware).then_some(control.rts),
        })
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> Result<serialport::StopBits> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(Error::UnsupportedFraming(
            "1.5 stop bits".to_owned(),
        )),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(Error::UnsupportedFraming(format!(
            "{:?} parity",
            parity
        ))),
    }
}

fn flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
        FlowControl::Software => serialport::FlowControl::Software,
    }
}

/// A refused rate is reported as such, anything else is a driver failure
fn baud_error(rate: u32, e: serialport::Error) -> Error {
    match e.kind() {
        serialport::ErrorKind::InvalidInput => {
            Error::UnsupportedBaudRate(format!("{} baud: {}", rate, e.description))
        }
        _ => e.into(),
    }
}

/// The driver calls that put a [Line] in place
trait LineControl {
    fn set_baud_rate(&mut self, rate: u32) -> serialport::Result<()>;
    fn set_data_bits(&mut self, bits: serialport::DataBits) -> serialport::Result<()>;
    fn set_stop_bits(&mut self, bits: serialport::StopBits) -> serialport::Result<()>;
    fn set_parity(&mut self, parity: serialport::Parity) -> serialport::Result<()>;
    fn set_flow_control(&mut self, flow: serialport::FlowControl) -> serialport::Result<()>;
    fn write_data_terminal_ready(&mut self, level: bool) -> serialport::Result<()>;
    fn write_request_to_send(&mut self, level: bool) -> serialport::Result<()>;
}

impl LineControl for Box<dyn serialport::SerialPort> {
    fn set_baud_rate(&mut self, rate: u32) -> serialport::Result<()> {
        serialport::SerialPort::set_baud_rate(&mut **self, rate)
    }

    fn set_data_bits(&mut self, bits: serialport::DataBits) -> serialport::Result<()> {
        serialport::SerialPort::set_data_bits(&mut **self, bits)
    }

    fn set_stop_bits(&mut self, bits: serialport::StopBits) -> serialport::Result<()> {
        serialport::SerialPort::set_stop_bits(&mut **self, bits)
    }

    fn set_parity(&mut self, parity: serialport::Parity) -> serialport::Result<()> {
        serialport::SerialPort::set_parity(&mut **self, parity)
    }

    fn set_flow_control(&mut self, flow: serialport::FlowControl) -> serialport::Result<()> {
        serialport::SerialPort::set_flow_control(&mut **self, flow)
    }

    fn write_data_terminal_ready(&mut self, level: bool) -> serialport::Result<()> {
        serialport::SerialPort::write_data_terminal_ready(&mut **self, level)
    }

    fn write_request_to_send(&mut self, level: bool) -> serialport::Result<()> {
        serialport::SerialPort::write_request_to_send(&mut **self, level)
    }
}

/// Rate first, since it is the setting drivers most often refuse
fn write_line(device: &mut impl LineControl, line: &Line) -> Result<()> {
    if let Some(rate) = line.baud_rate {
        device
            .set_baud_rate(rate)
            .map_err(|e| baud_error(rate, e))?;
    }
    device.set_data_bits(line.data_bits)?;
    device.set_stop_bits(line.stop_bits)?;
    device.set_parity(line.parity)?;
    device.set_flow_control(line.flow_control)?;
    device.write_data_terminal_ready(line.dtr)?;
    if let Some(rts) = line.rts {
        device.write_request_to_send(rts)?;
    }
    Ok(())
}

/// Put `line` in place, going back to `previous` if the driver refuses part of it
fn switch_line(device: &mut impl LineControl, line: &Line, previous: &Line) -> Result<()> {
    if let Err(e) = write_line(device, line) {
        if let Err(restore) = write_line(device, previous) {
            warn!("switch_line: could not restore {:?}: {}", previous, restore);
        }
        return Err(e);
    }
    Ok(())
}

impl SerialComm for SerialPort {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self.device.write(data) {
            Ok(n) => Ok(n),
            // flow control is holding the line, the caller decides how long to wait
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        let available = self.device.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        let len = available.min(data.len());
        Ok(self.device.read(&mut data[..len])?)
    }

    fn apply(&mut self, settings: &PortSettings) -> Result<()> {
        let line = Line::new(settings)?;
        if line.baud_rate.is_none() {
            debug!("apply: hang-up requested on {}, dropping DTR", self.path);
        }
        switch_line(&mut self.device, &line, &self.line)?;
        self.line = line;

        trace!("apply: {} now {:?}", self.path, settings);
        Ok(())
    }

    fn line_status(&mut self) -> Result<LineStatus> {
        Ok(LineStatus {
            cts: self.device.read_clear_to_send()?,
            dsr: self.device.read_data_set_ready()?,
            dcd: self.device.read_carrier_detect()?,
            ri: self.device.read_ring_indicator()?,
        })
    }

    fn purge_buffers(&mut self) -> Result<()> {
        Ok(self.device.clear(serialport::ClearBuffer::All)?)
    }
}

/// Opens the operating system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl Connector for SystemPorts {
    fn open(&self, path: &str, options: OpenOptions) -> Result<Box<dyn SerialComm>> {
        Ok(Box::new(SerialPort::new(path, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControlConfig, DataConfig};
    use crate::ErrorKind;

    /// Records driver calls, failing the first call named in `fail_once`
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_once: Option<(&'static str, serialport::ErrorKind)>,
    }

    impl Recorder {
        fn call(
            &mut self,
            name: &'static str,
            value: impl std::fmt::Debug,
        ) -> serialport::Result<()> {
            if let Some((failing, kind)) = self.fail_once {
                if failing == name {
                    self.fail_once = None;
                    return Err(serialport::Error::new(kind, "refused by driver"));
                }
            }
            self.calls.push(format!("{} {:?}", name, value));
            Ok(())
        }
    }

    impl LineControl for Recorder {
        fn set_baud_rate(&mut self, rate: u32) -> serialport::Result<()> {
            self.call("baud", rate)
        }

        fn set_data_bits(&mut self, bits: serialport::DataBits) -> serialport::Result<()> {
            self.call("data", bits)
        }

        fn set_stop_bits(&mut self, bits: serialport::StopBits) -> serialport::Result<()> {
            self.call("stop", bits)
        }

        fn set_parity(&mut self, parity: serialport::Parity) -> serialport::Result<()> {
            self.call("parity", parity)
        }

        fn set_flow_control(&mut self, flow: serialport::FlowControl) -> serialport::Result<()> {
            self.call("flow", flow)
        }

        fn write_data_terminal_ready(&mut self, level: bool) -> serialport::Result<()> {
            self.call("dtr", level)
        }

        fn write_request_to_send(&mut self, level: bool) -> serialport::Result<()> {
            self.call("rts", level)
        }
    }

    fn line(baud_rate: BaudRate, parity: Parity) -> Line {
        let settings = PortSettings {
            data: DataConfig::new(DataBits::Seven, StopBits::Two, parity, baud_rate),
            control: ControlConfig::default(),
        };
        Line::new(&settings).unwrap()
    }

    #[test]
    fn rate_is_set_first() {
        let mut device = Recorder::default();
        write_line(&mut device, &line(BaudRate::B115200, Parity::Even)).unwrap();
        assert_eq!(device.calls[0], "baud 115200");
        assert_eq!(device.calls.len(), 7);
    }

    #[test]
    fn refused_rate_is_unsupported_and_nothing_changes() {
        let mut device = Recorder {
            fail_once: Some(("baud", serialport::ErrorKind::InvalidInput)),
            ..Recorder::default()
        };
        let err = switch_line(
            &mut device,
            &line(BaudRate::Custom(31_250), Parity::Even),
            &Line::initial(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedBaudRate(_)));
        assert_eq!(crate::Error::from(err).kind(), ErrorKind::UnsupportedBaudRate);

        // only the restore of the previous line reached the driver
        assert_eq!(device.calls[0], "baud 9600");
        assert!(device.calls.contains(&"data Eight".to_owned()));
        assert!(!device.calls.contains(&"data Seven".to_owned()));
    }

    #[test]
    fn later_failure_restores_previous_line() {
        let mut device = Recorder {
            fail_once: Some(("flow", serialport::ErrorKind::Unknown)),
            ..Recorder::default()
        };
        let err = switch_line(
            &mut device,
            &line(BaudRate::B115200, Parity::Odd),
            &Line::initial(),
        )
        .unwrap_err();
        assert_eq!(crate::Error::from(err).kind(), ErrorKind::PortUnavailable);

        let restored = device
            .calls
            .iter()
            .position(|call| call == "baud 9600")
            .unwrap();
        assert_eq!(device.calls[..restored].first().unwrap(), "baud 115200");
        assert_eq!(device.calls[restored + 1], "data Eight");
        assert_eq!(device.calls.last().unwrap(), "rts false");
    }

    #[test]
    fn hangup_keeps_rate_and_drops_dtr() {
        let mut settings = PortSettings::default();
        settings.control.dtr = true;
        settings.data.baud_rate = BaudRate::B0;
        let line = Line::new(&settings).unwrap();
        assert_eq!(line.baud_rate, None);
        assert!(!line.dtr);

        let mut device = Recorder::default();
        write_line(&mut device, &line).unwrap();
        assert!(!device.calls.iter().any(|call| call.starts_with("baud")));
    }

    #[test]
    fn inexpressible_settings_are_refused_before_the_driver() {
        let mut settings = PortSettings::default();
        settings.data.parity = Parity::Mark;
        assert!(matches!(
            Line::new(&settings),
            Err(Error::UnsupportedFraming(_))
        ));

        let mut settings = PortSettings::default();
        settings.control.flow_control = FlowControl::Software;
        settings.control.xon = b'q';
        assert!(matches!(
            Line::new(&settings),
            Err(Error::UnsupportedControl(_))
        ));
    }
}
