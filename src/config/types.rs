use std::fmt;

/// Number of data bits in each character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn count(&self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Number of stop bits after each character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

baud_rates! {
    /// Line speed of a serial port
    ///
    /// [B0](BaudRate::B0) is not a speed: it asks the driver to leave the line rate alone and drop
    /// DTR, which hangs up a modem on the other end.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum BaudRate {
        B0 = 0,
        B50 = 50,
        B75 = 75,
        B110 = 110,
        B134 = 134,
        B150 = 150,
        B200 = 200,
        B300 = 300,
        B600 = 600,
        B1200 = 1200,
        B1800 = 1800,
        B2400 = 2400,
        B4800 = 4800,
        B9600 = 9600,
        B14400 = 14400,
        B19200 = 19200,
        B28800 = 28800,
        B38400 = 38400,
        B56000 = 56000,
        B57600 = 57600,
        B115200 = 115200,
        B128000 = 128000,
        B153600 = 153600,
        B230400 = 230400,
        B256000 = 256000,
        B460800 = 460800,
        B500000 = 500000,
        B576000 = 576000,
        B921600 = 921600,
        B1000000 = 1000000,
        B1152000 = 1152000,
        B1500000 = 1500000,
        B2000000 = 2000000,
        B2500000 = 2500000,
        B3000000 = 3000000,
        B3500000 = 3500000,
        B4000000 = 4000000,
    }
}

impl BaudRate {
    /// Whether this is the hang-up sentinel rather than a line speed
    pub fn is_hangup(&self) -> bool {
        *self == BaudRate::B0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hangup() {
            f.write_str("hang-up")
        } else {
            write!(f, "{} baud", self.rate())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    None,
    /// RTS/CTS
    Hardware,
    /// XON/XOFF
    Software,
}

pub const DEFAULT_XON: u8 = 0x11;
pub const DEFAULT_XOFF: u8 = 0x13;

/// Framing and speed half of a port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataConfig {
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub baud_rate: BaudRate,
}

impl DataConfig {
    pub fn new(
        data_bits: DataBits,
        stop_bits: StopBits,
        parity: Parity,
        baud_rate: BaudRate,
    ) -> Self {
        DataConfig {
            data_bits,
            stop_bits,
            parity,
            baud_rate,
        }
    }
}

impl Default for DataConfig {
    /// 9600 8N1
    fn default() -> Self {
        DataConfig::new(DataBits::Eight, StopBits::One, Parity::None, BaudRate::B9600)
    }
}

impl fmt::Display for DataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        write!(
            f,
            "{}{}{} @ {}",
            self.data_bits.count(),
            parity,
            stop,
            self.baud_rate
        )
    }
}

/// Flow control and modem line half of a port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlConfig {
    pub flow_control: FlowControl,
    pub xon: u8,
    pub xoff: u8,
    /// Assert RTS manually; not allowed together with hardware flow control
    pub rts: bool,
    pub dtr: bool,
}

impl ControlConfig {
    pub fn new(flow_control: FlowControl, xon: u8, xoff: u8, rts: bool, dtr: bool) -> Self {
        ControlConfig {
            flow_control,
            xon,
            xoff,
            rts,
            dtr,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig::new(FlowControl::None, DEFAULT_XON, DEFAULT_XOFF, false, false)
    }
}

/// A complete line configuration, as handed to the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortSettings {
    pub data: DataConfig,
    pub control: ControlConfig,
}
