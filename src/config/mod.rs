//! Port configuration values and the rules for combining them
//!
//! Every check here runs before anything is handed to the device layer, so a rejected
//! configuration never reaches the driver and never replaces a committed one.

#[macro_use]
mod macros;

mod types;
pub use types::{
    BaudRate, ControlConfig, DataBits, DataConfig, FlowControl, Parity, PortSettings, StopBits,
    DEFAULT_XOFF, DEFAULT_XON,
};

use log::debug;

use crate::{Error, ErrorKind, Result};

/// Highest custom rate accepted, in baud
pub const MAX_BAUD_RATE: u32 = 4_000_000;

/// Check that a character frame can be put on the wire
///
/// Follows the 16550 UART rules: two stop bits cannot follow a 5 bit character, and one and a
/// half stop bits only exist for 5 bit characters.
pub fn validate_data(data_bits: DataBits, stop_bits: StopBits, parity: Parity) -> Result<()> {
    match (data_bits, stop_bits) {
        (DataBits::Five, StopBits::Two) => Err(Error::new(
            ErrorKind::InvalidFraming,
            "5 data bits cannot be followed by 2 stop bits",
        )),
        (DataBits::Five, StopBits::OnePointFive) | (_, StopBits::One) | (_, StopBits::Two) => {
            debug!(
                "validate_data: {} data bits, {:?} stop bits, {:?} parity ok",
                data_bits.count(),
                stop_bits,
                parity
            );
            Ok(())
        }
        (_, StopBits::OnePointFive) => Err(Error::new(
            ErrorKind::InvalidFraming,
            format!(
                "1.5 stop bits need 5 data bits, got {}",
                data_bits.count()
            ),
        )),
    }
}

/// Check that a baud rate can be requested from a driver
///
/// [BaudRate::B0] passes as the hang-up sentinel. A custom rate must be positive and no higher
/// than [MAX_BAUD_RATE].
pub fn validate_baud(baud_rate: BaudRate) -> Result<()> {
    match baud_rate {
        BaudRate::Custom(0) => Err(Error::new(
            ErrorKind::UnsupportedBaudRate,
            "a custom rate of 0 is not a line speed, use BaudRate::B0 to hang up",
        )),
        BaudRate::Custom(rate) if rate > MAX_BAUD_RATE => Err(Error::new(
            ErrorKind::UnsupportedBaudRate,
            format!("{} baud is above the {} baud limit", rate, MAX_BAUD_RATE),
        )),
        _ => Ok(()),
    }
}

/// Check that flow control and manual modem line settings agree
pub fn validate_control(
    flow_control: FlowControl,
    xon: u8,
    xoff: u8,
    rts: bool,
    _dtr: bool,
) -> Result<()> {
    match flow_control {
        FlowControl::Software if xon == xoff => Err(Error::new(
            ErrorKind::ConflictingFlowControl,
            format!("XON and XOFF are both {:#04x}", xon),
        )),
        FlowControl::Hardware if rts => Err(Error::new(
            ErrorKind::ConflictingFlowControl,
            "RTS is driven by hardware flow control and cannot be set manually",
        )),
        _ => Ok(()),
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        validate_data(self.data_bits, self.stop_bits, self.parity)?;
        validate_baud(self.baud_rate)
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        validate_control(self.flow_control, self.xon, self.xoff, self.rts, self.dtr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DATA_BITS: [DataBits; 4] = [
        DataBits::Five,
        DataBits::Six,
        DataBits::Seven,
        DataBits::Eight,
    ];
    const ALL_PARITY: [Parity; 5] = [
        Parity::None,
        Parity::Odd,
        Parity::Even,
        Parity::Mark,
        Parity::Space,
    ];

    #[test]
    fn five_bits_two_stop_bits_is_rejected_for_every_parity() {
        for parity in ALL_PARITY {
            let err = validate_data(DataBits::Five, StopBits::Two, parity).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFraming);
        }
    }

    #[test]
    fn one_and_a_half_stop_bits_only_with_five_bits() {
        assert!(validate_data(DataBits::Five, StopBits::OnePointFive, Parity::None).is_ok());
        for bits in &ALL_DATA_BITS[1..] {
            let err = validate_data(*bits, StopBits::OnePointFive, Parity::Even).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFraming);
        }
    }

    #[test]
    fn common_frames_pass() {
        for bits in ALL_DATA_BITS {
            for parity in ALL_PARITY {
                assert!(validate_data(bits, StopBits::One, parity).is_ok());
            }
        }
        assert!(validate_data(DataBits::Eight, StopBits::Two, Parity::None).is_ok());
        assert!(validate_data(DataBits::Seven, StopBits::Two, Parity::Mark).is_ok());
    }

    #[test]
    fn baud_rates() {
        for rate in BaudRate::STANDARD {
            assert!(validate_baud(*rate).is_ok(), "{:?}", rate);
        }
        assert!(validate_baud(BaudRate::Custom(31_250)).is_ok());
        assert!(validate_baud(BaudRate::Custom(MAX_BAUD_RATE)).is_ok());

        let err = validate_baud(BaudRate::Custom(MAX_BAUD_RATE + 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBaudRate);
        let err = validate_baud(BaudRate::Custom(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBaudRate);
    }

    #[test]
    fn baud_rate_lookup() {
        assert_eq!(BaudRate::from_rate(115_200), BaudRate::B115200);
        assert_eq!(BaudRate::from_rate(0), BaudRate::B0);
        assert_eq!(BaudRate::from_rate(31_250), BaudRate::Custom(31_250));
        assert_eq!(BaudRate::B4000000.rate(), 4_000_000);
        assert!(BaudRate::B0.is_hangup());
        assert!(!BaudRate::Custom(9600).is_standard());
        assert_eq!(BaudRate::STANDARD.len(), 37);
    }

    #[test]
    fn software_flow_needs_distinct_characters() {
        let err = validate_control(FlowControl::Software, b'x', b'x', false, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingFlowControl);
        assert!(
            validate_control(FlowControl::Software, DEFAULT_XON, DEFAULT_XOFF, false, true)
                .is_ok()
        );
    }

    #[test]
    fn flow_none_ignores_characters() {
        assert!(validate_control(FlowControl::None, b'x', b'x', false, false).is_ok());
        assert!(validate_control(FlowControl::None, b'x', b'x', true, true).is_ok());
    }

    #[test]
    fn hardware_flow_excludes_manual_rts() {
        let err = validate_control(FlowControl::Hardware, b'x', b'x', true, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingFlowControl);
        assert!(validate_control(FlowControl::Hardware, b'x', b'x', false, true).is_ok());
    }

    #[test]
    fn display() {
        assert_eq!(DataConfig::default().to_string(), "8N1 @ 9600 baud");
        let hangup = DataConfig::new(
            DataBits::Five,
            StopBits::OnePointFive,
            Parity::Mark,
            BaudRate::B0,
        );
        assert_eq!(hangup.to_string(), "5M1.5 @ hang-up");
    }
}
