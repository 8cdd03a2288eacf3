use pretty_assertions::assert_eq;
use serialcom::{
    config::{
        BaudRate, ControlConfig, DataBits, DataConfig, FlowControl, Parity, PortSettings, StopBits,
        DEFAULT_XOFF, DEFAULT_XON,
    },
    device::Loopback,
    ErrorKind, PortHandle, SerialComManager, SessionState,
};
use std::time::Duration;

const PORT1: &str = "/dev/pts/1";
const PORT2: &str = "/dev/pts/3";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_pair() -> (SerialComManager<Loopback>, PortHandle, PortHandle) {
    init();
    let bus = Loopback::new();
    bus.add_pair(PORT1, PORT2);
    let scm = SerialComManager::new(bus);
    let handle1 = scm.open(PORT1, true, true, true).unwrap();
    let handle2 = scm.open(PORT2, true, true, true).unwrap();
    (scm, handle1, handle2)
}

fn configure_both(
    scm: &SerialComManager<Loopback>,
    handles: [PortHandle; 2],
    data: DataConfig,
    control: ControlConfig,
) {
    for handle in handles {
        scm.configure_data(
            handle,
            data.data_bits,
            data.stop_bits,
            data.parity,
            data.baud_rate,
        )
        .unwrap();
        scm.configure_control(
            handle,
            control.flow_control,
            control.xon,
            control.xoff,
            control.rts,
            control.dtr,
        )
        .unwrap();
    }
}

/// Write "testing" on the first port and expect exactly that on the second, then close both
fn validate_and_close(scm: SerialComManager<Loopback>, handle1: PortHandle, handle2: PortHandle) {
    assert_eq!(scm.write(handle1, b"testing", 0).unwrap(), 7);
    let data = scm
        .read_timeout(handle2, 1024, Duration::from_millis(500))
        .unwrap();
    assert_eq!(String::from_utf8(data).unwrap(), "testing");
    scm.close(handle1).unwrap();
    scm.close(handle2).unwrap();
}

#[test]
fn every_standard_baud_rate_8n1() {
    for baud_rate in BaudRate::STANDARD {
        let (scm, handle1, handle2) = open_pair();
        let data = DataConfig::new(DataBits::Eight, StopBits::One, Parity::None, *baud_rate);
        let control = ControlConfig::new(FlowControl::None, b'x', b'x', false, false);
        configure_both(&scm, [handle1, handle2], data, control);
        assert_eq!(scm.session_state(handle1).unwrap(), SessionState::Configured);
        validate_and_close(scm, handle1, handle2);
    }
}

#[test]
fn framing_and_parity_matrix() {
    let frames = [
        (DataBits::Five, StopBits::One),
        (DataBits::Five, StopBits::OnePointFive),
        (DataBits::Six, StopBits::One),
        (DataBits::Six, StopBits::Two),
        (DataBits::Seven, StopBits::One),
        (DataBits::Seven, StopBits::Two),
        (DataBits::Eight, StopBits::One),
        (DataBits::Eight, StopBits::Two),
    ];
    let parities = [
        Parity::None,
        Parity::Odd,
        Parity::Even,
        Parity::Mark,
        Parity::Space,
    ];
    for (data_bits, stop_bits) in frames {
        for parity in parities {
            let (scm, handle1, handle2) = open_pair();
            let data = DataConfig::new(data_bits, stop_bits, parity, BaudRate::B115200);
            configure_both(&scm, [handle1, handle2], data, ControlConfig::default());
            validate_and_close(scm, handle1, handle2);
        }
    }
}

#[test]
fn flow_control_variants() {
    let controls = [
        ControlConfig::new(FlowControl::None, b'x', b'x', true, true),
        ControlConfig::new(FlowControl::Hardware, b'x', b'x', false, true),
        ControlConfig::new(FlowControl::Software, DEFAULT_XON, DEFAULT_XOFF, false, false),
        ControlConfig::new(FlowControl::Software, b'q', b's', true, true),
    ];
    for control in controls {
        let (scm, handle1, handle2) = open_pair();
        configure_both(&scm, [handle1, handle2], DataConfig::default(), control);
        validate_and_close(scm, handle1, handle2);
    }
}

#[test]
fn custom_baud_rate_round_trip() {
    let (scm, handle1, handle2) = open_pair();
    let data = DataConfig::new(
        DataBits::Eight,
        StopBits::One,
        Parity::None,
        BaudRate::Custom(31_250),
    );
    configure_both(&scm, [handle1, handle2], data, ControlConfig::default());
    validate_and_close(scm, handle1, handle2);
}

#[test]
fn rejected_framing_leaves_configuration_alone() {
    let (scm, handle1, _handle2) = open_pair();
    scm.configure_data(
        handle1,
        DataBits::Eight,
        StopBits::One,
        Parity::Even,
        BaudRate::B19200,
    )
    .unwrap();
    scm.configure_control(handle1, FlowControl::None, b'x', b'x', false, false)
        .unwrap();
    let before = scm.settings(handle1).unwrap();

    for parity in [Parity::None, Parity::Odd, Parity::Even, Parity::Mark, Parity::Space] {
        let err = scm
            .configure_data(handle1, DataBits::Five, StopBits::Two, parity, BaudRate::B9600)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFraming);
        assert_eq!(scm.settings(handle1).unwrap(), before);
    }
}

#[test]
fn rejected_framing_on_fresh_port_stays_unconfigured() {
    let (scm, handle1, _handle2) = open_pair();
    let err = scm
        .configure_data(
            handle1,
            DataBits::Five,
            StopBits::Two,
            Parity::None,
            BaudRate::B9600,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFraming);
    assert_eq!(scm.settings(handle1).unwrap(), None);
    assert_eq!(scm.session_state(handle1).unwrap(), SessionState::Opened);
}

#[test]
fn equal_xon_xoff_rejected_for_software_flow() {
    let (scm, handle1, _handle2) = open_pair();
    for ch in [b'x', DEFAULT_XON, 0] {
        let err = scm
            .configure_control(handle1, FlowControl::Software, ch, ch, false, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingFlowControl);
    }
    let err = scm
        .configure_control(handle1, FlowControl::Hardware, b'x', b'x', true, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingFlowControl);
    assert_eq!(scm.settings(handle1).unwrap(), None);
}

#[test]
fn unsupported_baud_rate() {
    let (scm, handle1, _handle2) = open_pair();
    let err = scm
        .configure_data(
            handle1,
            DataBits::Eight,
            StopBits::One,
            Parity::None,
            BaudRate::Custom(4_000_001),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedBaudRate);
}

#[test]
fn repeated_configuration_is_idempotent() {
    let (scm, handle1, _handle2) = open_pair();
    let expected = PortSettings {
        data: DataConfig::new(DataBits::Seven, StopBits::Two, Parity::Odd, BaudRate::B57600),
        control: ControlConfig::new(FlowControl::Software, DEFAULT_XON, DEFAULT_XOFF, false, true),
    };
    for _ in 0..3 {
        scm.configure_data(
            handle1,
            DataBits::Seven,
            StopBits::Two,
            Parity::Odd,
            BaudRate::B57600,
        )
        .unwrap();
        scm.configure_control(
            handle1,
            FlowControl::Software,
            DEFAULT_XON,
            DEFAULT_XOFF,
            false,
            true,
        )
        .unwrap();
        assert_eq!(scm.settings(handle1).unwrap(), Some(expected));
    }
}

#[test]
fn mismatched_speeds_fail_the_round_trip() {
    let (scm, handle1, handle2) = open_pair();
    configure_both(
        &scm,
        [handle1, handle2],
        DataConfig::default(),
        ControlConfig::default(),
    );
    scm.configure_data(
        handle2,
        DataBits::Eight,
        StopBits::One,
        Parity::None,
        BaudRate::B115200,
    )
    .unwrap();
    assert!(!scm
        .round_trip(handle1, handle2, b"testing", Duration::from_millis(50))
        .unwrap());

    scm.configure_data(
        handle1,
        DataBits::Eight,
        StopBits::One,
        Parity::None,
        BaudRate::B115200,
    )
    .unwrap();
    assert!(scm
        .round_trip(handle1, handle2, b"testing", Duration::from_millis(500))
        .unwrap());
}

#[test]
fn hangup_sentinel_keeps_line_speed() {
    let (scm, handle1, handle2) = open_pair();
    let data = DataConfig::new(DataBits::Eight, StopBits::One, Parity::None, BaudRate::B38400);
    let control = ControlConfig::new(FlowControl::None, b'x', b'x', false, true);
    configure_both(&scm, [handle1, handle2], data, control);
    assert!(scm.line_status(handle2).unwrap().dsr);

    scm.configure_data(
        handle1,
        DataBits::Eight,
        StopBits::One,
        Parity::None,
        BaudRate::B0,
    )
    .unwrap();
    assert!(!scm.line_status(handle2).unwrap().dsr);
    assert!(scm
        .round_trip(handle1, handle2, b"testing", Duration::from_millis(500))
        .unwrap());
}
