use serialcom::{
    config::{BaudRate, DataBits, FlowControl, Parity, StopBits},
    device::SystemPorts,
    ManagerConfig, OsType, SerialComManager,
};
use std::time::Duration;

/// Wired pair checked when no ports are given on the command line
fn default_ports(os: OsType) -> Option<(&'static str, &'static str)> {
    match os {
        OsType::Linux => Some(("/dev/ttyUSB0", "/dev/ttyUSB1")),
        OsType::Windows => Some(("COM51", "COM52")),
        OsType::MacOsX => Some(("/dev/cu.usbserial-A70362A3", "/dev/cu.usbserial-A602RDCH")),
        OsType::Solaris | OsType::Other => None,
    }
}

fn main() -> Result<(), serialcom::Error> {
    env_logger::init();
    let scm = SerialComManager::with_config(SystemPorts, ManagerConfig::from_env());

    let mut args = std::env::args().skip(1);
    let (port1, port2) = match (args.next(), args.next()) {
        (Some(a), Some(b)) => (a, b),
        _ => match default_ports(scm.os_type()) {
            Some((a, b)) => (a.to_owned(), b.to_owned()),
            None => {
                eprintln!("usage: serialcom <port> <port>");
                std::process::exit(2);
            }
        },
    };

    let handle1 = scm.open(&port1, true, true, true)?;
    let handle2 = scm.open(&port2, true, true, true)?;

    let mut failures = 0;
    for baud_rate in BaudRate::STANDARD.iter().copied().filter(|b| !b.is_hangup()) {
        let result = [handle1, handle2].iter().try_for_each(|&handle| {
            scm.configure_data(handle, DataBits::Eight, StopBits::One, Parity::None, baud_rate)?;
            scm.configure_control(handle, FlowControl::None, b'x', b'x', false, false)
        });
        let verdict = match result.and_then(|_| {
            scm.clear_buffers(handle2)?;
            scm.round_trip(handle1, handle2, b"testing", Duration::from_millis(500))
        }) {
            Ok(true) => "ok".to_owned(),
            Ok(false) => {
                failures += 1;
                "data mismatch".to_owned()
            }
            Err(e) => {
                failures += 1;
                e.to_string()
            }
        };
        println!("8N1 @ {:>8}: {}", baud_rate.rate(), verdict);
    }

    scm.close(handle1)?;
    scm.close(handle2)?;

    if failures > 0 {
        println!("{} configurations failed", failures);
        std::process::exit(1);
    }
    Ok(())
}
