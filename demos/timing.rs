//! Demo: timing measurements against a serial-attached DALI adapter.

use dali_adapter::{command::Command, frame::Status, session::Session};
use simple_logger::SimpleLogger;
use std::time::Duration;

/// A half bit period, in µs.
const HALF_BIT: u32 = 417;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()
        .unwrap();

    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let mut session = Session::open_serial(&path)?;
    session.start_receive()?;

    // Stretch the start bit until the receiver rejects it.
    for start in (300..=600).step_by(50) {
        let mut periods = vec![HALF_BIT; 17];
        periods[0] = start;
        for command in Command::sequence(&periods) {
            session.send(&command)?;
        }
        let frame = session.get(Duration::from_millis(200));
        match frame.status() {
            Status::Loopback | Status::Frame => {
                println!("{start} us: {:#04x}", frame.data());
            }
            Status::Timing => println!(
                "{start} us: timing violation after {} us at bit {}",
                frame.elapsed_us(),
                frame.bit()
            ),
            status => println!("{start} us: {status:?}"),
        }
    }

    // Power the bus down for 600 ms, which the receiver reports as a system
    // failure followed by a recover.
    for command in Command::sequence(&[600_000]) {
        session.send(&command)?;
    }
    for _ in 0..2 {
        println!("{:?}", session.get(Duration::from_secs(1)));
    }
    session.close()?;
    Ok(())
}
