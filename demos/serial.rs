//! Demo: send frames through a serial-attached DALI adapter.

use dali_adapter::{
    frame::{Status, TxFrame},
    session::Session,
};
use simple_logger::SimpleLogger;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init().unwrap();

    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let mut session = Session::open_serial(&path)?;
    session.start_receive()?;

    // Broadcast OFF and wait for it to appear on the bus.
    session.transmit(&TxFrame::new(16, 0xFF00), true)?;

    // Ask every device for its actual level.
    let reply = session.query_reply(&TxFrame::new(16, 0xFFA0))?;
    match reply.status() {
        Status::Frame => println!("actual level: {}", reply.data()),
        Status::Timeout => println!("no device answered"),
        status => println!("unexpected reply: {status:?}"),
    }

    // Print everything else seen on the bus for a few seconds.
    for _ in 0..50 {
        let frame = session.get(Duration::from_millis(100));
        if frame.status() != Status::Timeout {
            println!("{frame:?}");
        }
    }
    session.close()?;
    Ok(())
}
