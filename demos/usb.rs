//! Demo: send frames through a USB-attached DALI adapter.

use dali_adapter::{
    frame::{Status, TxFrame},
    session::Session,
};
use simple_logger::SimpleLogger;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init().unwrap();

    let mut session = Session::open_usb_options()
        .reply_timeout(Some(Duration::from_secs(1)))
        .open()?;
    session.start_receive()?;

    // Recall the maximum level on all devices.
    let sequence = session.transmit(&TxFrame::new(16, 0xFF05), true)?;
    println!("acknowledged as {sequence:?}");

    // Configuration commands such as RESET must be sent twice.
    session.transmit(&TxFrame::new(16, 0xFF20).with_send_twice(true), false)?;
    for _ in 0..2 {
        println!("{:?}", session.get(Duration::from_secs(1)));
    }

    let reply = session.query_reply(&TxFrame::new(16, 0xFF90))?;
    match reply.status() {
        Status::Frame => println!("status: {:#04x}", reply.data()),
        status => println!("no status: {status:?}"),
    }
    session.close()?;
    Ok(())
}
