//! A simple but easy to use library for talking to DALI bus adapters.
//!
//! Adapters are reached either over a serial port, which speaks a line based
//! [text protocol](command), or over USB, which exchanges fixed size binary
//! packets. Both are driven through a [`Session`](session::Session):
//!
//! ```no_run
//! # fn wrapper() -> Result<(), dali_adapter::error::Error> {
//! use dali_adapter::{frame::{Status, TxFrame}, session::Session};
//! use std::time::Duration;
//!
//! let mut session = Session::open_serial("/dev/ttyUSB0")?;
//! session.start_receive()?;
//! session.transmit(&TxFrame::new(16, 0xFF00), false)?;
//! let echo = session.get(Duration::from_secs(2));
//! assert_eq!(echo.status(), Status::Loopback);
//! session.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::missing_crate_level_docs)]
#![cfg_attr(all(doc, feature = "doc_cfg"), feature(doc_cfg))]

pub mod backend;
pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod queue;
pub mod session;
mod worker;
