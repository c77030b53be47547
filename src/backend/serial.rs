//! The serial port binding, speaking the text protocol.

use std::io::{self, Read as _, Write as _};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

use super::{closed_error, Backend};
use crate::{error::Error, frame::WireFormat};

/// The baud rate serial adapters use by default.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How many bytes are requested from the port per read.
const READ_CHUNK_SIZE: usize = 64;

/// A platform agnostic serial port link.
///
/// Adapter output is split into lines. Partial lines are kept between reads
/// until their newline arrives. Writes go through a second handle to the same
/// port so that a transmit never waits on a pending read.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Exactly one of them is
// wrapped here, decided at compile time, so that consumers only ever see
// [`Serial`].
#[derive(Debug)]
pub struct Serial {
	name: Option<String>,
	reader: Mutex<Option<LineReader>>,
	writer: Mutex<Option<ExternSerial>>,
}

#[derive(Debug)]
struct LineReader {
	port: ExternSerial,
	pending: Vec<u8>,
}

/// Remove the next complete, non-blank line from `pending`, without its line
/// ending.
fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
	while let Some(end) = pending.iter().position(|&b| b == b'\n') {
		let mut line: Vec<u8> = pending.drain(..=end).collect();
		while let Some(b'\r' | b'\n') = line.last() {
			line.pop();
		}
		if !line.is_empty() {
			return Some(line);
		}
	}
	None
}

impl Serial {
	/// Open the serial port at `path` with 8N1 framing and no flow control.
	pub(crate) fn open(path: &str, baud_rate: u32) -> Result<Self, Error> {
		// Some platforms ignore the baud rate passed to `new`, so it is set
		// again with `baud_rate` below.
		let port = sp::new(path, DEFAULT_BAUD_RATE)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.timeout(Duration::from_millis(100))
			.baud_rate(baud_rate)
			.open_native()?;
		let writer = port.try_clone_native()?;
		log::debug!("opened serial port {path} at {baud_rate} baud");
		Ok(Serial {
			name: port.name().or_else(|| Some(path.to_string())),
			reader: Mutex::new(Some(LineReader {
				port,
				pending: Vec::new(),
			})),
			writer: Mutex::new(Some(writer)),
		})
	}
}

impl Backend for Serial {
	fn wire_format(&self) -> WireFormat {
		WireFormat::Text
	}

	fn read_raw(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
		let mut guard = self.reader.lock();
		let reader = guard.as_mut().ok_or_else(closed_error)?;
		if let Some(line) = take_line(&mut reader.pending) {
			return Ok(Some(line));
		}

		let deadline = Instant::now() + timeout;
		let mut buffer = [0; READ_CHUNK_SIZE];
		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return Ok(None);
			}
			reader.port.set_timeout(remaining)?;
			match reader.port.read(&mut buffer) {
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::UnexpectedEof,
						"serial port returned no data",
					))
				}
				Ok(n) => {
					reader.pending.extend_from_slice(&buffer[..n]);
					if let Some(line) = take_line(&mut reader.pending) {
						return Ok(Some(line));
					}
				}
				Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
				Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
				Err(e) => return Err(e),
			}
		}
	}

	fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
		let mut guard = self.writer.lock();
		let writer = guard.as_mut().ok_or_else(closed_error)?;
		writer.write_all(bytes)?;
		writer.flush()?;
		Ok(bytes.len())
	}

	fn close(&mut self) -> io::Result<()> {
		let writer = self.writer.get_mut().take();
		let reader = self.reader.get_mut().take();
		if let Some(reader) = &reader {
			if !reader.pending.is_empty() {
				log::debug!(
					"{} discarding partial line {:?}",
					self.name.as_deref().unwrap_or(super::UNKNOWN_BACKEND_NAME),
					String::from_utf8_lossy(&reader.pending)
				);
			}
		}
		if let Some(mut writer) = writer {
			writer.flush()?;
		}
		Ok(())
	}

	fn name(&self) -> Option<String> {
		self.name.clone()
	}
}
