//! An in-memory link for use in testing.

mod emulator;

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{closed_error, Backend};
use crate::frame::WireFormat;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A mock backend for use in testing.
///
/// It has the following features:
///   * Everything written to it is recorded.
///   * It can be filled with packets (or lines) for reading. Reads block until
///     a packet is available or the timeout expires, like a real link.
///   * A responder can be installed that answers every write, for instance
///     with one of the built-in adapter emulators.
///   * Specific errors can be inserted for calls to `read_raw` and `write_raw`.
///     Each is only surfaced once.
///
/// All methods take `&self`, so a mock can be driven through
/// [`Session::backend`](crate::session::Session::backend) while a session owns
/// it.
///
/// ```
/// use dali_adapter::{backend::Mock, frame::{Status, TxFrame}, session::Session};
/// use std::time::Duration;
///
/// let mut session = Session::from_backend(Mock::text_adapter());
/// session.start_receive()?;
/// session.transmit(&TxFrame::new(16, 0xFF00), false)?;
/// assert_eq!(session.get(Duration::from_secs(1)).status(), Status::Loopback);
/// assert_eq!(session.backend().written(), [b"S1 10 FF00\r".to_vec()]);
/// session.close()?;
/// # Ok::<(), dali_adapter::error::Error>(())
/// ```
pub struct Mock {
	format: WireFormat,
	id: usize,
	state: Mutex<State>,
	readable: Condvar,
}

#[derive(Default)]
struct State {
	/// Packets waiting to be read.
	incoming: VecDeque<Vec<u8>>,
	/// Everything written so far.
	written: Vec<Vec<u8>>,
	/// Produces the packets that answer a write.
	responder: Option<Responder>,
	/// The error to surface on the next read, if any. It is only surfaced once.
	read_error: Option<io::Error>,
	/// The error to surface on the next write, if any. It is only surfaced once.
	write_error: Option<io::Error>,
	closed: bool,
}

impl Mock {
	/// Create a new Mock backend speaking `format`.
	pub fn new(format: WireFormat) -> Self {
		Mock {
			format,
			id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
			state: Mutex::new(State::default()),
			readable: Condvar::new(),
		}
	}

	/// Create a new Mock backend speaking the text protocol.
	pub fn text() -> Self {
		Mock::new(WireFormat::Text)
	}

	/// Create a new Mock backend speaking the binary protocol.
	pub fn binary() -> Self {
		Mock::new(WireFormat::Binary)
	}

	/// Create a Mock backend that behaves like a serial adapter on an
	/// otherwise silent bus.
	///
	/// Frames are echoed as loopback lines, raw sequences are decoded with
	/// the adapter's timing rules, and a bus power-down of more than half a
	/// second is reported as a failure followed by a recover.
	pub fn text_adapter() -> Self {
		let mut adapter = emulator::TextAdapter::default();
		Mock::text().with_responder(move |bytes| adapter.respond(bytes))
	}

	/// Create a Mock backend that behaves like a USB adapter on an otherwise
	/// silent bus.
	///
	/// Frames are acknowledged with their sequence number and queries are
	/// answered with a no-frame reply.
	pub fn binary_adapter() -> Self {
		Mock::binary().with_responder(emulator::respond_binary)
	}

	/// Install a responder that produces the packets answering each write.
	#[must_use]
	pub fn with_responder<F>(self, responder: F) -> Self
	where
		F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
	{
		self.state.lock().responder = Some(Box::new(responder));
		self
	}

	/// Append a packet to be read.
	///
	/// The data is not validated in any way.
	pub fn push<T: AsRef<[u8]>>(&self, packet: T) {
		self.state.lock().incoming.push_back(packet.as_ref().to_vec());
		self.readable.notify_all();
	}

	/// The number of packets that have not been read yet.
	pub fn pending(&self) -> usize {
		self.state.lock().incoming.len()
	}

	/// Everything written so far, one entry per write.
	pub fn written(&self) -> Vec<Vec<u8>> {
		self.state.lock().written.clone()
	}

	/// Set the error for the next `read_raw`, if any.
	pub fn read_error(&self, err: Option<io::Error>) {
		self.state.lock().read_error = err;
		self.readable.notify_all();
	}

	/// Set the error for the next `write_raw`, if any.
	pub fn write_error(&self, err: Option<io::Error>) {
		self.state.lock().write_error = err;
	}

	/// Whether the link has been closed.
	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}
}

impl std::fmt::Debug for Mock {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Mock")
			.field("format", &self.format)
			.field("id", &self.id)
			.field("incoming", &state.incoming)
			.field("written", &state.written)
			.field("responder", &state.responder.is_some())
			.field("closed", &state.closed)
			.finish_non_exhaustive()
	}
}

impl Backend for Mock {
	fn wire_format(&self) -> WireFormat {
		self.format
	}

	fn read_raw(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
		let deadline = Instant::now().checked_add(timeout);
		let mut state = self.state.lock();
		loop {
			if let Some(err) = state.read_error.take() {
				return Err(err);
			}
			if state.closed {
				return Err(closed_error());
			}
			if let Some(packet) = state.incoming.pop_front() {
				return Ok(Some(packet));
			}
			match deadline {
				Some(deadline) => {
					if self.readable.wait_until(&mut state, deadline).timed_out() {
						return Ok(state.incoming.pop_front());
					}
				}
				None => self.readable.wait(&mut state),
			}
		}
	}

	fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
		let mut guard = self.state.lock();
		let state = &mut *guard;
		if let Some(err) = state.write_error.take() {
			return Err(err);
		}
		if state.closed {
			return Err(closed_error());
		}
		state.written.push(bytes.to_vec());
		if let Some(responder) = state.responder.as_mut() {
			let replies = responder(bytes);
			if !replies.is_empty() {
				state.incoming.extend(replies);
				self.readable.notify_all();
			}
		}
		Ok(bytes.len())
	}

	fn close(&mut self) -> io::Result<()> {
		self.state.get_mut().closed = true;
		Ok(())
	}

	fn name(&self) -> Option<String> {
		Some(format!("<mock {}>", self.id))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::{sync::Arc, thread};

	#[test]
	fn read_waits_for_data() {
		let mock = Arc::new(Mock::text());
		assert_eq!(mock.read_raw(Duration::from_millis(10)).unwrap(), None);

		let producer = {
			let mock = Arc::clone(&mock);
			thread::spawn(move || {
				thread::sleep(Duration::from_millis(20));
				mock.push("{00000001>08 000000ff}");
			})
		};
		let packet = mock.read_raw(Duration::from_secs(5)).unwrap();
		assert_eq!(packet.as_deref(), Some(&b"{00000001>08 000000ff}"[..]));
		producer.join().unwrap();
	}

	#[test]
	fn errors_surface_once() {
		let mock = Mock::binary();
		mock.read_error(Some(io::Error::new(io::ErrorKind::PermissionDenied, "nope")));
		mock.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "nope")));
		assert_eq!(
			mock.read_raw(Duration::ZERO).unwrap_err().kind(),
			io::ErrorKind::PermissionDenied
		);
		assert_eq!(mock.read_raw(Duration::ZERO).unwrap(), None);
		assert_eq!(
			mock.write_raw(&[1, 2]).unwrap_err().kind(),
			io::ErrorKind::BrokenPipe
		);
		assert_eq!(mock.write_raw(&[1, 2]).unwrap(), 2);
		assert_eq!(mock.written(), [vec![1, 2]]);
	}

	#[test]
	fn responder_answers_writes() {
		let mock = Mock::text().with_responder(|bytes| vec![bytes.to_ascii_lowercase()]);
		mock.write_raw(b"ABC").unwrap();
		assert_eq!(mock.pending(), 1);
		assert_eq!(mock.read_raw(Duration::ZERO).unwrap(), Some(b"abc".to_vec()));
	}

	#[test]
	fn closed_mock_rejects_io() {
		let mut mock = Mock::text();
		mock.push("line");
		mock.close().unwrap();
		assert!(mock.is_closed());
		assert_eq!(
			mock.read_raw(Duration::ZERO).unwrap_err().kind(),
			io::ErrorKind::NotConnected
		);
		assert_eq!(
			mock.write_raw(b"?\r").unwrap_err().kind(),
			io::ErrorKind::NotConnected
		);
	}

	#[test]
	fn names_are_unique() {
		assert_ne!(Mock::text().name(), Mock::text().name());
	}
}
