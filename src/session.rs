//! Sessions with an adapter.
//!
//! A [`Session`] owns a link to an adapter and, once
//! [`start_receive`](Session::start_receive) is called, a background worker
//! that decodes everything the adapter reports into a bounded queue. Frames
//! are transmitted from the caller's thread and replies are taken from the
//! queue with [`get`](Session::get).

mod options;

pub use options::*;

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "serial")]
use crate::backend::Serial;
#[cfg(feature = "usb")]
use crate::backend::Usb;
use crate::{
	backend::{closed_error, Backend, UNKNOWN_BACKEND_NAME},
	codec::{self, Exchange},
	command::Command,
	error::{Error, NotReceivingError, ProtocolError, SequenceMismatchError},
	frame::{Frame, Status, TxFrame, WireFormat},
	queue::FrameQueue,
	worker,
};

/// The lifecycle state of a [`Session`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum State {
	/// The link has been released.
	Closed,
	/// The link is open but nothing is being received.
	OpenIdle,
	/// The receive worker is running.
	Receiving,
}

/// A session with an adapter over a link `B`.
///
/// Closing is idempotent and also happens when the session is dropped.
///
/// ## Example
///
/// ```rust
/// # use dali_adapter::{frame::{Status, TxFrame}, session::Session};
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::open_serial("/dev/ttyUSB0")?;
/// session.start_receive()?;
/// // Broadcast OFF, and wait for the adapter to put it on the bus.
/// session.transmit(&TxFrame::new(16, 0xFF00), true)?;
/// // Query the actual level of all devices.
/// let reply = session.query_reply(&TxFrame::new(16, 0xFFA0))?;
/// if reply.status() == Status::Frame {
///     println!("level {}", reply.data());
/// }
/// session.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Session<B: Backend + 'static> {
	/// The link, shared with the receive worker
	backend: Arc<B>,
	/// The link's name, for logging
	name: String,
	/// The format spoken on the link
	format: WireFormat,
	/// Frames decoded by the worker, plus the running flag and sequence numbers
	queue: Arc<FrameQueue>,
	/// The receive worker, if one was started
	worker: Option<JoinHandle<Result<(), Error>>>,
	/// How long a blocking transmit waits for its reply
	reply_timeout: Option<Duration>,
	/// How long a query waits for each reply
	query_timeout: Duration,
	closed: bool,
}

#[cfg(feature = "serial")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "serial")))]
impl Session<Serial> {
	/// Open a session on the serial adapter at the specified path using the
	/// default options.
	///
	/// Alternatively, use [`Session::open_serial_options`] to customize how
	/// the session is opened.
	pub fn open_serial(path: &str) -> Result<Session<Serial>, Error> {
		OpenSerialOptions::new().open(path)
	}

	/// Get an [`OpenSerialOptions`] to customize how a serial session is opened.
	pub fn open_serial_options() -> OpenSerialOptions {
		OpenSerialOptions::default()
	}
}

#[cfg(feature = "usb")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "usb")))]
impl Session<Usb> {
	/// Open a session on the first USB adapter found, using the default
	/// options.
	///
	/// Alternatively, use [`Session::open_usb_options`] to customize how the
	/// session is opened.
	pub fn open_usb() -> Result<Session<Usb>, Error> {
		OpenUsbOptions::new().open()
	}

	/// Get an [`OpenUsbOptions`] to customize how a USB session is opened.
	pub fn open_usb_options() -> OpenUsbOptions {
		OpenUsbOptions::default()
	}
}

impl<B: Backend + 'static> Session<B> {
	/// Open a session on an already opened link using the default options.
	///
	/// See [`SessionOptions`] to customize the session.
	pub fn from_backend(backend: B) -> Self {
		Session::with_options(backend, SessionOptions::new())
	}

	pub(crate) fn with_options(backend: B, options: SessionOptions) -> Self {
		let name = backend
			.name()
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string());
		let format = backend.wire_format();
		log::debug!("{name} session opened ({format:?})");
		Session {
			backend: Arc::new(backend),
			name,
			format,
			queue: Arc::new(FrameQueue::new(options.queue_capacity)),
			worker: None,
			reply_timeout: options.reply_timeout,
			query_timeout: options.query_timeout,
			closed: false,
		}
	}

	/// Get a reference to the underlying link.
	pub fn backend(&self) -> &B {
		&self.backend
	}

	/// The name of the link.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The format spoken on the link.
	pub fn wire_format(&self) -> WireFormat {
		self.format
	}

	/// The queue received frames are placed on.
	pub fn queue(&self) -> &FrameQueue {
		&self.queue
	}

	/// The current lifecycle state.
	pub fn state(&self) -> State {
		if self.closed {
			State::Closed
		} else if self.queue.is_running() {
			State::Receiving
		} else {
			State::OpenIdle
		}
	}

	/// Whether the receive worker is running.
	///
	/// This becomes `false` on its own if the adapter is removed or the link
	/// fails.
	pub fn is_receiving(&self) -> bool {
		self.state() == State::Receiving
	}

	/// Start the background worker that receives frames.
	///
	/// Calling this while already receiving does nothing.
	///
	/// ## Errors
	///
	/// Fails if the session is closed, the worker could not be spawned, or a
	/// previous worker stopped because the link failed. In the last case the
	/// link's error is returned and the session should be closed.
	pub fn start_receive(&mut self) -> Result<(), Error> {
		self.check_open()?;
		if self.queue.is_running() {
			return Ok(());
		}
		self.join_worker()?;
		self.queue.start();
		match worker::spawn(
			Arc::clone(&self.backend),
			Arc::clone(&self.queue),
			self.name.clone(),
		) {
			Ok(handle) => {
				self.worker = Some(handle);
				Ok(())
			}
			Err(e) => {
				self.queue.stop();
				Err(e.into())
			}
		}
	}

	/// Transmit a frame.
	///
	/// On sequenced links (USB) the frame is assigned the next sequence
	/// number, which is returned. Text links return `None`.
	///
	/// If `block` is true, the next received frame is taken from the queue
	/// and must be the adapter's acknowledgement of this frame. That frame is
	/// consumed.
	///
	/// ## Errors
	///
	/// * [`NotReceivingError`] if `block` is true but the session is not
	///   receiving, or stops receiving before a reply arrives.
	/// * [`SequenceMismatchError`] if, on a sequenced link, the reply carries
	///   a different sequence number or no reply arrives within the reply
	///   timeout.
	/// * An I/O error of kind [`TimedOut`](io::ErrorKind::TimedOut) if, on a
	///   text link, no reply arrives within the reply timeout.
	/// * [`ProtocolError`] if the frame cannot be encoded.
	pub fn transmit(&mut self, frame: &TxFrame, block: bool) -> Result<Option<u8>, Error> {
		self.check_open()?;
		if block && !self.queue.is_running() {
			return Err(NotReceivingError.into());
		}
		let sequence = self.write_frame(frame, Exchange::Send)?;
		if !block {
			return Ok(sequence);
		}

		let reply = self.queue.pop_while_running(self.reply_timeout);
		log::trace!("{} reply to blocking transmit: {reply:?}", self.name);
		match (sequence, reply) {
			(_, None) if !self.queue.is_running() => Err(NotReceivingError.into()),
			(Some(sent), None) => Err(SequenceMismatchError::new(sent, None).into()),
			(None, None) => Err(io::Error::new(
				io::ErrorKind::TimedOut,
				"no reply to blocking transmit",
			)
			.into()),
			(Some(sent), Some(reply)) if reply.sequence() != Some(sent) => {
				Err(SequenceMismatchError::new(sent, reply.sequence()).into())
			}
			_ => Ok(sequence),
		}
	}

	/// Send a raw text command to a serial adapter.
	///
	/// Whatever the adapter reports in response is placed on the queue like
	/// any other frame.
	///
	/// ## Errors
	///
	/// A [`ProtocolError`] is returned if the link does not speak the text
	/// protocol.
	pub fn send(&mut self, command: &Command) -> Result<(), Error> {
		self.check_open()?;
		if self.format != WireFormat::Text {
			return Err(ProtocolError::new(format!(
				"{} does not accept text commands such as {command}",
				self.name
			))
			.into());
		}
		let bytes = command.to_bytes();
		log::debug!("{} TX: {}", self.name, worker::printable(&bytes));
		self.backend.write_raw(&bytes)?;
		Ok(())
	}

	/// Take the next received frame, waiting up to `timeout` for one.
	///
	/// If none arrives in time a [`Timeout`](crate::frame::Status::Timeout)
	/// frame is returned.
	pub fn get(&self, timeout: Duration) -> Frame {
		if !self.is_receiving() {
			log::debug!("{} receive is not running", self.name);
		}
		self.queue.pop(timeout)
	}

	/// Take the next received frame, waiting up to `timeout` for one.
	///
	/// Equivalent to [`get`](Session::get).
	pub fn pop(&self, timeout: Duration) -> Frame {
		self.get(timeout)
	}

	/// Transmit a query and return the reply.
	///
	/// The adapter's echo of the query is skipped. If no other frame arrives
	/// within the query timeout a [`Timeout`](crate::frame::Status::Timeout)
	/// frame is returned, which on a DALI bus means no device answered. An
	/// answer is always returned with [`Frame`](Status::Frame) status, even
	/// when a USB adapter reports it in response mode.
	///
	/// ## Errors
	///
	/// [`NotReceivingError`] if the session is not receiving, plus the errors
	/// of [`transmit`](Session::transmit).
	pub fn query_reply(&mut self, frame: &TxFrame) -> Result<Frame, Error> {
		self.check_open()?;
		if !self.queue.is_running() {
			return Err(NotReceivingError.into());
		}
		let sequence = self.write_frame(frame, Exchange::Query)?;
		let mut echoes = if frame.send_twice() { 2 } else { 1 };
		loop {
			let reply = self.queue.pop(self.query_timeout);
			let is_echo = reply.is_echo_of(frame) && (sequence.is_none() || reply.sequence() == sequence);
			if echoes > 0 && is_echo {
				echoes -= 1;
				continue;
			}
			// USB adapters report the answer to a query in response mode,
			// tagged with the query's sequence number.
			if sequence.is_some() && reply.sequence() == sequence && reply.status() == Status::Loopback {
				return Ok(reply.with_status(Status::Frame));
			}
			return Ok(reply);
		}
	}

	/// Stop receiving and release the link.
	///
	/// Calling this on a closed session does nothing.
	///
	/// ## Errors
	///
	/// If the receive worker stopped because the link failed, that error is
	/// returned. The session is closed regardless.
	pub fn close(&mut self) -> Result<(), Error> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		log::debug!("{} closing session", self.name);
		self.queue.stop();
		let worker = self.join_worker();
		let link = match Arc::get_mut(&mut self.backend) {
			Some(backend) => backend.close().map_err(Error::from),
			None => {
				log::warn!("{} link is still in use and was not closed", self.name);
				Ok(())
			}
		};
		log::debug!("{} session closed", self.name);
		worker.and(link)
	}

	/// Encode and write a frame, returning its sequence number on sequenced
	/// links.
	fn write_frame(&self, frame: &TxFrame, exchange: Exchange) -> Result<Option<u8>, Error> {
		let sequence = self
			.format
			.is_sequenced()
			.then(|| self.queue.next_sequence());
		let bytes = codec::encode(self.format, frame, sequence.unwrap_or_default(), exchange)?;
		log::debug!("{} TX: {}", self.name, worker::printable(&bytes));
		self.backend.write_raw(&bytes)?;
		Ok(sequence)
	}

	/// Wait for a stopped worker and return the error it failed with, if any.
	fn join_worker(&mut self) -> Result<(), Error> {
		match self.worker.take() {
			Some(handle) => handle.join().unwrap_or_else(|_| {
				Err(io::Error::other("receive worker panicked").into())
			}),
			None => Ok(()),
		}
	}

	fn check_open(&self) -> Result<(), Error> {
		if self.closed {
			Err(closed_error().into())
		} else {
			Ok(())
		}
	}
}

impl<B: Backend + 'static> std::fmt::Debug for Session<B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("name", &self.name)
			.field("format", &self.format)
			.field("state", &self.state())
			.field("queued", &self.queue.len())
			.finish_non_exhaustive()
	}
}

impl<B: Backend + 'static> Drop for Session<B> {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::warn!("{} error while closing: {e}", self.name);
		}
	}
}
