//! The background loop moving frames from a link into a session's queue.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{
	backend::{is_device_removed, Backend},
	codec,
	error::Error,
	frame::{now, Frame, Status},
	queue::FrameQueue,
};

/// How long each read waits, which bounds how quickly the loop notices it
/// has been stopped.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Spawn a thread that reads from `backend` and pushes decoded frames onto
/// `queue` until the queue is stopped or the link fails.
///
/// The queue must already be started. It is stopped when the thread exits.
pub(crate) fn spawn<B: Backend + 'static>(
	backend: Arc<B>,
	queue: Arc<FrameQueue>,
	name: String,
) -> io::Result<JoinHandle<Result<(), Error>>> {
	thread::Builder::new()
		.name(format!("dali-rx[{name}]"))
		.spawn(move || {
			ReceiveWorker {
				backend,
				queue,
				name,
			}
			.run()
		})
}

struct ReceiveWorker<B> {
	backend: Arc<B>,
	queue: Arc<FrameQueue>,
	name: String,
}

impl<B: Backend> ReceiveWorker<B> {
	fn run(self) -> Result<(), Error> {
		log::debug!("{} receive worker started", self.name);
		let result = self.receive();
		self.queue.stop();
		match &result {
			Ok(()) => log::debug!("{} receive worker terminated", self.name),
			Err(e) => log::error!("{} receive worker failed: {e}", self.name),
		}
		result
	}

	fn receive(&self) -> Result<(), Error> {
		let format = self.backend.wire_format();
		while self.queue.is_running() {
			let raw = match self.backend.read_raw(READ_TIMEOUT) {
				Ok(Some(raw)) => raw,
				Ok(None) => continue,
				Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) if is_device_removed(&e) => {
					log::warn!("{} adapter removed: {e}", self.name);
					return Ok(());
				}
				Err(e) => return Err(e.into()),
			};
			log::debug!("{} RX: {}", self.name, printable(&raw));

			let frame = codec::decode(format, &raw).unwrap_or_else(|e| {
				log::warn!("{} {e}", self.name);
				Frame::event(now(), Status::General, 0)
			});
			if let Err(frame) = self.queue.push(frame) {
				log::debug!("{} receive stopped, dropping {frame:?}", self.name);
				break;
			}
		}
		Ok(())
	}
}

/// Render raw bytes for logging: text lines as text, packets as hex.
pub(crate) fn printable(raw: &[u8]) -> String {
	match std::str::from_utf8(raw) {
		Ok(text) if !text.contains(|c: char| c.is_control() && c != '\r' && c != '\n') => {
			format!("{:?}", text.trim_end())
		}
		_ => format!("{raw:02X?}"),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::backend::Mock;

	fn start(mock: Mock) -> (Arc<Mock>, Arc<FrameQueue>, JoinHandle<Result<(), Error>>) {
		let mock = Arc::new(mock);
		let queue = Arc::new(FrameQueue::new(4));
		queue.start();
		let handle = spawn(Arc::clone(&mock), Arc::clone(&queue), "test".to_string()).unwrap();
		(mock, queue, handle)
	}

	#[test]
	fn frames_are_queued_in_order() {
		let mock = Mock::text();
		mock.push("{00000001>08 00000001}");
		mock.push("garbage");
		mock.push("{00000002:08 00000002}");
		let (_mock, queue, handle) = start(mock);

		let timeout = Duration::from_secs(2);
		let first = queue.pop(timeout);
		assert_eq!((first.status(), first.data()), (Status::Loopback, 1));
		assert_eq!(queue.pop(timeout).status(), Status::General);
		let third = queue.pop(timeout);
		assert_eq!((third.status(), third.data()), (Status::Frame, 2));

		queue.stop();
		handle.join().unwrap().unwrap();
	}

	#[test]
	fn short_packets_degrade_to_general() {
		let mock = Mock::binary();
		mock.push([0x12, 0x72]);
		let (_mock, queue, handle) = start(mock);
		assert_eq!(queue.pop(Duration::from_secs(2)).status(), Status::General);
		queue.stop();
		handle.join().unwrap().unwrap();
	}

	#[test]
	fn removal_ends_cleanly() {
		let (mock, queue, handle) = start(Mock::text());
		mock.read_error(Some(io::Error::new(io::ErrorKind::NotConnected, "unplugged")));
		handle.join().unwrap().unwrap();
		assert!(!queue.is_running());
	}

	#[test]
	fn other_errors_are_returned() {
		let (mock, queue, handle) = start(Mock::text());
		mock.read_error(Some(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
		let err = handle.join().unwrap().unwrap_err();
		assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
		assert!(!queue.is_running());
	}

	#[test]
	fn thread_is_named() {
		let (_mock, queue, handle) = start(Mock::text());
		assert_eq!(handle.thread().name(), Some("dali-rx[test]"));
		queue.stop();
		handle.join().unwrap().unwrap();
	}

	#[test]
	fn printable_output() {
		assert_eq!(printable(b"{00000001>08 000000ff}\r\n"), "\"{00000001>08 000000ff}\"");
		assert_eq!(printable(&[0x12, 0x02]), "[12, 02]");
	}
}
