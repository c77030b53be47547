//! Links that can exchange raw bytes with a connected adapter.
//!
//! The [`Backend`] trait represents all such types. Reads and writes take
//! `&self` so that a session's receive worker and its caller can share one
//! link; each binding serializes access internally.

use std::io;
use std::time::Duration;

use crate::frame::WireFormat;

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
pub mod mock;
#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "usb")]
pub(crate) mod usb;

#[cfg(any(test, feature = "mock"))]
pub use mock::Mock;
#[cfg(feature = "serial")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "serial")))]
pub use serial::{Serial, DEFAULT_BAUD_RATE};
#[cfg(feature = "usb")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "usb")))]
pub use usb::Usb;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing raw bytes with a connected adapter.
pub trait Backend: Send + Sync + private::Sealed {
	/// The format of the bytes exchanged over this link.
	fn wire_format(&self) -> WireFormat;

	/// Read one unit of adapter output: a line for text links, a packet for
	/// binary links.
	///
	/// Returns `Ok(None)` if nothing arrived within `timeout`.
	fn read_raw(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;

	/// Write `bytes` to the adapter, returning the number of bytes written.
	fn write_raw(&self, bytes: &[u8]) -> io::Result<usize>;

	/// Release the link.
	///
	/// Reads and writes fail with [`io::ErrorKind::NotConnected`] afterwards.
	fn close(&mut self) -> io::Result<()>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn wire_format(&self) -> WireFormat {
		(**self).wire_format()
	}
	fn read_raw(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
		(**self).read_raw(timeout)
	}
	fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
		(**self).write_raw(bytes)
	}
	fn close(&mut self) -> io::Result<()> {
		(**self).close()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

/// Whether an I/O error means the adapter is gone, rather than that a single
/// exchange failed.
pub(crate) fn is_device_removed(error: &io::Error) -> bool {
	matches!(
		error.kind(),
		io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof
	)
}

/// The error returned by a link that has been closed.
pub(crate) fn closed_error() -> io::Error {
	io::Error::new(io::ErrorKind::NotConnected, "link is closed")
}

mod private {
	pub trait Sealed {}

	#[cfg(feature = "serial")]
	impl Sealed for super::Serial {}
	#[cfg(feature = "usb")]
	impl Sealed for super::Usb {}
	#[cfg(any(test, feature = "mock"))]
	impl Sealed for super::Mock {}
	impl<C: super::Backend + ?Sized> Sealed for Box<C> {}
}

#[cfg(test)]
mod test {
	use super::*;
	use static_assertions::assert_impl_all;

	assert_impl_all!(Mock: Backend, Send, Sync);
	assert_impl_all!(Box<dyn Backend>: Backend);
	#[cfg(feature = "serial")]
	assert_impl_all!(Serial: Backend, Send, Sync);

	#[test]
	fn removal_kinds() {
		for kind in [
			io::ErrorKind::NotConnected,
			io::ErrorKind::BrokenPipe,
			io::ErrorKind::UnexpectedEof,
		] {
			assert!(is_device_removed(&io::Error::new(kind, "gone")));
		}
		assert!(!is_device_removed(&io::Error::new(io::ErrorKind::TimedOut, "slow")));
		assert!(is_device_removed(&closed_error()));
	}

	#[test]
	fn boxed_backend_forwards() {
		let mut boxed: Box<dyn Backend> = Box::new(Mock::text());
		assert_eq!(boxed.wire_format(), WireFormat::Text);
		assert_eq!(boxed.write_raw(b"?\r").unwrap(), 2);
		assert_eq!(boxed.read_raw(Duration::ZERO).unwrap(), None);
		boxed.close().unwrap();
		assert!(is_device_removed(&boxed.write_raw(b"?\r").unwrap_err()));
	}
}
