//! The USB binding, speaking the binary protocol.

use std::io;
use std::time::Duration;

use rusb::{ConfigDescriptor, DeviceHandle, Direction, GlobalContext, TransferType};

use super::Backend;
use crate::{
	codec::binary::PACKET_SIZE,
	error::{DeviceNotFoundError, EndpointError, Error},
	frame::WireFormat,
};

/// The vendor ID of USB adapters.
pub const DEFAULT_VENDOR_ID: u16 = 0x17B5;
/// The product ID of USB adapters.
pub const DEFAULT_PRODUCT_ID: u16 = 0x0020;

/// The interface the adapter is driven through.
const INTERFACE: u8 = 0;
/// How long each read waits while draining stale packets on open.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
/// The most stale packets discarded on open.
const DRAIN_LIMIT: usize = 64;
/// `rusb` treats a zero timeout as "wait forever".
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Copy, Clone)]
struct Endpoint {
	address: u8,
	transfer_type: TransferType,
	max_packet_size: usize,
}

/// A USB adapter link.
pub struct Usb {
	handle: DeviceHandle<GlobalContext>,
	read_endpoint: Endpoint,
	write_endpoint: Endpoint,
	name: String,
	claimed: bool,
}

impl std::fmt::Debug for Usb {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Usb")
			.field("name", &self.name)
			.field("read_endpoint", &self.read_endpoint)
			.field("write_endpoint", &self.write_endpoint)
			.field("claimed", &self.claimed)
			.finish_non_exhaustive()
	}
}

impl Usb {
	/// Open the first USB device matching `vendor` and `product`.
	pub(crate) fn open(vendor: u16, product: u16) -> Result<Self, Error> {
		log::debug!("looking for USB adapters {vendor:04x}:{product:04x}");
		let device = rusb::devices()?
			.iter()
			.find(|device| {
				device
					.device_descriptor()
					.is_ok_and(|d| d.vendor_id() == vendor && d.product_id() == product)
			})
			.ok_or_else(|| {
				DeviceNotFoundError::new(format!("no USB device {vendor:04x}:{product:04x}"))
			})?;
		let name = format!(
			"usb {:03}:{:03} ({vendor:04x}:{product:04x})",
			device.bus_number(),
			device.address()
		);
		log::info!("found adapter {name}");

		let mut handle = device.open()?;
		handle.reset()?;
		if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
			handle.detach_kernel_driver(INTERFACE)?;
		}
		if let Err(e) = handle.set_active_configuration(1) {
			log::debug!("{name} keeping current configuration: {e}");
		}
		handle.claim_interface(INTERFACE)?;

		let config = device.active_config_descriptor()?;
		let (read_endpoint, write_endpoint) = find_endpoints(&config)
			.ok_or_else(|| EndpointError::new(format!("no IN and OUT endpoint on {name}")))?;

		let usb = Usb {
			handle,
			read_endpoint,
			write_endpoint,
			name,
			claimed: true,
		};
		usb.drain();
		Ok(usb)
	}

	/// Discard packets the adapter queued before the link was opened.
	fn drain(&self) {
		for _ in 0..DRAIN_LIMIT {
			match self.read_raw(DRAIN_TIMEOUT) {
				Ok(Some(packet)) => log::info!("{} discarding stale packet {packet:02X?}", self.name),
				Ok(None) | Err(_) => return,
			}
		}
	}
}

/// Find the IN and OUT endpoints of the adapter's interface.
fn find_endpoints(config: &ConfigDescriptor) -> Option<(Endpoint, Endpoint)> {
	let mut read = None;
	let mut write = None;
	let descriptors = config
		.interfaces()
		.flat_map(|interface| interface.descriptors())
		.filter(|d| d.interface_number() == INTERFACE && d.setting_number() == 0);
	for descriptor in descriptors {
		for endpoint in descriptor.endpoint_descriptors() {
			let found = Endpoint {
				address: endpoint.address(),
				transfer_type: endpoint.transfer_type(),
				max_packet_size: usize::from(endpoint.max_packet_size()),
			};
			match endpoint.direction() {
				Direction::In => read = read.or(Some(found)),
				Direction::Out => write = write.or(Some(found)),
			}
		}
	}
	read.zip(write)
}

/// Convert a `rusb` error to the I/O error the link reports.
pub(crate) fn io_error(error: rusb::Error) -> io::Error {
	let kind = match error {
		rusb::Error::Timeout => io::ErrorKind::TimedOut,
		rusb::Error::NoDevice => io::ErrorKind::NotConnected,
		rusb::Error::Pipe => io::ErrorKind::BrokenPipe,
		rusb::Error::Access => io::ErrorKind::PermissionDenied,
		rusb::Error::NotFound => io::ErrorKind::NotFound,
		rusb::Error::Busy => io::ErrorKind::WouldBlock,
		rusb::Error::InvalidParam => io::ErrorKind::InvalidInput,
		rusb::Error::Interrupted => io::ErrorKind::Interrupted,
		rusb::Error::NoMem => io::ErrorKind::OutOfMemory,
		rusb::Error::NotSupported => io::ErrorKind::Unsupported,
		_ => io::ErrorKind::Other,
	};
	io::Error::new(kind, error)
}

impl Backend for Usb {
	fn wire_format(&self) -> WireFormat {
		WireFormat::Binary
	}

	fn read_raw(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
		if !self.claimed {
			return Err(super::closed_error());
		}
		let endpoint = self.read_endpoint;
		let mut buffer = vec![0; endpoint.max_packet_size.max(PACKET_SIZE)];
		let timeout = timeout.max(MIN_TIMEOUT);
		let result = match endpoint.transfer_type {
			TransferType::Interrupt => self.handle.read_interrupt(endpoint.address, &mut buffer, timeout),
			_ => self.handle.read_bulk(endpoint.address, &mut buffer, timeout),
		};
		received(result, buffer)
	}

	fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
		if !self.claimed {
			return Err(super::closed_error());
		}
		let endpoint = self.write_endpoint;
		let timeout = Duration::from_secs(1);
		let result = match endpoint.transfer_type {
			TransferType::Interrupt => self.handle.write_interrupt(endpoint.address, bytes, timeout),
			_ => self.handle.write_bulk(endpoint.address, bytes, timeout),
		};
		result.map_err(io_error)
	}

	fn close(&mut self) -> io::Result<()> {
		if !self.claimed {
			return Ok(());
		}
		self.claimed = false;
		match self.handle.release_interface(INTERFACE) {
			// Unplugged adapters have nothing left to release.
			Ok(()) | Err(rusb::Error::NoDevice) => Ok(()),
			Err(e) => Err(io_error(e)),
		}
	}

	fn name(&self) -> Option<String> {
		Some(self.name.clone())
	}
}

/// Turn the outcome of a read transfer into the packet it produced, if any.
fn received(result: rusb::Result<usize>, mut buffer: Vec<u8>) -> io::Result<Option<Vec<u8>>> {
	match result {
		Ok(0) | Err(rusb::Error::Timeout) => Ok(None),
		Ok(n) => {
			buffer.truncate(n);
			Ok(Some(buffer))
		}
		Err(e) => Err(io_error(e)),
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn error_kinds() {
		assert_eq!(io_error(rusb::Error::NoDevice).kind(), io::ErrorKind::NotConnected);
		assert_eq!(io_error(rusb::Error::Timeout).kind(), io::ErrorKind::TimedOut);
		assert_eq!(io_error(rusb::Error::Pipe).kind(), io::ErrorKind::BrokenPipe);
		assert_eq!(io_error(rusb::Error::Overflow).kind(), io::ErrorKind::Other);
		assert!(crate::backend::is_device_removed(&io_error(rusb::Error::NoDevice)));
	}

	#[test]
	fn transfer_results() {
		let buffer = || vec![0x12; PACKET_SIZE];
		assert_eq!(received(Ok(0), buffer()).unwrap(), None);
		assert_eq!(received(Err(rusb::Error::Timeout), buffer()).unwrap(), None);
		assert_eq!(received(Ok(9), buffer()).unwrap(), Some(vec![0x12; 9]));
		let err = received(Err(rusb::Error::NoDevice), buffer()).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotConnected);
	}

	#[test]
	fn missing_device_is_not_found() {
		// No adapter is expected to use this vendor ID.
		match Usb::open(0xFFFF, 0xFFFE) {
			Err(Error::DeviceNotFound(_)) => {}
			// Hosts without USB access cannot enumerate devices at all.
			Err(Error::Io(_)) => {}
			other => panic!("unexpected result {other:?}"),
		}
	}
}
