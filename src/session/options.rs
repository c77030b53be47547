//! Types defining the different options when opening a session.

use super::Session;
#[cfg(feature = "serial")]
use crate::backend::{Serial, DEFAULT_BAUD_RATE};
#[cfg(feature = "usb")]
use crate::backend::{
    usb::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID},
    Usb,
};
use crate::{backend::Backend, error::Error, queue::DEFAULT_CAPACITY};
use std::time::Duration;

/// How long a query waits for the adapter's echo, and then for a backframe,
/// by default.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Options for configuring a session on an already opened link.
///
/// ## Example
///
/// ```rust
/// # use dali_adapter::session::SessionOptions;
/// # use std::time::Duration;
/// # #[cfg(feature = "mock")]
/// # fn wrapper() {
/// use dali_adapter::backend::Mock;
///
/// let session = SessionOptions::new()
///     .queue_capacity(8)
///     .query_timeout(Duration::from_millis(50))
///     .open(Mock::text_adapter());
/// # }
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// The number of frames buffered between the receive worker and the caller.
    pub(super) queue_capacity: usize,
    /// How long a blocking transmit waits for its reply.
    pub(super) reply_timeout: Option<Duration>,
    /// How long a query waits for each reply.
    pub(super) query_timeout: Duration,
}

impl SessionOptions {
    /// Create a blank set of options ready for configuration.
    ///
    /// The queue holds 40 frames, blocking transmits wait for their reply
    /// without limit, and queries wait 100 ms for each reply.
    ///
    /// Equivalent to [`default`](SessionOptions::default).
    pub fn new() -> Self {
        SessionOptions {
            queue_capacity: DEFAULT_CAPACITY,
            reply_timeout: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set the number of frames buffered between the receive worker and the
    /// caller.
    ///
    /// The default is 40.
    pub fn queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how long a blocking [`transmit`](Session::transmit) waits for
    /// its reply.
    ///
    /// If duration is `None`, it waits until a frame arrives or receiving
    /// stops. The default is `None`.
    pub fn reply_timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.reply_timeout = duration;
        self
    }

    /// Set how long [`query_reply`](Session::query_reply) waits for the
    /// echo of the query, and then for the backframe.
    ///
    /// The default is 100 ms.
    pub fn query_timeout(&mut self, duration: Duration) -> &mut Self {
        self.query_timeout = duration;
        self
    }

    /// Open a session on `backend` with these options.
    pub fn open<B: Backend + 'static>(&self, backend: B) -> Session<B> {
        Session::with_options(backend, *self)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::new()
    }
}

/// Options for configuring and opening a session on a serial adapter.
///
/// ## Example
///
/// ```rust
/// # use dali_adapter::session::OpenSerialOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = OpenSerialOptions::new()
///     .reply_timeout(Some(Duration::from_secs(1)))
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "serial")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "serial")))]
#[derive(Debug, Clone)]
pub struct OpenSerialOptions {
    /// The custom baud rate
    baud_rate: u32,
    /// Options for the session itself
    session: SessionOptions,
}

#[cfg(feature = "serial")]
impl OpenSerialOptions {
    /// Create a blank set of options ready for configuration.
    ///
    /// The default baud rate is 115,200. See [`SessionOptions::new`] for the
    /// remaining defaults.
    ///
    /// Equivalent to [`default`](OpenSerialOptions::default).
    pub fn new() -> Self {
        OpenSerialOptions {
            baud_rate: DEFAULT_BAUD_RATE,
            session: SessionOptions::new(),
        }
    }

    /// Set a custom baud rate.
    ///
    /// The default is 115,200.
    pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
        self.baud_rate = baud_rate;
        self
    }

    /// See [`SessionOptions::queue_capacity`].
    pub fn queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.session.queue_capacity(capacity);
        self
    }

    /// See [`SessionOptions::reply_timeout`].
    pub fn reply_timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.session.reply_timeout(duration);
        self
    }

    /// See [`SessionOptions::query_timeout`].
    pub fn query_timeout(&mut self, duration: Duration) -> &mut Self {
        self.session.query_timeout(duration);
        self
    }

    /// Open the serial port at the specified path with the custom options.
    pub fn open(&self, path: &str) -> Result<Session<Serial>, Error> {
        Ok(self.session.open(Serial::open(path, self.baud_rate)?))
    }

    /// Open the serial port at the specified path with the custom options.
    ///
    /// The type of the underlying backend is erased via dynamic dispatch,
    /// which does have runtime overhead. [`OpenSerialOptions::open`] should
    /// generally be used instead, except when the type of the underlying
    /// backend may not be known at compile time.
    pub fn open_dyn(&self, path: &str) -> Result<Session<Box<dyn Backend>>, Error> {
        let backend: Box<dyn Backend> = Box::new(Serial::open(path, self.baud_rate)?);
        Ok(self.session.open(backend))
    }
}

#[cfg(feature = "serial")]
impl Default for OpenSerialOptions {
    fn default() -> Self {
        OpenSerialOptions::new()
    }
}

/// Options for configuring and opening a session on a USB adapter.
///
/// ## Example
///
/// ```rust
/// # use dali_adapter::session::OpenUsbOptions;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = OpenUsbOptions::new().product_id(0x0020).open()?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "usb")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "usb")))]
#[derive(Debug, Clone)]
pub struct OpenUsbOptions {
    /// The USB vendor ID to look for
    vendor_id: u16,
    /// The USB product ID to look for
    product_id: u16,
    /// Options for the session itself
    session: SessionOptions,
}

#[cfg(feature = "usb")]
impl OpenUsbOptions {
    /// Create a blank set of options ready for configuration.
    ///
    /// The default device is `17b5:0020`. See [`SessionOptions::new`] for the
    /// remaining defaults.
    ///
    /// Equivalent to [`default`](OpenUsbOptions::default).
    pub fn new() -> Self {
        OpenUsbOptions {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            session: SessionOptions::new(),
        }
    }

    /// Set the USB vendor ID of the adapter.
    pub fn vendor_id(&mut self, vendor_id: u16) -> &mut Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Set the USB product ID of the adapter.
    pub fn product_id(&mut self, product_id: u16) -> &mut Self {
        self.product_id = product_id;
        self
    }

    /// See [`SessionOptions::queue_capacity`].
    pub fn queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.session.queue_capacity(capacity);
        self
    }

    /// See [`SessionOptions::reply_timeout`].
    pub fn reply_timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.session.reply_timeout(duration);
        self
    }

    /// See [`SessionOptions::query_timeout`].
    pub fn query_timeout(&mut self, duration: Duration) -> &mut Self {
        self.session.query_timeout(duration);
        self
    }

    /// Open the first matching USB adapter with the custom options.
    pub fn open(&self) -> Result<Session<Usb>, Error> {
        Ok(self
            .session
            .open(Usb::open(self.vendor_id, self.product_id)?))
    }

    /// Open the first matching USB adapter with the custom options.
    ///
    /// The type of the underlying backend is erased via dynamic dispatch,
    /// which does have runtime overhead. [`OpenUsbOptions::open`] should
    /// generally be used instead, except when the type of the underlying
    /// backend may not be known at compile time.
    pub fn open_dyn(&self) -> Result<Session<Box<dyn Backend>>, Error> {
        let backend: Box<dyn Backend> = Box::new(Usb::open(self.vendor_id, self.product_id)?);
        Ok(self.session.open(backend))
    }
}

#[cfg(feature = "usb")]
impl Default for OpenUsbOptions {
    fn default() -> Self {
        OpenUsbOptions::new()
    }
}
